//! Signature-based classification of metadata sections.
//!
//! A section's role is decided by the column names in its header, never by
//! its position in the file, so new or reordered sections in future releases
//! do not disturb parsing. Sections matching no signature are dropped.

pub mod model;

pub use model::{CubeInfo, DatasetMetadata, Dimension, DimensionMember};

use serde::Serialize;
use std::fmt;

use crate::error::MalformedSectionError;
use crate::parser::Section;

/// The semantic role of a metadata section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SectionRole {
    CubeInfo,
    Notes,
    Dimensions,
    DimensionValues,
}

impl fmt::Display for SectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionRole::CubeInfo => "CubeInfo",
            SectionRole::Notes => "Notes",
            SectionRole::Dimensions => "Dimensions",
            SectionRole::DimensionValues => "DimensionValues",
        };
        f.write_str(name)
    }
}

/// Column signatures, tested in order; the first whose columns are all
/// present in a header decides the role.
pub const SIGNATURES: &[(SectionRole, &[&str])] = &[
    (SectionRole::CubeInfo, &["Cube Title", "Product Id"]),
    (SectionRole::Dimensions, &["Dimension ID", "Dimension name"]),
    (SectionRole::DimensionValues, &["Dimension ID", "Member Name"]),
    (SectionRole::Notes, &["Note ID", "Note"]),
];

/// A section tagged with the role its header matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticSection {
    pub role: SectionRole,
    pub section: Section,
}

/// The role a header matches, if any.
pub fn role_of(section: &Section) -> Option<SectionRole> {
    SIGNATURES
        .iter()
        .find(|(_, columns)| section.has_columns(columns))
        .map(|(role, _)| *role)
}

/// Tag a section with its role; `None` if it matches no signature.
pub fn classify(section: Section) -> Option<SemanticSection> {
    role_of(&section).map(|role| SemanticSection { role, section })
}

/// Classify every section of a parse, stopping at the first parse error.
pub fn classify_all<I>(sections: I) -> Result<Vec<SemanticSection>, MalformedSectionError>
where
    I: IntoIterator<Item = Result<Section, MalformedSectionError>>,
{
    let mut classified = Vec::new();
    for section in sections {
        if let Some(semantic) = classify(section?) {
            classified.push(semantic);
        }
    }
    Ok(classified)
}
