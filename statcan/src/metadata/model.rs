//! The typed metadata object built from classified sections.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::{classify_all, SectionRole, SemanticSection};
use crate::error::{MetadataResult, MissingSectionError};
use crate::parser::{MetadataText, Section};

/// The cube (table) summary: title, product id and every other field of
/// the first cube-info row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CubeInfo {
    pub title: String,
    pub product_id: String,
    pub fields: BTreeMap<String, String>,
}

/// One categorical axis of the cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub id: String,
    pub name: String,
    /// Note ids referenced by the dimension, as written.
    pub note_ids: Vec<String>,
    /// Text of the referenced notes that exist in the notes section.
    pub notes: Vec<String>,
    pub definition: Option<String>,
}

/// One member (value) of a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionMember {
    pub dimension_id: String,
    pub name: String,
    pub classification_code: Option<String>,
    pub member_id: Option<String>,
    pub parent_member_id: Option<String>,
    pub terminated: bool,
    pub notes: Vec<String>,
    pub definition: Option<String>,
}

/// Parsed metadata for one dataset.
///
/// Built once from a full parse and immutable afterwards. A role whose
/// section never appeared is reported as [`MissingSectionError`] by the
/// accessor that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetMetadata {
    cube_info: Option<CubeInfo>,
    notes: Option<BTreeMap<String, String>>,
    dimensions: Option<Vec<Dimension>>,
    members: Option<Vec<DimensionMember>>,
}

impl DatasetMetadata {
    /// Detect the encoding, parse and classify raw metadata bytes.
    pub fn from_bytes(bytes: &[u8]) -> MetadataResult<Self> {
        let text = MetadataText::from_bytes(bytes)?;
        Self::parse(&text)
    }

    /// Read and parse a metadata file.
    pub fn read<P: AsRef<Path>>(path: P) -> MetadataResult<Self> {
        let text = MetadataText::read(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &MetadataText) -> MetadataResult<Self> {
        let sections = classify_all(text.sections())?;
        Ok(Self::from_sections(sections))
    }

    /// Assemble from classified sections. When a role occurs more than once
    /// the last occurrence wins.
    pub fn from_sections<I: IntoIterator<Item = SemanticSection>>(sections: I) -> Self {
        let mut by_role: HashMap<SectionRole, Section> = HashMap::new();
        for semantic in sections {
            by_role.insert(semantic.role, semantic.section);
        }
        let section = |role: SectionRole| by_role.get(&role);

        // Notes first: dimensions and members resolve against them.
        let notes = section(SectionRole::Notes).map(build_notes);
        let empty = BTreeMap::new();
        let lookup = notes.as_ref().unwrap_or(&empty);

        Self {
            cube_info: section(SectionRole::CubeInfo).and_then(build_cube_info),
            dimensions: section(SectionRole::Dimensions).map(|s| build_dimensions(s, lookup)),
            members: section(SectionRole::DimensionValues).map(|s| build_members(s, lookup)),
            notes,
        }
    }

    pub fn cube_info(&self) -> Result<&CubeInfo, MissingSectionError> {
        self.cube_info
            .as_ref()
            .ok_or(MissingSectionError(SectionRole::CubeInfo))
    }

    pub fn cube_title(&self) -> Result<&str, MissingSectionError> {
        Ok(&self.cube_info()?.title)
    }

    pub fn product_id(&self) -> Result<&str, MissingSectionError> {
        Ok(&self.cube_info()?.product_id)
    }

    /// Dimensions in declared order.
    pub fn dimensions(&self) -> Result<&[Dimension], MissingSectionError> {
        self.dimensions
            .as_deref()
            .ok_or(MissingSectionError(SectionRole::Dimensions))
    }

    pub fn dimension(&self, id: &str) -> Result<Option<&Dimension>, MissingSectionError> {
        Ok(self.dimensions()?.iter().find(|d| d.id == id))
    }

    pub fn dimension_members(&self) -> Result<&[DimensionMember], MissingSectionError> {
        self.members
            .as_deref()
            .ok_or(MissingSectionError(SectionRole::DimensionValues))
    }

    /// Members of one dimension, in file order.
    pub fn members_of(&self, dimension_id: &str) -> Result<Vec<&DimensionMember>, MissingSectionError> {
        Ok(self
            .dimension_members()?
            .iter()
            .filter(|m| m.dimension_id == dimension_id)
            .collect())
    }

    /// Note id to note text.
    pub fn notes(&self) -> Result<&BTreeMap<String, String>, MissingSectionError> {
        self.notes.as_ref().ok_or(MissingSectionError(SectionRole::Notes))
    }

    pub fn note(&self, id: &str) -> Result<Option<&str>, MissingSectionError> {
        Ok(self.notes()?.get(id).map(String::as_str))
    }

    /// The pivot dimension: the last declared dimension, which is the
    /// finest-grained axis of the cube.
    ///
    /// Every dimension row with an id or a name counts, so a last row with
    /// an empty `Dimension ID` is still the pivot. Fully blank rows are
    /// skipped.
    pub fn pivot_dimension(&self) -> Result<&Dimension, MissingSectionError> {
        self.dimensions()?
            .last()
            .ok_or(MissingSectionError(SectionRole::Dimensions))
    }

    /// Name of the pivot dimension, which is also the data column to pivot on.
    pub fn pivot_column(&self) -> Result<&str, MissingSectionError> {
        Ok(&self.pivot_dimension()?.name)
    }

    pub fn has_role(&self, role: SectionRole) -> bool {
        match role {
            SectionRole::CubeInfo => self.cube_info.is_some(),
            SectionRole::Notes => self.notes.is_some(),
            SectionRole::Dimensions => self.dimensions.is_some(),
            SectionRole::DimensionValues => self.members.is_some(),
        }
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Split a note reference field (`"3"`, `"3;7"`) into ids.
fn note_ids(field: Option<&str>) -> Vec<String> {
    field
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_notes(ids: &[String], notes: &BTreeMap<String, String>) -> Vec<String> {
    ids.iter().filter_map(|id| notes.get(id).cloned()).collect()
}

fn build_notes(section: &Section) -> BTreeMap<String, String> {
    (0..section.len())
        .filter_map(|row| {
            let id = section.non_empty(row, "Note ID")?;
            let text = section.value(row, "Note").unwrap_or_default();
            Some((id.to_string(), text.to_string()))
        })
        .collect()
}

fn build_cube_info(section: &Section) -> Option<CubeInfo> {
    if section.is_empty() {
        return None;
    }
    let fields = section
        .header()
        .iter()
        .zip(&section.rows()[0])
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some(CubeInfo {
        title: section.value(0, "Cube Title").unwrap_or_default().to_string(),
        product_id: section.value(0, "Product Id").unwrap_or_default().to_string(),
        fields,
    })
}

fn build_dimensions(section: &Section, notes: &BTreeMap<String, String>) -> Vec<Dimension> {
    (0..section.len())
        .filter_map(|row| {
            let id = section.value(row, "Dimension ID").unwrap_or_default();
            let name = section.value(row, "Dimension name").unwrap_or_default();
            if id.is_empty() && name.is_empty() {
                return None;
            }
            let note_ids = note_ids(section.value(row, "Dimension Notes"));
            Some(Dimension {
                id: id.to_string(),
                name: name.to_string(),
                notes: resolve_notes(&note_ids, notes),
                note_ids,
                definition: owned(section.non_empty(row, "Dimension Definitions")),
            })
        })
        .collect()
}

fn build_members(section: &Section, notes: &BTreeMap<String, String>) -> Vec<DimensionMember> {
    (0..section.len())
        .filter_map(|row| {
            let dimension_id = section.non_empty(row, "Dimension ID")?;
            let note_ids = note_ids(section.value(row, "Member Notes"));
            Some(DimensionMember {
                dimension_id: dimension_id.to_string(),
                name: section.value(row, "Member Name").unwrap_or_default().to_string(),
                classification_code: owned(section.non_empty(row, "Classification Code")),
                member_id: owned(section.non_empty(row, "Member ID")),
                parent_member_id: owned(section.non_empty(row, "Parent Member ID")),
                terminated: section.non_empty(row, "Terminated").is_some(),
                notes: resolve_notes(&note_ids, notes),
                definition: owned(section.non_empty(row, "Member Definitions")),
            })
        })
        .collect()
}
