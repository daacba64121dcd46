//! Blank-line delimited metadata sections.
//!
//! A metadata file is a sequence of small CSV tables separated by blank lines:
//!
//! ```text
//! "Cube Title","Product Id","CANSIM Id"
//! "Rail indicators","23100274","404-0021"
//!
//! "Dimension ID","Dimension name","Dimension Notes"
//! "1","Geography",""
//! "2","Indicator","3"
//! ```
//!
//! The first line of each section is its header. Fields are split on `,`
//! with surrounding quotes stripped, so a quoted comma widens a row; widths
//! are reconciled by truncating toward the narrower of header and rows.

use serde::Serialize;
use std::path::Path;
use std::str::Lines;

use encoding_rs::Encoding;

use super::decode_content;
use crate::error::{DecodeError, MalformedSectionError};

/// One rectangular block of a metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    /// 1-based line of the header in the source text.
    line: usize,
}

impl Section {
    /// Build a section, reconciling row widths against the header.
    ///
    /// Rows wider than the header are truncated to the header; a header wider
    /// than every row is truncated to the widest row. Nothing is padded.
    pub fn new(mut header: Vec<String>, mut rows: Vec<Vec<String>>, line: usize) -> Self {
        if let Some(widest) = rows.iter().map(Vec::len).max() {
            if widest < header.len() {
                header.truncate(widest);
            }
        }
        let width = header.len();
        for row in &mut rows {
            row.truncate(width);
        }
        Self { header, rows, line }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Number of columns after reconciliation.
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// True if every name in `columns` is in the header.
    pub fn has_columns(&self, columns: &[&str]) -> bool {
        columns.iter().all(|c| self.column_index(c).is_some())
    }

    /// Value of `column` in row `row`; `None` if either is absent.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// Like [`Section::value`], but treats empty cells as absent.
    pub fn non_empty(&self, row: usize, column: &str) -> Option<&str> {
        self.value(row, column).filter(|v| !v.is_empty())
    }
}

/// Split one metadata line into fields.
///
/// Surrounding quotes are dropped and doubled inner quotes collapse to one.
pub fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|s| s.trim().trim_matches('"').replace("\"\"", "\""))
        .collect()
}

/// A header whose first field is empty or numeric is a data row.
fn looks_like_data(fields: &[String]) -> bool {
    match fields.first() {
        None => true,
        Some(first) => first.is_empty() || first.chars().all(|c| c.is_ascii_digit()),
    }
}

/// Lazy iterator over the sections of a metadata text.
///
/// Created by [`parse_sections`] or [`MetadataText::sections`]; each call
/// starts again from the top of the text, so the sequence is restartable.
pub struct Sections<'a> {
    lines: std::iter::Enumerate<Lines<'a>>,
    at_start: bool,
    done: bool,
}

impl<'a> Iterator for Sections<'a> {
    type Item = Result<Section, MalformedSectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Skip blank lines up to the next header
        let (line_no, header_line) = loop {
            match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((idx, line)) => break (idx + 1, line),
            }
        };

        let header = split_fields(header_line);
        if self.at_start {
            self.at_start = false;
            if looks_like_data(&header) {
                self.done = true;
                return Some(Err(MalformedSectionError {
                    line: line_no,
                    content: header_line.trim().to_string(),
                }));
            }
        }

        let mut rows = Vec::new();
        for (_, line) in self.lines.by_ref() {
            if line.trim().is_empty() {
                break;
            }
            rows.push(split_fields(line));
        }

        Some(Ok(Section::new(header, rows, line_no)))
    }
}

/// Iterate the sections of already-decoded metadata text.
pub fn parse_sections(text: &str) -> Sections<'_> {
    Sections {
        lines: text.lines().enumerate(),
        at_start: true,
        done: false,
    }
}

/// A decoded metadata file.
#[derive(Debug, Clone)]
pub struct MetadataText {
    text: String,
    encoding: &'static Encoding,
}

impl MetadataText {
    /// Detect the encoding of `bytes` and decode them.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let decoded = decode_content(bytes)?;
        Ok(Self {
            text: decoded.text,
            encoding: decoded.encoding,
        })
    }

    /// Read and decode a metadata file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the detected encoding.
    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    /// A fresh pass over the sections.
    pub fn sections(&self) -> Sections<'_> {
        parse_sections(&self.text)
    }
}
