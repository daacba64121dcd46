//! Text decoding and parsing for bundle files.
//!
//! - [`sections`] - blank-line delimited metadata sections
//! - [`table`] - the long-format data table
//!
//! Neither file has a reliable encoding, so both go through [`decode_content`].

pub mod sections;
pub mod table;

pub use sections::{parse_sections, MetadataText, Section, Sections};
pub use table::{LongRecord, LongTable};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::DecodeError;

/// Decoded text together with the encoding that produced it.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Detect the encoding of raw bytes.
///
/// A BOM wins, then valid UTF-8, then chardet's guess.
pub fn detect_encoding(bytes: &[u8]) -> Result<&'static Encoding, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return Ok(encoding);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Ok(UTF_8);
    }

    let (charset, _confidence, _language) = chardet::detect(bytes);

    // Normalize charset names
    let label = match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => WINDOWS_1252.name().to_string(),
        _ => chardet::charset2encoding(&charset).to_string(),
    };

    Encoding::for_label(label.as_bytes()).ok_or(DecodeError::UnknownEncoding(charset))
}

/// Decode bytes with a known encoding, stripping any BOM.
pub fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> Result<String, DecodeError> {
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(DecodeError::Invalid(encoding.name()));
    }
    Ok(text.into_owned())
}

/// Detect the encoding of `bytes` and decode them.
pub fn decode_content(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let encoding = detect_encoding(bytes)?;
    let text = decode_with(bytes, encoding)?;
    Ok(Decoded { text, encoding })
}
