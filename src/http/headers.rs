//! Header field collection.
//!
//! Field names are case-insensitive: they are stored lower-cased and every
//! lookup is normalized the same way. Setting a name that is already present
//! folds the new value into the old one (`"1, 2"`), the way repeated field
//! lines are combined on the wire.

use std::collections::HashMap;

const CRLF: &[u8] = b"\r\n";

/// Characters allowed in a field name besides ASCII letters and digits.
const TOKEN_SPECIALS: &str = "!#$%&'*+-.^_`|~";

/// Errors produced while parsing a single field-line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The field-line has nothing before the colon.
    #[error("field name is empty")]
    EmptyName,

    /// Whitespace between the field name and the colon, or inside the name.
    #[error("field name contains whitespace: {0:?}")]
    NameContainsWhitespace(String),

    /// The field name contains a character outside the token grammar.
    #[error("invalid character {ch:?} in field name {name:?}")]
    InvalidNameCharacter { name: String, ch: char },

    /// The field-line has no colon separating name and value.
    #[error("field line has no colon separator")]
    MissingColon,

    /// The field value is not valid UTF-8.
    #[error("field value is not valid UTF-8")]
    ValueNotUtf8,
}

/// Case-insensitive header map with list-folding of repeated names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: HashMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one field-line from the front of `buf`.
    ///
    /// Returns the number of bytes consumed and whether the blank line ending
    /// the header block was reached. When `buf` does not yet hold a complete
    /// line nothing is consumed and `(0, false)` is returned.
    pub fn parse_line(&mut self, buf: &[u8]) -> Result<(usize, bool), HeaderError> {
        let Some(idx) = find_crlf(buf) else {
            return Ok((0, false));
        };

        if idx == 0 {
            return Ok((CRLF.len(), true));
        }

        let (name, value) = parse_field_line(&buf[..idx])?;
        self.set(name, value);

        Ok((idx + CRLF.len(), false))
    }

    /// Returns the value stored for `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    /// Adds a field. An existing value for the same name gets `", " + value`
    /// appended instead of being replaced.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.as_ref();

        match self.fields.get_mut(&name) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                self.fields.insert(name, value.to_string());
            }
        }
    }

    /// Overwrites the value for `name`, inserting it when absent.
    pub fn replace(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.fields
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Removes `name`, returning the value it held.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.fields.remove(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(lower-cased name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Renders a field name for the wire: every hyphen-delimited word gets an
/// upper-case first letter and lower-case rest (`x-content-sha256` becomes
/// `X-Content-Sha256`).
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word_start = true;

    for ch in name.chars() {
        if word_start {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch.to_ascii_lowercase());
        }
        word_start = ch == '-';
    }

    out
}

pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

fn parse_field_line(line: &[u8]) -> Result<(&str, &str), HeaderError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(HeaderError::MissingColon)?;

    let name = std::str::from_utf8(&line[..colon])
        .map_err(|_| HeaderError::InvalidNameCharacter {
            name: String::from_utf8_lossy(&line[..colon]).into_owned(),
            ch: char::REPLACEMENT_CHARACTER,
        })?
        .trim_start_matches(' ');
    validate_name(name)?;

    let value = std::str::from_utf8(&line[colon + 1..])
        .map_err(|_| HeaderError::ValueNotUtf8)?
        .trim_matches(' ');

    Ok((name, value))
}

fn validate_name(name: &str) -> Result<(), HeaderError> {
    if name.is_empty() {
        return Err(HeaderError::EmptyName);
    }

    if name.chars().any(|c| c.is_ascii_whitespace()) {
        return Err(HeaderError::NameContainsWhitespace(name.to_string()));
    }

    match name.chars().find(|&c| !is_token_char(c)) {
        Some(ch) => Err(HeaderError::InvalidNameCharacter {
            name: name.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || TOKEN_SPECIALS.contains(c)
}
