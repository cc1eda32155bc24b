//! Header naming and value conventions.
//!
//! Peers announce a small set of RFC822-style headers when they enter
//! the network. Symbolic keys (snake_case identifiers chosen in code)
//! are rewritten to header form before transmission; literal keys are
//! sent as given. Values are always sent as 7-bit clean text.

use std::collections::BTreeMap;
use std::fmt;

/// Header mapping carried by nodes and events.
pub type Headers = BTreeMap<String, String>;

/// A header key as supplied by the caller.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum HeaderKey {
    /// A code-level identifier such as `content_type`, transformed on use.
    Symbolic(String),
    /// A key that is used verbatim.
    Literal(String),
}

impl HeaderKey {
    /// Creates a symbolic key.
    pub fn symbolic(name: impl Into<String>) -> Self {
        Self::Symbolic(name.into())
    }

    /// Returns the key in the form it is transmitted.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Symbolic(name) => header_key(name),
            Self::Literal(name) => name.clone(),
        }
    }
}

impl From<&str> for HeaderKey {
    fn from(name: &str) -> Self {
        Self::Literal(name.to_string())
    }
}

impl From<String> for HeaderKey {
    fn from(name: String) -> Self {
        Self::Literal(name)
    }
}

/// Transforms a symbolic key into header form.
///
/// Underscores become hyphens, the first character is upper-cased and
/// the rest lower-cased: `content_type` becomes `Content-type`.
pub fn header_key(symbol: &str) -> String {
    let replaced = symbol.replace('_', "-");
    let mut chars = replaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Coerces a value to its 7-bit clean string form.
///
/// Non-ASCII and control characters are replaced by their `\u{..}`
/// escape so the result is always printable ASCII.
pub fn header_value(value: impl fmt::Display) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            out.extend(c.escape_unicode());
        }
    }
    out
}
