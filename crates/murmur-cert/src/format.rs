//! Persisted certificate text format.
//!
//! A small subset of ZPL, the same layout zcert writes:
//!
//! ```text
//! #   ****  Generated on 2026-01-01 12:00:00 by murmur  ****
//! #   ZeroMQ CURVE Public Certificate
//!
//! metadata
//!     name = "alice"
//! curve
//!     public-key = "<40 chars>"
//!     secret-key = "<40 chars>"
//! ```
//!
//! Public-only files omit the `secret-key` line entirely.

use std::collections::BTreeMap;

use murmur_crypto::{PublicKey, SecretKey};
use murmur_types::{MurmurError, Result};

const SECTION_METADATA: &str = "metadata";
const SECTION_CURVE: &str = "curve";
const KEY_PUBLIC: &str = "public-key";
const KEY_SECRET: &str = "secret-key";

/// Contents of one parsed certificate file.
pub(crate) struct CertFile {
    pub metadata: BTreeMap<String, String>,
    pub public: PublicKey,
    pub secret: Option<SecretKey>,
}

/// Renders a certificate file. `secret` is written only when given.
pub(crate) fn render(
    metadata: &BTreeMap<String, String>,
    public: &PublicKey,
    secret: Option<&SecretKey>,
) -> String {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    let mut out = String::new();
    out.push_str(&format!("#   ****  Generated on {timestamp} by murmur  ****\n"));
    match secret {
        Some(_) => {
            out.push_str("#   ZeroMQ CURVE **Secret** Certificate\n");
            out.push_str("#   DO NOT PROVIDE THIS FILE TO OTHER USERS nor change its permissions.\n");
        }
        None => {
            out.push_str("#   ZeroMQ CURVE Public Certificate\n");
            out.push_str("#   Exchange securely, or use a secure mechanism to verify the contents\n");
            out.push_str("#   of this file after exchange.\n");
        }
    }
    out.push('\n');

    out.push_str(SECTION_METADATA);
    out.push('\n');
    for (name, value) in metadata {
        out.push_str(&format!("    {name} = \"{}\"\n", escape(value)));
    }

    out.push_str(SECTION_CURVE);
    out.push('\n');
    out.push_str(&format!("    {KEY_PUBLIC} = \"{}\"\n", public.to_armored()));
    if let Some(secret) = secret {
        out.push_str(&format!("    {KEY_SECRET} = \"{}\"\n", secret.to_armored()));
    }
    out
}

/// Parses certificate file text.
pub(crate) fn parse(text: &str) -> Result<CertFile> {
    let mut metadata = BTreeMap::new();
    let mut public = None;
    let mut secret = None;
    let mut section: Option<&str> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indented = trimmed.len() != line.len();
        if !indented {
            section = Some(trimmed);
            continue;
        }

        let Some((name, value)) = trimmed.split_once('=') else {
            return Err(malformed(format!("line {line_no}: expected `name = value`")));
        };
        let name = name.trim();
        let value = unquote(value.trim());

        match section {
            None => {
                return Err(malformed(format!("line {line_no}: entry outside of any section")));
            }
            Some(SECTION_METADATA) => {
                metadata.insert(name.to_string(), value);
            }
            Some(SECTION_CURVE) if name == KEY_PUBLIC => {
                public = Some(PublicKey::from_armored(&value).map_err(|e| {
                    malformed(format!("line {line_no}: bad public key: {e}"))
                })?);
            }
            Some(SECTION_CURVE) if name == KEY_SECRET => {
                let key = SecretKey::from_armored(&value).map_err(|e| {
                    malformed(format!("line {line_no}: bad secret key: {e}"))
                })?;
                if !key.is_empty() {
                    secret = Some(key);
                }
            }
            Some(_) => {}
        }
    }

    let public = public.ok_or_else(|| malformed("missing curve public-key".to_string()))?;
    Ok(CertFile {
        metadata,
        public,
        secret,
    })
}

fn malformed(reason: String) -> MurmurError {
    MurmurError::MalformedCertificate { reason }
}

/// Checks that `name` can be written as a metadata entry name.
pub(crate) fn validate_meta_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("is empty")
    } else if name.trim() != name {
        Some("has leading or trailing whitespace")
    } else if name.starts_with('#') {
        Some("starts with `#`")
    } else if name.contains('=') {
        Some("contains `=`")
    } else if name.chars().any(char::is_control) {
        Some("contains a control character")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(malformed(format!("metadata name {name:?} {problem}"))),
        None => Ok(()),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

fn unquote(value: &str) -> String {
    let inner = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner,
        None => return value.to_string(),
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => out.push(unescape_code_point(&mut chars)),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Reads the `{hex}` tail of a `\u{hex}` escape.
fn unescape_code_point(chars: &mut std::str::Chars<'_>) -> char {
    let rest = chars.as_str();
    let decoded = rest
        .strip_prefix('{')
        .and_then(|r| r.split_once('}'))
        .and_then(|(hex, _)| u32::from_str_radix(hex, 16).ok().map(|code| (hex.len(), code)))
        .and_then(|(len, code)| char::from_u32(code).map(|c| (len, c)));
    match decoded {
        Some((len, c)) => {
            // Skip `{`, the digits and `}`.
            for _ in 0..len + 2 {
                chars.next();
            }
            c
        }
        None => 'u',
    }
}
