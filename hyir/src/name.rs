//! Symbol names and their textual quoting rules.
//!
//! Names that only use identifier characters are printed verbatim. Every
//! other name is wrapped in double quotes, and each byte that is not
//! printable, or is a quote or backslash, is written as `\XX` with two
//! uppercase hexadecimal digits.
//!
//! Named symbols hold UTF-8 text. An escaped byte sequence that does not
//! decode to UTF-8 is rejected instead of being replaced.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The name of a global symbol (function or global variable).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SymbolName {
    /// A symbol with a textual name.
    Named(String),

    /// Doesn't have a string name and was given a number
    Numbered(u32),
}

impl SymbolName {
    /// Name as it would be written after the `@` sigil.
    pub fn escaped(&self) -> String {
        match self {
            SymbolName::Named(name) => escape_name(name),
            SymbolName::Numbered(n) => n.to_string(),
        }
    }

    /// Raw, unescaped text of the name.
    pub fn raw(&self) -> String {
        match self {
            SymbolName::Named(name) => name.clone(),
            SymbolName::Numbered(n) => n.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SymbolName::Named(name) => Some(name.as_str()),
            SymbolName::Numbered(_) => None,
        }
    }

    pub fn is_numbered(&self) -> bool {
        matches!(self, SymbolName::Numbered(_))
    }
}

impl From<String> for SymbolName {
    fn from(s: String) -> Self {
        SymbolName::Named(s)
    }
}

impl From<&str> for SymbolName {
    fn from(s: &str) -> Self {
        SymbolName::Named(s.to_string())
    }
}

impl From<u32> for SymbolName {
    fn from(n: u32) -> Self {
        SymbolName::Numbered(n)
    }
}

impl std::fmt::Display for SymbolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.escaped())
    }
}

/// Characters allowed in an unquoted identifier.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')
}

/// Whether `name` must be quoted to survive a round trip through the text format.
pub fn needs_quotes(name: &str) -> bool {
    match name.chars().next() {
        None => true,
        Some(first) if first.is_ascii_digit() => true,
        Some(_) => !name.chars().all(is_ident_char),
    }
}

/// Render a name in its canonical textual form (without the sigil).
pub fn escape_name(name: &str) -> String {
    if !needs_quotes(name) {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    out.push_str(&escape_bytes(name.as_bytes(), false));
    out.push('"');
    out
}

/// Escape a byte string using `\XX` sequences.
///
/// With `lowercase` set the hexadecimal digits are lowercase, which is the
/// spelling some tools emit.
pub fn escape_bytes(bytes: &[u8], lowercase: bool) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        let printable = (0x20..0x7f).contains(&byte);
        if printable && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else if lowercase {
            out.push_str(&format!("\\{:02x}", byte));
        } else {
            out.push_str(&format!("\\{:02X}", byte));
        }
    }
    out
}

/// Decode `\XX` hexadecimal escapes (and `\\`) into raw bytes.
///
/// Returns `None` when an escape sequence is malformed.
pub fn unescape_bytes(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        if bytes.get(i + 1) == Some(&b'\\') {
            out.push(b'\\');
            i += 2;
            continue;
        }

        let hex = text.get(i + 1..i + 3)?;
        out.push(u8::from_str_radix(hex, 16).ok()?);
        i += 3;
    }
    Some(out)
}

/// Render a function-local name (value, label or type name). Unlike
/// global names these may start with a digit without being quoted.
pub fn escape_local(name: &str) -> String {
    if !name.is_empty() && name.chars().all(is_ident_char) {
        name.to_string()
    } else {
        format!("\"{}\"", escape_bytes(name.as_bytes(), false))
    }
}

/// Inverse of [`escape_name`]: accepts either a bare identifier or a quoted
/// name and returns the raw name. `None` for malformed escapes and for bytes
/// that are not UTF-8.
pub fn unescape_name(token: &str) -> Option<String> {
    let inner = match token.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"')?,
        None => return Some(token.to_string()),
    };
    String::from_utf8(unescape_bytes(inner)?).ok()
}
