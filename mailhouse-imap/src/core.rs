//! Core string domains of the IMAP grammar.
//!
//! IMAP distinguishes several overlapping string classes: atoms (bare
//! words), quoted strings (with `\"` and `\\` escapes), and literals
//! (octet-counted, may contain anything but NUL). Values decoded from the
//! wire are owned; the decoder allocates once per value.

use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use crate::error::{ValidationError, ValidationErrorKind};

// ----- Character classes (RFC 3501 §9) -----

pub(crate) fn is_char8(byte: u8) -> bool {
    byte != 0
}

/// `TEXT-CHAR = <any CHAR except CR and LF>`
pub(crate) fn is_text_char(byte: u8) -> bool {
    matches!(byte, 0x01..=0x09 | 0x0b | 0x0c | 0x0e..=0x7f)
}

/// `quoted-specials = DQUOTE / "\"`
pub(crate) fn is_quoted_specials(byte: u8) -> bool {
    byte == b'"' || byte == b'\\'
}

/// `list-wildcards = "%" / "*"`
pub(crate) fn is_list_wildcards(byte: u8) -> bool {
    byte == b'%' || byte == b'*'
}

/// `resp-specials = "]"`
pub(crate) fn is_resp_specials(byte: u8) -> bool {
    byte == b']'
}

/// `ATOM-CHAR = <any CHAR except atom-specials>`
pub(crate) fn is_atom_char(byte: u8) -> bool {
    let atom_special = matches!(byte, b'(' | b')' | b'{' | b' ' | 0x00..=0x1f | 0x7f)
        || is_list_wildcards(byte)
        || is_quoted_specials(byte)
        || is_resp_specials(byte);

    !atom_special && byte.is_ascii()
}

/// `ASTRING-CHAR = ATOM-CHAR / resp-specials`
pub(crate) fn is_astring_char(byte: u8) -> bool {
    is_atom_char(byte) || is_resp_specials(byte)
}

/// `tag = 1*<any ASTRING-CHAR except "+">`
pub(crate) fn is_tag_char(byte: u8) -> bool {
    is_astring_char(byte) && byte != b'+'
}

fn validate(value: &str, predicate: fn(u8) -> bool) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(ValidationErrorKind::Empty));
    }

    if let Some(at) = value.bytes().position(|byte| !predicate(byte)) {
        return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
            byte: value.as_bytes()[at],
            at,
        }));
    }

    Ok(())
}

// ----- Tag -----

/// A client-chosen correlation string, echoed on the completion line.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tag(String);

impl Tag {
    /// Construct without validation. The caller guarantees that the value
    /// only contains tag characters.
    pub(crate) fn unvalidated(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Tag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value, is_tag_char)?;
        Ok(Self(value.to_owned()))
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ----- Atom -----

/// `atom = 1*ATOM-CHAR`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Atom(String);

impl Atom {
    pub(crate) fn unvalidated(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Atom {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value, is_atom_char)?;
        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ----- Quoted -----

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`
///
/// The inner value is unescaped; escaping happens during encoding.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Quoted(String);

impl Quoted {
    pub(crate) fn unvalidated(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Quoted {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Empty quoted strings are legal (`""`).
        if let Some(at) = value.bytes().position(|byte| !is_text_char(byte)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value.as_bytes()[at],
                at,
            }));
        }
        Ok(Self(value.to_owned()))
    }
}

/// Escape `\` and `"` for emission inside a quoted string.
pub(crate) fn escape_quoted(unescaped: &str) -> Cow<str> {
    let mut escaped = Cow::Borrowed(unescaped);

    if escaped.contains('\\') {
        escaped = Cow::Owned(escaped.replace('\\', "\\\\"));
    }

    if escaped.contains('"') {
        escaped = Cow::Owned(escaped.replace('"', "\\\""));
    }

    escaped
}

/// Undo [`escape_quoted`] while parsing.
pub(crate) fn unescape_quoted(escaped: &str) -> Cow<str> {
    let mut unescaped = Cow::Borrowed(escaped);

    if unescaped.contains("\\\\") {
        unescaped = Cow::Owned(unescaped.replace("\\\\", "\\"));
    }

    if unescaped.contains("\\\"") {
        unescaped = Cow::Owned(unescaped.replace("\\\"", "\""));
    }

    unescaped
}

// ----- Literal -----

/// `literal = "{" number "}" CRLF *CHAR8`
///
/// An octet-counted chunk. May contain any byte except NUL.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Literal(Vec<u8>);

impl Literal {
    pub(crate) fn unvalidated(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&[u8]> for Literal {
    type Error = ValidationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if let Some(at) = data.iter().position(|byte| !is_char8(*byte)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: data[at],
                at,
            }));
        }
        Ok(Self(data.to_vec()))
    }
}

impl std::fmt::Debug for Literal {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Literal({:?})", String::from_utf8_lossy(&self.0))
    }
}

// ----- IString / AString / NString -----

/// `string = quoted / literal`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum IString {
    Quoted(Quoted),
    Literal(Literal),
}

impl IString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Quoted(quoted) => quoted.as_str().as_bytes(),
            Self::Literal(literal) => literal.as_bytes(),
        }
    }
}

impl From<&str> for IString {
    /// Choose the quoted form when the value fits, a literal otherwise.
    fn from(value: &str) -> Self {
        match Quoted::try_from(value) {
            Ok(quoted) => Self::Quoted(quoted),
            Err(_) => Self::Literal(Literal::unvalidated(value.as_bytes().to_vec())),
        }
    }
}

/// `astring = 1*ASTRING-CHAR / string`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AString {
    Atom(Atom),
    String(IString),
}

impl AString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Atom(atom) => atom.as_str().as_bytes(),
            Self::String(string) => string.as_bytes(),
        }
    }

    /// The value as text, replacing invalid UTF-8 (only possible in
    /// literals) with U+FFFD.
    pub fn to_text(&self) -> Cow<str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl From<&str> for AString {
    fn from(value: &str) -> Self {
        match Atom::try_from(value) {
            Ok(atom) => Self::Atom(atom),
            Err(_) => Self::String(IString::from(value)),
        }
    }
}

/// `nstring = string / nil`
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct NString(pub Option<IString>);

impl NString {
    pub const NIL: Self = Self(None);

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self(Some(IString::Literal(Literal::unvalidated(data))))
    }
}

impl From<&str> for NString {
    fn from(value: &str) -> Self {
        Self(Some(IString::from(value)))
    }
}

impl From<Option<&str>> for NString {
    fn from(value: Option<&str>) -> Self {
        Self(value.map(IString::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_validation() {
        assert!(Tag::try_from("A1").is_ok());
        assert!(Tag::try_from("a.001").is_ok());
        assert!(Tag::try_from("").is_err());
        assert!(Tag::try_from("A+1").is_err());
        assert!(Tag::try_from("A 1").is_err());
    }

    #[test]
    fn test_atom_validation() {
        assert!(Atom::try_from("NOOP").is_ok());
        assert!(Atom::try_from("\\Seen").is_err());
        assert!(Atom::try_from("a(b").is_err());
        assert!(Atom::try_from("").is_err());
    }

    #[test]
    fn test_quoted_escaping() {
        assert_eq!(escape_quoted("hello"), "hello");
        assert_eq!(escape_quoted("he\"llo"), "he\\\"llo");
        assert_eq!(escape_quoted("he\\llo"), "he\\\\llo");
        assert_eq!(unescape_quoted("he\\\"llo"), "he\"llo");
        assert_eq!(unescape_quoted("he\\\\llo"), "he\\llo");
    }

    #[test]
    fn test_literal_rejects_nul() {
        assert!(Literal::try_from(b"ok".as_ref()).is_ok());
        assert!(Literal::try_from(b"a\x00b".as_ref()).is_err());
    }

    #[test]
    fn test_astring_choice() {
        assert!(matches!(AString::from("plain"), AString::Atom(_)));
        assert!(matches!(
            AString::from("with space"),
            AString::String(IString::Quoted(_))
        ));
    }
}
