//! Mailbox names.

use std::fmt::{Display, Formatter};

use crate::core::{AString, IString};

/// A mailbox name.
///
/// Names are opaque to the protocol layer except for `INBOX`, which RFC
/// 3501 §5.1 defines as case-insensitive; it is normalised to the
/// canonical spelling at construction.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Mailbox(String);

impl Mailbox {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".into())
        } else {
            Self(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&AString> for Mailbox {
    fn from(value: &AString) -> Self {
        Self::new(value.to_text().into_owned())
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `LIST`/`LSUB` query argument: a mailbox name that may additionally
/// contain the `%` and `*` wildcards.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ListMailbox {
    /// Bare token form (atom chars plus wildcards).
    Token(String),
    /// Quoted or literal form.
    String(IString),
}

impl ListMailbox {
    pub fn to_text(&self) -> String {
        match self {
            Self::Token(token) => token.clone(),
            Self::String(string) => String::from_utf8_lossy(string.as_bytes()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_normalisation() {
        assert_eq!(Mailbox::new("inbox").as_str(), "INBOX");
        assert_eq!(Mailbox::new("InBoX").as_str(), "INBOX");
        assert_eq!(Mailbox::new("work").as_str(), "work");
        assert_eq!(Mailbox::new("Inbox2").as_str(), "Inbox2");
    }
}
