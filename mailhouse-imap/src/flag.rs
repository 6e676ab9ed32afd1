//! Flag-related types.

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::core::Atom;
use crate::error::ValidationError;

/// A message flag.
///
/// System flags begin with `\` and are pre-defined in RFC 3501; anything
/// else is a keyword defined by client or server. `\Recent` is
/// server-managed: it is carried here so stores can record it, but the
/// dispatcher refuses to set or clear it on client request.
///
/// Flag equality is ASCII-case-insensitive, so `\seen` == `\Seen` and
/// `gopher` == `Gopher`. Display always renders the canonical form.
#[derive(Clone, Debug, Eq)]
pub enum Flag {
    /// `\Answered`
    Answered,
    /// `\Deleted` -- marked for removal by a later EXPUNGE.
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Flagged`
    Flagged,
    /// `\Recent` -- first session to see this message. Server-managed.
    Recent,
    /// `\Seen`
    Seen,
    /// A `\`-prefixed flag that is not one of the system flags.
    Extension(Atom),
    /// A keyword (no `\` prefix).
    Keyword(Atom),
}

impl Flag {
    pub fn system(atom: Atom) -> Self {
        match atom.as_str().to_ascii_lowercase().as_str() {
            "answered" => Self::Answered,
            "deleted" => Self::Deleted,
            "draft" => Self::Draft,
            "flagged" => Self::Flagged,
            "recent" => Self::Recent,
            "seen" => Self::Seen,
            _ => Self::Extension(atom),
        }
    }

    pub fn keyword(atom: Atom) -> Self {
        Self::Keyword(atom)
    }

    /// The flags advertised in the untagged `FLAGS` response, in the order
    /// clients conventionally see them.
    pub fn advertised() -> [Flag; 5] {
        [
            Flag::Answered,
            Flag::Flagged,
            Flag::Deleted,
            Flag::Seen,
            Flag::Draft,
        ]
    }
}

impl TryFrom<&str> for Flag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(if let Some(value) = value.strip_prefix('\\') {
            Self::system(Atom::try_from(value)?)
        } else {
            Self::keyword(Atom::try_from(value)?)
        })
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Self) -> bool {
        use Flag::*;

        match (self, other) {
            (Answered, Answered)
            | (Deleted, Deleted)
            | (Draft, Draft)
            | (Flagged, Flagged)
            | (Recent, Recent)
            | (Seen, Seen) => true,
            (Extension(a), Extension(b)) | (Keyword(a), Keyword(b)) => {
                a.as_str().eq_ignore_ascii_case(b.as_str())
            }
            _ => false,
        }
    }
}

impl Hash for Flag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().to_ascii_lowercase().hash(state);
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Flag::Answered => f.write_str("\\Answered"),
            Flag::Deleted => f.write_str("\\Deleted"),
            Flag::Draft => f.write_str("\\Draft"),
            Flag::Flagged => f.write_str("\\Flagged"),
            Flag::Recent => f.write_str("\\Recent"),
            Flag::Seen => f.write_str("\\Seen"),
            Flag::Extension(atom) => write!(f, "\\{atom}"),
            Flag::Keyword(atom) => write!(f, "{atom}"),
        }
    }
}

/// `STORE` action: replace, add, or remove flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreType {
    /// `FLAGS`
    Replace,
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
}

/// Whether `STORE` answers with per-message untagged `FETCH` responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreResponse {
    Answer,
    /// `.SILENT` suffix present.
    Silent,
}

/// Mailbox name attribute in `LIST`/`LSUB` responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagNameAttribute {
    /// `\Noinferiors`
    Noinferiors,
    /// `\Noselect`
    Noselect,
    /// `\Marked`
    Marked,
    /// `\Unmarked`
    Unmarked,
}

impl Display for FlagNameAttribute {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Noinferiors => f.write_str("\\Noinferiors"),
            Self::Noselect => f.write_str("\\Noselect"),
            Self::Marked => f.write_str("\\Marked"),
            Self::Unmarked => f.write_str("\\Unmarked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_eq() {
        assert_eq!(Flag::try_from("\\seen").unwrap(), Flag::Seen);
        assert_eq!(Flag::try_from("\\SEEN").unwrap(), Flag::Seen);
        assert_eq!(
            Flag::try_from("gopher").unwrap(),
            Flag::try_from("Gopher").unwrap()
        );
        assert_ne!(Flag::try_from("gopher").unwrap(), Flag::Seen);
    }

    #[test]
    fn test_display_canonical() {
        assert_eq!(Flag::try_from("\\dELETED").unwrap().to_string(), "\\Deleted");
        assert_eq!(Flag::try_from("\\Custom").unwrap().to_string(), "\\Custom");
        assert_eq!(Flag::try_from("todo").unwrap().to_string(), "todo");
    }
}
