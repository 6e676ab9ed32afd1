//! `AUTHENTICATE`-related types.

use std::fmt::{Display, Formatter};

use crate::core::Atom;

/// `auth-type = atom`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AuthMechanism {
    /// RFC 4616 SASL PLAIN: `\0authcid\0password`.
    Plain,
    /// The non-standard but widespread LOGIN mechanism.
    Login,
    Other(Atom),
}

impl From<Atom> for AuthMechanism {
    fn from(atom: Atom) -> Self {
        match atom.as_str().to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "LOGIN" => Self::Login,
            _ => Self::Other(atom),
        }
    }
}

impl Display for AuthMechanism {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Plain => f.write_str("PLAIN"),
            Self::Login => f.write_str("LOGIN"),
            Self::Other(atom) => write!(f, "{}", atom.as_str().to_ascii_uppercase()),
        }
    }
}

/// The line a client sends after the server's `+` continuation during
/// `AUTHENTICATE`: either one base64 blob or `*` to cancel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthenticateData {
    /// Already base64-decoded.
    Continue(Vec<u8>),
    Cancel,
}
