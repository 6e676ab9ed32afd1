//! Response-related types.
//!
//! Everything the server puts on the wire is one of: the connection
//! greeting, an untagged data line, a (tagged or untagged) status line, or
//! the `+` continuation request.

use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

use crate::core::Tag;
use crate::fetch::MessageDataItem;
use crate::flag::{Flag, FlagNameAttribute};
use crate::mailbox::Mailbox;
use crate::status::StatusDataItem;

/// The greeting sent when a connection is accepted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Greeting {
    pub kind: GreetingKind,
    pub text: String,
}

impl Greeting {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            kind: GreetingKind::Ok,
            text: text.into(),
        }
    }

    pub fn preauth(text: impl Into<String>) -> Self {
        Self {
            kind: GreetingKind::PreAuth,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GreetingKind {
    /// Connection is usable, client must authenticate.
    Ok,
    /// Connection is usable and pre-authenticated.
    PreAuth,
    /// Connection is rejected.
    Bye,
}

/// Any server-to-client message after the greeting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Data(Data),
    Status(Status),
    /// Command continuation request, `+\r\n`.
    Continue,
}

/// A capability advertised by `* CAPABILITY`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Capability {
    Imap4Rev1,
    StartTls,
    AuthPlain,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::AuthPlain => f.write_str("AUTH=PLAIN"),
        }
    }
}

/// A status line: `OK`/`NO`/`BAD`, tagged or untagged, or `BYE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Ok {
        tag: Option<Tag>,
        code: Option<Code>,
        text: String,
    },
    No {
        tag: Option<Tag>,
        code: Option<Code>,
        text: String,
    },
    Bad {
        tag: Option<Tag>,
        code: Option<Code>,
        text: String,
    },
    Bye {
        text: String,
    },
}

impl Status {
    pub fn ok(tag: Option<Tag>, code: Option<Code>, text: impl Into<String>) -> Self {
        Self::Ok {
            tag,
            code,
            text: text.into(),
        }
    }

    pub fn no(tag: Option<Tag>, text: impl Into<String>) -> Self {
        Self::No {
            tag,
            code: None,
            text: text.into(),
        }
    }

    pub fn bad(tag: Option<Tag>, text: impl Into<String>) -> Self {
        Self::Bad {
            tag,
            code: None,
            text: text.into(),
        }
    }

    pub fn bye(text: impl Into<String>) -> Self {
        Self::Bye { text: text.into() }
    }

    /// `<tag> OK <name> Completed`
    pub fn completed(tag: Tag, name: &str) -> Self {
        Self::ok(Some(tag), None, format!("{name} Completed"))
    }
}

/// A response code, emitted in square brackets after `OK`/`NO`/`BAD`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Code {
    PermanentFlags(Vec<Flag>),
    ReadOnly,
    ReadWrite,
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(u32),
}

/// An untagged data line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Data {
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* <n> EXISTS`
    Exists(u32),
    /// `* <n> EXPUNGE`
    Expunge(NonZeroU32),
    /// `* <seq> FETCH (<items>)`
    Fetch {
        seq: NonZeroU32,
        items: Vec<MessageDataItem>,
    },
    /// `* FLAGS (<flags>)`
    Flags(Vec<Flag>),
    /// `* LIST (<attrs>) "<delim>" "<name>"`
    List {
        attributes: Vec<FlagNameAttribute>,
        delimiter: Option<char>,
        mailbox: Mailbox,
    },
    /// `* LSUB (<attrs>) "<delim>" "<name>"`
    Lsub {
        attributes: Vec<FlagNameAttribute>,
        delimiter: Option<char>,
        mailbox: Mailbox,
    },
    /// `* <n> RECENT`
    Recent(u32),
    /// `* SEARCH <id> ...`
    Search(Vec<u32>),
    /// `* STATUS <mailbox> (<items>)`
    Status {
        mailbox: Mailbox,
        items: Vec<StatusDataItem>,
    },
}
