//! Command-related types.

use crate::auth::AuthMechanism;
use crate::core::{AString, Atom, Literal, Tag};
use crate::datetime::DateTime;
use crate::fetch::MacroOrMessageDataItemNames;
use crate::flag::{Flag, StoreResponse, StoreType};
use crate::mailbox::{ListMailbox, Mailbox};
use crate::search::SearchKey;
use crate::sequence::SequenceSet;

/// One complete client command: the client-chosen tag plus the typed body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub tag: Tag,
    pub body: CommandBody,
}

impl Command {
    pub fn new(tag: Tag, body: CommandBody) -> Self {
        Self { tag, body }
    }
}

/// The closed union of everything the server understands.
///
/// `FETCH`/`STORE`/`COPY`/`SEARCH` carry a `uid` flag instead of separate
/// `UID ...` variants; the two addressing modes share everything else.
/// A well-formed line with an unrecognised keyword lands in [`Unknown`](Self::Unknown)
/// so the error reply can still carry the client's tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandBody {
    // -- any state --
    Capability,
    Logout,
    Noop,

    // -- not authenticated --
    Authenticate {
        mechanism: AuthMechanism,
        /// SASL-IR initial response, already base64-decoded.
        initial_response: Option<Vec<u8>>,
    },
    Login {
        username: AString,
        password: AString,
    },
    StartTls,

    // -- authenticated --
    Append {
        mailbox: Mailbox,
        flags: Vec<Flag>,
        date: Option<DateTime>,
        message: Literal,
    },
    Create {
        mailbox: Mailbox,
    },
    Delete {
        mailbox: Mailbox,
    },
    Examine {
        mailbox: Mailbox,
    },
    List {
        reference: Mailbox,
        mailbox_wildcard: ListMailbox,
    },
    Lsub {
        reference: Mailbox,
        mailbox_wildcard: ListMailbox,
    },
    Rename {
        from: Mailbox,
        to: Mailbox,
    },
    Select {
        mailbox: Mailbox,
    },
    Status {
        mailbox: Mailbox,
        items: Vec<crate::status::StatusDataItemName>,
    },
    Subscribe {
        mailbox: Mailbox,
    },
    Unsubscribe {
        mailbox: Mailbox,
    },

    // -- selected --
    Check,
    Close,
    Copy {
        sequence_set: SequenceSet,
        mailbox: Mailbox,
        uid: bool,
    },
    Expunge,
    Fetch {
        sequence_set: SequenceSet,
        attributes: MacroOrMessageDataItemNames,
        uid: bool,
    },
    Search {
        charset: Option<String>,
        criteria: SearchKey,
        uid: bool,
    },
    Store {
        sequence_set: SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: Vec<Flag>,
        uid: bool,
    },

    // -- anything else --
    Unknown {
        keyword: Atom,
    },
}

impl CommandBody {
    /// The command name as used in `OK <name> Completed` lines and
    /// diagnostics. `UID` variants include the prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::Noop => "NOOP",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Login { .. } => "LOGIN",
            Self::StartTls => "STARTTLS",
            Self::Append { .. } => "APPEND",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Examine { .. } => "EXAMINE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Rename { .. } => "RENAME",
            Self::Select { .. } => "SELECT",
            Self::Status { .. } => "STATUS",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Copy { uid: false, .. } => "COPY",
            Self::Copy { uid: true, .. } => "UID COPY",
            Self::Expunge => "EXPUNGE",
            Self::Fetch { uid: false, .. } => "FETCH",
            Self::Fetch { uid: true, .. } => "UID FETCH",
            Self::Search { uid: false, .. } => "SEARCH",
            Self::Search { uid: true, .. } => "UID SEARCH",
            Self::Store { uid: false, .. } => "STORE",
            Self::Store { uid: true, .. } => "UID STORE",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }
}
