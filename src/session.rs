//! Per-connection session state.
//!
//! A session moves through not-authenticated, authenticated, selected, and
//! logout; which commands are admissible depends only on that state. The
//! state is an explicit value owned by the connection task; nothing here
//! is shared between connections.

use std::collections::HashSet;

use mailhouse_imap::command::CommandBody;

use crate::store;

/// The mailbox bound to a session by `SELECT`/`EXAMINE`.
#[derive(Clone, Debug)]
pub struct SelectedMailbox {
    pub mailbox: store::Mailbox,
    /// Selected via `EXAMINE`: no flag changes, no expunge on `CLOSE`.
    pub read_only: bool,
    /// UIDs whose `\Recent` this session claimed at `SELECT` time. The
    /// store flag is cleared for other sessions, but this session keeps
    /// rendering `\Recent` for them.
    pub recent: HashSet<u32>,
}

impl SelectedMailbox {
    pub fn name(&self) -> &str {
        &self.mailbox.name
    }
}

#[derive(Clone, Debug)]
pub enum SessionState {
    NotAuthenticated,
    Authenticated,
    Selected(SelectedMailbox),
    Logout,
}

impl SessionState {
    /// The connection loop keeps running while this holds.
    pub fn ready(&self) -> bool {
        !matches!(self, Self::Logout)
    }

    pub fn selected(&self) -> Option<&SelectedMailbox> {
        match self {
            Self::Selected(selected) => Some(selected),
            _ => None,
        }
    }

    pub fn selected_mut(&mut self) -> Option<&mut SelectedMailbox> {
        match self {
            Self::Selected(selected) => Some(selected),
            _ => None,
        }
    }

    /// The state-machine precondition table: is `body` admissible now?
    pub fn permits(&self, body: &CommandBody) -> bool {
        use CommandBody::*;

        match body {
            Capability | Noop | Logout | Unknown { .. } => true,
            Login { .. } | Authenticate { .. } | StartTls => {
                matches!(self, Self::NotAuthenticated)
            }
            Create { .. } | Delete { .. } | Rename { .. } | List { .. } | Lsub { .. }
            | Subscribe { .. } | Unsubscribe { .. } | Status { .. } | Append { .. }
            | Select { .. } | Examine { .. } => {
                matches!(self, Self::Authenticated | Self::Selected(_))
            }
            Check | Close | Expunge | Copy { .. } | Fetch { .. } | Search { .. }
            | Store { .. } => matches!(self, Self::Selected(_)),
        }
    }
}
