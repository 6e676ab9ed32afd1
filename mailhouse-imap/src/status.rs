//! `STATUS`-related types.

use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;

/// `status-att = "MESSAGES" / "RECENT" / "UIDNEXT" / "UIDVALIDITY" / "UNSEEN"`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StatusDataItemName {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

impl Display for StatusDataItemName {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Messages => f.write_str("MESSAGES"),
            Self::Recent => f.write_str("RECENT"),
            Self::UidNext => f.write_str("UIDNEXT"),
            Self::UidValidity => f.write_str("UIDVALIDITY"),
            Self::Unseen => f.write_str("UNSEEN"),
        }
    }
}

/// One `name value` pair in a `* STATUS` response. Emitted in the order
/// the client requested the names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusDataItem {
    Messages(u32),
    Recent(u32),
    UidNext(NonZeroU32),
    UidValidity(NonZeroU32),
    Unseen(u32),
}
