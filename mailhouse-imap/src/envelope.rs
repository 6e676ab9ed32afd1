//! `ENVELOPE`-related types.

use crate::core::NString;

/// The envelope structure of a message: a fixed, positional digest of the
/// addressing headers. Every slot is nillable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Envelope {
    pub date: NString,
    pub subject: NString,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: NString,
    pub message_id: NString,
}

/// One address: `(name adl mailbox host)`.
///
/// `adl` is the obsolete source-route slot and is always `NIL` here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    pub name: NString,
    pub adl: NString,
    pub mailbox: NString,
    pub host: NString,
}
