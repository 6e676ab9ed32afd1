//! Streaming nom parsers for the formal syntax of IMAP4rev1
//! ([RFC 3501 §9](https://datatracker.ietf.org/doc/html/rfc3501#section-9)),
//! restricted to the grammar this server speaks.
//!
//! All parsers are streaming: running out of input yields
//! `nom::Err::Incomplete`, never a false reject. Keywords are matched
//! case-insensitively; literal and quoted content is case-sensitive.

pub(crate) mod command;
pub(crate) mod core;
pub(crate) mod datetime;
pub(crate) mod fetch;
pub(crate) mod flag;
pub(crate) mod mailbox;
pub(crate) mod search;
pub(crate) mod sequence;
pub(crate) mod status;
