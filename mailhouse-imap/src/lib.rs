#![deny(missing_debug_implementations)]

//! IMAP4rev1 wire types and codec for the mailhouse server.
//!
//! This crate knows the protocol and nothing else: the typed command and
//! response model, a streaming command parser for the RFC 3501 grammar
//! subset the server speaks, a fragment-based response encoder, and a
//! [`tokio_util::codec`] framing layer that handles octet-counted literals
//! and their `+` continuation requests.

pub mod auth;
pub mod body;
pub mod codec;
pub mod command;
pub mod core;
pub mod datetime;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod flag;
pub mod mailbox;
pub mod response;
pub mod rfc3501;
pub mod search;
pub mod sequence;
pub mod status;
pub mod tokio;
