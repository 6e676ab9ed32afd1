//! mailhouse: a small IMAP4rev1 mail-access server.
//!
//! The wire protocol lives in the `mailhouse-imap` crate; this crate wires
//! it to a mailbox store: the per-connection session loop, the state
//! machine, the command dispatcher, and the store contract with its
//! bundled in-memory implementation.

pub mod bodystructure;
pub mod config;
pub mod connlog;
pub mod dispatch;
pub mod fetch;
pub mod server;
pub mod session;
pub mod store;
