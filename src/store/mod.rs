//! The message store contract.
//!
//! The dispatcher talks to storage exclusively through [`MessageStore`];
//! everything behind the trait -- schema, blobs, transactions -- is the
//! store's business. Every mutating operation is transactional: on error
//! no partial state may become visible. The bundled [`MemoryStore`] backs
//! tests and default runs; persistent backends are drop-in replacements.

pub mod memory;
pub mod search;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use mailhouse_imap::flag::Flag;

use crate::store::search::SearchNode;

pub use memory::MemoryStore;

/// Hard cap on message body size, matching the `APPEND` limit.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no mailbox named {0:?}")]
    NoSuchMailbox(String),
    #[error("a mailbox named {0:?} already exists")]
    MailboxExists(String),
    #[error("no message with id {0}")]
    NoSuchMessage(u64),
    #[error("message body is too big. max is {max} bytes")]
    BodyTooBig { max: usize },
    #[error("malformed message: {0}")]
    BadMessage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A mailbox row.
///
/// `id` doubles as the UIDVALIDITY value: it is never reused and never
/// changes for the lifetime of the mailbox. `next_uid` is the UID the next
/// appended message will receive; monotonic, never reused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mailbox {
    pub id: u32,
    pub name: String,
    pub next_uid: u32,
}

/// A message row, without its body bytes.
#[derive(Clone, Debug)]
pub struct Message {
    /// Storage-internal id, unique across all mailboxes.
    pub row_id: u64,
    /// Externally visible UID, unique and ascending within the mailbox.
    pub uid: u32,
    pub mailbox_id: u32,
    /// Size of the raw RFC 5322 bytes.
    pub size: u32,
    /// `INTERNALDATE`.
    pub created: DateTime<FixedOffset>,
    pub flags: Vec<Flag>,
    pub headers: Headers,
}

impl Message {
    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }
}

/// An ordered, case-insensitive header multimap.
///
/// Keys keep the capitalisation of the stored message; lookups ignore
/// case; values keep their order of appearance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the header block of a raw RFC 5322 message.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (headers, _) =
            mailparse::parse_headers(raw).map_err(|err| StoreError::BadMessage(err.to_string()))?;

        Ok(Self(
            headers
                .iter()
                .map(|header| (header.get_key(), header.get_value()))
                .collect(),
        ))
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
            .collect()
    }

    /// Only the headers whose name appears in `names`.
    pub fn include(&self, names: &[String]) -> Headers {
        Headers(
            self.0
                .iter()
                .filter(|(key, _)| names.iter().any(|name| name.eq_ignore_ascii_case(key)))
                .cloned()
                .collect(),
        )
    }

    /// All headers except those whose name appears in `names`.
    pub fn exclude(&self, names: &[String]) -> Headers {
        Headers(
            self.0
                .iter()
                .filter(|(key, _)| !names.iter().any(|name| name.eq_ignore_ascii_case(key)))
                .cloned()
                .collect(),
        )
    }

    /// Render as `Key: value\r\n` lines (no trailing blank line).
    pub fn format(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.0 {
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Abstract storage of mailboxes, messages, headers, flags, and bodies.
///
/// Mailbox-scoped operations take the mailbox *name*; per-message
/// mutations take the storage-internal `row_id`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    // -- mailboxes --
    async fn create_mailbox(&self, name: &str) -> Result<Mailbox>;
    async fn delete_mailbox(&self, name: &str) -> Result<()>;
    async fn rename_mailbox(&self, from: &str, to: &str) -> Result<()>;
    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>>;
    async fn mailbox_by_name(&self, name: &str) -> Result<Mailbox>;

    // -- counts --
    async fn message_count(&self, mailbox: &str) -> Result<u32>;
    async fn recent_count(&self, mailbox: &str) -> Result<u32>;
    async fn unseen_count(&self, mailbox: &str) -> Result<u32>;

    // -- message access --
    /// UIDs of all messages in the mailbox, ascending.
    async fn uids(&self, mailbox: &str) -> Result<Vec<u32>>;
    /// Messages by position (0-based offset into the UID-ascending order).
    async fn messages_by_offset(
        &self,
        mailbox: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Message>>;
    /// Messages whose UID lies in `lo..=hi`; `hi = None` means unbounded.
    async fn messages_by_uid_range(
        &self,
        mailbox: &str,
        lo: u32,
        hi: Option<u32>,
    ) -> Result<Vec<Message>>;
    async fn message_by_row(&self, row_id: u64) -> Result<Message>;

    // -- message lifecycle --
    /// Parse headers, size-check and store the body, insert the row; all
    /// or nothing. `created` defaults to now.
    async fn create_message(
        &self,
        mailbox: &str,
        body: &[u8],
        flags: &[Flag],
        created: Option<DateTime<FixedOffset>>,
    ) -> Result<Message>;
    /// Copy all given messages into `target`, preserving headers, body
    /// bytes, flags, and internal date; fresh UIDs from the target's
    /// `next_uid`, plus `\Recent`. All or nothing.
    async fn copy_messages(&self, row_ids: &[u64], target: &str) -> Result<Vec<Message>>;
    /// Remove all `\Deleted` messages; returns their UIDs, ascending.
    async fn expunge(&self, mailbox: &str) -> Result<Vec<u32>>;

    // -- flags --
    async fn add_flags(&self, row_id: u64, flags: &[Flag]) -> Result<()>;
    async fn remove_flags(&self, row_id: u64, flags: &[Flag]) -> Result<()>;
    /// One transaction spanning remove-then-add.
    async fn replace_flags(&self, row_id: u64, remove: &[Flag], add: &[Flag]) -> Result<()>;
    /// Consume `\Recent` for the whole mailbox and return the affected
    /// UIDs. The first session to select the mailbox claims them.
    async fn claim_recent(&self, mailbox: &str) -> Result<Vec<u32>>;

    // -- bodies --
    /// The full raw RFC 5322 bytes.
    async fn body(&self, row_id: u64) -> Result<Vec<u8>>;
    /// The bytes after the header block (skipping the blank line).
    async fn text(&self, row_id: u64) -> Result<Vec<u8>>;

    // -- queries --
    /// UIDs of messages matching the compiled query, ascending.
    async fn search(&self, mailbox: &str, query: &SearchNode) -> Result<Vec<u32>>;

    /// Flush any buffered state (`CHECK`).
    async fn sync(&self) -> Result<()>;
}

/// Split a raw message into its header block (including the blank line)
/// and the text after it.
pub(crate) fn split_message(raw: &[u8]) -> (&[u8], &[u8]) {
    match raw.windows(4).position(|window| window == b"\r\n\r\n") {
        Some(at) => (&raw[..at + 4], &raw[at + 4..]),
        None => (raw, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_multimap() {
        let raw = b"Subject: hi\r\nReceived: a\r\nreceived: b\r\n\r\nbody";
        let headers = Headers::parse(raw).unwrap();

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get_first("subject"), Some("hi"));
        assert_eq!(headers.get_all("RECEIVED"), vec!["a", "b"]);

        let included = headers.include(&["subject".into()]);
        assert_eq!(included.format(), b"Subject: hi\r\n");

        let excluded = headers.exclude(&["received".into()]);
        assert_eq!(excluded.format(), b"Subject: hi\r\n");
    }

    #[test]
    fn test_split_message() {
        let (header, text) = split_message(b"Subject: hi\r\n\r\nbody!\r\n");
        assert_eq!(header, b"Subject: hi\r\n\r\n");
        assert_eq!(text, b"body!\r\n");

        let (header, text) = split_message(b"no blank line");
        assert_eq!(header, b"no blank line");
        assert_eq!(text, b"");
    }
}
