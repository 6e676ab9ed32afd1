//! An in-memory message store.
//!
//! Serves tests and credential-less demo runs. Every operation takes the
//! store lock once and either completes or leaves nothing behind, which
//! gives the transactional guarantee of the contract for free.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};

use mailhouse_imap::flag::Flag;

use crate::store::search::SearchNode;
use crate::store::{
    split_message, Headers, Mailbox, Message, MessageStore, Result, StoreError, MAX_BODY_BYTES,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    mailboxes: Vec<MailboxRec>,
    next_mailbox_id: u32,
    next_row_id: u64,
}

#[derive(Debug)]
struct MailboxRec {
    id: u32,
    name: String,
    next_uid: u32,
    /// Ascending UID order by construction.
    messages: Vec<MessageRec>,
}

#[derive(Debug)]
struct MessageRec {
    row_id: u64,
    uid: u32,
    mailbox_id: u32,
    size: u32,
    created: DateTime<FixedOffset>,
    flags: Vec<Flag>,
    headers: Headers,
    body: Vec<u8>,
}

impl MessageRec {
    fn to_message(&self) -> Message {
        Message {
            row_id: self.row_id,
            uid: self.uid,
            mailbox_id: self.mailbox_id,
            size: self.size,
            created: self.created,
            flags: self.flags.clone(),
            headers: self.headers.clone(),
        }
    }

    fn add_flag(&mut self, flag: &Flag) {
        if !self.flags.contains(flag) {
            self.flags.push(flag.clone());
        }
    }

    fn remove_flag(&mut self, flag: &Flag) {
        self.flags.retain(|existing| existing != flag);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn mailbox(&self, name: &str) -> Result<&MailboxRec> {
        self.mailboxes
            .iter()
            .find(|mailbox| mailbox.name == name)
            .ok_or_else(|| StoreError::NoSuchMailbox(name.into()))
    }

    fn mailbox_mut(&mut self, name: &str) -> Result<&mut MailboxRec> {
        self.mailboxes
            .iter_mut()
            .find(|mailbox| mailbox.name == name)
            .ok_or_else(|| StoreError::NoSuchMailbox(name.into()))
    }

    fn message_mut(&mut self, row_id: u64) -> Result<&mut MessageRec> {
        self.mailboxes
            .iter_mut()
            .flat_map(|mailbox| mailbox.messages.iter_mut())
            .find(|message| message.row_id == row_id)
            .ok_or(StoreError::NoSuchMessage(row_id))
    }

    fn message(&self, row_id: u64) -> Result<&MessageRec> {
        self.mailboxes
            .iter()
            .flat_map(|mailbox| mailbox.messages.iter())
            .find(|message| message.row_id == row_id)
            .ok_or(StoreError::NoSuchMessage(row_id))
    }

    fn insert_message(
        &mut self,
        mailbox_name: &str,
        body: &[u8],
        flags: Vec<Flag>,
        created: DateTime<FixedOffset>,
    ) -> Result<Message> {
        if body.len() > MAX_BODY_BYTES {
            return Err(StoreError::BodyTooBig {
                max: MAX_BODY_BYTES,
            });
        }

        // Parse headers before touching any state.
        let headers = Headers::parse(body)?;

        let row_id = self.next_row_id;
        let mailbox = self.mailbox_mut(mailbox_name)?;

        let rec = MessageRec {
            row_id,
            uid: mailbox.next_uid,
            mailbox_id: mailbox.id,
            size: body.len() as u32,
            created,
            flags,
            headers,
            body: body.to_vec(),
        };

        let message = rec.to_message();
        mailbox.next_uid += 1;
        mailbox.messages.push(rec);
        self.next_row_id += 1;

        Ok(message)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_mailbox(&self, name: &str) -> Result<Mailbox> {
        let mut inner = self.inner.lock().unwrap();

        if inner.mailbox(name).is_ok() {
            return Err(StoreError::MailboxExists(name.into()));
        }

        inner.next_mailbox_id += 1;
        let rec = MailboxRec {
            id: inner.next_mailbox_id,
            name: name.into(),
            next_uid: 1,
            messages: Vec::new(),
        };
        let mailbox = Mailbox {
            id: rec.id,
            name: rec.name.clone(),
            next_uid: rec.next_uid,
        };
        inner.mailboxes.push(rec);

        Ok(mailbox)
    }

    async fn delete_mailbox(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        // Cascades messages, headers, and flags with the mailbox record.
        inner.mailbox(name)?;
        inner.mailboxes.retain(|mailbox| mailbox.name != name);

        Ok(())
    }

    async fn rename_mailbox(&self, from: &str, to: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        if inner.mailbox(to).is_ok() {
            return Err(StoreError::MailboxExists(to.into()));
        }

        inner.mailbox_mut(from)?.name = to.into();

        Ok(())
    }

    async fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        let inner = self.inner.lock().unwrap();

        Ok(inner
            .mailboxes
            .iter()
            .map(|rec| Mailbox {
                id: rec.id,
                name: rec.name.clone(),
                next_uid: rec.next_uid,
            })
            .collect())
    }

    async fn mailbox_by_name(&self, name: &str) -> Result<Mailbox> {
        let inner = self.inner.lock().unwrap();
        let rec = inner.mailbox(name)?;

        Ok(Mailbox {
            id: rec.id,
            name: rec.name.clone(),
            next_uid: rec.next_uid,
        })
    }

    async fn message_count(&self, mailbox: &str) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.mailbox(mailbox)?.messages.len() as u32)
    }

    async fn recent_count(&self, mailbox: &str) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .filter(|message| message.flags.contains(&Flag::Recent))
            .count() as u32)
    }

    async fn unseen_count(&self, mailbox: &str) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .filter(|message| !message.flags.contains(&Flag::Seen))
            .count() as u32)
    }

    async fn uids(&self, mailbox: &str) -> Result<Vec<u32>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .map(|message| message.uid)
            .collect())
    }

    async fn messages_by_offset(
        &self,
        mailbox: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .map(MessageRec::to_message)
            .collect())
    }

    async fn messages_by_uid_range(
        &self,
        mailbox: &str,
        lo: u32,
        hi: Option<u32>,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .filter(|message| message.uid >= lo && hi.map_or(true, |hi| message.uid <= hi))
            .map(MessageRec::to_message)
            .collect())
    }

    async fn message_by_row(&self, row_id: u64) -> Result<Message> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.message(row_id)?.to_message())
    }

    async fn create_message(
        &self,
        mailbox: &str,
        body: &[u8],
        flags: &[Flag],
        created: Option<DateTime<FixedOffset>>,
    ) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let created = created.unwrap_or_else(|| Local::now().fixed_offset());
        inner.insert_message(mailbox, body, flags.to_vec(), created)
    }

    async fn copy_messages(&self, row_ids: &[u64], target: &str) -> Result<Vec<Message>> {
        let mut inner = self.inner.lock().unwrap();

        // Validate everything up front; nothing is copied on any miss.
        inner.mailbox(target)?;
        let mut sources = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            let rec = inner.message(*row_id)?;
            let mut flags = rec.flags.clone();
            if !flags.contains(&Flag::Recent) {
                flags.push(Flag::Recent);
            }
            sources.push((rec.body.clone(), flags, rec.created));
        }

        let mut copies = Vec::with_capacity(sources.len());
        for (body, flags, created) in sources {
            copies.push(inner.insert_message(target, &body, flags, created)?);
        }

        Ok(copies)
    }

    async fn expunge(&self, mailbox: &str) -> Result<Vec<u32>> {
        let mut inner = self.inner.lock().unwrap();
        let mailbox = inner.mailbox_mut(mailbox)?;

        let expunged = mailbox
            .messages
            .iter()
            .filter(|message| message.flags.contains(&Flag::Deleted))
            .map(|message| message.uid)
            .collect();

        mailbox
            .messages
            .retain(|message| !message.flags.contains(&Flag::Deleted));

        Ok(expunged)
    }

    async fn add_flags(&self, row_id: u64, flags: &[Flag]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner.message_mut(row_id)?;

        for flag in flags {
            message.add_flag(flag);
        }

        Ok(())
    }

    async fn remove_flags(&self, row_id: u64, flags: &[Flag]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner.message_mut(row_id)?;

        for flag in flags {
            message.remove_flag(flag);
        }

        Ok(())
    }

    async fn replace_flags(&self, row_id: u64, remove: &[Flag], add: &[Flag]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner.message_mut(row_id)?;

        for flag in remove {
            message.remove_flag(flag);
        }
        for flag in add {
            message.add_flag(flag);
        }

        Ok(())
    }

    async fn claim_recent(&self, mailbox: &str) -> Result<Vec<u32>> {
        let mut inner = self.inner.lock().unwrap();
        let mailbox = inner.mailbox_mut(mailbox)?;

        let mut claimed = Vec::new();
        for message in &mut mailbox.messages {
            if message.flags.contains(&Flag::Recent) {
                message.remove_flag(&Flag::Recent);
                claimed.push(message.uid);
            }
        }

        Ok(claimed)
    }

    async fn body(&self, row_id: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.message(row_id)?.body.clone())
    }

    async fn text(&self, row_id: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let (_, text) = split_message(&inner.message(row_id)?.body);
        Ok(text.to_vec())
    }

    async fn search(&self, mailbox: &str, query: &SearchNode) -> Result<Vec<u32>> {
        let inner = self.inner.lock().unwrap();

        Ok(inner
            .mailbox(mailbox)?
            .messages
            .iter()
            .filter(|rec| query.matches(&rec.to_message()))
            .map(|rec| rec.uid)
            .collect())
    }

    async fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIL: &[u8] = b"Subject: hi\r\n\r\nbody!\r\n";

    async fn store_with_inbox() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_mailbox("INBOX").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_uids_are_monotonic() {
        let store = store_with_inbox().await;

        for _ in 0..3 {
            store
                .create_message("INBOX", MAIL, &[Flag::Recent], None)
                .await
                .unwrap();
        }

        assert_eq!(store.uids("INBOX").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.mailbox_by_name("INBOX").await.unwrap().next_uid, 4);

        // Expunging doesn't free UIDs for reuse.
        let msg = store.messages_by_offset("INBOX", 2, 1).await.unwrap();
        store
            .add_flags(msg[0].row_id, &[Flag::Deleted])
            .await
            .unwrap();
        assert_eq!(store.expunge("INBOX").await.unwrap(), vec![3]);

        let msg = store
            .create_message("INBOX", MAIL, &[], None)
            .await
            .unwrap();
        assert_eq!(msg.uid, 4);
    }

    #[tokio::test]
    async fn test_expunge_keeps_survivor_uids() {
        let store = store_with_inbox().await;

        for _ in 0..3 {
            store.create_message("INBOX", MAIL, &[], None).await.unwrap();
        }

        let victims = store.messages_by_offset("INBOX", 0, 2).await.unwrap();
        for victim in &victims {
            store
                .add_flags(victim.row_id, &[Flag::Deleted])
                .await
                .unwrap();
        }

        assert_eq!(store.expunge("INBOX").await.unwrap(), vec![1, 2]);
        assert_eq!(store.uids("INBOX").await.unwrap(), vec![3]);

        let survivors = store.messages_by_offset("INBOX", 0, 10).await.unwrap();
        assert!(!survivors[0].has_flag(&Flag::Deleted));
    }

    #[tokio::test]
    async fn test_flags_are_a_set() {
        let store = store_with_inbox().await;
        let msg = store
            .create_message("INBOX", MAIL, &[], None)
            .await
            .unwrap();

        store.add_flags(msg.row_id, &[Flag::Seen]).await.unwrap();
        store.add_flags(msg.row_id, &[Flag::Seen]).await.unwrap();
        // Case-insensitive equality keeps the set deduplicated.
        store
            .add_flags(msg.row_id, &[Flag::try_from("\\seen").unwrap()])
            .await
            .unwrap();

        let msg = store.message_by_row(msg.row_id).await.unwrap();
        assert_eq!(
            msg.flags.iter().filter(|flag| **flag == Flag::Seen).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_copy_preserves_everything_but_uid() {
        let store = store_with_inbox().await;
        store.create_mailbox("work").await.unwrap();

        let original = store
            .create_message("INBOX", MAIL, &[Flag::Seen], None)
            .await
            .unwrap();

        let copies = store
            .copy_messages(&[original.row_id], "work")
            .await
            .unwrap();
        let copy = &copies[0];

        assert_ne!(copy.row_id, original.row_id);
        assert_eq!(copy.uid, 1);
        assert_eq!(copy.created, original.created);
        assert_eq!(copy.headers, original.headers);
        assert!(copy.has_flag(&Flag::Seen));
        assert!(copy.has_flag(&Flag::Recent));
        assert_eq!(
            store.body(copy.row_id).await.unwrap(),
            store.body(original.row_id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_is_all_or_nothing() {
        let store = store_with_inbox().await;
        store.create_mailbox("work").await.unwrap();

        let msg = store
            .create_message("INBOX", MAIL, &[], None)
            .await
            .unwrap();

        // One bad row id fails the whole copy.
        let result = store.copy_messages(&[msg.row_id, 999], "work").await;
        assert!(result.is_err());
        assert_eq!(store.message_count("work").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_body_too_big() {
        let store = store_with_inbox().await;

        let huge = vec![b'x'; MAX_BODY_BYTES + 1];
        let result = store.create_message("INBOX", &huge, &[], None).await;
        assert!(matches!(result, Err(StoreError::BodyTooBig { .. })));
        assert_eq!(store.message_count("INBOX").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_recent_claims_once() {
        let store = store_with_inbox().await;
        store
            .create_message("INBOX", MAIL, &[Flag::Recent], None)
            .await
            .unwrap();

        assert_eq!(store.recent_count("INBOX").await.unwrap(), 1);
        assert_eq!(store.claim_recent("INBOX").await.unwrap(), vec![1]);
        assert_eq!(store.recent_count("INBOX").await.unwrap(), 0);
        assert!(store.claim_recent("INBOX").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let store = store_with_inbox().await;
        store.create_mailbox("work").await.unwrap();

        assert!(store.create_mailbox("work").await.is_err());

        store.rename_mailbox("work", "play").await.unwrap();
        assert!(store.mailbox_by_name("work").await.is_err());

        let play = store.mailbox_by_name("play").await.unwrap();
        store.create_message("play", MAIL, &[], None).await.unwrap();

        store.delete_mailbox("play").await.unwrap();
        assert!(store.mailbox_by_name("play").await.is_err());

        // UIDVALIDITY values are never reused.
        let recreated = store.create_mailbox("play").await.unwrap();
        assert_ne!(recreated.id, play.id);
    }

    #[tokio::test]
    async fn test_body_and_text() {
        let store = store_with_inbox().await;
        let msg = store
            .create_message("INBOX", MAIL, &[], None)
            .await
            .unwrap();

        assert_eq!(store.body(msg.row_id).await.unwrap(), MAIL);
        assert_eq!(store.text(msg.row_id).await.unwrap(), b"body!\r\n");
        assert_eq!(msg.size as usize, MAIL.len());
    }
}
