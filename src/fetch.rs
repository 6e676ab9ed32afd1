//! Sequence resolution and `FETCH` item assembly.
//!
//! A sequence set resolves against the selected mailbox in one of two
//! modes: message sequence numbers are 1-based positions in UID-ascending
//! order, UIDs are the stable per-mailbox identifiers. Responses always
//! carry sequence numbers, whatever the addressing mode was.

use std::num::NonZeroU32;
use std::sync::Arc;

use mailhouse_imap::core::NString;
use mailhouse_imap::fetch::{MessageDataItem, MessageDataItemName, Section};
use mailhouse_imap::flag::Flag;
use mailhouse_imap::sequence::SequenceSet;

use crate::bodystructure::{body_structure, envelope_from};
use crate::session::SelectedMailbox;
use crate::store::{split_message, Message, MessageStore, Result};

/// A message paired with its current sequence number.
#[derive(Clone, Debug)]
pub struct Numbered {
    pub seq: NonZeroU32,
    pub message: Message,
}

/// `1` is a safe fallback for ids the store guarantees to be non-zero.
pub(crate) fn nz(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value.max(1)).unwrap_or(NonZeroU32::MIN)
}

/// Resolve a sequence set against the mailbox, in client order, with
/// duplicates preserved across ranges (the client asked twice).
pub async fn resolve(
    store: &Arc<dyn MessageStore>,
    mailbox: &str,
    set: &SequenceSet,
    uid_mode: bool,
) -> Result<Vec<Numbered>> {
    let mut out = Vec::new();

    if uid_mode {
        // Sequence numbers still appear in the response; map them through
        // the mailbox's UID list.
        let uids = store.uids(mailbox).await?;
        let largest = uids.last().copied().unwrap_or(0);

        for sequence in &set.0 {
            let (lo, hi) = sequence.bounds(largest);
            for message in store.messages_by_uid_range(mailbox, lo, Some(hi)).await? {
                let seq = match uids.binary_search(&message.uid) {
                    Ok(index) => nz(index as u32 + 1),
                    Err(_) => continue,
                };
                out.push(Numbered { seq, message });
            }
        }
    } else {
        let count = store.message_count(mailbox).await?;

        for sequence in &set.0 {
            let (lo, hi) = sequence.bounds(count);
            if lo > count || count == 0 {
                continue;
            }
            let hi = hi.min(count);

            let messages = store
                .messages_by_offset(mailbox, lo - 1, hi - lo + 1)
                .await?;
            for (index, message) in messages.into_iter().enumerate() {
                out.push(Numbered {
                    seq: nz(lo + index as u32),
                    message,
                });
            }
        }
    }

    Ok(out)
}

/// The flags of a message as this session sees them: store flags plus
/// `\Recent` for messages the session claimed at `SELECT` time.
pub fn session_flags(message: &Message, selected: &SelectedMailbox) -> Vec<Flag> {
    let mut flags = message.flags.clone();

    if selected.recent.contains(&message.uid) && !flags.contains(&Flag::Recent) {
        flags.push(Flag::Recent);
    }

    flags
}

/// The assembled items for one message, plus whether serving them implies
/// setting `\Seen` (a non-peek body fetch).
pub struct Assembled {
    pub items: Vec<MessageDataItem>,
    pub set_seen: bool,
}

/// Assemble the response items for one message.
///
/// The `RFC822` family answers in its `BODY[...]` spelling; `UID` is
/// forced into the item list by the caller for `UID FETCH`.
pub async fn assemble(
    store: &Arc<dyn MessageStore>,
    selected: &SelectedMailbox,
    message: &Message,
    names: &[MessageDataItemName],
) -> Result<Assembled> {
    let mut items = Vec::new();
    let mut set_seen = false;

    for name in names {
        match name {
            MessageDataItemName::Flags => {
                items.push(MessageDataItem::Flags(session_flags(message, selected)));
            }
            MessageDataItemName::InternalDate => {
                items.push(MessageDataItem::InternalDate(message.created.into()));
            }
            MessageDataItemName::Rfc822Size => {
                items.push(MessageDataItem::Rfc822Size(message.size));
            }
            MessageDataItemName::Uid => {
                items.push(MessageDataItem::Uid(nz(message.uid)));
            }
            MessageDataItemName::Envelope => {
                items.push(MessageDataItem::Envelope(envelope_from(&message.headers)));
            }
            MessageDataItemName::Body => {
                let raw = store.body(message.row_id).await?;
                items.push(MessageDataItem::Body(body_structure(&raw)?));
            }
            MessageDataItemName::BodyStructure => {
                let raw = store.body(message.row_id).await?;
                items.push(MessageDataItem::BodyStructure(body_structure(&raw)?));
            }
            MessageDataItemName::Rfc822 => {
                set_seen = true;
                items.push(body_item(store, message, &None, &None).await?);
            }
            MessageDataItemName::Rfc822Header => {
                items.push(body_item(store, message, &Some(Section::Header), &None).await?);
            }
            MessageDataItemName::Rfc822Text => {
                set_seen = true;
                items.push(body_item(store, message, &Some(Section::Text), &None).await?);
            }
            MessageDataItemName::BodyExt {
                section,
                partial,
                peek,
            } => {
                if !peek {
                    set_seen = true;
                }
                items.push(body_item(store, message, section, partial).await?);
            }
        }
    }

    Ok(Assembled { items, set_seen })
}

async fn body_item(
    store: &Arc<dyn MessageStore>,
    message: &Message,
    section: &Option<Section>,
    partial: &Option<(u32, NonZeroU32)>,
) -> Result<MessageDataItem> {
    let mut data = match section {
        None => store.body(message.row_id).await?,
        Some(Section::Header) => {
            let raw = store.body(message.row_id).await?;
            let (header, _) = split_message(&raw);
            header.to_vec()
        }
        Some(Section::Text) => store.text(message.row_id).await?,
        Some(Section::HeaderFields(names)) => {
            let names = header_names(names);
            message.headers.include(&names).format()
        }
        Some(Section::HeaderFieldsNot(names)) => {
            let names = header_names(names);
            message.headers.exclude(&names).format()
        }
    };

    let origin = match partial {
        Some((offset, length)) => {
            let start = (*offset as usize).min(data.len());
            let end = (start + length.get() as usize).min(data.len());
            data = data[start..end].to_vec();
            Some(*offset)
        }
        None => None,
    };

    Ok(MessageDataItem::BodyExt {
        section: section.clone(),
        origin,
        data: NString::from_bytes(data),
    })
}

fn header_names(names: &[mailhouse_imap::core::AString]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.to_text().into_owned())
        .collect()
}
