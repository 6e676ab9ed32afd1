//! Compilation of `SEARCH` key trees into store queries.
//!
//! The wire-level [`SearchKey`] tree is compiled into a [`SearchNode`]
//! predicate program that any store backend can interpret: a SQL store
//! would render it as a WHERE clause, the in-memory store evaluates it per
//! message. Keys the server doesn't support compile to an [`Unsupported`]
//! error so the dispatcher can answer `NO` instead of returning wrong
//! results.

use chrono::NaiveDate;
use thiserror::Error;

use mailhouse_imap::flag::Flag;
use mailhouse_imap::search::SearchKey;
use mailhouse_imap::sequence::{SeqOrUid, Sequence, SequenceSet};

use crate::store::Message;

/// A backend-agnostic search predicate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchNode {
    /// Matches every message.
    All,
    /// Conjunction.
    And(Vec<SearchNode>),
    Or(Box<SearchNode>, Box<SearchNode>),
    Not(Box<SearchNode>),
    FlagSet(Flag),
    FlagClear(Flag),
    /// Header `name` exists with `value` as a case-insensitive substring.
    HeaderContains { name: String, value: String },
    /// `INTERNALDATE` is earlier than the given date.
    Before(NaiveDate),
    /// `INTERNALDATE` is within or later than the given date.
    Since(NaiveDate),
    Larger(u32),
    Smaller(u32),
    /// UID lies within any of the inclusive ranges; `None` = unbounded.
    UidIn(Vec<(u32, Option<u32>)>),
}

/// A parsed-but-unsupported search key; answered with `NO`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("search key {0} is not implemented")]
pub struct Unsupported(pub String);

/// Compile a search key tree.
pub fn compile(key: &SearchKey) -> Result<SearchNode, Unsupported> {
    use SearchKey::*;

    Ok(match key {
        All => SearchNode::All,
        And(keys) => SearchNode::And(
            keys.iter()
                .map(compile)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Or(left, right) => SearchNode::Or(Box::new(compile(left)?), Box::new(compile(right)?)),
        Not(inner) => SearchNode::Not(Box::new(compile(inner)?)),

        Answered => SearchNode::FlagSet(Flag::Answered),
        Unanswered => SearchNode::FlagClear(Flag::Answered),
        Deleted => SearchNode::FlagSet(Flag::Deleted),
        Undeleted => SearchNode::FlagClear(Flag::Deleted),
        Draft => SearchNode::FlagSet(Flag::Draft),
        Undraft => SearchNode::FlagClear(Flag::Draft),
        Flagged => SearchNode::FlagSet(Flag::Flagged),
        Unflagged => SearchNode::FlagClear(Flag::Flagged),
        Seen => SearchNode::FlagSet(Flag::Seen),
        Unseen => SearchNode::FlagClear(Flag::Seen),
        Recent => SearchNode::FlagSet(Flag::Recent),
        Old => SearchNode::FlagClear(Flag::Recent),
        New => SearchNode::And(vec![
            SearchNode::FlagSet(Flag::Recent),
            SearchNode::FlagClear(Flag::Seen),
        ]),
        Keyword(atom) => SearchNode::FlagSet(Flag::Keyword(atom.clone())),
        Unkeyword(atom) => SearchNode::FlagClear(Flag::Keyword(atom.clone())),

        Bcc(value) => header_contains("Bcc", value),
        Cc(value) => header_contains("Cc", value),
        From(value) => header_contains("From", value),
        Subject(value) => header_contains("Subject", value),
        To(value) => header_contains("To", value),
        Header(name, value) => SearchNode::HeaderContains {
            name: name.to_text().into_owned(),
            value: value.to_text().into_owned(),
        },

        Before(date) => SearchNode::Before(*date.inner()),
        Since(date) => SearchNode::Since(*date.inner()),

        Larger(size) => SearchNode::Larger(*size),
        Smaller(size) => SearchNode::Smaller(*size),

        Uid(set) => SearchNode::UidIn(uid_ranges(set)),

        // Parsed for stream sync, not served.
        On(_) => return Err(Unsupported("ON".into())),
        SentBefore(_) => return Err(Unsupported("SENTBEFORE".into())),
        SentOn(_) => return Err(Unsupported("SENTON".into())),
        SentSince(_) => return Err(Unsupported("SENTSINCE".into())),
        Body(_) => return Err(Unsupported("BODY".into())),
        Text(_) => return Err(Unsupported("TEXT".into())),
        SequenceSet(_) => return Err(Unsupported("message sequence numbers".into())),
    })
}

fn header_contains(name: &str, value: &mailhouse_imap::core::AString) -> SearchNode {
    SearchNode::HeaderContains {
        name: name.into(),
        value: value.to_text().into_owned(),
    }
}

/// `*` has no resolvable value without the mailbox at hand; it is treated
/// as an open bound, which matches every use of `n:*` and over-matches
/// only the degenerate bare `*` key.
fn uid_ranges(set: &SequenceSet) -> Vec<(u32, Option<u32>)> {
    set.0
        .iter()
        .map(|sequence| match sequence {
            Sequence::Single(SeqOrUid::Value(value)) => (value.get(), Some(value.get())),
            Sequence::Single(SeqOrUid::Asterisk) => (1, None),
            Sequence::Range(start, end) => {
                let lo = match start {
                    SeqOrUid::Value(value) => value.get(),
                    SeqOrUid::Asterisk => 1,
                };
                let hi = match end {
                    SeqOrUid::Value(value) => Some(value.get()),
                    SeqOrUid::Asterisk => None,
                };
                match hi {
                    Some(hi) if hi < lo => (hi, Some(lo)),
                    _ => (lo, hi),
                }
            }
        })
        .collect()
}

impl SearchNode {
    /// Evaluate against one message. Backends without a native query
    /// language use this directly.
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::And(nodes) => nodes.iter().all(|node| node.matches(message)),
            Self::Or(left, right) => left.matches(message) || right.matches(message),
            Self::Not(inner) => !inner.matches(message),
            Self::FlagSet(flag) => message.has_flag(flag),
            Self::FlagClear(flag) => !message.has_flag(flag),
            Self::HeaderContains { name, value } => {
                let needle = value.to_ascii_lowercase();
                message
                    .headers
                    .get_all(name)
                    .iter()
                    .any(|header| header.to_ascii_lowercase().contains(&needle))
            }
            Self::Before(date) => message.created.date_naive() < *date,
            Self::Since(date) => message.created.date_naive() >= *date,
            Self::Larger(size) => message.size > *size,
            Self::Smaller(size) => message.size < *size,
            Self::UidIn(ranges) => ranges
                .iter()
                .any(|(lo, hi)| message.uid >= *lo && hi.map_or(true, |hi| message.uid <= hi)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use mailhouse_imap::core::AString;

    use super::*;
    use crate::store::Headers;

    fn message(size: u32, flags: Vec<Flag>, subject: &str) -> Message {
        let mut headers = Headers::new();
        headers.push("Subject", subject);

        Message {
            row_id: 1,
            uid: 7,
            mailbox_id: 1,
            size,
            created: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2023, 6, 15, 12, 0, 0)
                .unwrap(),
            flags,
            headers,
        }
    }

    #[test]
    fn test_compile_flags() {
        assert_eq!(
            compile(&SearchKey::Seen).unwrap(),
            SearchNode::FlagSet(Flag::Seen)
        );
        assert_eq!(
            compile(&SearchKey::Unseen).unwrap(),
            SearchNode::FlagClear(Flag::Seen)
        );
        assert_eq!(
            compile(&SearchKey::New).unwrap(),
            SearchNode::And(vec![
                SearchNode::FlagSet(Flag::Recent),
                SearchNode::FlagClear(Flag::Seen),
            ])
        );
    }

    #[test]
    fn test_compile_unsupported() {
        assert!(compile(&SearchKey::Body(AString::from("x"))).is_err());
        assert!(compile(&SearchKey::SentOn(
            chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().into()
        ))
        .is_err());

        // One unsupported key poisons the whole conjunction.
        let key = SearchKey::And(vec![SearchKey::Seen, SearchKey::Text(AString::from("x"))]);
        assert!(compile(&key).is_err());
    }

    #[test]
    fn test_matches() {
        let msg = message(100, vec![Flag::Seen], "Meeting notes");

        assert!(SearchNode::FlagSet(Flag::Seen).matches(&msg));
        assert!(!SearchNode::FlagClear(Flag::Seen).matches(&msg));
        assert!(SearchNode::HeaderContains {
            name: "subject".into(),
            value: "meeting".into(),
        }
        .matches(&msg));
        assert!(SearchNode::Larger(99).matches(&msg));
        assert!(!SearchNode::Larger(100).matches(&msg));
        assert!(SearchNode::Smaller(101).matches(&msg));
        assert!(SearchNode::UidIn(vec![(5, Some(10))]).matches(&msg));
        assert!(!SearchNode::UidIn(vec![(8, None)]).matches(&msg));
        assert!(
            SearchNode::Before(chrono::NaiveDate::from_ymd_opt(2023, 6, 16).unwrap())
                .matches(&msg)
        );
        assert!(
            SearchNode::Since(chrono::NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()).matches(&msg)
        );
        assert!(
            !SearchNode::Since(chrono::NaiveDate::from_ymd_opt(2023, 6, 16).unwrap())
                .matches(&msg)
        );
    }

    #[test]
    fn test_uid_ranges() {
        use std::num::NonZeroU32;

        let n = |v: u32| SeqOrUid::Value(NonZeroU32::new(v).unwrap());
        let set = SequenceSet(vec![
            Sequence::Single(n(3)),
            Sequence::Range(n(10), SeqOrUid::Asterisk),
            Sequence::Range(n(9), n(5)),
        ]);

        assert_eq!(
            uid_ranges(&set),
            vec![(3, Some(3)), (10, None), (5, Some(9))]
        );
    }
}
