//! `SEARCH`-related types.

use crate::core::{AString, Atom};
use crate::datetime::NaiveDate;
use crate::sequence::SequenceSet;

/// `search-key` (RFC 3501 §6.4.4).
///
/// The full grammar is parsed even where the server later answers
/// `NO ... not implemented` for a key -- a half-parsed command would leave
/// the stream out of sync.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchKey {
    /// Implicit conjunction of several keys (the top-level key list and
    /// parenthesised groups).
    And(Vec<SearchKey>),
    All,
    Answered,
    Bcc(AString),
    Before(NaiveDate),
    Body(AString),
    Cc(AString),
    Deleted,
    Draft,
    Flagged,
    From(AString),
    Header(AString, AString),
    Keyword(Atom),
    Larger(u32),
    New,
    Not(Box<SearchKey>),
    Old,
    On(NaiveDate),
    Or(Box<SearchKey>, Box<SearchKey>),
    Recent,
    Seen,
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    SequenceSet(SequenceSet),
    Since(NaiveDate),
    Smaller(u32),
    Subject(AString),
    Text(AString),
    To(AString),
    Uid(SequenceSet),
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword(Atom),
    Unseen,
}
