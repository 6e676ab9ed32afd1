//! Sequence-set parsers.

use nom::branch::alt;
use nom::bytes::streaming::tag;
use nom::combinator::{map, value};
use nom::multi::separated_list1;
use nom::sequence::separated_pair;

use crate::codec::decode::IMAPResult;
use crate::rfc3501::core::nz_number;
use crate::sequence::{SeqOrUid, Sequence, SequenceSet};

/// `seq-number = nz-number / "*"`
fn seq_number(input: &[u8]) -> IMAPResult<SeqOrUid> {
    alt((
        map(nz_number, SeqOrUid::Value),
        value(SeqOrUid::Asterisk, tag(b"*")),
    ))(input)
}

/// `seq-range = seq-number ":" seq-number`, or a bare `seq-number`
fn sequence(input: &[u8]) -> IMAPResult<Sequence> {
    alt((
        map(
            separated_pair(seq_number, tag(b":"), seq_number),
            |(start, end)| Sequence::Range(start, end),
        ),
        map(seq_number, Sequence::Single),
    ))(input)
}

/// `sequence-set = (seq-number / seq-range) *("," (seq-number / seq-range))`
pub(crate) fn sequence_set(input: &[u8]) -> IMAPResult<SequenceSet> {
    map(separated_list1(tag(b","), sequence), SequenceSet)(input)
}
