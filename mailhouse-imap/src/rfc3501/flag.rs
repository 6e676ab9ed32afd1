//! Flag parsers.

use abnf_core::streaming::sp;
use nom::branch::alt;
use nom::bytes::streaming::tag;
use nom::combinator::map;
use nom::multi::separated_list0;
use nom::sequence::{delimited, preceded};

use crate::codec::decode::IMAPResult;
use crate::flag::Flag;
use crate::rfc3501::core::atom;

/// `flag = "\Answered" / "\Flagged" / "\Deleted" / "\Seen" / "\Draft" /
///         flag-keyword / flag-extension`
///
/// `\Recent` is accepted here too; whether a client may *store* it is
/// the dispatcher's concern.
pub(crate) fn flag(input: &[u8]) -> IMAPResult<Flag> {
    alt((
        map(preceded(tag(b"\\"), atom), Flag::system),
        map(atom, Flag::keyword),
    ))(input)
}

/// `flag-list = "(" [flag *(SP flag)] ")"`
pub(crate) fn flag_list(input: &[u8]) -> IMAPResult<Vec<Flag>> {
    delimited(tag(b"("), separated_list0(sp, flag), tag(b")"))(input)
}
