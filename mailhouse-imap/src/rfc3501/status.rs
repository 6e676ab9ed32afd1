//! `STATUS` attribute parser.

use nom::branch::alt;
use nom::bytes::streaming::tag_no_case;
use nom::combinator::value;

use crate::codec::decode::IMAPResult;
use crate::status::StatusDataItemName;

/// `status-att = "MESSAGES" / "RECENT" / "UIDNEXT" / "UIDVALIDITY" / "UNSEEN"`
pub(crate) fn status_att(input: &[u8]) -> IMAPResult<StatusDataItemName> {
    alt((
        value(StatusDataItemName::Messages, tag_no_case(b"MESSAGES")),
        value(StatusDataItemName::Recent, tag_no_case(b"RECENT")),
        value(StatusDataItemName::UidNext, tag_no_case(b"UIDNEXT")),
        value(StatusDataItemName::UidValidity, tag_no_case(b"UIDVALIDITY")),
        value(StatusDataItemName::Unseen, tag_no_case(b"UNSEEN")),
    ))(input)
}
