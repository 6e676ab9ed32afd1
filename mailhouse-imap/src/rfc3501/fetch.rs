//! Fetch-attribute parsers.

use abnf_core::streaming::sp;
use nom::branch::alt;
use nom::bytes::streaming::{tag, tag_no_case};
use nom::combinator::{map, opt, value};
use nom::multi::separated_list1;
use nom::sequence::{delimited, separated_pair, tuple};

use crate::codec::decode::IMAPResult;
use crate::core::AString;
use crate::fetch::{MessageDataItemName, Section};
use crate::rfc3501::core::{astring, number, nz_number};

/// `fetch-att = "ENVELOPE" / "FLAGS" / "INTERNALDATE" /
///              "RFC822" [".HEADER" / ".SIZE" / ".TEXT"] /
///              "BODY" ["STRUCTURE"] / "UID" /
///              "BODY" section ["<" number "." nz-number ">"] /
///              "BODY.PEEK" section ["<" number "." nz-number ">"]`
pub(crate) fn fetch_att(input: &[u8]) -> IMAPResult<MessageDataItemName> {
    alt((
        value(
            MessageDataItemName::BodyStructure,
            tag_no_case(b"BODYSTRUCTURE"),
        ),
        map(
            tuple((tag_no_case(b"BODY.PEEK"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: true,
            },
        ),
        map(
            tuple((tag_no_case(b"BODY"), section, opt(partial))),
            |(_, section, partial)| MessageDataItemName::BodyExt {
                section,
                partial,
                peek: false,
            },
        ),
        value(MessageDataItemName::Body, tag_no_case(b"BODY")),
        value(MessageDataItemName::Envelope, tag_no_case(b"ENVELOPE")),
        value(MessageDataItemName::Flags, tag_no_case(b"FLAGS")),
        value(
            MessageDataItemName::InternalDate,
            tag_no_case(b"INTERNALDATE"),
        ),
        value(
            MessageDataItemName::Rfc822Header,
            tag_no_case(b"RFC822.HEADER"),
        ),
        value(MessageDataItemName::Rfc822Size, tag_no_case(b"RFC822.SIZE")),
        value(MessageDataItemName::Rfc822Text, tag_no_case(b"RFC822.TEXT")),
        value(MessageDataItemName::Rfc822, tag_no_case(b"RFC822")),
        value(MessageDataItemName::Uid, tag_no_case(b"UID")),
    ))(input)
}

/// `section = "[" [section-spec] "]"`
///
/// The grammar subset here has no numeric part paths; a section is a
/// header/text selector or empty (whole body).
fn section(input: &[u8]) -> IMAPResult<Option<Section>> {
    delimited(tag(b"["), opt(section_spec), tag(b"]"))(input)
}

fn section_spec(input: &[u8]) -> IMAPResult<Section> {
    alt((
        map(
            tuple((tag_no_case(b"HEADER.FIELDS.NOT"), sp, header_list)),
            |(_, _, headers)| Section::HeaderFieldsNot(headers),
        ),
        map(
            tuple((tag_no_case(b"HEADER.FIELDS"), sp, header_list)),
            |(_, _, headers)| Section::HeaderFields(headers),
        ),
        value(Section::Header, tag_no_case(b"HEADER")),
        value(Section::Text, tag_no_case(b"TEXT")),
    ))(input)
}

/// `header-list = "(" header-fld-name *(SP header-fld-name) ")"`
fn header_list(input: &[u8]) -> IMAPResult<Vec<AString>> {
    delimited(tag(b"("), separated_list1(sp, header_fld_name), tag(b")"))(input)
}

#[inline]
/// `header-fld-name = astring`
pub(crate) fn header_fld_name(input: &[u8]) -> IMAPResult<AString> {
    astring(input)
}

/// `"<" number "." nz-number ">"`
fn partial(input: &[u8]) -> IMAPResult<(u32, std::num::NonZeroU32)> {
    delimited(
        tag(b"<"),
        separated_pair(number, tag(b"."), nz_number),
        tag(b">"),
    )(input)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    #[test]
    fn test_fetch_att() {
        let tests: &[(MessageDataItemName, &str)] = &[
            (MessageDataItemName::Envelope, "ENVELOPE???"),
            (MessageDataItemName::Flags, "FLAGS???"),
            (MessageDataItemName::InternalDate, "INTERNALDATE???"),
            (MessageDataItemName::Rfc822, "RFC822???"),
            (MessageDataItemName::Rfc822Header, "RFC822.HEADER???"),
            (MessageDataItemName::Rfc822Size, "RFC822.SIZE???"),
            (MessageDataItemName::Rfc822Text, "RFC822.TEXT???"),
            (MessageDataItemName::Body, "BODY???"),
            (MessageDataItemName::BodyStructure, "BODYSTRUCTURE???"),
            (MessageDataItemName::Uid, "UID???"),
            (
                MessageDataItemName::BodyExt {
                    partial: None,
                    peek: false,
                    section: None,
                },
                "BODY[]???",
            ),
            (
                MessageDataItemName::BodyExt {
                    partial: None,
                    peek: true,
                    section: Some(Section::Text),
                },
                "BODY.PEEK[TEXT]???",
            ),
            (
                MessageDataItemName::BodyExt {
                    partial: Some((42, NonZeroU32::new(1337).unwrap())),
                    peek: true,
                    section: Some(Section::Text),
                },
                "BODY.PEEK[TEXT]<42.1337>???",
            ),
            (
                MessageDataItemName::BodyExt {
                    partial: None,
                    peek: true,
                    section: Some(Section::HeaderFields(vec![AString::from("SUBJECT")])),
                },
                "BODY.PEEK[HEADER.FIELDS (SUBJECT)]???",
            ),
            (
                MessageDataItemName::BodyExt {
                    partial: None,
                    peek: false,
                    section: Some(Section::HeaderFieldsNot(vec![
                        AString::from("X-Spam"),
                        AString::from("Received"),
                    ])),
                },
                "BODY[HEADER.FIELDS.NOT (X-Spam Received)]???",
            ),
        ];

        let expected_remainder = "???".as_bytes();

        for (expected, test) in tests {
            let (got_remainder, got) = fetch_att(test.as_bytes()).unwrap();

            assert_eq!(*expected, got);
            assert_eq!(expected_remainder, got_remainder);
        }
    }
}
