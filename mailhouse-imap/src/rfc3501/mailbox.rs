//! Mailbox name parsers.

use std::str::from_utf8;

use nom::branch::alt;
use nom::bytes::streaming::take_while1;
use nom::combinator::map;

use crate::codec::decode::IMAPResult;
use crate::core::{is_astring_char, is_list_wildcards};
use crate::mailbox::{ListMailbox, Mailbox};
use crate::rfc3501::core::{astring, string};

/// `mailbox = "INBOX" / astring`
///
/// INBOX is matched case-insensitively inside [`Mailbox::new`].
pub(crate) fn mailbox(input: &[u8]) -> IMAPResult<Mailbox> {
    map(astring, |name| Mailbox::from(&name))(input)
}

/// `list-mailbox = 1*list-char / string`
pub(crate) fn list_mailbox(input: &[u8]) -> IMAPResult<ListMailbox> {
    alt((
        map(take_while1(is_list_char), |bytes: &[u8]| {
            // `unwrap` is safe because `is_list_char` admits ASCII only.
            ListMailbox::Token(from_utf8(bytes).unwrap().to_owned())
        }),
        map(string, ListMailbox::String),
    ))(input)
}

/// `list-char = ATOM-CHAR / list-wildcards / resp-specials`
fn is_list_char(byte: u8) -> bool {
    // `is_astring_char` already covers resp-specials.
    is_astring_char(byte) || is_list_wildcards(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox() {
        let (_, val) = mailbox(b"inbox ").unwrap();
        assert_eq!(val.as_str(), "INBOX");

        let (_, val) = mailbox(b"\"with space\" ").unwrap();
        assert_eq!(val.as_str(), "with space");
    }

    #[test]
    fn test_list_mailbox() {
        let (_, val) = list_mailbox(b"*\r\n").unwrap();
        assert_eq!(val.to_text(), "*");

        let (_, val) = list_mailbox(b"%.mail\r\n").unwrap();
        assert_eq!(val.to_text(), "%.mail");

        let (_, val) = list_mailbox(b"\"\"\r\n").unwrap();
        assert_eq!(val.to_text(), "");
    }
}
