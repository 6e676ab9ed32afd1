//! `BODYSTRUCTURE` and `ENVELOPE` computation.
//!
//! Both are pure functions over a stored message: the body structure walks
//! the MIME tree of the raw bytes, the envelope digests the addressing
//! headers. Sizes and line counts describe the transfer-encoded body
//! octets as stored, not the decoded content.

use mailhouse_imap::body::{BasicFields, BodyStructure};
use mailhouse_imap::core::NString;
use mailhouse_imap::envelope::{Address, Envelope};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};

use crate::store::{split_message, Headers, Result, StoreError};

/// Compute the `BODYSTRUCTURE` of a raw RFC 5322 message.
pub fn body_structure(raw: &[u8]) -> Result<BodyStructure> {
    let parsed =
        mailparse::parse_mail(raw).map_err(|err| StoreError::BadMessage(err.to_string()))?;

    Ok(structure_of(&parsed))
}

fn structure_of(part: &ParsedMail) -> BodyStructure {
    let (r#type, subtype) = split_media_type(&part.ctype.mimetype);

    if part.subparts.is_empty() {
        let (_, body) = split_message(part.raw_bytes);
        let lines = body.iter().filter(|byte| **byte == b'\n').count() as u32;
        let is_text = r#type.eq_ignore_ascii_case("TEXT");

        BodyStructure::Single {
            fields: BasicFields {
                parameter_list: single_part_params(part),
                id: NString::from(part.headers.get_first_value("Content-ID").as_deref()),
                description: NString::from(
                    part.headers.get_first_value("Content-Description").as_deref(),
                ),
                content_transfer_encoding: part
                    .headers
                    .get_first_value("Content-Transfer-Encoding")
                    .map(|encoding| encoding.to_ascii_uppercase())
                    .unwrap_or_else(|| "7BIT".into()),
                size: body.len() as u32,
            },
            lines: is_text.then_some(lines),
            r#type,
            subtype,
        }
    } else {
        BodyStructure::Multi {
            bodies: part.subparts.iter().map(structure_of).collect(),
            subtype,
            parameter_list: part
                .ctype
                .params
                .iter()
                .map(|(key, value)| (key.to_ascii_uppercase(), value.clone()))
                .collect(),
        }
    }
}

/// Content-type parameters with `CHARSET` first, the way clients expect.
fn single_part_params(part: &ParsedMail) -> Vec<(String, String)> {
    let mut params = vec![("CHARSET".to_owned(), part.ctype.charset.to_ascii_uppercase())];

    for (key, value) in &part.ctype.params {
        if !key.eq_ignore_ascii_case("charset") {
            params.push((key.to_ascii_uppercase(), value.clone()));
        }
    }

    params
}

fn split_media_type(mimetype: &str) -> (String, String) {
    match mimetype.split_once('/') {
        Some((r#type, subtype)) => (r#type.to_ascii_uppercase(), subtype.to_ascii_uppercase()),
        None => (mimetype.to_ascii_uppercase(), String::new()),
    }
}

/// Build the `ENVELOPE` of a message from its stored headers.
///
/// `sender` and `reply-to` default to `from` when absent (RFC 3501 §7.4.2).
pub fn envelope_from(headers: &Headers) -> Envelope {
    let from = addresses_from(headers, "From");
    let sender = non_empty_or(addresses_from(headers, "Sender"), &from);
    let reply_to = non_empty_or(addresses_from(headers, "Reply-To"), &from);

    Envelope {
        date: NString::from(headers.get_first("Date")),
        subject: NString::from(headers.get_first("Subject")),
        to: addresses_from(headers, "To"),
        cc: addresses_from(headers, "Cc"),
        bcc: addresses_from(headers, "Bcc"),
        in_reply_to: NString::from(headers.get_first("In-Reply-To")),
        message_id: NString::from(headers.get_first("Message-ID")),
        from,
        sender,
        reply_to,
    }
}

fn non_empty_or(addresses: Vec<Address>, fallback: &[Address]) -> Vec<Address> {
    if addresses.is_empty() {
        fallback.to_vec()
    } else {
        addresses
    }
}

fn addresses_from(headers: &Headers, key: &str) -> Vec<Address> {
    let mut addresses = Vec::new();

    for value in headers.get_all(key) {
        let Ok(parsed) = mailparse::addrparse(value) else {
            // An unparseable address header degrades to NIL.
            continue;
        };

        for addr in parsed.iter() {
            match addr {
                MailAddr::Single(info) => addresses.push(address_of(info)),
                // Group syntax is flattened to its members.
                MailAddr::Group(group) => {
                    addresses.extend(group.addrs.iter().map(address_of));
                }
            }
        }
    }

    addresses
}

fn address_of(info: &mailparse::SingleInfo) -> Address {
    let (mailbox, host) = match info.addr.split_once('@') {
        Some((mailbox, host)) => (Some(mailbox), Some(host)),
        None => (Some(info.addr.as_str()), None),
    };

    Address {
        name: NString::from(info.display_name.as_deref()),
        adl: NString::NIL,
        mailbox: NString::from(mailbox),
        host: NString::from(host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_structure() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\n\r\nhello\r\n";
        let structure = body_structure(raw).unwrap();

        match structure {
            BodyStructure::Single {
                r#type,
                subtype,
                fields,
                lines,
            } => {
                assert_eq!(r#type, "TEXT");
                assert_eq!(subtype, "PLAIN");
                assert_eq!(fields.size, 7);
                assert_eq!(lines, Some(1));
                assert_eq!(fields.content_transfer_encoding, "7BIT");
                assert_eq!(fields.parameter_list[0].0, "CHARSET");
                assert_eq!(fields.parameter_list[0].1, "UTF-8");
            }
            other => panic!("expected single part, got {other:?}"),
        }
    }

    #[test]
    fn test_multipart_structure() {
        let raw = b"Content-Type: multipart/alternative; boundary=xyz\r\n\
            \r\n\
            --xyz\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            plain body\r\n\
            --xyz\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <p>html body</p>\r\n\
            --xyz--\r\n";

        match body_structure(raw).unwrap() {
            BodyStructure::Multi {
                bodies,
                subtype,
                parameter_list,
            } => {
                assert_eq!(bodies.len(), 2);
                assert_eq!(subtype, "ALTERNATIVE");
                assert!(parameter_list
                    .iter()
                    .any(|(key, value)| key == "BOUNDARY" && value == "xyz"));
                assert!(matches!(
                    &bodies[1],
                    BodyStructure::Single { subtype, .. } if subtype == "HTML"
                ));
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope() {
        let raw = b"Date: Wed, 1 Feb 2023 09:05:00 +0200\r\n\
            Subject: hi\r\n\
            From: Bob Example <bob@example.com>\r\n\
            To: alice@example.com, Carol <carol@example.org>\r\n\
            Message-ID: <1@example.com>\r\n\
            \r\n\
            body\r\n";

        let headers = Headers::parse(raw).unwrap();
        let envelope = envelope_from(&headers);

        assert_eq!(envelope.subject, NString::from("hi"));
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(envelope.from[0].name, NString::from("Bob Example"));
        assert_eq!(envelope.from[0].mailbox, NString::from("bob"));
        assert_eq!(envelope.from[0].host, NString::from("example.com"));
        assert_eq!(envelope.to.len(), 2);

        // Absent sender falls back to from.
        assert_eq!(envelope.sender, envelope.from);
        assert_eq!(envelope.message_id, NString::from("<1@example.com>"));
    }
}
