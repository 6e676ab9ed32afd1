//! Framing support for [`tokio_util::codec`]-based transports.

use thiserror::Error;

pub mod server;

/// All interactions transmitted by client and server are in the form of
/// lines, that is, strings that end with a CRLF.
///
/// The protocol receiver of an IMAP4rev1 server is either ...
#[derive(Clone, Debug, Eq, PartialEq)]
enum FramingState {
    /// ... reading a line, or ...
    ReadLine { to_consume_acc: usize },
    /// ... reading a sequence of octets with a known count followed by a
    /// line, or ...
    ReadLiteral { to_consume_acc: usize, length: u32 },
    /// ... reading the one base64 line a client sends after an
    /// `AUTHENTICATE` continuation request.
    ReadAuthData { to_consume_acc: usize },
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FramingError {
    #[error("Expected `\\r\\n`, got `\\n`")]
    NotCrLf,
    #[error("Could not find a line searching a maximum of {max_line_length} bytes")]
    LineTooLarge { max_line_length: usize },
}

/// Skip the first `skip` bytes of `buf` and count how many more bytes are
/// needed to cover the next `\r\n`.
///
/// Returns `None` when no line was found, `Some(Ok(length))` with
/// `buf[..skip + length]` being the first line (including `\r\n`), or
/// `Some(Err(length))` with `buf[..skip + length]` being the first line
/// (including `\n`) with a missing `\r`.
fn find_crlf_inclusive(skip: usize, buf: &[u8]) -> Option<Result<usize, usize>> {
    match buf.iter().skip(skip).position(|item| *item == b'\n') {
        Some(position) => {
            if buf[skip + position.saturating_sub(1)] == b'\r' {
                Some(Ok(position + 1))
            } else {
                Some(Err(position + 1))
            }
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_crlf_inclusive() {
        let tests = [
            (b"A\r".as_ref(), 0, None),
            (b"A\r\n", 0, Some(Ok(3))),
            (b"A\n", 0, Some(Err(2))),
            (b"\n", 0, Some(Err(1))),
            (b"aaa\r\nA\r".as_ref(), 5, None),
            (b"aaa\r\nA\r\n", 5, Some(Ok(3))),
            (b"aaa\r\nA\n", 5, Some(Err(2))),
            (b"aaa\r\n\n", 5, Some(Err(1))),
        ];

        for (test, skip, expected) in tests {
            let got = find_crlf_inclusive(skip, test);
            assert_eq!(expected, got);
        }
    }
}
