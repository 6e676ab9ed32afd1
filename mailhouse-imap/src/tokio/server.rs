//! A [`tokio_util::codec`] codec for the server side of a connection.
//!
//! The codec owns the framing state machine: it scans for CRLF-terminated
//! lines, counts literal octets after the parser announced `{n}`, and
//! (when told so by the session) decodes the base64 line that follows an
//! `AUTHENTICATE` continuation request. Whenever a literal is announced
//! the codec emits an [`Action`] so the caller can send the continuation
//! request -- or refuse the literal while the stream is still in sync.

use std::io::{Error as IoError, Write};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::{find_crlf_inclusive, FramingError, FramingState};
use crate::auth::AuthenticateData;
use crate::codec::decode::{
    render_diagnostic, AuthenticateDataCodec, AuthenticateDataDecodeError, CommandCodec,
    CommandDecodeError, Decoder as ImapDecoder,
};
use crate::codec::encode::Encoder as ImapEncoder;
use crate::codec::encode::{GreetingCodec, ResponseCodec};
use crate::command::Command;
use crate::core::Tag;
use crate::response::{Greeting, Response};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImapServerCodec {
    state: FramingState,
    max_literal_size: usize,
    max_line_length: usize,
}

impl ImapServerCodec {
    pub fn new(max_literal_size: usize) -> Self {
        Self {
            state: FramingState::ReadLine { to_consume_acc: 0 },
            max_literal_size,
            max_line_length: 8 * 1024,
        }
    }

    /// Switch the decoder to expect the client's reply to an
    /// `AUTHENTICATE` continuation request. Resets itself after one line.
    pub fn expect_authenticate_data(&mut self) {
        self.state = FramingState::ReadAuthData { to_consume_acc: 0 };
    }
}

#[derive(Debug, Error)]
pub enum ImapServerCodecError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("Parsing failed: {message}")]
    ParsingFailed {
        /// The client tag when one was parseable, for the `BAD` reply.
        tag: Option<Tag>,
        message: String,
        /// The offending line with a caret under the failure position.
        diagnostic: String,
    },
    #[error("Parsing authenticate data failed")]
    AuthenticateDataFailed,
}

impl PartialEq for ImapServerCodecError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(error1), Self::Io(error2)) => error1.kind() == error2.kind(),
            (Self::Framing(kind1), Self::Framing(kind2)) => kind1 == kind2,
            (
                Self::ParsingFailed { tag: tag1, .. },
                Self::ParsingFailed { tag: tag2, .. },
            ) => tag1 == tag2,
            (Self::AuthenticateDataFailed, Self::AuthenticateDataFailed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum Event {
    Command(Command),
    AuthenticateData(AuthenticateData),
    ActionRequired(Action),
}

#[derive(Debug, Eq, PartialEq)]
pub enum Action {
    /// Send a continuation request; the client will transmit the literal.
    SendLiteralAck(u32),
    /// The literal exceeds the configured maximum. Answering `NO`/`BAD`
    /// instead of a continuation request keeps the stream in sync: a
    /// client may not send literal octets it was never invited to send.
    SendLiteralReject { tag: Tag, length: u32 },
}

impl Decoder for ImapServerCodec {
    type Item = Event;
    type Error = ImapServerCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                FramingState::ReadLine {
                    ref mut to_consume_acc,
                } => match find_crlf_inclusive(*to_consume_acc, src) {
                    Some(Ok(to_consume)) => {
                        *to_consume_acc += to_consume;
                        let line = &src[..*to_consume_acc];

                        match CommandCodec.decode(line) {
                            Ok((rem, cmd)) => {
                                debug_assert!(rem.is_empty());

                                src.advance(*to_consume_acc);
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                return Ok(Some(Event::Command(cmd)));
                            }
                            // A line that doesn't end with a literal prefix
                            // is always complete in IMAP.
                            Err(CommandDecodeError::Incomplete) => unreachable!(),
                            Err(CommandDecodeError::LiteralFound { tag, length }) => {
                                if length as usize <= self.max_literal_size {
                                    src.reserve(length as usize);

                                    self.state = FramingState::ReadLiteral {
                                        to_consume_acc: *to_consume_acc,
                                        length,
                                    };

                                    return Ok(Some(Event::ActionRequired(
                                        Action::SendLiteralAck(length),
                                    )));
                                } else {
                                    src.advance(*to_consume_acc);
                                    self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                    return Ok(Some(Event::ActionRequired(
                                        Action::SendLiteralReject { tag, length },
                                    )));
                                }
                            }
                            Err(CommandDecodeError::Failed {
                                tag,
                                message,
                                offset,
                            }) => {
                                let diagnostic = render_diagnostic(line, offset);
                                log::debug!("command parse failed:\n{diagnostic}");

                                src.advance(*to_consume_acc);
                                self.state = FramingState::ReadLine { to_consume_acc: 0 };

                                return Err(ImapServerCodecError::ParsingFailed {
                                    tag,
                                    message,
                                    diagnostic,
                                });
                            }
                        }
                    }
                    // This line is missing the `\r` and is discarded.
                    Some(Err(to_discard)) => {
                        src.advance(*to_consume_acc + to_discard);
                        self.state = FramingState::ReadLine { to_consume_acc: 0 };

                        return Err(ImapServerCodecError::Framing(FramingError::NotCrLf));
                    }
                    // More data needed.
                    None => {
                        if src.len() - *to_consume_acc > self.max_line_length {
                            return Err(ImapServerCodecError::Framing(
                                FramingError::LineTooLarge {
                                    max_line_length: self.max_line_length,
                                },
                            ));
                        }

                        return Ok(None);
                    }
                },
                FramingState::ReadLiteral {
                    to_consume_acc,
                    length,
                } => {
                    if to_consume_acc + length as usize <= src.len() {
                        self.state = FramingState::ReadLine {
                            to_consume_acc: to_consume_acc + length as usize,
                        }
                    } else {
                        return Ok(None);
                    }
                }
                FramingState::ReadAuthData {
                    ref mut to_consume_acc,
                } => match find_crlf_inclusive(*to_consume_acc, src) {
                    Some(Ok(to_consume)) => {
                        *to_consume_acc += to_consume;
                        let line = &src[..*to_consume_acc];

                        let decoded = AuthenticateDataCodec.decode(line).map(|(_, data)| data);

                        src.advance(*to_consume_acc);
                        self.state = FramingState::ReadLine { to_consume_acc: 0 };

                        return match decoded {
                            Ok(data) => Ok(Some(Event::AuthenticateData(data))),
                            Err(AuthenticateDataDecodeError::Incomplete) => unreachable!(),
                            Err(AuthenticateDataDecodeError::Failed) => {
                                Err(ImapServerCodecError::AuthenticateDataFailed)
                            }
                        };
                    }
                    Some(Err(to_discard)) => {
                        src.advance(*to_consume_acc + to_discard);
                        self.state = FramingState::ReadLine { to_consume_acc: 0 };

                        return Err(ImapServerCodecError::Framing(FramingError::NotCrLf));
                    }
                    None => return Ok(None),
                },
            }
        }
    }
}

impl Encoder<&Greeting> for ImapServerCodec {
    type Error = IoError;

    fn encode(&mut self, item: &Greeting, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = GreetingCodec.encode(item).dump();
        dst.writer().write_all(&data)
    }
}

impl Encoder<&Response> for ImapServerCodec {
    type Error = IoError;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = ResponseCodec.encode(item).dump();
        dst.writer().write_all(&data)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use pretty_assertions::assert_eq;
    use tokio_util::codec::Decoder;

    use super::*;
    use crate::command::CommandBody;

    #[test]
    fn test_decode_command_in_pieces() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a noo");
        assert_eq!(codec.decode(&mut src).unwrap(), None);

        src.extend_from_slice(b"p\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::Command(Command::new(
                Tag::try_from("a").unwrap(),
                CommandBody::Noop
            )))
        );
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn test_decode_command_with_literal() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a login {3}\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::ActionRequired(Action::SendLiteralAck(3)))
        );

        src.extend_from_slice(b"bob {6}\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::ActionRequired(Action::SendLiteralAck(6)))
        );

        src.extend_from_slice(b"s3cret\r\n");
        match codec.decode(&mut src).unwrap() {
            Some(Event::Command(Command {
                tag,
                body: CommandBody::Login { username, password },
            })) => {
                assert_eq!(tag, Tag::try_from("a").unwrap());
                assert_eq!(username.as_bytes(), b"bob");
                assert_eq!(password.as_bytes(), b"s3cret");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_oversized_literal() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a append work {2048}\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::ActionRequired(Action::SendLiteralReject {
                tag: Tag::try_from("a").unwrap(),
                length: 2048,
            }))
        );

        // The stream is aligned on a command boundary again.
        src.extend_from_slice(b"a2 noop\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::Command(Command::new(
                Tag::try_from("a2").unwrap(),
                CommandBody::Noop
            )))
        );
    }

    #[test]
    fn test_decode_authenticate_data_mode() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        codec.expect_authenticate_data();
        src.extend_from_slice(b"AGJvYgBzM2NyZXQ=\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::AuthenticateData(AuthenticateData::Continue(
                b"\0bob\0s3cret".to_vec()
            )))
        );

        // Back to command mode afterwards.
        src.extend_from_slice(b"a noop\r\n");
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(Event::Command(Command::new(
                Tag::try_from("a").unwrap(),
                CommandBody::Noop
            )))
        );
    }

    #[test]
    fn test_decode_parse_error_keeps_tag() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a1 (\r\n");
        match codec.decode(&mut src) {
            Err(ImapServerCodecError::ParsingFailed { tag, .. }) => {
                assert_eq!(tag, Some(Tag::try_from("a1").unwrap()));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_bare_lf_is_rejected() {
        let mut codec = ImapServerCodec::new(1024);
        let mut src = BytesMut::new();

        src.extend_from_slice(b"a noop\n");
        assert_eq!(
            codec.decode(&mut src),
            Err(ImapServerCodecError::Framing(FramingError::NotCrLf))
        );
    }
}
