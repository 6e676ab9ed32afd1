//! Decoding of client messages.
//!
//! IMAP literals make separating parsing from transport awkward: when the
//! parser reaches `{n}` at the end of the buffered input, the server must
//! send a `+` continuation request before the client will transmit the
//! declared octets. The parser signals this with
//! [`CommandDecodeError::LiteralFound`]; the framing layer in
//! [`crate::tokio`] reacts and re-parses once the octets arrived.

use std::num::{ParseIntError, TryFromIntError};

use nom::error::{ErrorKind, FromExternalError, ParseError};

use crate::auth::AuthenticateData;
use crate::command::Command;
use crate::core::Tag;
use crate::rfc3501::command::{authenticate_data, command};
use crate::rfc3501::core::tag_imap;

/// An extended version of [`nom::IResult`].
pub(crate) type IMAPResult<'a, O> = Result<(&'a [u8], O), nom::Err<IMAPParseError<'a>>>;

/// An extended version of [`nom::error::Error`].
#[derive(Debug)]
pub(crate) struct IMAPParseError<'a> {
    pub input: &'a [u8],
    pub kind: IMAPErrorKind,
}

/// An extended version of [`nom::error::ErrorKind`].
#[derive(Debug)]
pub(crate) enum IMAPErrorKind {
    Literal {
        /// Filled in by the `command` parser; literal parsers deeper in the
        /// grammar don't know the tag.
        tag: Option<Tag>,
        length: u32,
    },
    BadNumber,
    BadBase64,
    BadDateTime,
    LiteralContainsNull,
    RecursionLimitExceeded,
    Nom(ErrorKind),
}

impl IMAPErrorKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::Literal { .. } => "unexpected literal",
            Self::BadNumber => "expected number",
            Self::BadBase64 => "expected base64",
            Self::BadDateTime => "expected date-time",
            Self::LiteralContainsNull => "literal contains NUL",
            Self::RecursionLimitExceeded => "expression nested too deeply",
            Self::Nom(_) => "syntax error",
        }
    }
}

impl<'a> ParseError<&'a [u8]> for IMAPParseError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::Nom(kind),
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, _: Self) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::Nom(kind),
        }
    }
}

impl<'a> FromExternalError<&'a [u8], ParseIntError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: ParseIntError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadNumber,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], TryFromIntError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: TryFromIntError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadNumber,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], base64::DecodeError> for IMAPParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: base64::DecodeError) -> Self {
        Self {
            input,
            kind: IMAPErrorKind::BadBase64,
        }
    }
}

/// Decoder.
///
/// Implemented for types that know how to decode a specific IMAP message.
pub trait Decoder {
    type Message;
    type Error;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Self::Message), Self::Error>;
}

/// Error during command decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandDecodeError {
    /// More data is needed.
    Incomplete,

    /// The decoder stopped at the beginning of literal data. The server
    /// must send a continuation request (or refuse the literal) before
    /// more data will arrive.
    LiteralFound {
        /// The tag of the command the literal belongs to, so a refusal can
        /// still be correlated.
        tag: Tag,
        length: u32,
    },

    /// Decoding failed.
    Failed {
        /// The client's tag when one was parseable, for the `BAD` reply.
        tag: Option<Tag>,
        message: String,
        /// Byte offset into the input where parsing gave up.
        offset: usize,
    },
}

/// Error during authenticate-data line decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthenticateDataDecodeError {
    Incomplete,
    Failed,
}

/// Decoder for complete command lines (literal octets already present).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandCodec;

impl Decoder for CommandCodec {
    type Message = Command;
    type Error = CommandDecodeError;

    fn decode<'a>(&self, input: &'a [u8]) -> Result<(&'a [u8], Command), CommandDecodeError> {
        match command(input) {
            Ok((rem, cmd)) => Ok((rem, cmd)),
            Err(nom::Err::Incomplete(_)) => Err(CommandDecodeError::Incomplete),
            Err(nom::Err::Failure(error)) => match error.kind {
                IMAPErrorKind::Literal {
                    tag: Some(tag),
                    length,
                } => Err(CommandDecodeError::LiteralFound { tag, length }),
                kind => Err(failed(input, error.input, &kind)),
            },
            Err(nom::Err::Error(error)) => Err(failed(input, error.input, &error.kind)),
        }
    }
}

fn failed(input: &[u8], at: &[u8], kind: &IMAPErrorKind) -> CommandDecodeError {
    CommandDecodeError::Failed {
        tag: recover_tag(input),
        message: kind.describe().into(),
        offset: input.len().saturating_sub(at.len()),
    }
}

/// Best-effort recovery of the client tag from a line that failed to
/// parse, so the `BAD` reply can be correlated (falls back to `*`).
fn recover_tag(input: &[u8]) -> Option<Tag> {
    match tag_imap(input) {
        Ok((rem, tag)) if rem.first() == Some(&b' ') => Some(tag),
        _ => None,
    }
}

/// Decoder for the line following an `AUTHENTICATE` continuation request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthenticateDataCodec;

impl Decoder for AuthenticateDataCodec {
    type Message = AuthenticateData;
    type Error = AuthenticateDataDecodeError;

    fn decode<'a>(
        &self,
        input: &'a [u8],
    ) -> Result<(&'a [u8], AuthenticateData), AuthenticateDataDecodeError> {
        match authenticate_data(input) {
            Ok((rem, data)) => Ok((rem, data)),
            Err(nom::Err::Incomplete(_)) => Err(AuthenticateDataDecodeError::Incomplete),
            Err(nom::Err::Failure(_)) | Err(nom::Err::Error(_)) => {
                Err(AuthenticateDataDecodeError::Failed)
            }
        }
    }
}

// ----- Diagnostics -----

const LOWERHEX: &[u8; 16] = b"0123456789abcdef";

/// Render a failed line for the log: the line with control bytes escaped,
/// and a caret under the byte where parsing gave up.
///
/// ```text
/// a1 fetch ? (flags)\r\n
///          ^
/// ```
pub fn render_diagnostic(line: &[u8], offset: usize) -> String {
    let mut quoted = String::new();
    let mut caret = 0;

    for (i, byte) in line.iter().enumerate() {
        let escaped = escape_byte(*byte);
        if i < offset {
            caret += escaped.len();
        }
        quoted.push_str(&escaped);
    }

    format!("{}\n{}^", quoted, " ".repeat(caret))
}

fn escape_byte(byte: u8) -> String {
    match byte {
        b'\r' => "\\r".into(),
        b'\n' => "\\n".into(),
        b'\t' => "\\t".into(),
        0x20..=0x7e => (byte as char).to_string(),
        _ => {
            let mut out = String::from("\\x");
            out.push(LOWERHEX[(byte >> 4) as usize] as char);
            out.push(LOWERHEX[(byte & 0xf) as usize] as char);
            out
        }
    }
}
