//! Core scalar parsers: numbers, atoms, strings, literals, tags.

use std::num::NonZeroU32;
use std::str::from_utf8;

use abnf_core::streaming::{crlf, dquote};
use abnf_core::{is_alpha, is_digit};
use nom::branch::alt;
use nom::bytes::streaming::{escaped, tag, tag_no_case, take, take_while, take_while1};
use nom::character::streaming::{digit1, one_of};
use nom::combinator::{map, map_res, opt, recognize};
use nom::sequence::{delimited, terminated, tuple};

use crate::codec::decode::{IMAPErrorKind, IMAPParseError, IMAPResult};
use crate::core::{
    is_astring_char, is_atom_char, is_quoted_specials, is_tag_char, is_text_char, unescape_quoted,
    AString, Atom, IString, Literal, NString, Quoted, Tag,
};

// ----- number -----

/// `number = 1*DIGIT`
///
/// Unsigned 32-bit integer (0 <= n < 4,294,967,296)
pub(crate) fn number(input: &[u8]) -> IMAPResult<u32> {
    map_res(
        // `unwrap` is safe because `1*DIGIT` is ASCII-only.
        map(digit1, |val| from_utf8(val).unwrap()),
        str::parse::<u32>,
    )(input)
}

/// `nz-number = digit-nz *DIGIT`
///
/// Non-zero unsigned 32-bit integer (0 < n < 4,294,967,296)
pub(crate) fn nz_number(input: &[u8]) -> IMAPResult<NonZeroU32> {
    map_res(number, NonZeroU32::try_from)(input)
}

// ----- string -----

/// `string = quoted / literal`
pub(crate) fn string(input: &[u8]) -> IMAPResult<IString> {
    alt((map(quoted, IString::Quoted), map(literal, IString::Literal)))(input)
}

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`
pub(crate) fn quoted(input: &[u8]) -> IMAPResult<Quoted> {
    let mut parser = tuple((
        dquote,
        map(
            escaped(
                take_while1(is_any_text_char_except_quoted_specials),
                '\\',
                one_of("\\\""),
            ),
            // `unwrap` is safe because the matched bytes are ASCII-only.
            |val| from_utf8(val).unwrap(),
        ),
        dquote,
    ));

    let (remaining, (_, quoted, _)) = parser(input)?;

    Ok((remaining, Quoted::unvalidated(unescape_quoted(quoted))))
}

pub(crate) fn is_any_text_char_except_quoted_specials(byte: u8) -> bool {
    is_text_char(byte) && !is_quoted_specials(byte)
}

/// `literal = "{" number "}" CRLF *CHAR8`
///
/// When the input ends right after `{n}CRLF`, parsing fails with
/// [`IMAPErrorKind::Literal`] so the framing layer can send a continuation
/// request and wait for the declared octets.
pub(crate) fn literal(input: &[u8]) -> IMAPResult<Literal> {
    let (remaining, length) =
        terminated(delimited(tag(b"{"), number, tag(b"}")), crlf)(input)?;

    // Note: this doesn't trigger when data follows the literal prefix.
    if remaining.is_empty() {
        return Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::Literal {
                // The tag is filled in by the `command` parser.
                tag: None,
                length,
            },
        }));
    }

    let (remaining, data) = take(length)(remaining)?;

    match Literal::try_from(data) {
        Ok(literal) => Ok((remaining, literal)),
        Err(_) => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::LiteralContainsNull,
        })),
    }
}

// ----- astring / atom -----

/// `astring = 1*ASTRING-CHAR / string`
pub(crate) fn astring(input: &[u8]) -> IMAPResult<AString> {
    alt((
        map(take_while1(is_astring_char), |bytes: &[u8]| {
            // `unwrap` is safe because `is_astring_char` admits ASCII only.
            AString::Atom(Atom::unvalidated(from_utf8(bytes).unwrap()))
        }),
        map(string, AString::String),
    ))(input)
}

/// `atom = 1*ATOM-CHAR`
pub(crate) fn atom(input: &[u8]) -> IMAPResult<Atom> {
    let (remaining, parsed) = take_while1(is_atom_char)(input)?;

    // `unwrap` is safe because `is_atom_char` admits ASCII only.
    Ok((remaining, Atom::unvalidated(from_utf8(parsed).unwrap())))
}

// ----- nstring -----

/// `nstring = string / nil`
#[allow(dead_code)]
pub(crate) fn nstring(input: &[u8]) -> IMAPResult<NString> {
    alt((
        map(string, |item| NString(Some(item))),
        map(nil, |_| NString(None)),
    ))(input)
}

#[inline]
/// `nil = "NIL"`
pub(crate) fn nil(input: &[u8]) -> IMAPResult<&[u8]> {
    tag_no_case(b"NIL")(input)
}

// ----- text -----

/// `text = 1*TEXT-CHAR`
pub(crate) fn text(input: &[u8]) -> IMAPResult<&[u8]> {
    take_while1(is_text_char)(input)
}

// ----- base64 -----

/// `base64 = *(4base64-char) [base64-terminal]`
pub(crate) fn base64(input: &[u8]) -> IMAPResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    map_res(
        recognize(tuple((
            take_while(is_base64_char),
            opt(alt((tag("=="), tag("=")))),
        ))),
        |input| STANDARD.decode(input),
    )(input)
}

/// `base64-char = ALPHA / DIGIT / "+" / "/" ; Case-sensitive`
pub(crate) fn is_base64_char(i: u8) -> bool {
    is_alpha(i) || is_digit(i) || i == b'+' || i == b'/'
}

// ----- charset -----

/// `charset = atom / quoted`
pub(crate) fn charset(input: &[u8]) -> IMAPResult<String> {
    alt((
        map(atom, |atom| atom.as_str().to_owned()),
        map(quoted, |quoted| quoted.as_str().to_owned()),
    ))(input)
}

// ----- tag -----

/// `tag = 1*<any ASTRING-CHAR except "+">`
pub(crate) fn tag_imap(input: &[u8]) -> IMAPResult<Tag> {
    map(take_while1(is_tag_char), |val| {
        // `unwrap` is safe because `is_tag_char` admits ASCII only.
        Tag::unvalidated(from_utf8(val).unwrap())
    })(input)
}
