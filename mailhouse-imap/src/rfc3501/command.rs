//! Top-level command parser.
//!
//! `command = tag SP (command-any / command-auth / command-nonauth /
//!                    command-select) CRLF`
//!
//! A syntactically well-formed line whose keyword is not recognised parses
//! to [`CommandBody::Unknown`] so the reply can still carry the tag.

use abnf_core::streaming::{crlf, sp};
use nom::branch::alt;
use nom::bytes::streaming::{tag, tag_no_case, take_while};
use nom::combinator::{map, opt, value};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{delimited, preceded, terminated, tuple};

use crate::auth::{AuthenticateData, AuthMechanism};
use crate::codec::decode::{IMAPErrorKind, IMAPResult};
use crate::command::{Command, CommandBody};
use crate::core::{is_text_char, AString};
use crate::fetch::{Macro, MacroOrMessageDataItemNames};
use crate::flag::{StoreResponse, StoreType};
use crate::rfc3501::core::{astring, atom, base64, literal, tag_imap};
use crate::rfc3501::datetime::date_time;
use crate::rfc3501::fetch::fetch_att;
use crate::rfc3501::flag::{flag, flag_list};
use crate::rfc3501::mailbox::{list_mailbox, mailbox};
use crate::rfc3501::search::search;
use crate::rfc3501::sequence::sequence_set;
use crate::rfc3501::status::status_att;

pub(crate) fn command(input: &[u8]) -> IMAPResult<Command> {
    let mut parser_tag = terminated(tag_imap, sp);
    let mut parser_body = terminated(
        alt((
            command_any,
            command_auth,
            command_nonauth,
            command_select,
            command_unknown,
        )),
        crlf,
    );

    let (remaining, obtained_tag) = parser_tag(input)?;

    match parser_body(remaining) {
        Ok((remaining, body)) => Ok((
            remaining,
            Command {
                tag: obtained_tag,
                body,
            },
        )),
        Err(mut error) => {
            // Literal errors originate below the tag; fill it in so the
            // framing layer can correlate its continuation handling.
            if let nom::Err::Error(ref mut err) | nom::Err::Failure(ref mut err) = error {
                if let IMAPErrorKind::Literal { ref mut tag, .. } = err.kind {
                    *tag = Some(obtained_tag);
                }
            }

            Err(error)
        }
    }
}

// # Command Any

/// `command-any = "CAPABILITY" / "LOGOUT" / "NOOP"`
///
/// Valid in all states.
fn command_any(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        value(CommandBody::Capability, tag_no_case(b"CAPABILITY")),
        value(CommandBody::Logout, tag_no_case(b"LOGOUT")),
        value(CommandBody::Noop, tag_no_case(b"NOOP")),
    ))(input)
}

// # Command Auth

/// `command-auth = append / create / delete / examine / list / lsub /
///                 rename / select / status / subscribe / unsubscribe`
///
/// Valid only in Authenticated or Selected state.
fn command_auth(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        append,
        create,
        delete,
        examine,
        list,
        lsub,
        rename,
        select,
        status,
        subscribe,
        unsubscribe,
    ))(input)
}

/// `append = "APPEND" SP mailbox [SP flag-list] [SP date-time] SP literal`
fn append(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"APPEND"),
        sp,
        mailbox,
        opt(preceded(sp, flag_list)),
        opt(preceded(sp, date_time)),
        sp,
        literal,
    ));

    let (remaining, (_, _, mailbox, flags, date, _, message)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Append {
            mailbox,
            flags: flags.unwrap_or_default(),
            date,
            message,
        },
    ))
}

/// `create = "CREATE" SP mailbox`
fn create(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"CREATE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Create { mailbox }))
}

/// `delete = "DELETE" SP mailbox`
fn delete(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"DELETE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Delete { mailbox }))
}

/// `examine = "EXAMINE" SP mailbox`
fn examine(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"EXAMINE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Examine { mailbox }))
}

/// `list = "LIST" SP mailbox SP list-mailbox`
fn list(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LIST"), sp, mailbox, sp, list_mailbox));

    let (remaining, (_, _, reference, _, mailbox_wildcard)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::List {
            reference,
            mailbox_wildcard,
        },
    ))
}

/// `lsub = "LSUB" SP mailbox SP list-mailbox`
fn lsub(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LSUB"), sp, mailbox, sp, list_mailbox));

    let (remaining, (_, _, reference, _, mailbox_wildcard)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Lsub {
            reference,
            mailbox_wildcard,
        },
    ))
}

/// `rename = "RENAME" SP mailbox SP mailbox`
fn rename(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"RENAME"), sp, mailbox, sp, mailbox));

    let (remaining, (_, _, from, _, to)) = parser(input)?;

    Ok((remaining, CommandBody::Rename { from, to }))
}

/// `select = "SELECT" SP mailbox`
fn select(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"SELECT"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Select { mailbox }))
}

/// `status = "STATUS" SP mailbox SP "(" status-att *(SP status-att) ")"`
fn status(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"STATUS"),
        sp,
        mailbox,
        sp,
        delimited(tag(b"("), separated_list0(sp, status_att), tag(b")")),
    ));

    let (remaining, (_, _, mailbox, _, items)) = parser(input)?;

    Ok((remaining, CommandBody::Status { mailbox, items }))
}

/// `subscribe = "SUBSCRIBE" SP mailbox`
fn subscribe(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"SUBSCRIBE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Subscribe { mailbox }))
}

/// `unsubscribe = "UNSUBSCRIBE" SP mailbox`
fn unsubscribe(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"UNSUBSCRIBE"), sp, mailbox));

    let (remaining, (_, _, mailbox)) = parser(input)?;

    Ok((remaining, CommandBody::Unsubscribe { mailbox }))
}

// # Command NonAuth

/// `command-nonauth = login / authenticate / "STARTTLS"`
///
/// Valid only in Not Authenticated state.
fn command_nonauth(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        login,
        authenticate,
        value(CommandBody::StartTls, tag_no_case(b"STARTTLS")),
    ))(input)
}

/// `login = "LOGIN" SP userid SP password`
fn login(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"LOGIN"), sp, userid, sp, password));

    let (remaining, (_, _, username, _, password)) = parser(input)?;

    Ok((remaining, CommandBody::Login { username, password }))
}

#[inline]
/// `userid = astring`
fn userid(input: &[u8]) -> IMAPResult<AString> {
    astring(input)
}

#[inline]
/// `password = astring`
fn password(input: &[u8]) -> IMAPResult<AString> {
    astring(input)
}

/// `authenticate = "AUTHENTICATE" SP auth-type [SP (base64 / "=")]`
///
/// The optional initial response is the SASL-IR extension; without it the
/// server answers with a continuation request and the client's reply is
/// parsed by [`authenticate_data`].
fn authenticate(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"AUTHENTICATE"),
        sp,
        map(atom, AuthMechanism::from),
        opt(preceded(
            sp,
            alt((map(base64, Some), value(Some(Vec::new()), tag(b"=")))),
        )),
    ));

    let (remaining, (_, _, mechanism, initial_response)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Authenticate {
            mechanism,
            initial_response: initial_response.flatten(),
        },
    ))
}

/// The line following the server's `+` continuation during `AUTHENTICATE`:
/// `base64 CRLF`, or `"*" CRLF` to cancel.
pub(crate) fn authenticate_data(input: &[u8]) -> IMAPResult<AuthenticateData> {
    terminated(
        alt((
            value(AuthenticateData::Cancel, tag(b"*")),
            map(base64, AuthenticateData::Continue),
        )),
        crlf,
    )(input)
}

// # Command Select

/// `command-select = "CHECK" / "CLOSE" / "EXPUNGE" /
///                   copy / fetch / store / uid / search`
///
/// Valid only in Selected state.
fn command_select(input: &[u8]) -> IMAPResult<CommandBody> {
    alt((
        value(CommandBody::Check, tag_no_case(b"CHECK")),
        value(CommandBody::Close, tag_no_case(b"CLOSE")),
        value(CommandBody::Expunge, tag_no_case(b"EXPUNGE")),
        copy,
        fetch,
        store,
        uid,
        search,
    ))(input)
}

/// `copy = "COPY" SP sequence-set SP mailbox`
fn copy(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"COPY"), sp, sequence_set, sp, mailbox));

    let (remaining, (_, _, sequence_set, _, mailbox)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Copy {
            sequence_set,
            mailbox,
            uid: false,
        },
    ))
}

/// `fetch = "FETCH" SP sequence-set SP ("ALL" / "FULL" / "FAST" /
///                                      fetch-att / "(" fetch-att *(SP fetch-att) ")")`
fn fetch(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((
        tag_no_case(b"FETCH"),
        sp,
        sequence_set,
        sp,
        alt((
            value(
                MacroOrMessageDataItemNames::Macro(Macro::All),
                tag_no_case(b"ALL"),
            ),
            value(
                MacroOrMessageDataItemNames::Macro(Macro::Fast),
                tag_no_case(b"FAST"),
            ),
            value(
                MacroOrMessageDataItemNames::Macro(Macro::Full),
                tag_no_case(b"FULL"),
            ),
            map(fetch_att, |attr| {
                MacroOrMessageDataItemNames::MessageDataItemNames(vec![attr])
            }),
            map(
                delimited(tag(b"("), separated_list0(sp, fetch_att), tag(b")")),
                MacroOrMessageDataItemNames::MessageDataItemNames,
            ),
        )),
    ));

    let (remaining, (_, _, sequence_set, _, attributes)) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Fetch {
            sequence_set,
            attributes,
            uid: false,
        },
    ))
}

/// `store = "STORE" SP sequence-set SP store-att-flags`
fn store(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"STORE"), sp, sequence_set, sp, store_att_flags));

    let (remaining, (_, _, sequence_set, _, (kind, response, flags))) = parser(input)?;

    Ok((
        remaining,
        CommandBody::Store {
            sequence_set,
            kind,
            response,
            flags,
            uid: false,
        },
    ))
}

/// `store-att-flags = (["+" / "-"] "FLAGS" [".SILENT"]) SP
///                    (flag-list / (flag *(SP flag)))`
fn store_att_flags(input: &[u8]) -> IMAPResult<(StoreType, StoreResponse, Vec<crate::flag::Flag>)> {
    let mut parser = tuple((
        tuple((
            map(
                opt(alt((
                    value(StoreType::Add, tag(b"+")),
                    value(StoreType::Remove, tag(b"-")),
                ))),
                |kind| kind.unwrap_or(StoreType::Replace),
            ),
            tag_no_case(b"FLAGS"),
            map(opt(tag_no_case(b".SILENT")), |silent| match silent {
                Some(_) => StoreResponse::Silent,
                None => StoreResponse::Answer,
            }),
        )),
        sp,
        alt((flag_list, separated_list1(sp, flag))),
    ));

    let (remaining, ((kind, _, response), _, flags)) = parser(input)?;

    Ok((remaining, (kind, response, flags)))
}

/// `uid = "UID" SP (copy / fetch / search / store)`
///
/// Unique identifiers are used instead of message sequence numbers.
fn uid(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((tag_no_case(b"UID"), sp, alt((copy, fetch, search, store))));

    let (remaining, (_, _, mut cmd)) = parser(input)?;

    match cmd {
        CommandBody::Copy { ref mut uid, .. }
        | CommandBody::Fetch { ref mut uid, .. }
        | CommandBody::Search { ref mut uid, .. }
        | CommandBody::Store { ref mut uid, .. } => *uid = true,
        _ => unreachable!(),
    }

    Ok((remaining, cmd))
}

// # Unknown commands

/// A fallback for well-formed lines with an unrecognised (or malformed)
/// command: swallow the rest of the line so the stream stays in sync and
/// let the dispatcher answer a tagged `BAD`.
fn command_unknown(input: &[u8]) -> IMAPResult<CommandBody> {
    let mut parser = tuple((atom, take_while(is_text_char)));

    let (remaining, (keyword, _)) = parser(input)?;

    Ok((remaining, CommandBody::Unknown { keyword }))
}
