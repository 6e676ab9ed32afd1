//! Encoding of server messages.
//!
//! Responses are serialised into [`Fragment`]s rather than dumped into one
//! buffer: a literal inside a response (e.g. a message body in a `FETCH`
//! item) ends the current line fragment and becomes its own fragment, so a
//! transport can stream large bodies without re-scanning the serialised
//! bytes. For the server direction there is nothing to wait for between
//! fragments; [`Encoded::dump`] concatenates them.

use std::collections::VecDeque;
use std::io::Write;
use std::num::NonZeroU32;

use crate::body::{BasicFields, BodyStructure};
use crate::core::{escape_quoted, AString, Atom, IString, Literal, NString, Quoted, Tag};
use crate::datetime::DateTime;
use crate::envelope::{Address, Envelope};
use crate::fetch::{MessageDataItem, Section};
use crate::flag::{Flag, FlagNameAttribute};
use crate::mailbox::Mailbox;
use crate::response::{Capability, Code, Data, Greeting, GreetingKind, Response, Status};
use crate::status::StatusDataItem;

/// Encoder.
///
/// Implemented for types that know how to encode a specific IMAP message.
pub trait Encoder {
    type Message;

    fn encode(&self, message: &Self::Message) -> Encoded;
}

/// An encoded message, as a queue of [`Fragment`]s.
#[derive(Clone, Debug)]
pub struct Encoded {
    items: VecDeque<Fragment>,
}

impl Encoded {
    /// Dump the (remaining) encoded data as one byte vector.
    pub fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();

        for fragment in self.items {
            match fragment {
                Fragment::Line { mut data } => out.append(&mut data),
                Fragment::Literal { mut data } => out.append(&mut data),
            }
        }

        out
    }
}

impl Iterator for Encoded {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }
}

/// One transmission unit of an encoded message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fragment {
    /// A line ending in (or leading up to) CRLF.
    Line { data: Vec<u8> },
    /// The octets of a `{n}`-prefixed literal.
    Literal { data: Vec<u8> },
}

// -------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct EncodeContext {
    accumulator: Vec<u8>,
    items: VecDeque<Fragment>,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self) {
        self.items.push_back(Fragment::Line {
            data: std::mem::take(&mut self.accumulator),
        })
    }

    pub fn push_literal(&mut self) {
        self.items.push_back(Fragment::Literal {
            data: std::mem::take(&mut self.accumulator),
        })
    }

    pub fn into_items(self) -> VecDeque<Fragment> {
        let Self {
            accumulator,
            mut items,
        } = self;

        if !accumulator.is_empty() {
            items.push_back(Fragment::Line { data: accumulator });
        }

        items
    }

    #[cfg(test)]
    pub(crate) fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();

        for item in self.into_items() {
            match item {
                Fragment::Line { data } | Fragment::Literal { data } => {
                    out.extend_from_slice(&data)
                }
            }
        }

        out
    }
}

impl Write for EncodeContext {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.accumulator.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Codec for the connection greeting.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GreetingCodec;

/// Codec for everything after the greeting.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResponseCodec;

macro_rules! impl_encoder_for_codec {
    ($codec:ty, $message:ty) => {
        impl Encoder for $codec {
            type Message = $message;

            fn encode(&self, message: &Self::Message) -> Encoded {
                let mut ctx = EncodeContext::new();
                // `unwrap` is safe: writing into a `Vec` can't fail.
                EncodeIntoContext::encode_ctx(message, &mut ctx).unwrap();

                Encoded {
                    items: ctx.into_items(),
                }
            }
        }
    };
}

impl_encoder_for_codec!(GreetingCodec, Greeting);
impl_encoder_for_codec!(ResponseCodec, Response);

// -------------------------------------------------------------------------------------------------

pub(crate) trait EncodeIntoContext {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()>;
}

fn join<T: EncodeIntoContext>(
    items: &[T],
    sep: &[u8],
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    let mut first = true;
    for item in items {
        if !first {
            ctx.write_all(sep)?;
        }
        item.encode_ctx(ctx)?;
        first = false;
    }
    Ok(())
}

// ----- Primitives --------------------------------------------------------------------------------

impl EncodeIntoContext for u32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

impl EncodeIntoContext for NonZeroU32 {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

impl EncodeIntoContext for Tag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.inner().as_bytes())
    }
}

impl EncodeIntoContext for Atom {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.as_str().as_bytes())
    }
}

impl EncodeIntoContext for Quoted {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{}\"", escape_quoted(self.as_str()))
    }
}

impl EncodeIntoContext for Literal {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{{{}}}\r\n", self.len())?;
        ctx.push_line();

        ctx.write_all(self.as_bytes())?;
        ctx.push_literal();

        Ok(())
    }
}

impl EncodeIntoContext for IString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Quoted(quoted) => quoted.encode_ctx(ctx),
            Self::Literal(literal) => literal.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for NString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match &self.0 {
            Some(istring) => istring.encode_ctx(ctx),
            None => ctx.write_all(b"NIL"),
        }
    }
}

impl EncodeIntoContext for AString {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Atom(atom) => atom.encode_ctx(ctx),
            Self::String(istring) => istring.encode_ctx(ctx),
        }
    }
}

impl EncodeIntoContext for Mailbox {
    /// Mailbox names render as astrings: bare when atom-safe, quoted
    /// otherwise (so the empty name becomes `""`).
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        let name = self.as_str();
        let atom_safe =
            !name.is_empty() && name.bytes().all(crate::core::is_atom_char);

        if atom_safe {
            ctx.write_all(name.as_bytes())
        } else {
            write!(ctx, "\"{}\"", escape_quoted(name))
        }
    }
}

impl EncodeIntoContext for Flag {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

impl EncodeIntoContext for FlagNameAttribute {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

impl EncodeIntoContext for DateTime {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "\"{self}\"")
    }
}

impl EncodeIntoContext for Capability {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        write!(ctx, "{self}")
    }
}

// ----- Greeting ----------------------------------------------------------------------------------

impl EncodeIntoContext for Greeting {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"* ")?;
        match self.kind {
            GreetingKind::Ok => ctx.write_all(b"OK")?,
            GreetingKind::PreAuth => ctx.write_all(b"PREAUTH")?,
            GreetingKind::Bye => ctx.write_all(b"BYE")?,
        }
        write!(ctx, " {}\r\n", self.text)
    }
}

// ----- Status ------------------------------------------------------------------------------------

impl EncodeIntoContext for Code {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Code::PermanentFlags(flags) => {
                ctx.write_all(b"PERMANENTFLAGS (")?;
                join(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Code::ReadOnly => ctx.write_all(b"READ-ONLY"),
            Code::ReadWrite => ctx.write_all(b"READ-WRITE"),
            Code::UidNext(next) => {
                ctx.write_all(b"UIDNEXT ")?;
                next.encode_ctx(ctx)
            }
            Code::UidValidity(validity) => {
                ctx.write_all(b"UIDVALIDITY ")?;
                validity.encode_ctx(ctx)
            }
            Code::Unseen(unseen) => {
                ctx.write_all(b"UNSEEN ")?;
                unseen.encode_ctx(ctx)
            }
        }
    }
}

impl EncodeIntoContext for Status {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        fn status_line(
            ctx: &mut EncodeContext,
            tag: &Option<Tag>,
            kind: &[u8],
            code: &Option<Code>,
            text: &str,
        ) -> std::io::Result<()> {
            match tag {
                Some(tag) => tag.encode_ctx(ctx)?,
                None => ctx.write_all(b"*")?,
            }
            ctx.write_all(b" ")?;
            ctx.write_all(kind)?;

            if let Some(code) = code {
                ctx.write_all(b" [")?;
                code.encode_ctx(ctx)?;
                ctx.write_all(b"]")?;
            }

            // `* OK [UNSEEN 0]`-style lines carry no trailing text.
            if !text.is_empty() {
                write!(ctx, " {text}")?;
            }

            ctx.write_all(b"\r\n")
        }

        match self {
            Status::Ok { tag, code, text } => status_line(ctx, tag, b"OK", code, text),
            Status::No { tag, code, text } => status_line(ctx, tag, b"NO", code, text),
            Status::Bad { tag, code, text } => status_line(ctx, tag, b"BAD", code, text),
            Status::Bye { text } => write!(ctx, "* BYE {text}\r\n"),
        }
    }
}

// ----- Data --------------------------------------------------------------------------------------

impl EncodeIntoContext for StatusDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Messages(count) => {
                ctx.write_all(b"MESSAGES ")?;
                count.encode_ctx(ctx)
            }
            Self::Recent(count) => {
                ctx.write_all(b"RECENT ")?;
                count.encode_ctx(ctx)
            }
            Self::UidNext(next) => {
                ctx.write_all(b"UIDNEXT ")?;
                next.encode_ctx(ctx)
            }
            Self::UidValidity(validity) => {
                ctx.write_all(b"UIDVALIDITY ")?;
                validity.encode_ctx(ctx)
            }
            Self::Unseen(count) => {
                ctx.write_all(b"UNSEEN ")?;
                count.encode_ctx(ctx)
            }
        }
    }
}

fn encode_list_line(
    ctx: &mut EncodeContext,
    keyword: &[u8],
    attributes: &[FlagNameAttribute],
    delimiter: &Option<char>,
    mailbox: &Mailbox,
) -> std::io::Result<()> {
    ctx.write_all(b"* ")?;
    ctx.write_all(keyword)?;
    ctx.write_all(b" (")?;
    join(attributes, b" ", ctx)?;
    ctx.write_all(b") ")?;

    match delimiter {
        Some(delimiter) => write!(ctx, "\"{}\"", escape_quoted(&delimiter.to_string()))?,
        None => ctx.write_all(b"NIL")?,
    }

    write!(ctx, " \"{}\"\r\n", escape_quoted(mailbox.as_str()))
}

impl EncodeIntoContext for Data {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Data::Capability(capabilities) => {
                ctx.write_all(b"* CAPABILITY ")?;
                join(capabilities, b" ", ctx)?;
                ctx.write_all(b"\r\n")
            }
            Data::Exists(count) => {
                ctx.write_all(b"* ")?;
                count.encode_ctx(ctx)?;
                ctx.write_all(b" EXISTS\r\n")
            }
            Data::Expunge(seq) => {
                ctx.write_all(b"* ")?;
                seq.encode_ctx(ctx)?;
                ctx.write_all(b" EXPUNGE\r\n")
            }
            Data::Fetch { seq, items } => {
                ctx.write_all(b"* ")?;
                seq.encode_ctx(ctx)?;
                ctx.write_all(b" FETCH (")?;
                join(items, b" ", ctx)?;
                ctx.write_all(b")\r\n")
            }
            Data::Flags(flags) => {
                ctx.write_all(b"* FLAGS (")?;
                join(flags, b" ", ctx)?;
                ctx.write_all(b")\r\n")
            }
            Data::List {
                attributes,
                delimiter,
                mailbox,
            } => encode_list_line(ctx, b"LIST", attributes, delimiter, mailbox),
            Data::Lsub {
                attributes,
                delimiter,
                mailbox,
            } => encode_list_line(ctx, b"LSUB", attributes, delimiter, mailbox),
            Data::Recent(count) => {
                ctx.write_all(b"* ")?;
                count.encode_ctx(ctx)?;
                ctx.write_all(b" RECENT\r\n")
            }
            Data::Search(ids) => {
                ctx.write_all(b"* SEARCH")?;
                for id in ids {
                    ctx.write_all(b" ")?;
                    id.encode_ctx(ctx)?;
                }
                ctx.write_all(b"\r\n")
            }
            Data::Status { mailbox, items } => {
                ctx.write_all(b"* STATUS ")?;
                mailbox.encode_ctx(ctx)?;
                ctx.write_all(b" (")?;
                join(items, b" ", ctx)?;
                ctx.write_all(b")\r\n")
            }
        }
    }
}

// ----- Fetch items -------------------------------------------------------------------------------

impl EncodeIntoContext for Section {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Section::Header => ctx.write_all(b"HEADER"),
            Section::HeaderFields(names) => {
                ctx.write_all(b"HEADER.FIELDS (")?;
                join(names, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Section::HeaderFieldsNot(names) => {
                ctx.write_all(b"HEADER.FIELDS.NOT (")?;
                join(names, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Section::Text => ctx.write_all(b"TEXT"),
        }
    }
}

impl EncodeIntoContext for MessageDataItem {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::BodyExt {
                section,
                origin,
                data,
            } => {
                ctx.write_all(b"BODY[")?;
                if let Some(section) = section {
                    section.encode_ctx(ctx)?;
                }
                ctx.write_all(b"]")?;
                if let Some(origin) = origin {
                    write!(ctx, "<{origin}>")?;
                }
                ctx.write_all(b" ")?;
                data.encode_ctx(ctx)
            }
            Self::Body(structure) => {
                ctx.write_all(b"BODY ")?;
                structure.encode_ctx(ctx)
            }
            Self::BodyStructure(structure) => {
                ctx.write_all(b"BODYSTRUCTURE ")?;
                structure.encode_ctx(ctx)
            }
            Self::Envelope(envelope) => {
                ctx.write_all(b"ENVELOPE ")?;
                envelope.encode_ctx(ctx)
            }
            Self::Flags(flags) => {
                ctx.write_all(b"FLAGS (")?;
                join(flags, b" ", ctx)?;
                ctx.write_all(b")")
            }
            Self::InternalDate(datetime) => {
                ctx.write_all(b"INTERNALDATE ")?;
                datetime.encode_ctx(ctx)
            }
            Self::Rfc822Size(size) => {
                ctx.write_all(b"RFC822.SIZE ")?;
                size.encode_ctx(ctx)
            }
            Self::Uid(uid) => {
                ctx.write_all(b"UID ")?;
                uid.encode_ctx(ctx)
            }
        }
    }
}

// ----- Envelope ----------------------------------------------------------------------------------

impl EncodeIntoContext for Address {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.name.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.adl.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.mailbox.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.host.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

fn encode_address_list(addresses: &[Address], ctx: &mut EncodeContext) -> std::io::Result<()> {
    if addresses.is_empty() {
        ctx.write_all(b"NIL")
    } else {
        ctx.write_all(b"(")?;
        join(addresses, b"", ctx)?;
        ctx.write_all(b")")
    }
}

impl EncodeIntoContext for Envelope {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"(")?;
        self.date.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.subject.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.from, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.sender, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.reply_to, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.to, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.cc, ctx)?;
        ctx.write_all(b" ")?;
        encode_address_list(&self.bcc, ctx)?;
        ctx.write_all(b" ")?;
        self.in_reply_to.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.message_id.encode_ctx(ctx)?;
        ctx.write_all(b")")
    }
}

// ----- Body structure ----------------------------------------------------------------------------

fn encode_parameter_list(
    parameters: &[(String, String)],
    ctx: &mut EncodeContext,
) -> std::io::Result<()> {
    if parameters.is_empty() {
        return ctx.write_all(b"NIL");
    }

    ctx.write_all(b"(")?;
    let mut first = true;
    for (key, value) in parameters {
        if !first {
            ctx.write_all(b" ")?;
        }
        write!(
            ctx,
            "\"{}\" \"{}\"",
            escape_quoted(key),
            escape_quoted(value)
        )?;
        first = false;
    }
    ctx.write_all(b")")
}

impl EncodeIntoContext for BasicFields {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        encode_parameter_list(&self.parameter_list, ctx)?;
        ctx.write_all(b" ")?;
        self.id.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        self.description.encode_ctx(ctx)?;
        ctx.write_all(b" ")?;
        write!(ctx, "\"{}\"", escape_quoted(&self.content_transfer_encoding))?;
        ctx.write_all(b" ")?;
        self.size.encode_ctx(ctx)
    }
}

impl EncodeIntoContext for BodyStructure {
    /// Single parts are the fixed positional list
    /// `(type subtype params id description encoding size lines md5
    /// disposition language location)`; multiparts emit each part
    /// back-to-back, then the subtype, parameters, and two `NIL`s.
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Self::Single {
                r#type,
                subtype,
                fields,
                lines,
            } => {
                write!(
                    ctx,
                    "(\"{}\" \"{}\" ",
                    escape_quoted(r#type),
                    escape_quoted(subtype)
                )?;
                fields.encode_ctx(ctx)?;
                ctx.write_all(b" ")?;
                match lines {
                    Some(lines) => lines.encode_ctx(ctx)?,
                    None => ctx.write_all(b"NIL")?,
                }
                ctx.write_all(b" NIL NIL NIL NIL)")
            }
            Self::Multi {
                bodies,
                subtype,
                parameter_list,
            } => {
                ctx.write_all(b"(")?;
                for body in bodies {
                    body.encode_ctx(ctx)?;
                }
                write!(ctx, " \"{}\" ", escape_quoted(subtype))?;
                encode_parameter_list(parameter_list, ctx)?;
                ctx.write_all(b" NIL NIL)")
            }
        }
    }
}

// ----- Response ----------------------------------------------------------------------------------

impl EncodeIntoContext for Response {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Response::Data(data) => data.encode_ctx(ctx),
            Response::Status(status) => status.encode_ctx(ctx),
            Response::Continue => ctx.write_all(b"+\r\n"),
        }
    }
}
