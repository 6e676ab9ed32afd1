//! Fetch-related types: what a client may ask `FETCH` for, and what a
//! server hands back per message.

use std::num::NonZeroU32;

use crate::body::BodyStructure;
use crate::core::{AString, NString};
use crate::datetime::DateTime;
use crate::envelope::Envelope;
use crate::flag::Flag;

/// `ALL` / `FAST` / `FULL` shorthand for common attribute sets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Macro {
    All,
    Fast,
    Full,
}

impl Macro {
    pub fn expand(&self) -> Vec<MessageDataItemName> {
        use MessageDataItemName::*;

        match self {
            Self::All => vec![Flags, InternalDate, Rfc822Size, Envelope],
            Self::Fast => vec![Flags, InternalDate, Rfc822Size],
            Self::Full => vec![Flags, InternalDate, Rfc822Size, Envelope, Body],
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MacroOrMessageDataItemNames {
    Macro(Macro),
    MessageDataItemNames(Vec<MessageDataItemName>),
}

impl MacroOrMessageDataItemNames {
    pub fn expand(self) -> Vec<MessageDataItemName> {
        match self {
            Self::Macro(macro_) => macro_.expand(),
            Self::MessageDataItemNames(names) => names,
        }
    }
}

/// A `BODY[...]` section specifier.
///
/// Numeric MIME part paths are not part of the grammar this server speaks;
/// a section is a header/text selector or absent (whole body).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Section {
    /// `HEADER`
    Header,
    /// `HEADER.FIELDS (name ...)`
    HeaderFields(Vec<AString>),
    /// `HEADER.FIELDS.NOT (name ...)`
    HeaderFieldsNot(Vec<AString>),
    /// `TEXT`
    Text,
}

/// One requested fetch attribute (`fetch-att`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MessageDataItemName {
    /// `BODY` -- non-extensible body structure.
    Body,
    /// `BODY[section]<partial>` or `BODY.PEEK[section]<partial>`.
    BodyExt {
        section: Option<Section>,
        /// `<offset.length>` slice of the section octets.
        partial: Option<(u32, NonZeroU32)>,
        peek: bool,
    },
    /// `BODYSTRUCTURE`
    BodyStructure,
    /// `ENVELOPE`
    Envelope,
    /// `FLAGS`
    Flags,
    /// `INTERNALDATE`
    InternalDate,
    /// `RFC822` -- equivalent to `BODY[]` (and sets `\Seen`).
    Rfc822,
    /// `RFC822.HEADER` -- equivalent to `BODY.PEEK[HEADER]`.
    Rfc822Header,
    /// `RFC822.SIZE`
    Rfc822Size,
    /// `RFC822.TEXT` -- equivalent to `BODY[TEXT]`.
    Rfc822Text,
    /// `UID`
    Uid,
}

/// One `name value` item inside a `* n FETCH (...)` response.
///
/// `RFC822`-family requests answer in their `BODY[...]` spelling, so the
/// response side has no `RFC822` variants beyond the size.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MessageDataItem {
    /// `BODY[section]<origin> data`
    BodyExt {
        section: Option<Section>,
        /// The `<origin>` octet offset, present when the request was partial.
        origin: Option<u32>,
        data: NString,
    },
    /// `BODY` (shorthand structure; same encoding as `BODYSTRUCTURE`).
    Body(BodyStructure),
    /// `BODYSTRUCTURE`
    BodyStructure(BodyStructure),
    /// `ENVELOPE`
    Envelope(Envelope),
    /// `FLAGS (...)`
    Flags(Vec<Flag>),
    /// `INTERNALDATE "..."`
    InternalDate(DateTime),
    /// `RFC822.SIZE n`
    Rfc822Size(u32),
    /// `UID n`
    Uid(NonZeroU32),
}
