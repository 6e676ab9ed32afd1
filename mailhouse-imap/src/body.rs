//! `BODYSTRUCTURE`-related types.

use crate::core::NString;

/// The MIME structure of a message as reported by `BODYSTRUCTURE`.
///
/// Single parts are emitted as a fixed positional list
/// `(type subtype params id description encoding size lines md5
/// disposition language location)` with `NIL` in every unknown slot;
/// multiparts emit each part back-to-back followed by the subtype and
/// multipart parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BodyStructure {
    Single {
        /// Media type, e.g. `TEXT` in `TEXT/PLAIN`.
        r#type: String,
        /// Media subtype, e.g. `PLAIN`.
        subtype: String,
        fields: BasicFields,
        /// Line count; meaningful for `TEXT/*` parts, `NIL` otherwise.
        lines: Option<u32>,
    },
    Multi {
        bodies: Vec<BodyStructure>,
        subtype: String,
        parameter_list: Vec<(String, String)>,
    },
}

/// The fields common to every non-multipart body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicFields {
    /// `(key value ...)` or `NIL`.
    pub parameter_list: Vec<(String, String)>,
    /// `Content-ID`.
    pub id: NString,
    /// `Content-Description`.
    pub description: NString,
    /// `Content-Transfer-Encoding`; `7BIT` when absent.
    pub content_transfer_encoding: String,
    /// Body size in octets, transfer-encoded.
    pub size: u32,
}
