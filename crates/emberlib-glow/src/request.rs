//! GetDirectory / Unsubscribe request payload builders.
//!
//! Requests are built with indefinite-length containers: every opened
//! container contributes a two-zero end-of-contents marker, emitted in LIFO
//! order once the payload is complete. The resulting byte streams are
//! bit-exact with what deployed providers have been verified to accept.
//!
//! The outer wrap is always
//! `application(0) { application(11) { ... } }`; a root-tree request puts
//! the command directly inside, while a typed-path request nests the
//! qualified element container carrying the target path first.

use emberlib_core::{ElementKind, Error, Result};

use crate::{
    application, context, COMMAND_TAG, ELEMENT_COLLECTION_TAG, FUNCTION_TAG, INTEGER_TAG,
    QUALIFIED_NODE_TAG, QUALIFIED_PARAMETER_TAG, RELATIVE_OID_TAG, ROOT_COLLECTION_TAG,
    ROOT_ELEMENT_TAG,
};

/// Command code instructing the provider to return the immediate children
/// of the referenced element.
pub const GETDIR_COMMAND: i64 = 32;

/// Command code cancelling interest in the referenced element.
pub const UNSUBSCRIBE_COMMAND: i64 = 31;

/// All-ones field mask: request every element field.
const FIELD_MASK_ALL: i64 = -1;

/// Sequence writer with an open-container stack.
///
/// `open` writes a tag byte plus the indefinite-length marker; `finish`
/// closes every container still open, innermost first.
struct Writer {
    data: Vec<u8>,
    open_containers: usize,
}

impl Writer {
    fn new() -> Self {
        Self { data: Vec::new(), open_containers: 0 }
    }

    fn open(&mut self, tag: u8) {
        self.data.push(tag);
        self.data.push(0x80);
        self.open_containers += 1;
    }

    /// Write a relative OID: tag, component count, one byte per component.
    fn write_oid(&mut self, components: &[u8]) {
        self.data.push(RELATIVE_OID_TAG);
        self.data.push(components.len() as u8);
        self.data.extend_from_slice(components);
    }

    /// Write an integer wrapped in a definite-length context container:
    /// `context(n) <tlv-len> 0x02 <len> <big-endian two's complement>`.
    fn write_context_int(&mut self, ctx: u8, value: i64) {
        let content = integer_content(value);
        self.data.push(context(ctx));
        self.data.push((content.len() + 2) as u8);
        self.data.push(INTEGER_TAG);
        self.data.push(content.len() as u8);
        self.data.extend_from_slice(&content);
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..self.open_containers {
            self.data.extend_from_slice(&[0x00, 0x00]);
        }
        self.data
    }
}

/// Minimal big-endian two's complement encoding of `value`.
fn integer_content(value: i64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1 {
        let redundant = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0);
        if !redundant {
            break;
        }
        bytes.remove(0);
    }
    bytes
}

/// Write a command container: `context(0) { application(2) { command
/// [, field mask] } }`. GetDirectory carries the all-fields mask;
/// Unsubscribe has no mask field.
fn write_command(w: &mut Writer, command: i64) {
    w.open(context(0));
    w.open(application(COMMAND_TAG));
    w.write_context_int(0, command);
    if command == GETDIR_COMMAND {
        w.write_context_int(1, FIELD_MASK_ALL);
    }
}

/// Build the Glow payload of a root-tree GetDirectory request.
///
/// The command sits directly inside the root element container with no
/// qualified element in between -- the shape providers interpret as "list
/// the root".
///
/// Pure: every call returns the same bytes.
pub fn root_request() -> Vec<u8> {
    let mut w = Writer::new();
    w.open(application(ROOT_COLLECTION_TAG));
    w.open(application(ROOT_ELEMENT_TAG));
    write_command(&mut w, GETDIR_COMMAND);
    w.finish()
}

/// Build the Glow payload of a typed-path request.
///
/// `kind` chooses the qualified container (parameters and nodes request
/// through their qualified form); `path` is a possibly empty
/// dotted-decimal string. Components must fit a single OID byte; values
/// above 255 are rejected.
pub fn typed_request(kind: ElementKind, path: &str, command: i64) -> Result<Vec<u8>> {
    let components = parse_path(path)?;

    let inner_tag = match kind {
        ElementKind::Parameter | ElementKind::QualifiedParameter => QUALIFIED_PARAMETER_TAG,
        ElementKind::Node | ElementKind::QualifiedNode => QUALIFIED_NODE_TAG,
        ElementKind::Function => FUNCTION_TAG,
    };

    let mut w = Writer::new();
    w.open(application(ROOT_COLLECTION_TAG));
    w.open(application(ROOT_ELEMENT_TAG));
    w.open(context(0));
    w.open(application(inner_tag));
    w.open(context(0));
    w.write_oid(&components);
    w.open(context(2));
    w.open(application(ELEMENT_COLLECTION_TAG));
    write_command(&mut w, command);
    Ok(w.finish())
}

/// Parse a dotted-decimal path into OID components.
///
/// The empty string is the empty path. Each component must be a decimal
/// number below 256.
pub fn parse_path(path: &str) -> Result<Vec<u8>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    path.split('.')
        .map(|part| {
            let n: u32 = part
                .parse()
                .map_err(|_| Error::InvalidPath(format!("component {part:?} is not a number")))?;
            u8::try_from(n)
                .map_err(|_| Error::InvalidPath(format!("component {n} exceeds 255")))
        })
        .collect()
}
