//! Glow element decoder.
//!
//! Recursive descent over the BER productions of a directory response:
//!
//! ```text
//! root          := application(0) of application(11) of { context(0) of element }+ end
//! element       := qualified_parameter | qualified_node | parameter | node | function
//! element_body  := context(0) of path
//!                | context(1) of SET of content_field*
//!                | context(2) of application(4) of { context(0) of element }*
//! content_field := context(k) of <typed value>
//! ```
//!
//! Providers mix definite and indefinite lengths freely, so every
//! production may hand back either a bounded sub-reader or an open one
//! holding the rest of the buffer. After each step the descent continues
//! with whichever reader still has bytes
//! ([`pick_reader`](crate::reader::pick_reader)); two non-empty readers at
//! once means the decoder drifted off a container boundary and the message
//! is rejected.

use emberlib_core::{
    Element, ElementKind, Error, Function, Node, Parameter, Result, Value, VALUE_TYPE_BOOLEAN,
    VALUE_TYPE_ENUM, VALUE_TYPE_INTEGER, VALUE_TYPE_STRING,
};

use crate::collection::ElementCollection;
use crate::reader::{pick_reader, Reader};
use crate::{
    application, context, universal, ELEMENT_COLLECTION_TAG, FUNCTION_TAG, NODE_TAG,
    PARAMETER_TAG, QUALIFIED_NODE_TAG, QUALIFIED_PARAMETER_TAG, RELATIVE_OID_TAG,
    ROOT_COLLECTION_TAG, ROOT_ELEMENT_TAG, SET_TAG,
};

/// Parse a complete Glow payload into an element collection.
///
/// The payload must be a root element collection; each top-level entry
/// becomes one element (with one level of decoded children, matching what
/// a single GetDirectory returns).
pub fn parse_collection(payload: &[u8]) -> Result<ElementCollection> {
    let mut data = Reader::new(payload.to_vec());
    let mut collection = ElementCollection::new();

    let (mut app0, _) = data
        .read_tagged(ROOT_COLLECTION_TAG, application)
        .map_err(|e| Error::MalformedBer(format!("root element collection: {e}")))?;
    let (mut app11, _) = app0
        .read_tagged(ROOT_ELEMENT_TAG, application)
        .map_err(|e| Error::MalformedBer(format!("root element: {e}")))?;

    loop {
        let (entry, _) = app11
            .read_tagged(0, context)
            .map_err(|e| Error::MalformedBer(format!("top-level element entry: {e}")))?;

        let (element, _, mut rest) = decode_element(entry)?;
        collection.insert(element);

        rest.read_end()?; // element end
        rest.read_end()?; // entry end

        // With definite-length entries the leftover bytes belong to the
        // enclosing element list; put them back in front.
        if !rest.is_empty() {
            let mut rejoined = rest.remaining().to_vec();
            rejoined.extend_from_slice(app11.remaining());
            app11 = Reader::new(rejoined);
        }

        if app11.read_end()? {
            break;
        }
    }

    if !app0.read_end()? {
        return Err(Error::MalformedBer(
            "root element collection has trailing data".into(),
        ));
    }

    Ok(collection)
}

/// Accumulates element attributes across body productions before the kind
/// is sealed into the final sum type.
#[derive(Default)]
struct ElementBuilder {
    kind: Option<ElementKind>,
    path: String,
    identifier: String,
    description: String,
    children: Vec<Element>,
    is_online: bool,
    is_root: bool,
    value: Option<Value>,
    minimum: Option<Value>,
    maximum: Option<Value>,
    default: Option<Value>,
    access: i64,
    format: String,
    enumeration: String,
    factor: i64,
    value_type: Option<i64>,
}

impl ElementBuilder {
    fn kind(&self) -> ElementKind {
        self.kind.expect("element kind set before body decoding")
    }

    fn finish(mut self) -> Element {
        let kind = self.kind();

        // A parameter whose value never arrived takes the declared type's
        // default; enums and unknown types stay unset.
        if self.value.is_none() {
            if let Some(vt) = self.value_type {
                self.value = Value::default_for(vt);
            }
        }

        match kind {
            ElementKind::Node | ElementKind::QualifiedNode => {
                let node = Node {
                    path: self.path,
                    identifier: self.identifier,
                    description: self.description,
                    children: self.children,
                    is_online: self.is_online,
                    is_root: self.is_root,
                };
                if kind == ElementKind::Node {
                    Element::Node(node)
                } else {
                    Element::QualifiedNode(node)
                }
            }
            ElementKind::Parameter | ElementKind::QualifiedParameter => {
                let parameter = Parameter {
                    path: self.path,
                    identifier: self.identifier,
                    description: self.description,
                    children: self.children,
                    value: self.value,
                    minimum: self.minimum,
                    maximum: self.maximum,
                    default: self.default,
                    access: self.access,
                    format: self.format,
                    enumeration: self.enumeration,
                    factor: self.factor,
                    is_online: self.is_online,
                    value_type: self.value_type,
                };
                if kind == ElementKind::Parameter {
                    Element::Parameter(parameter)
                } else {
                    Element::QualifiedParameter(parameter)
                }
            }
            ElementKind::Function => Element::Function(Function {
                path: self.path,
                identifier: self.identifier,
                description: self.description,
                children: self.children,
            }),
        }
    }
}

/// Decode one element from `source`, whose next value must be an
/// application-tagged element.
///
/// Returns the element together with what is left of `source` and of the
/// element body reader; with indefinite-length encodings one of the two is
/// always empty.
fn decode_element(mut source: Reader) -> Result<(Element, Reader, Reader)> {
    let tag = source.peek()?;
    let kind = match tag {
        t if t == application(PARAMETER_TAG) => ElementKind::Parameter,
        t if t == application(NODE_TAG) => ElementKind::Node,
        t if t == application(QUALIFIED_PARAMETER_TAG) => ElementKind::QualifiedParameter,
        t if t == application(QUALIFIED_NODE_TAG) => ElementKind::QualifiedNode,
        t if t == application(FUNCTION_TAG) => ElementKind::Function,
        t => return Err(Error::UnknownElementKind(t)),
    };

    let (body, _) = source.read_tagged(tag & 0x1F, application)?;

    let mut builder = ElementBuilder { kind: Some(kind), ..ElementBuilder::default() };
    let rest = decode_body(&mut builder, body)?;

    Ok((builder.finish(), source, rest))
}

/// Drive the element body productions until the body's end-of-contents.
fn decode_body(builder: &mut ElementBuilder, mut reader: Reader) -> Result<Reader> {
    loop {
        let tag = reader.peek()?;
        let candidates = match tag {
            t if t == context(0) => decode_path(builder, reader)?,
            t if t == context(1) => decode_contents(builder, reader)?,
            t if t == context(2) => decode_children(builder, reader)?,
            _ => {
                // Context tags beyond the known productions are read past
                // and discarded.
                read_over_value(&mut reader)?;
                vec![reader]
            }
        };

        reader = pick_reader(candidates)?;
        if reader.read_end()? {
            return Ok(reader);
        }
    }
}

/// `context(0) of path`: a relative OID for qualified elements, a single
/// integer sub-identifier for unqualified children.
fn decode_path(builder: &mut ElementBuilder, mut outer: Reader) -> Result<Vec<Reader>> {
    let (mut ctx, _) = outer.read_tagged(0, context)?;

    builder.path = if ctx.peek()? == RELATIVE_OID_TAG {
        let components = ctx.decode_oid()?;
        components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".")
    } else {
        ctx.decode_integer()?.to_string()
    };

    if !ctx.read_end()? {
        return Err(Error::MalformedBer("path container not closed".into()));
    }

    Ok(vec![outer, ctx])
}

/// `context(1) of SET of content_field*`.
fn decode_contents(builder: &mut ElementBuilder, mut outer: Reader) -> Result<Vec<Reader>> {
    let (mut content, _) = outer.read_tagged(1, context)?;
    let (mut set, _) = content.read_tagged(SET_TAG, universal)?;

    loop {
        let candidates = decode_content_field(builder, set)?;
        set = pick_reader(candidates)?;
        if set.read_end()? {
            break;
        }
    }

    Ok(vec![outer, content, set])
}

/// One `context(k) of <typed value>` record; the meaning of `k` depends on
/// the element kind.
fn decode_content_field(builder: &mut ElementBuilder, mut set: Reader) -> Result<Vec<Reader>> {
    let tag = set.peek()?;
    let k = tag & 0x1F;
    let (mut field, _) = set.read_tagged(k, context)?;

    match builder.kind() {
        ElementKind::Parameter | ElementKind::QualifiedParameter => {
            decode_parameter_field(builder, &mut field, k)?;
        }
        ElementKind::Node | ElementKind::QualifiedNode => {
            decode_node_field(builder, &mut field, k)?;
        }
        ElementKind::Function => {
            decode_function_field(builder, &mut field, k)?;
        }
    }

    Ok(vec![set, field])
}

fn decode_parameter_field(
    builder: &mut ElementBuilder,
    field: &mut Reader,
    k: u8,
) -> Result<()> {
    match k {
        0 => builder.identifier = field.decode_utf8()?,
        1 => builder.description = field.decode_utf8()?,
        2 => builder.value = Some(decode_typed_value(builder.value_type, field)?),
        3 => builder.minimum = Some(field.decode_any()?),
        4 => builder.maximum = Some(field.decode_any()?),
        5 => builder.access = field.decode_integer()?,
        6 => builder.format = field.decode_utf8()?,
        7 => builder.enumeration = field.decode_utf8()?,
        8 => builder.factor = field.decode_integer()?,
        9 => builder.is_online = decode_bool(field)?,
        12 => builder.default = Some(field.decode_any()?),
        13 => builder.value_type = Some(field.decode_integer()?),
        _ => read_over_value(field)?,
    }
    Ok(())
}

fn decode_node_field(builder: &mut ElementBuilder, field: &mut Reader, k: u8) -> Result<()> {
    match k {
        0 => builder.identifier = field.decode_utf8()?,
        1 => builder.description = field.decode_utf8()?,
        2 => builder.is_root = decode_bool(field)?,
        3 => builder.is_online = decode_bool(field)?,
        _ => read_over_value(field)?,
    }
    Ok(())
}

fn decode_function_field(builder: &mut ElementBuilder, field: &mut Reader, k: u8) -> Result<()> {
    match k {
        0 => builder.identifier = field.decode_utf8()?,
        1 => builder.description = field.decode_utf8()?,
        _ => read_over_value(field)?,
    }
    Ok(())
}

/// Decode a parameter value using the already-seen value type.
///
/// Providers send the value-type field before the value in practice; if it
/// has not been seen, fall back to generic dynamic decoding.
fn decode_typed_value(value_type: Option<i64>, field: &mut Reader) -> Result<Value> {
    match value_type {
        Some(VALUE_TYPE_INTEGER) => field.decode_integer().map(Value::Integer),
        Some(VALUE_TYPE_ENUM) => field.decode_integer().map(Value::Enum),
        Some(VALUE_TYPE_STRING) => field.decode_utf8().map(Value::String),
        Some(VALUE_TYPE_BOOLEAN) => decode_bool(field).map(Value::Boolean),
        _ => field.decode_any(),
    }
}

fn decode_bool(field: &mut Reader) -> Result<bool> {
    match field.decode_any()? {
        Value::Boolean(b) => Ok(b),
        Value::Integer(i) => Ok(i != 0),
        other => Err(Error::MalformedBer(format!(
            "expected boolean, decoded {other:?}"
        ))),
    }
}

/// `context(2) of application(4) of { context(0) of element }*`: decode the
/// children collection and append each child in document order.
fn decode_children(builder: &mut ElementBuilder, mut outer: Reader) -> Result<Vec<Reader>> {
    let (mut wrap, _) = outer.read_tagged(2, context)?;
    let (mut list, _) = wrap.read_tagged(ELEMENT_COLLECTION_TAG, application)?;

    loop {
        let (entry, _) = list.read_tagged(0, context)?;
        let (child, entry_rest, body_rest) = decode_element(entry)?;
        builder.children.push(child);

        list = pick_reader(vec![list, entry_rest, body_rest])?;
        list.read_end()?; // child element end
        list.read_end()?; // child entry end
        if list.read_end()? {
            // end of the children collection
            break;
        }
    }

    Ok(vec![outer, wrap, list])
}

/// Consume one BER value without interpreting it, preserving the decoder
/// position: tag, length, contents, and (for indefinite lengths) the
/// end-of-contents marker.
fn read_over_value(reader: &mut Reader) -> Result<()> {
    let tag = reader.peek()?;
    let (mut inner, open) = reader.read_tagged(tag, universal)?;
    if !open {
        // Bounded: the contents were split off and can be dropped whole.
        return Ok(());
    }

    loop {
        if inner.read_end()? {
            *reader = inner;
            return Ok(());
        }
        inner.read_byte()?;
    }
}
