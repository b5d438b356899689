//! The element tree model.
//!
//! A provider's directory response decodes into a tree of typed elements:
//! nodes, parameters, and functions, each in a plain or qualified (absolute
//! path) form. Elements are created by the decoder and never mutated after
//! construction.
//!
//! The JSON view serialises each kind with its own field set: nodes emit
//! children and their online/root flags, parameters emit only the fields
//! the provider actually sent, functions emit identifier and description
//! only.

use serde::ser::Serializer;
use serde::Serialize;

use crate::value::Value;

/// Discriminates the five Glow element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Node,
    QualifiedNode,
    Parameter,
    QualifiedParameter,
    Function,
}

/// A node or qualified node: a branch point in the provider tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Dotted-decimal path. Absolute for qualified nodes, a single
    /// sub-identifier for unqualified children.
    pub path: String,
    pub identifier: String,
    pub description: String,
    /// Immediate children in document order.
    pub children: Vec<Element>,
    pub is_online: bool,
    pub is_root: bool,
}

/// A parameter or qualified parameter: a leaf carrying a typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub path: String,
    pub identifier: String,
    pub description: String,
    pub children: Vec<Element>,
    /// Current value, typed per `value_type`. Defaulted when the provider
    /// omits it (numeric zero, empty string, or false -- never for enums).
    pub value: Option<Value>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub default: Option<Value>,
    pub access: i64,
    pub format: String,
    pub enumeration: String,
    pub factor: i64,
    pub is_online: bool,
    /// Declared value-type code (1=int, 2=real, 3=string, 4=bool, 6=enum).
    pub value_type: Option<i64>,
}

/// A function element. Invocation semantics are out of scope; only the
/// identity attributes are retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Function {
    pub path: String,
    pub identifier: String,
    pub description: String,
    pub children: Vec<Element>,
}

/// A decoded Glow element.
///
/// Plain and qualified variants share their payload struct; the variant
/// records which application tag the provider used, which also determines
/// how the `path` attribute is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Node(Node),
    QualifiedNode(Node),
    Parameter(Parameter),
    QualifiedParameter(Parameter),
    Function(Function),
}

impl Element {
    /// The kind tag for this element.
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Node(_) => ElementKind::Node,
            Element::QualifiedNode(_) => ElementKind::QualifiedNode,
            Element::Parameter(_) => ElementKind::Parameter,
            Element::QualifiedParameter(_) => ElementKind::QualifiedParameter,
            Element::Function(_) => ElementKind::Function,
        }
    }

    /// Dotted-decimal path attribute.
    pub fn path(&self) -> &str {
        match self {
            Element::Node(n) | Element::QualifiedNode(n) => &n.path,
            Element::Parameter(p) | Element::QualifiedParameter(p) => &p.path,
            Element::Function(f) => &f.path,
        }
    }

    /// Identifier attribute (may be empty if the provider sent none).
    pub fn identifier(&self) -> &str {
        match self {
            Element::Node(n) | Element::QualifiedNode(n) => &n.identifier,
            Element::Parameter(p) | Element::QualifiedParameter(p) => &p.identifier,
            Element::Function(f) => &f.identifier,
        }
    }

    /// Description attribute (may be empty).
    pub fn description(&self) -> &str {
        match self {
            Element::Node(n) | Element::QualifiedNode(n) => &n.description,
            Element::Parameter(p) | Element::QualifiedParameter(p) => &p.description,
            Element::Function(f) => &f.description,
        }
    }

    /// Immediate children in document order.
    pub fn children(&self) -> &[Element] {
        match self {
            Element::Node(n) | Element::QualifiedNode(n) => &n.children,
            Element::Parameter(p) | Element::QualifiedParameter(p) => &p.children,
            Element::Function(f) => &f.children,
        }
    }
}

// JSON view structs. Each element kind serialises its own field set; the
// parameter view omits anything the provider did not set.

#[derive(Serialize)]
struct NodeView<'a> {
    path: &'a str,
    element_type: ElementKind,
    identifier: &'a str,
    description: &'a str,
    children: &'a [Element],
    is_online: bool,
    is_root: bool,
}

#[derive(Serialize)]
struct ParameterView<'a> {
    path: &'a str,
    element_type: ElementKind,
    #[serde(skip_serializing_if = "is_empty_slice")]
    children: &'a [Element],
    #[serde(skip_serializing_if = "str::is_empty")]
    identifier: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: &'a Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum: &'a Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum: &'a Option<Value>,
    #[serde(skip_serializing_if = "is_zero")]
    access: i64,
    #[serde(skip_serializing_if = "str::is_empty")]
    format: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    enumeration: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    factor: i64,
    #[serde(skip_serializing_if = "is_false")]
    is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: &'a Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    value_type: &'a Option<i64>,
}

#[derive(Serialize)]
struct FunctionView<'a> {
    path: &'a str,
    element_type: ElementKind,
    identifier: &'a str,
    description: &'a str,
}

fn is_empty_slice(v: &[Element]) -> bool {
    v.is_empty()
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Element::Node(n) | Element::QualifiedNode(n) => NodeView {
                path: &n.path,
                element_type: self.kind(),
                identifier: &n.identifier,
                description: &n.description,
                children: &n.children,
                is_online: n.is_online,
                is_root: n.is_root,
            }
            .serialize(serializer),
            Element::Parameter(p) | Element::QualifiedParameter(p) => ParameterView {
                path: &p.path,
                element_type: self.kind(),
                children: &p.children,
                identifier: &p.identifier,
                description: &p.description,
                value: &p.value,
                minimum: &p.minimum,
                maximum: &p.maximum,
                access: p.access,
                format: &p.format,
                enumeration: &p.enumeration,
                factor: p.factor,
                is_online: p.is_online,
                default: &p.default,
                value_type: &p.value_type,
            }
            .serialize(serializer),
            Element::Function(f) => FunctionView {
                path: &f.path,
                element_type: self.kind(),
                identifier: &f.identifier,
                description: &f.description,
            }
            .serialize(serializer),
        }
    }
}
