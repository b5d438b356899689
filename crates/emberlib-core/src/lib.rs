//! emberlib-core: Core traits, types, and error definitions for emberlib.
//!
//! This crate defines the protocol-agnostic vocabulary shared by the S101
//! framing codec, the Glow codec, and the transport/consumer layers. Consumer
//! applications depend on these types without pulling in any codec or
//! transport implementation.
//!
//! # Key types
//!
//! - [`Element`] -- the typed view of a provider's tree entries
//! - [`Value`] -- dynamic parameter values whose wire type depends on the
//!   parameter's declared value type
//! - [`Transport`] -- byte-level communication channel
//! - [`Error`] / [`Result`] -- error handling

pub mod element;
pub mod error;
pub mod transport;
pub mod value;

// Re-export key types at crate root for ergonomic `use emberlib_core::*`.
pub use element::{Element, ElementKind, Function, Node, Parameter};
pub use error::{Error, Result};
pub use transport::Transport;
pub use value::{
    Value, VALUE_TYPE_BOOLEAN, VALUE_TYPE_ENUM, VALUE_TYPE_INTEGER, VALUE_TYPE_REAL,
    VALUE_TYPE_STRING,
};
