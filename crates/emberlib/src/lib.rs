//! # emberlib -- Ember+ directory discovery for Rust
//!
//! `emberlib` is an asynchronous consumer-side library for the Ember+
//! remote control protocol, used by professional-audio and broadcast
//! devices to export a tree of named parameters, nodes, and functions. It
//! dials a provider over TCP, sends GetDirectory requests, and returns a
//! typed, JSON-friendly view of the element tree.
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberlib::Consumer;
//!
//! #[tokio::main]
//! async fn main() -> emberlib::Result<()> {
//!     let mut consumer = Consumer::connect("192.168.1.40", 9000).await?;
//!     let collection = consumer.get_root().await?;
//!     println!("{}", serde_json::to_string_pretty(&collection.serialise()).unwrap());
//!     consumer.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                  | Purpose                                         |
//! |------------------------|-------------------------------------------------|
//! | `emberlib-core`        | Element model, [`Value`], [`Transport`], errors |
//! | `emberlib-s101`        | S101 byte-stuffed framing and CRC               |
//! | `emberlib-glow`        | Glow/BER reader, request encoder, tree decoder  |
//! | `emberlib-transport`   | TCP transport implementation                    |
//! | `emberlib-test-harness`| Scripted mock provider for tests                |
//! | **`emberlib`**         | This facade crate -- consumer, pool, re-exports |
//!
//! ## Layers
//!
//! Requests flow encoder -> framing -> transport; responses flow transport
//! -> framing (with multi-packet re-assembly) -> decoder -> collection.
//! [`Consumer`] drives one connection end to end; [`ProviderPool`] shares
//! connections across callers keyed by provider address, with keep-alive
//! housekeeping.

pub use emberlib_core::*;

/// S101 framing layer: escaping, CRC, frame splitting, message assembly.
pub mod s101 {
    pub use emberlib_s101::*;
}

/// Glow payload layer: BER reader, request payloads, element decoding.
pub mod glow {
    pub use emberlib_glow::*;
}

/// Transport implementations.
pub mod transport {
    pub use emberlib_transport::*;
}

pub mod consumer;
pub mod pool;

pub use consumer::{Consumer, ConsumerOptions};
pub use emberlib_glow::ElementCollection;
pub use pool::{PoolOptions, ProviderConfig, ProviderPool};

use emberlib_glow::request;

/// Encode a complete root-tree GetDirectory request, framed and ready to
/// write to the provider.
///
/// Requests are emitted as a first-multi frame carrying the payload plus
/// an empty last-multi frame, as the protocol requires.
pub fn encode_root_request() -> Vec<u8> {
    emberlib_s101::encode(&request::root_request(), emberlib_s101::FIRST_MULTI_PACKET)
}

/// Encode a framed GetDirectory request for the element of the given kind
/// at a dotted-decimal path (empty for the root).
pub fn encode_directory_request(kind: ElementKind, path: &str) -> Result<Vec<u8>> {
    let payload = request::typed_request(kind, path, request::GETDIR_COMMAND)?;
    Ok(emberlib_s101::encode(&payload, emberlib_s101::FIRST_MULTI_PACKET))
}

/// Encode a framed Unsubscribe request for the element of the given kind
/// at a dotted-decimal path.
pub fn encode_unsubscribe_request(kind: ElementKind, path: &str) -> Result<Vec<u8>> {
    let payload = request::typed_request(kind, path, request::UNSUBSCRIBE_COMMAND)?;
    Ok(emberlib_s101::encode(&payload, emberlib_s101::FIRST_MULTI_PACKET))
}
