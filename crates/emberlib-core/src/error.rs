//! Error types for emberlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, framing-layer, and
//! Glow-decoding errors are all captured here.

/// The error type for all emberlib operations.
///
/// Variants cover the full range of failure modes encountered when talking
/// to an Ember+ provider: physical transport failures, S101 framing
/// problems, malformed Glow/BER payloads, and lookup misses against a
/// decoded element collection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket setup, write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The input byte stream ended before a frame could be completed.
    ///
    /// Recoverable: the caller appends the next read to the trailing bytes
    /// and splits again.
    #[error("transport ended before a complete frame")]
    TransportEnded,

    /// An S101 frame failed structural validation (under-length, corrupt
    /// escape sequence, missing frame markers).
    ///
    /// Fatal for that frame; callers discard it and continue with the next.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A Glow/BER value failed to decode (unexpected tag, oversized length
    /// field, truncated contents, missing end-of-contents marker).
    ///
    /// Fatal for the containing message.
    #[error("malformed encoding: {0}")]
    MalformedBer(String),

    /// A response element carried an application tag outside the known set
    /// (parameter, node, qualified parameter, qualified node, function).
    #[error("unknown element kind: 0x{0:02X}")]
    UnknownElementKind(u8),

    /// A collection lookup by path or identifier found no element.
    ///
    /// Recoverable; surfaced to the caller unchanged.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// After a value was handled, more than one BER sub-reader still held
    /// unread bytes. Indicates framing drift inside the decoder.
    #[error("decoder residual: {0}")]
    DecoderResidual(String),

    /// A dotted-decimal path could not be encoded (non-numeric component or
    /// a component above 255).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Timed out waiting for a response from the provider.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the provider has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the provider was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
