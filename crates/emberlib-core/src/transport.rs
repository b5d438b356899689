//! Transport trait for provider communication.
//!
//! The [`Transport`] trait abstracts over the byte stream to an Ember+
//! provider. The only production implementation is the TCP transport in
//! `emberlib-transport`; tests substitute scripted mocks.
//!
//! The codec layers operate on a `Transport` rather than directly on a
//! socket. Short reads are routine: the S101 layer re-assembles frames from
//! whatever each `receive` call returns.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a provider.
///
/// Implementations handle connection state and deadlines at the socket
/// layer. Framing and payload concerns belong to the codec crates that
/// consume this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the provider.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying stream.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the provider into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be any non-zero
    /// amount up to `buf.len()`. Waits up to `timeout` for data; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if none arrives
    /// within the deadline, and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) once
    /// the provider closes its end.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
