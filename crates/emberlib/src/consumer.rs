//! Single-connection Ember+ consumer.
//!
//! [`Consumer`] owns one transport to a provider and drives the full
//! request cycle: encode, frame, send, re-assemble the (possibly
//! multi-packet) response, decode, return the element collection.
//!
//! The consumer is deliberately sequential -- one request in flight at a
//! time on its connection. Callers that need pipelining across providers
//! use [`ProviderPool`](crate::pool::ProviderPool).

use std::collections::VecDeque;
use std::time::Duration;

use emberlib_core::{ElementKind, Result, Transport};
use emberlib_glow::{parse_collection, ElementCollection};
use emberlib_s101::MessageAssembler;
use emberlib_transport::TcpTransport;

/// Receive buffer length, from the Ember+ documentation: the largest frame
/// a provider emits is 1290 bytes on the wire.
pub(crate) const READ_BUFFER_LEN: usize = 1290;

/// Default time to wait for a complete response.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a [`Consumer`] connection.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Time budget for each receive cycle while waiting for a response.
    pub response_timeout: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// A consumer session on a single provider connection.
pub struct Consumer {
    transport: Box<dyn Transport>,
    assembler: MessageAssembler,
    /// Messages completed by a read beyond the one being returned.
    ready: VecDeque<Vec<u8>>,
    response_timeout: Duration,
}

impl Consumer {
    /// Connect to a provider at `host:port` with default options.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_options(host, port, ConsumerOptions::default()).await
    }

    /// Connect to a provider with custom options.
    pub async fn connect_with_options(
        host: &str,
        port: u16,
        options: ConsumerOptions,
    ) -> Result<Self> {
        let transport = TcpTransport::connect(&format!("{host}:{port}")).await?;
        Ok(Self::with_transport(Box::new(transport), options))
    }

    /// Build a consumer over an already-connected transport.
    pub fn with_transport(transport: Box<dyn Transport>, options: ConsumerOptions) -> Self {
        Self {
            transport,
            assembler: MessageAssembler::new(),
            ready: VecDeque::new(),
            response_timeout: options.response_timeout,
        }
    }

    /// Request the immediate children of the provider's root.
    pub async fn get_root(&mut self) -> Result<ElementCollection> {
        self.request(crate::encode_root_request()).await
    }

    /// Request the immediate children of the element of the given kind at
    /// a dotted-decimal path.
    pub async fn get_directory(
        &mut self,
        kind: ElementKind,
        path: &str,
    ) -> Result<ElementCollection> {
        let request = crate::encode_directory_request(kind, path)?;
        self.request(request).await
    }

    /// Cancel interest in the element at a dotted-decimal path.
    ///
    /// Providers do not acknowledge unsubscription, so this only writes
    /// the request.
    pub async fn unsubscribe(&mut self, kind: ElementKind, path: &str) -> Result<()> {
        let request = crate::encode_unsubscribe_request(kind, path)?;
        self.transport.send(&request).await
    }

    /// Whether the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the connection.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    async fn request(&mut self, request: Vec<u8>) -> Result<ElementCollection> {
        self.transport.send(&request).await?;
        let payload = self.receive_message().await?;
        parse_collection(&payload)
    }

    /// Read from the transport until one complete logical message is
    /// assembled, and return its Glow payload.
    ///
    /// Extra messages completed by the same reads are queued and returned
    /// by subsequent calls.
    pub async fn receive_message(&mut self) -> Result<Vec<u8>> {
        if let Some(message) = self.ready.pop_front() {
            return Ok(message);
        }

        let mut buf = [0u8; READ_BUFFER_LEN];
        loop {
            let n = self
                .transport
                .receive(&mut buf, self.response_timeout)
                .await?;
            let mut messages = self.assembler.push(&buf[..n])?;
            if !messages.is_empty() {
                let first = messages.remove(0);
                self.ready.extend(messages);
                return Ok(first);
            }
        }
    }
}
