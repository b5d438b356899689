//! Mock Ember+ provider for protocol-level testing.
//!
//! [`MockProvider`] is a TCP listener pre-loaded with scripted
//! request/response pairs at the raw byte level. Each expected request is
//! read in full, compared exactly, and answered with the scripted response
//! bytes. Responses are usually built with
//! [`frame_response`](MockProvider::frame_response), which wraps a Glow
//! payload in a single S101 frame the way a provider answers a directory
//! request.
//!
//! # Example
//!
//! ```no_run
//! use emberlib_test_harness::MockProvider;
//!
//! # async fn example() {
//! let mut provider = MockProvider::bind().await;
//! provider.expect(
//!     b"request bytes".to_vec(),
//!     MockProvider::frame_response(&[0x60, 0x00, 0x00]),
//! );
//! let addr = provider.addr().to_string();
//! provider.start();
//! // ... connect a consumer to `addr` and exercise it ...
//! provider.wait().await.unwrap();
//! # }
//! ```

use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use emberlib_s101::{encode, SINGLE_PACKET};

/// A scripted request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes the client must send.
    request: Vec<u8>,
    /// The bytes written back once the request matched.
    response: Vec<u8>,
}

/// A scripted Ember+ provider on a localhost TCP listener.
///
/// The listener is bound at construction, so clients may connect as soon
/// as [`start`](MockProvider::start) has been called; expectations are
/// served in order against a single accepted connection.
pub struct MockProvider {
    listener: Option<TcpListener>,
    addr: String,
    expectations: VecDeque<Expectation>,
    server_handle: Option<JoinHandle<Result<(), String>>>,
}

impl MockProvider {
    /// Bind the provider to a random localhost port.
    ///
    /// # Panics
    ///
    /// Panics when no local port can be bound; test environments without
    /// loopback networking cannot run the harness at all.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock provider listener");
        let addr = listener
            .local_addr()
            .expect("mock provider has no local addr")
            .to_string();
        Self {
            listener: Some(listener),
            addr,
            expectations: VecDeque::new(),
            server_handle: None,
        }
    }

    /// The `host:port` address the provider is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Add an expected request and the raw bytes to answer it with.
    ///
    /// Expectations are consumed in order.
    pub fn expect(&mut self, request: Vec<u8>, response: Vec<u8>) {
        self.expectations.push_back(Expectation { request, response });
    }

    /// Wrap a Glow payload in a single S101 frame, as providers answer
    /// directory requests.
    pub fn frame_response(glow_payload: &[u8]) -> Vec<u8> {
        encode(glow_payload, SINGLE_PACKET)
    }

    /// Accept one connection and serve all loaded expectations.
    ///
    /// Runs in a background task; call [`wait`](MockProvider::wait)
    /// afterwards to surface script violations.
    pub fn start(&mut self) {
        let listener = self.listener.take().expect("mock provider already started");
        let expectations: Vec<Expectation> = self.expectations.drain(..).collect();

        self.server_handle = Some(tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            tracing::debug!(peer = %peer, "mock provider accepted connection");

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                let mut total_read = 0;

                while total_read < expectation.request.len() {
                    let n = stream
                        .read(&mut buf[total_read..])
                        .await
                        .map_err(|e| format!("expectation {i}: read error: {e}"))?;
                    if n == 0 {
                        return Err(format!(
                            "expectation {i}: client disconnected after {total_read} bytes \
                             (expected {})",
                            expectation.request.len()
                        ));
                    }
                    total_read += n;
                }

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {i}: request mismatch: expected {:02X?}, got {buf:02X?}",
                        expectation.request
                    ));
                }

                stream
                    .write_all(&expectation.response)
                    .await
                    .map_err(|e| format!("expectation {i}: write error: {e}"))?;
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
            }

            Ok(())
        }));
    }

    /// Wait for the server task to finish and report script violations.
    pub async fn wait(self) -> Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("mock provider task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn serves_scripted_exchange() {
        let mut provider = MockProvider::bind().await;
        provider.expect(vec![0x01, 0x02], vec![0xAA, 0xBB, 0xCC]);
        let addr = provider.addr().to_string();
        provider.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(&[0x01, 0x02]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB, 0xCC]);

        drop(client);
        provider.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_request_mismatch() {
        let mut provider = MockProvider::bind().await;
        provider.expect(vec![0x01], vec![0x02]);
        let addr = provider.addr().to_string();
        provider.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(&[0xFF]).await.unwrap();

        let err = provider.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "got: {err}");
    }

    #[tokio::test]
    async fn frame_response_is_a_single_frame() {
        let framed = MockProvider::frame_response(&[0x60, 0x00, 0x00]);
        assert_eq!(framed[0], 0xFE);
        assert_eq!(*framed.last().unwrap(), 0xFF);
    }
}
