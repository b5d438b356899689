//! Provider connection pool.
//!
//! [`ProviderPool`] shares connections across callers, keyed by provider
//! address. Each connection is owned by a single background task that
//! writes requests, drains the socket, and matches parsed responses
//! against the pending request's expected path; callers hand a request
//! over an mpsc channel and await the reply under the call timeout.
//!
//! Providers push unsolicited messages on the same connection (value
//! updates for trees someone else walked); the task discards anything
//! whose first element path does not extend the expected path. A
//! housekeeper closes connections that have been idle longer than the
//! keep-alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Mutex};

use emberlib_core::{ElementKind, Error, Result, Transport};
use emberlib_glow::{parse_collection, ElementCollection};
use emberlib_s101::MessageAssembler;
use emberlib_transport::TcpTransport;

use crate::consumer::READ_BUFFER_LEN;

/// How long the connection task waits on an idle socket before looping.
const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Identifies one provider endpoint. Pool connections are keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderConfig {
    pub host: String,
    pub port: u16,
}

impl ProviderConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// The `host:port` dial string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for a [`ProviderPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Time budget for one request/response exchange.
    pub call_timeout: Duration,
    /// Idle time after which a pooled connection is closed.
    pub keep_alive: Duration,
    /// How often the housekeeper checks for idle connections.
    pub housekeeping_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(60),
            housekeeping_interval: Duration::from_secs(10),
        }
    }
}

/// One pending request handed to a connection task.
struct PoolRequest {
    request: Vec<u8>,
    expected_path: String,
    reply: oneshot::Sender<Result<ElementCollection>>,
}

struct ProviderHandle {
    request_tx: mpsc::Sender<PoolRequest>,
    last_used: Instant,
}

/// A pool of provider connections with keep-alive housekeeping.
///
/// Must be created inside a tokio runtime; the housekeeper task stops on
/// its own once the pool is dropped.
pub struct ProviderPool {
    connections: Arc<Mutex<HashMap<ProviderConfig, ProviderHandle>>>,
    options: PoolOptions,
}

impl ProviderPool {
    pub fn new(options: PoolOptions) -> Self {
        let connections: Arc<Mutex<HashMap<ProviderConfig, ProviderHandle>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let weak = Arc::downgrade(&connections);
        let keep_alive = options.keep_alive;
        let interval = options.housekeeping_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(connections) = weak.upgrade() else { break };
                let mut map = connections.lock().await;
                map.retain(|config, handle| {
                    let keep = !handle.request_tx.is_closed()
                        && handle.last_used.elapsed() <= keep_alive;
                    if !keep {
                        tracing::debug!(addr = %config.addr(), "closing unused connection");
                    }
                    keep
                });
            }
        });

        Self { connections, options }
    }

    /// Request the root directory through a pooled connection.
    pub async fn get_root(&self, config: &ProviderConfig) -> Result<ElementCollection> {
        self.dispatch(config, crate::encode_root_request(), String::new())
            .await
    }

    /// Request the children of the element of the given kind at a
    /// dotted-decimal path through a pooled connection.
    pub async fn get_directory(
        &self,
        config: &ProviderConfig,
        kind: ElementKind,
        path: &str,
    ) -> Result<ElementCollection> {
        let request = crate::encode_directory_request(kind, path)?;
        self.dispatch(config, request, path.to_string()).await
    }

    /// Close every pooled connection.
    pub async fn close_all(&self) {
        let mut map = self.connections.lock().await;
        for (config, _) in map.drain() {
            tracing::debug!(addr = %config.addr(), "closing connection");
        }
        // Dropping the handles closes the request channels; each task
        // shuts its transport down on the way out.
    }

    async fn dispatch(
        &self,
        config: &ProviderConfig,
        request: Vec<u8>,
        expected_path: String,
    ) -> Result<ElementCollection> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let pool_request = PoolRequest {
            request,
            expected_path,
            reply: reply_tx,
        };

        let tx = self.handle_for(config).await?;
        if let Err(rejected) = tx.send(pool_request).await {
            // The connection task died between lookup and send. Drop the
            // stale handle (unless someone already replaced it) and retry
            // once on a fresh connection.
            {
                let mut map = self.connections.lock().await;
                if map
                    .get(config)
                    .is_some_and(|h| h.request_tx.same_channel(&tx))
                {
                    map.remove(config);
                }
            }
            let tx = self.handle_for(config).await?;
            tx.send(rejected.0)
                .await
                .map_err(|_| Error::ConnectionLost)?;
        }

        match tokio::time::timeout(self.options.call_timeout, reply_rx).await {
            Err(_) => Err(Error::Timeout),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Ok(Ok(result)) => result,
        }
    }

    /// Look up a live handle for `config`, dialing a new connection when
    /// none exists.
    async fn handle_for(&self, config: &ProviderConfig) -> Result<mpsc::Sender<PoolRequest>> {
        {
            let mut map = self.connections.lock().await;
            if let Some(handle) = map.get_mut(config) {
                if !handle.request_tx.is_closed() {
                    handle.last_used = Instant::now();
                    return Ok(handle.request_tx.clone());
                }
                map.remove(config);
            }
        }

        tracing::debug!(addr = %config.addr(), "creating new connection");
        let transport = TcpTransport::connect(&config.addr()).await?;
        let (request_tx, request_rx) = mpsc::channel(1);
        tokio::spawn(connection_task(
            transport,
            request_rx,
            self.options.call_timeout,
            config.addr(),
        ));

        let mut map = self.connections.lock().await;
        if let Some(existing) = map.get_mut(config) {
            if !existing.request_tx.is_closed() {
                // Another caller connected while we dialed; ours shuts
                // down when its channel drops.
                tracing::debug!(addr = %config.addr(), "closing redundant connection");
                existing.last_used = Instant::now();
                return Ok(existing.request_tx.clone());
            }
        }
        map.insert(
            config.clone(),
            ProviderHandle {
                request_tx: request_tx.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(request_tx)
    }
}

/// Whether a response's first element path answers a request for
/// `expected`.
///
/// A directory answer repeats the requested path or extends it by one
/// component; the root request (empty path) is answered with a
/// single-component path. Every requested component must match.
fn path_matches(expected: &str, response_path: &str) -> bool {
    let expected_parts: Vec<&str> = if expected.is_empty() {
        Vec::new()
    } else {
        expected.split('.').collect()
    };
    let expected_len = expected_parts.len().max(1);

    let got_parts: Vec<&str> = response_path.split('.').collect();
    if got_parts.len() != expected_len && got_parts.len() != expected_len + 1 {
        return false;
    }

    expected_parts.iter().zip(&got_parts).all(|(e, g)| e == g)
}

/// Owns one provider connection: serves queued requests and drains
/// unsolicited traffic in between.
async fn connection_task(
    mut transport: TcpTransport,
    mut request_rx: mpsc::Receiver<PoolRequest>,
    call_timeout: Duration,
    addr: String,
) {
    let mut assembler = MessageAssembler::new();
    let mut buf = vec![0u8; READ_BUFFER_LEN];

    loop {
        tokio::select! {
            maybe_request = request_rx.recv() => {
                let Some(request) = maybe_request else { break };
                if serve_request(&mut transport, &mut assembler, &mut buf, call_timeout, request)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            received = transport.receive(&mut buf, IDLE_READ_TIMEOUT) => {
                match received {
                    Ok(n) => drain_unsolicited(&mut assembler, &buf[..n]),
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        tracing::debug!(addr = %addr, error = %e, "stopping connection task");
                        break;
                    }
                }
            }
        }
    }

    let _ = transport.close().await;
    tracing::debug!(addr = %addr, "connection task ended");
}

/// Write one request and read until a response matches its path or the
/// deadline passes. `Err` means the connection is unusable and the task
/// should end; request-level failures are reported through the reply
/// channel and return `Ok`.
async fn serve_request(
    transport: &mut TcpTransport,
    assembler: &mut MessageAssembler,
    buf: &mut [u8],
    call_timeout: Duration,
    request: PoolRequest,
) -> Result<()> {
    if let Err(e) = transport.send(&request.request).await {
        let _ = request.reply.send(Err(e));
        return Err(Error::ConnectionLost);
    }

    let deadline = tokio::time::Instant::now() + call_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            let _ = request.reply.send(Err(Error::Timeout));
            return Ok(());
        }

        let n = match transport.receive(buf, remaining).await {
            Ok(n) => n,
            Err(Error::Timeout) => {
                let _ = request.reply.send(Err(Error::Timeout));
                return Ok(());
            }
            Err(e) => {
                let _ = request.reply.send(Err(e));
                return Err(Error::ConnectionLost);
            }
        };

        let messages = match assembler.push(&buf[..n]) {
            Ok(messages) => messages,
            Err(e) => {
                let _ = request.reply.send(Err(e));
                return Err(Error::ConnectionLost);
            }
        };

        let mut pending = messages.into_iter();
        while let Some(message) = pending.next() {
            let collection = match parse_collection(&message) {
                Ok(collection) => collection,
                Err(e) => {
                    tracing::debug!(error = %e, "failed to parse response message");
                    continue;
                }
            };
            let first_path = match collection.elements().first() {
                Some(element) => element.path().to_string(),
                None => continue,
            };

            if path_matches(&request.expected_path, &first_path) {
                let _ = request.reply.send(Ok(collection));
                // One read may complete several messages; anything after
                // the match is unsolicited and must not be carried into
                // the next request.
                for leftover in pending {
                    tracing::debug!(
                        bytes = leftover.len(),
                        "discarding unsolicited message"
                    );
                }
                return Ok(());
            }
            tracing::debug!(
                expected = %request.expected_path,
                got = %first_path,
                "response path does not match pending request"
            );
        }
    }
}

fn drain_unsolicited(assembler: &mut MessageAssembler, bytes: &[u8]) {
    match assembler.push(bytes) {
        Ok(messages) => {
            for message in messages {
                tracing::debug!(bytes = message.len(), "discarding unsolicited message");
            }
        }
        Err(e) => tracing::debug!(error = %e, "failed to assemble unsolicited data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberlib_test_harness::MockProvider;

    // ---------------------------------------------------------------
    // Path matching
    // ---------------------------------------------------------------

    #[test]
    fn root_request_matches_single_component_answers() {
        assert!(path_matches("", "1"));
        assert!(path_matches("", "1.2"));
        assert!(!path_matches("", "1.2.3"));
    }

    #[test]
    fn typed_request_matches_same_or_one_deeper() {
        assert!(path_matches("1.2", "1.2"));
        assert!(path_matches("1.2", "1.2.7"));
        assert!(!path_matches("1.2", "1"));
        assert!(!path_matches("1.2", "1.2.7.9"));
    }

    #[test]
    fn typed_request_requires_prefix_agreement() {
        assert!(!path_matches("1.2", "1.3"));
        assert!(!path_matches("1.2", "2.2.1"));
    }

    // ---------------------------------------------------------------
    // Pooled requests
    // ---------------------------------------------------------------

    fn node_response_payload(path: u8) -> Vec<u8> {
        vec![
            0x60, 0x80, 0x6B, 0x80, 0xA0, 0x80, // response wrap
            0x6A, 0x80, // QualifiedNode
            0xA0, 0x03, 0x0D, 0x01, path, // path
            0x00, 0x00, // element end
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // entry, root element, root
        ]
    }

    fn config_for(addr: &str) -> ProviderConfig {
        let (host, port) = addr.rsplit_once(':').unwrap();
        ProviderConfig::new(host, port.parse().unwrap())
    }

    #[tokio::test]
    async fn pooled_root_request() {
        let mut provider = MockProvider::bind().await;
        provider.expect(
            crate::encode_root_request(),
            MockProvider::frame_response(&node_response_payload(1)),
        );
        let config = config_for(provider.addr());
        provider.start();

        let pool = ProviderPool::new(PoolOptions::default());
        let collection = pool.get_root(&config).await.unwrap();
        assert!(collection.find_by_path("1").is_ok());

        pool.close_all().await;
        provider.wait().await.unwrap();
    }

    #[tokio::test]
    async fn pool_reuses_one_connection_for_sequential_requests() {
        // Both expectations are scripted on a single accepted connection;
        // a pool that re-dialed would hang on the second request.
        let mut provider = MockProvider::bind().await;
        provider.expect(
            crate::encode_root_request(),
            MockProvider::frame_response(&node_response_payload(1)),
        );
        provider.expect(
            crate::encode_directory_request(ElementKind::QualifiedNode, "1").unwrap(),
            MockProvider::frame_response(&node_response_payload(1)),
        );
        let config = config_for(provider.addr());
        provider.start();

        let pool = ProviderPool::new(PoolOptions::default());
        pool.get_root(&config).await.unwrap();
        let collection = pool
            .get_directory(&config, ElementKind::QualifiedNode, "1")
            .await
            .unwrap();
        assert!(collection.find_by_path("1").is_ok());

        pool.close_all().await;
        provider.wait().await.unwrap();
    }

    #[tokio::test]
    async fn pool_skips_responses_for_other_paths() {
        // The provider answers with an unrelated deep path first; the
        // pool must keep reading until the matching answer arrives.
        let mut response = MockProvider::frame_response(&[
            0x60, 0x80, 0x6B, 0x80, 0xA0, 0x80, 0x6A, 0x80, //
            0xA0, 0x05, 0x0D, 0x03, 0x07, 0x07, 0x07, // path 7.7.7
            0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        response.extend_from_slice(&MockProvider::frame_response(&node_response_payload(1)));

        let mut provider = MockProvider::bind().await;
        provider.expect(crate::encode_root_request(), response);
        let config = config_for(provider.addr());
        provider.start();

        let pool = ProviderPool::new(PoolOptions::default());
        let collection = pool.get_root(&config).await.unwrap();
        assert_eq!(collection.elements()[0].path(), "1");

        pool.close_all().await;
        provider.wait().await.unwrap();
    }

    #[tokio::test]
    async fn pool_discards_batch_members_after_the_match() {
        // The provider's answer and an unsolicited update land in one
        // write. The trailing message must be drained with the first
        // request, not linger to answer the next one.
        let mut response = MockProvider::frame_response(&node_response_payload(1));
        response.extend_from_slice(&MockProvider::frame_response(&node_response_payload(9)));

        let mut provider = MockProvider::bind().await;
        provider.expect(crate::encode_root_request(), response);
        provider.expect(
            crate::encode_directory_request(ElementKind::QualifiedNode, "3").unwrap(),
            MockProvider::frame_response(&node_response_payload(3)),
        );
        let config = config_for(provider.addr());
        provider.start();

        let pool = ProviderPool::new(PoolOptions::default());
        let collection = pool.get_root(&config).await.unwrap();
        assert_eq!(collection.elements()[0].path(), "1");

        let collection = pool
            .get_directory(&config, ElementKind::QualifiedNode, "3")
            .await
            .unwrap();
        assert_eq!(collection.elements()[0].path(), "3");

        pool.close_all().await;
        provider.wait().await.unwrap();
    }

    #[tokio::test]
    async fn pool_times_out_without_matching_response() {
        let mut provider = MockProvider::bind().await;
        provider.expect(
            crate::encode_root_request(),
            // Only a deep-path answer; never the requested one.
            MockProvider::frame_response(&[
                0x60, 0x80, 0x6B, 0x80, 0xA0, 0x80, 0x6A, 0x80, //
                0xA0, 0x05, 0x0D, 0x03, 0x07, 0x07, 0x07, //
                0x00, 0x00, //
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
        );
        let config = config_for(provider.addr());
        provider.start();

        let pool = ProviderPool::new(PoolOptions {
            call_timeout: Duration::from_millis(200),
            ..PoolOptions::default()
        });
        let err = pool.get_root(&config).await.unwrap_err();
        assert!(matches!(err, Error::Timeout), "got {err:?}");

        pool.close_all().await;
        provider.wait().await.unwrap();
    }
}
