//! An in-process transport that serves an [`Api`] to a [`Client`].
//!
//! [`serve`] spawns a server task that owns the served builder and returns a
//! [`LoopbackProtocol`] speaking to it over channels of JSON frames. Nothing
//! but bytes crosses the boundary, so clients observe exactly what a network
//! transport would deliver: results are serialized and failures arrive as
//! their exposed projection.
//!
//! # Request flow
//!
//! 1. [`Protocol::closer`] assigns the request a fresh echo id.
//! 2. A one-shot channel keyed on that id is registered in the pending map.
//! 3. The request frame is sent to the server task.
//! 4. The server routes the served builder along the path, closes it with
//!    the data and answers with a response frame carrying the same echo id.
//! 5. The client's reader task hands the response to the waiting one-shot.
//!
//! ```rust,ignore
//! let (protocol, server) = loopback::serve(api, LoopbackConfig::default());
//! let client = Client::new(protocol);
//! assert!(client.connected());
//! let value = client.route("users").close(()).await?;
//! server.shutdown().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use tether_api::{Api, Link, Protocol};
use tether_core::{Error, ErrorKind, Path, Result, Value};

use crate::frame::{RequestFrame, ResponseFrame};

/// Tuning knobs of the loopback transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// How long a close waits for its response.
    pub request_timeout: Duration,
    /// Capacity of the request and response channels.
    pub channel_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

/// Serves `api` and returns a protocol connected to it.
///
/// Must be called from within a tokio runtime.
pub fn serve(api: Api, config: LoopbackConfig) -> (LoopbackProtocol, ServerHandle) {
    let capacity = config.channel_capacity.max(1);
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (response_tx, response_rx) = mpsc::channel(capacity);
    let token = CancellationToken::new();

    let shared = Arc::new(Shared {
        pending: Mutex::new(HashMap::new()),
        connection: Mutex::new(Connection {
            open: true,
            link: None,
        }),
    });

    let server = tokio::spawn(run_server(api, request_rx, response_tx, token.clone()));
    tokio::spawn(run_reader(response_rx, Arc::clone(&shared)));
    debug!(capacity, timeout = ?config.request_timeout, "Loopback server started");

    let protocol = LoopbackProtocol {
        requests: request_tx,
        shared,
        echo_counter: AtomicU64::new(1),
        request_timeout: config.request_timeout,
    };
    let handle = ServerHandle {
        token,
        task: Some(server),
    };
    (protocol, handle)
}

// =============================================================================
// Server side
// =============================================================================

/// Controls a running loopback server.
pub struct ServerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the server and waits for it to wind down. In-flight requests
    /// are abandoned; their callers observe a disconnect.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "Loopback server task failed");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_server(
    api: Api,
    mut requests: mpsc::Receiver<Vec<u8>>,
    responses: mpsc::Sender<Vec<u8>>,
    token: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = finished {
                    warn!(error = %err, "Loopback request task failed");
                }
            }
            request = requests.recv() => {
                let Some(bytes) = request else { break };
                in_flight.spawn(handle_request(api.clone(), bytes, responses.clone()));
            }
        }
    }

    in_flight.abort_all();
    debug!("Loopback server stopped");
}

async fn handle_request(api: Api, bytes: Vec<u8>, responses: mpsc::Sender<Vec<u8>>) {
    let request: RequestFrame = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "Dropping malformed loopback request");
            return;
        }
    };

    let echo = request.echo;
    let result = match request.path() {
        Ok(path) => api.route_all(path.iter().cloned()).close(request.data()).await,
        Err(err) => Err(err.expose()),
    };
    trace!(echo, ok = result.is_ok(), "Loopback request handled");

    let response = ResponseFrame::new(echo, result);
    let sent = match serde_json::to_vec(&response) {
        Ok(bytes) => responses.send(bytes).await.is_ok(),
        Err(err) => {
            warn!(echo, error = %err, "Failed to encode loopback response");
            true
        }
    };
    if !sent {
        debug!(echo, "Loopback client went away before the response");
    }
}

// =============================================================================
// Client side
// =============================================================================

struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    connection: Mutex<Connection>,
}

/// Whether the server is still reachable, and the link to report it on.
struct Connection {
    open: bool,
    link: Option<Link>,
}

impl Shared {
    fn on_response(&self, response: ResponseFrame) {
        let echo = response.echo;
        let waiter = self.pending.lock().remove(&echo);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response.into_result());
            }
            None => warn!(echo, "Received loopback response for unknown echo (timed out?)"),
        }
    }

    fn on_disconnect(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            debug!(
                count = pending.len(),
                "Clearing pending loopback calls due to disconnect"
            );
        }
        drop(pending);

        let mut connection = self.connection.lock();
        connection.open = false;
        if let Some(link) = &connection.link {
            link.set_connected(false);
        }
    }
}

async fn run_reader(mut responses: mpsc::Receiver<Vec<u8>>, shared: Arc<Shared>) {
    while let Some(bytes) = responses.recv().await {
        match serde_json::from_slice::<ResponseFrame>(&bytes) {
            Ok(response) => shared.on_response(response),
            Err(err) => warn!(error = %err, "Dropping malformed loopback response"),
        }
    }
    shared.on_disconnect();
}

/// The client half of a loopback transport. See [`serve`].
pub struct LoopbackProtocol {
    requests: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
    echo_counter: AtomicU64,
    request_timeout: Duration,
}

#[async_trait]
impl Protocol for LoopbackProtocol {
    async fn closer(&self, path: Path, data: Value) -> Result<Value> {
        let echo = self.echo_counter.fetch_add(1, Ordering::SeqCst);
        let request = serde_json::to_vec(&RequestFrame::new(echo, &path, &data)?)?;

        // Register before sending so a fast response cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(echo, tx);

        trace!(echo, path = %path, "Sending loopback request");
        if self.requests.send(request).await.is_err() {
            self.shared.pending.lock().remove(&echo);
            return Err(ErrorKind::Disconnected.into());
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(ErrorKind::Disconnected.into()),
            Err(_) => {
                self.shared.pending.lock().remove(&echo);
                Err(Error::new(ErrorKind::Timeout(self.request_timeout)))
            }
        }
    }

    fn init(&self, link: &Link) {
        let mut connection = self.shared.connection.lock();
        link.set_connected(connection.open);
        connection.link = Some(link.clone());
    }
}
