//! Connection session
//!
//! One tokio task owns the transport. Callers talk to it through a cloneable
//! [`SessionHandle`]: submissions travel over an mpsc channel (so concurrent
//! callers are serialized in arrival order) and each carries a oneshot for
//! its result. The task applies inbound frames and submissions to the
//! [`Dispatcher`] one at a time and writes whatever bytes it asks for.
//!
//! Any [`Desync`] or transport failure ends the task: every outstanding
//! operation is failed and the status moves to `ConnectionFailure`. A new
//! session must be started to reconnect.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::codec::ViscaCodec;
use super::dispatch::{Dispatcher, Reply, RetryPolicy};
use super::message::{Command, Inquiry};
use super::params::{Answer, Options};
use super::transport::{self, Endpoint, Transport};
use super::{
    Desync, ViscaError, DEFAULT_BUFFER_FULL_RETRIES, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_REQUEST_QUEUE_DEPTH, MAX_MESSAGE_LEN,
};

/// Connection state as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Transport not yet established
    Connecting,
    /// Connected and processing messages
    Ok,
    /// Closed after a fatal condition; terminal for this session
    ConnectionFailure(String),
}

impl ConnectionStatus {
    /// True once the session has closed
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionStatus::ConnectionFailure(_))
    }
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_buffer_full_retries() -> u32 {
    DEFAULT_BUFFER_FULL_RETRIES
}

fn default_max_frame_len() -> usize {
    MAX_MESSAGE_LEN
}

fn default_request_queue_depth() -> usize {
    DEFAULT_REQUEST_QUEUE_DEPTH
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Camera address
    #[serde(default)]
    pub endpoint: Endpoint,
    /// Give up on the transport after this long
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Resends allowed for one operation after buffer-full errors
    #[serde(default = "default_buffer_full_retries")]
    pub max_buffer_full_retries: u32,
    /// Longest inbound run accepted without a terminator
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Submissions buffered ahead of the IO task
    #[serde(default = "default_request_queue_depth")]
    pub request_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_buffer_full_retries: DEFAULT_BUFFER_FULL_RETRIES,
            max_frame_len: MAX_MESSAGE_LEN,
            request_queue_depth: DEFAULT_REQUEST_QUEUE_DEPTH,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ViscaError> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| ViscaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ViscaError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ViscaError> {
        if self.max_frame_len < 3 {
            return Err(ViscaError::Config(format!(
                "max_frame_len {} is shorter than any reply",
                self.max_frame_len
            )));
        }
        if self.request_queue_depth == 0 {
            return Err(ViscaError::Config(
                "request_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_buffer_full_retries: self.max_buffer_full_retries,
        }
    }
}

/// A submission to the IO task
enum Request {
    Command {
        description: String,
        bytes: Vec<u8>,
        reply: Reply<()>,
    },
    Inquiry {
        inquiry: Inquiry,
        bytes: Vec<u8>,
        reply: Reply<Answer>,
    },
}

/// Caller-side handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Send a command and wait for its Completion
    pub async fn send_command(
        &self,
        command: &Command,
        options: &Options,
    ) -> Result<(), ViscaError> {
        // Invalid user input never reaches the wire
        let bytes = command.encode(options)?;
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Command {
            description: command.description().to_string(),
            bytes,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed_error())?
    }

    /// Send an inquiry and wait for its decoded answer
    pub async fn send_inquiry(&self, inquiry: &Inquiry) -> Result<Answer, ViscaError> {
        let bytes = inquiry.encode()?;
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Inquiry {
            inquiry: inquiry.clone(),
            bytes,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed_error())?
    }

    async fn submit(&self, request: Request) -> Result<(), ViscaError> {
        if let ConnectionStatus::ConnectionFailure(reason) = &*self.status.borrow() {
            return Err(ViscaError::Closed(reason.clone()));
        }
        self.enqueue(request).await
    }

    /// Hand a request to the IO task. The task may have closed since the
    /// status was last checked.
    async fn enqueue(&self, request: Request) -> Result<(), ViscaError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Closure error carrying the session's failure reason
    fn closed_error(&self) -> ViscaError {
        match &*self.status.borrow() {
            ConnectionStatus::ConnectionFailure(reason) => ViscaError::Closed(reason.clone()),
            _ => ViscaError::Closed(Desync::TransportClosed.to_string()),
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// A receiver that sees every later status change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Close the connection, failing everything outstanding
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the session has failed or been closed; returns the reason
    pub async fn closed(&self) -> String {
        let mut status = self.status.clone();
        loop {
            if let ConnectionStatus::ConnectionFailure(reason) = &*status.borrow_and_update() {
                return reason.clone();
            }
            if status.changed().await.is_err() {
                return Desync::TransportClosed.to_string();
            }
        }
    }
}

/// Session entry points
pub struct Session;

impl Session {
    /// Connect to the configured endpoint in the background.
    ///
    /// The handle is usable at once; submissions made while `Connecting`
    /// are buffered and sent after the transport opens.
    pub fn connect(config: SessionConfig) -> SessionHandle {
        let (handle, parts) = Self::handle(&config);
        tokio::spawn(async move {
            let timeout = Duration::from_millis(config.connect_timeout_ms);
            info!(endpoint = %config.endpoint, "connecting");
            match transport::open(&config.endpoint, timeout).await {
                Ok(stream) => run(stream, config, parts).await,
                Err(e) => {
                    error!(endpoint = %config.endpoint, %e, "connection failed");
                    parts.abandon(e.to_string());
                }
            }
        });
        handle
    }

    /// Run a session over an already-open transport
    pub fn start<T: Transport>(transport: T, config: SessionConfig) -> SessionHandle {
        let (handle, parts) = Self::handle(&config);
        tokio::spawn(run(transport, config, parts));
        handle
    }

    fn handle(config: &SessionConfig) -> (SessionHandle, TaskParts) {
        let (requests_tx, requests) = mpsc::channel(config.request_queue_depth.max(1));
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            requests: requests_tx,
            status,
            cancel: cancel.clone(),
        };
        let parts = TaskParts {
            requests,
            status: status_tx,
            cancel,
        };
        (handle, parts)
    }
}

/// The IO task's half of the channels
struct TaskParts {
    requests: mpsc::Receiver<Request>,
    status: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl TaskParts {
    /// Report failure and fail every submission still buffered
    fn abandon(mut self, reason: String) {
        self.status
            .send_replace(ConnectionStatus::ConnectionFailure(reason.clone()));
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let err = ViscaError::Closed(reason.clone());
            match request {
                Request::Command { reply, .. } => {
                    let _ = reply.send(Err(err));
                }
                Request::Inquiry { reply, .. } => {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }
}

async fn run<T: Transport>(transport: T, config: SessionConfig, mut parts: TaskParts) {
    let (reader, writer) = tokio::io::split(transport);
    let mut frames = FramedRead::new(reader, ViscaCodec::new(config.max_frame_len));
    let mut sink = FramedWrite::new(writer, ViscaCodec::new(config.max_frame_len));
    let mut dispatcher = Dispatcher::new(config.retry_policy());

    parts.status.send_replace(ConnectionStatus::Ok);
    info!(endpoint = %config.endpoint, "connection ok");

    let reason: Desync = 'io: loop {
        tokio::select! {
            biased;

            _ = parts.cancel.cancelled() => {
                debug!("session closed by host");
                break 'io Desync::TransportClosed;
            }

            frame = frames.next() => match frame {
                Some(Ok(frame)) => {
                    if let Err(desync) = dispatcher.handle_frame(frame) {
                        break 'io desync;
                    }
                }
                Some(Err(e)) => break 'io Desync::Transport(e.to_string()),
                None => break 'io Desync::TransportClosed,
            },

            request = parts.requests.recv() => match request {
                Some(Request::Command { description, bytes, reply }) => {
                    dispatcher.submit_command(description, bytes, reply);
                }
                Some(Request::Inquiry { inquiry, bytes, reply }) => {
                    dispatcher.submit_inquiry(inquiry, bytes, reply);
                }
                None => {
                    debug!("all session handles dropped");
                    break 'io Desync::TransportClosed;
                }
            },
        }

        for bytes in dispatcher.take_outbound() {
            if let Err(e) = sink.send(bytes).await {
                break 'io Desync::Transport(e.to_string());
            }
        }
    };

    let reason = reason.to_string();
    error!(%reason, "closing connection");
    // Status must read failed before any caller sees its operation fail
    parts.abandon(reason.clone());
    dispatcher.fail_all(&reason);
}
