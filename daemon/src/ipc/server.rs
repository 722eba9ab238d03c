//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! engine events and session commands to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapter::AdapterEvent;
use crate::engine::VoiceCommandEngine;
use crate::error::EngineError;
use crate::events::EngineEvent;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared by all client handlers
struct ServerContext {
    engine: VoiceCommandEngine,
    /// Feeds the engine's single-consumer event loop
    adapter_tx: mpsc::Sender<AdapterEvent>,
    notify_tx: broadcast::Sender<Notification>,
    start_time: Instant,
}

impl Server {
    /// Bind the socket and create a server for `engine`
    pub fn bind(
        socket_path: &Path,
        engine: VoiceCommandEngine,
        adapter_tx: mpsc::Sender<AdapterEvent>,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context: Arc::new(ServerContext {
                engine,
                adapter_tx,
                notify_tx,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = loop {
            let request = match read_frame::<_, Request>(&mut reader).await {
                Ok(Some(Ok(request))) => request,
                Ok(Some(Err(e))) => {
                    warn!(%e, "malformed request");
                    let response = Response::error("invalid_request", e.to_string());
                    if let Err(e) = write_frame(&mut *writer.lock().await, &response).await {
                        break Err(e);
                    }
                    continue;
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            debug!(?request, "received request");

            // Subscribe before answering so no notification slips between
            let notifications = matches!(request, Request::Subscribe)
                .then(|| context.notify_tx.subscribe());

            let response = Self::process_request(request, &context).await;
            if let Err(e) = write_frame(&mut *writer.lock().await, &response).await {
                break Err(e);
            }

            if let Some(rx) = notifications {
                if forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(tokio::spawn(forward_notifications(rx, Arc::clone(&writer))));
                }
            }
        };

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        let engine = &context.engine;
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let uptime_secs = context.start_time.elapsed().as_secs();
                Response::Status(DaemonStatus::from_snapshot(engine.snapshot(), uptime_secs))
            }

            Request::Start => match engine.start() {
                Ok(started) => {
                    if !started {
                        debug!("start via IPC ignored, session already active");
                    }
                    Response::Ok
                }
                Err(e) => engine_error_response(e),
            },

            Request::Stop => {
                engine.stop();
                Response::Ok
            }

            Request::Reset => {
                engine.reset();
                Response::Ok
            }

            Request::SetAutoRestart { enabled } => {
                engine.set_auto_restart(enabled);
                Response::Ok
            }

            Request::AdapterEvent(event) => match context.adapter_tx.send(event).await {
                Ok(()) => Response::Ok,
                Err(_) => Response::error("engine_stopped", "engine event loop is not running"),
            },

            Request::Recognize { text } => Response::Recognized {
                result: engine.recognize(&text).result,
            },

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn engine_error_response(err: EngineError) -> Response {
    let code = match err {
        EngineError::ShutDown => "engine_shut_down",
        EngineError::Adapter(_) => "adapter_unavailable",
        EngineError::InvalidPatterns(_) => "engine_error",
    };
    Response::error(code, err.to_string())
}

/// Republish engine events to IPC subscribers until the engine goes away
pub async fn relay_engine_events(
    mut event_rx: broadcast::Receiver<EngineEvent>,
    notify_tx: broadcast::Sender<Notification>,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                let _ = notify_tx.send(Notification::EngineEvent(event));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "engine event relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_notifications(
    mut rx: broadcast::Receiver<Notification>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
) {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                if let Err(e) = write_frame(&mut *writer.lock().await, &notification).await {
                    debug!(?e, "subscriber went away");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber lagged behind notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read one length-prefixed JSON frame.
///
/// `Ok(None)` on clean disconnect or an oversized frame; the inner
/// `Err` is a body that did not parse.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<serde_json::Result<T>>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    // Read message body
    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("truncated message body")?;

    Ok(Some(serde_json::from_slice(&msg_buf)))
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}
