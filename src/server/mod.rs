//! TCP front end: every accepted connection gets its own PTY bridge.
//!
//! Socket bytes are written to the bridge input; bridge output is written
//! back to the socket.

pub mod shutdown;

use std::future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::pty::{BridgeConfig, BridgeError, PtyBridge, PtyInput, PtyOutput, SpawnSpec};
use crate::server::shutdown::ShutdownManager;

const SOCKET_READ_CHUNK: usize = 1024;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}

/// Per-connection settings shared by all sessions.
#[derive(Debug, Clone)]
struct SessionSettings {
    spec: SpawnSpec,
    bridge: BridgeConfig,
    timeout: Option<Duration>,
}

pub struct Server {
    addr: SocketAddr,
    listener: TcpListener,
    settings: Arc<SessionSettings>,
    drain_timeout: Duration,
    shutdown: Arc<ShutdownManager>,
}

impl Server {
    /// Bind the listener using `config`. `spec` overrides the configured
    /// command when given.
    pub async fn bind(config: &Config, spec: Option<SpawnSpec>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.server.bind_addr.as_str()).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {}", addr);

        let settings = SessionSettings {
            spec: spec.unwrap_or_else(|| config.command.spawn_spec()),
            bridge: BridgeConfig::from(&config.bridge),
            timeout: config.server.session_timeout(),
        };

        Ok(Self {
            addr,
            listener,
            settings: Arc::new(settings),
            drain_timeout: config.server.drain_timeout(),
            shutdown: Arc::new(ShutdownManager::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown_handle(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown is signaled, then wait (bounded)
    /// for open sessions to finish.
    pub async fn run(self) -> io::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let settings = Arc::clone(&self.settings);
                        let shutdown = Arc::clone(&self.shutdown);
                        tokio::spawn(serve_connection(stream, peer, settings, shutdown));
                    }
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
            }
        }

        drop(self.listener);
        self.shutdown.wait_for_sessions(self.drain_timeout).await;
        Ok(())
    }
}

enum SessionEnd {
    ClientClosed,
    PtyClosed,
    TimedOut,
    Shutdown,
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    settings: Arc<SessionSettings>,
    shutdown: Arc<ShutdownManager>,
) {
    shutdown.increment_sessions();
    scopeguard::defer! {
        shutdown.decrement_sessions();
    }

    let mut bridge = match PtyBridge::spawn_with(&settings.spec, settings.bridge) {
        Ok(bridge) => bridge,
        Err(e) => {
            tracing::warn!(%peer, "Could not start session: {}", e);
            return;
        }
    };
    let session = bridge.id();
    tracing::info!(%peer, %session, "Session opened");

    let Some(output) = bridge.take_output() else {
        return;
    };
    let (reader, writer) = stream.into_split();
    let mut pump_out = tokio::spawn(pump_output(output, writer));
    let deadline = async {
        match settings.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => future::pending().await,
        }
    };

    let end = tokio::select! {
        _ = pump_input(reader, bridge.input()) => SessionEnd::ClientClosed,
        _ = &mut pump_out => SessionEnd::PtyClosed,
        _ = deadline => SessionEnd::TimedOut,
        _ = shutdown.wait() => SessionEnd::Shutdown,
    };

    match end {
        SessionEnd::ClientClosed => tracing::info!(%peer, %session, "Client closed"),
        SessionEnd::PtyClosed => tracing::info!(%peer, %session, "PTY closed"),
        SessionEnd::TimedOut => tracing::info!(%peer, %session, "Session timed out"),
        SessionEnd::Shutdown => tracing::debug!(%peer, %session, "Closing session for shutdown"),
    }

    bridge.close().await;
    if !matches!(end, SessionEnd::PtyClosed) {
        if let Err(e) = pump_out.await {
            tracing::debug!(%session, "Output pump ended abnormally: {}", e);
        }
    }
    tracing::info!(%peer, %session, status = %bridge.status(), "Session finished");
}

/// Socket -> PTY. Returns when the client stops sending or the session
/// closes.
async fn pump_input(mut reader: OwnedReadHalf, input: PtyInput) {
    let mut buf = [0u8; SOCKET_READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("Socket read failed: {}", e);
                return;
            }
        };
        match input.write(&buf[..n]).await {
            Ok(()) => {}
            Err(BridgeError::NotRunning) => return,
            Err(e) => {
                tracing::warn!("PTY write failed: {}", e);
                return;
            }
        }
    }
}

/// PTY -> socket. Ends when the session ends or the socket fails.
async fn pump_output(mut output: PtyOutput, mut writer: OwnedWriteHalf) {
    while let Some(item) = output.next_chunk().await {
        match item {
            Ok(chunk) => {
                if let Err(e) = writer.write_all(&chunk).await {
                    tracing::debug!("Socket write failed: {}", e);
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("PTY closed with error: {}", e);
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}
