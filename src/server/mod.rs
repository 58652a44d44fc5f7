//! Proxy server: startup and dispatch loop
//!
//! One task runs the accept loop; every accepted socket becomes a pipeline
//! task on the worker pool. Shutdown is signal-driven: a process-wide stop
//! flag plus a broadcast channel, polled by the loop.

mod connection;
mod handler;
mod listener;
mod stats;

pub use connection::{ClientConnection, ClientStream, ConnState};
pub use handler::handle_client;
pub use listener::{bind_listener, raise_fd_limit};
pub use stats::{ServerStats, StatsSnapshot};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::config::ProxyConfig;
use crate::error::{ListenerError, ProxyError};
use crate::pool::WorkerPool;
use crate::tls::build_acceptor;

/// Handle for signaling the server to stop from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Request a graceful shutdown
    ///
    /// Idempotent: the flag flips once, repeat calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            info!("Shutdown requested");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }
}

/// The dispatch proxy server
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    pool: WorkerPool,
    stats: Arc<ServerStats>,
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
}

impl ProxyServer {
    /// Initialize the server: fd limit, listener, TLS, worker pool
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` on any initialization failure; all of them are
    /// fatal (exit code 1).
    pub fn bind(config: ProxyConfig) -> Result<Self, ProxyError> {
        raise_fd_limit(config.ulimit)?;

        let listener = bind_listener(config.port)?;

        let tls_acceptor = if config.use_https {
            Some(build_acceptor(&config)?)
        } else {
            None
        };

        let pool = WorkerPool::new(config.workers);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            listener,
            tls_acceptor,
            pool,
            stats: Arc::new(ServerStats::new()),
            shutdown_tx,
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Actual bound address (differs from the config when port 0 was used)
    ///
    /// # Errors
    ///
    /// Returns `ListenerError` if the socket is gone.
    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.listener.local_addr().map_err(ListenerError::IoError)
    }

    /// Shared statistics
    #[must_use]
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// A handle for requesting shutdown (from the signal watcher)
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Log the startup banner
    fn log_startup(&self) {
        let config = &self.config;
        info!(
            version = crate::VERSION,
            mode = config.mode(),
            port = config.port,
            workers = config.workers,
            buffer_size = config.buffer_size,
            "multiflow-proxy running"
        );

        if config.ssh_only {
            info!(ssh_port = config.ssh_port, "Mode: SSH only");
        } else {
            info!(
                ssh_port = config.ssh_port,
                openvpn_port = config.openvpn_port,
                v2ray_port = config.v2ray_port,
                upstream_host = %config.remote_host,
                "Upstream dispatch table"
            );
        }
    }

    /// Run the dispatch loop until shutdown
    ///
    /// Consumes the server. On return the listener is closed, the worker pool
    /// is joined (in-flight bridges ran to their natural end), and final
    /// statistics are logged.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError` only for unrecoverable listener failures;
    /// transient accept errors re-enter the loop.
    pub async fn run(self) -> Result<(), ProxyError> {
        self.log_startup();

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            // The flag covers a shutdown requested before this subscriber
            // existed; the channel covers one requested mid-wait.
            if self.stopping.load(Ordering::SeqCst) {
                info!("Dispatch loop stopping");
                break;
            }

            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.dispatch(stream, peer_addr);
                        }
                        Err(e) => {
                            let err = ListenerError::AcceptError(e.to_string());
                            if err.is_recoverable() {
                                warn!(error = %err, "Recoverable accept error");
                                continue;
                            }
                            error!(error = %err, "Fatal accept error");
                            self.pool.stop().await;
                            return Err(err.into());
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Dispatch loop stopping");
                    break;
                }
            }
        }

        // Listener drops here; bridges already submitted drain naturally
        drop(self.listener);
        self.pool.stop().await;

        let snap = self.stats.snapshot();
        info!(
            accepted = snap.accepted,
            completed = snap.completed,
            failed = snap.failed,
            bytes_up = snap.bytes_up,
            bytes_down = snap.bytes_down,
            "Server stopped"
        );

        Ok(())
    }

    /// Submit one accepted socket to the worker pool
    fn dispatch(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let config = Arc::clone(&self.config);
        let tls_acceptor = self.tls_acceptor.clone();
        let stats = Arc::clone(&self.stats);

        let submitted = self.pool.submit(async move {
            handle_client(stream, peer_addr, config, tls_acceptor, stats).await;
        });

        if !submitted {
            warn!(client = %peer_addr, "Worker pool stopped, dropping connection");
        }
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("port", &self.config.port)
            .field("mode", &self.config.mode())
            .field("workers", &self.pool.size())
            .finish()
    }
}
