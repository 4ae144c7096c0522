//! The reporter loop: keep a collector connection alive and send a registry
//! snapshot on every tick.
//!
//! ```text
//!   ┌──────► Idle ──dial──► Handshaking ──ok,ok──► Streaming ──tick──► send
//!   │          │ fail            │ fail                 │ write fail
//!   └─sleep─ Backoff ◄───────────┴──────────────────────┘
//! ```
//!
//! Every failure is logged and retried after a constant delay, forever,
//! unless the shutdown signal fires (or the token is rejected and
//! `retry_on_auth_failure` is off).

use std::sync::Arc;

use instrumental_metrics::MetricSource;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ReporterConfig;
use crate::connection::{self, Streaming};
use crate::encoder;
use crate::error::ReporterResult;
use crate::greeting::Greeting;
use crate::transport::{Dialer, TcpDialer};

/// Where the connection state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    /// About to dial.
    Idle,
    /// Dialed; exchanging `hello` and `authenticate`.
    Handshaking,
    /// Handshake done; sending on every tick.
    Streaming,
    /// Waiting out the retry delay after a failure.
    Backoff,
    /// The loop has exited.
    Stopped,
}

/// Periodically streams a [`MetricSource`] to an Instrumental collector.
pub struct Reporter<D = TcpDialer> {
    config: ReporterConfig,
    greeting: Greeting,
    source: Arc<dyn MetricSource + Send + Sync>,
    dialer: D,
    state: watch::Sender<ReporterState>,
}

impl Reporter<TcpDialer> {
    /// Create a reporter that dials the collector over TCP.
    ///
    /// `greeting` is computed once by the caller and reused for every
    /// reconnect.
    pub fn new(
        config: ReporterConfig,
        greeting: Greeting,
        source: Arc<dyn MetricSource + Send + Sync>,
    ) -> ReporterResult<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ReporterState::Idle);
        Ok(Self {
            config,
            greeting,
            source,
            dialer: TcpDialer,
            state,
        })
    }
}

impl<D: Dialer> Reporter<D> {
    /// Swap the transport, e.g. for an in-memory stream in tests.
    pub fn with_dialer<D2: Dialer>(self, dialer: D2) -> Reporter<D2> {
        Reporter {
            config: self.config,
            greeting: self.greeting,
            source: self.source,
            dialer,
            state: self.state,
        }
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    pub fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReporterState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` flips (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            addr = %self.config.addr,
            prefix = %self.config.prefix,
            interval = ?self.config.interval,
            "instrumental reporter started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.connect_and_stream(&mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        addr = %self.config.addr,
                        kind = %e.kind(),
                        error = %e,
                        "instrumental connection failed"
                    );
                    if e.is_auth_rejection() && !self.config.retry_on_auth_failure {
                        error!(addr = %self.config.addr, "collector rejected the token; giving up");
                        break;
                    }
                }
            }

            self.set_state(ReporterState::Backoff);
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(ReporterState::Stopped);
        info!("instrumental reporter stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> ReporterHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.subscribe();
        let handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        ReporterHandle {
            shutdown_tx,
            state,
            handle,
        }
    }

    /// One connection lifetime. `Ok` only when shutdown was requested.
    async fn connect_and_stream(&self, shutdown: &mut watch::Receiver<bool>) -> ReporterResult<()> {
        self.set_state(ReporterState::Idle);

        let conn = tokio::select! {
            res = self.establish() => res?,
            _ = shutdown.changed() => return Ok(()),
        };
        info!(addr = %self.config.addr, "connected to collector");

        self.stream(conn, shutdown).await
    }

    async fn establish(&self) -> ReporterResult<Streaming<D::Stream>> {
        let conn =
            connection::dial(&self.dialer, &self.config.addr, self.config.dial_timeout).await?;
        self.set_state(ReporterState::Handshaking);
        conn.handshake(&self.greeting, &self.config.token, self.config.handshake_timeout)
            .await
    }

    async fn stream(
        &self,
        mut conn: Streaming<D::Stream>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReporterResult<()> {
        self.set_state(ReporterState::Streaming);

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let lines = encoder::encode(
                        self.source.as_ref(),
                        &self.config.prefix,
                        encoder::unix_now(),
                    );
                    if let Err(e) = conn.send(&lines, self.config.write_timeout).await {
                        debug!(peer_closed = conn.peer_closed(), "metric write failed");
                        return Err(e);
                    }
                    debug!(lines = lines.len(), "metrics sent");
                }
                _ = shutdown.changed() => {
                    conn.close(self.config.write_timeout).await;
                    return Ok(());
                }
            }
        }
    }

    fn set_state(&self, next: ReporterState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "reporter state");
        }
    }
}

/// Owner's handle to a spawned reporter.
pub struct ReporterHandle {
    shutdown_tx: watch::Sender<bool>,
    state: watch::Receiver<ReporterState>,
    handle: JoinHandle<()>,
}

impl ReporterHandle {
    pub fn state(&self) -> ReporterState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReporterState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "reporter task ended abnormally");
        }
    }
}
