// MIT License

//! One shared connection per bridge host.
//!
//! A `BridgeConnection` bundles the session with its dispatcher and owns the
//! two background loops: the read loop that pulls events off the wire and
//! fans them out, and the keepalive loop that pings on an interval. Every
//! adapter multiplexing over the host shares this one object via the
//! registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::dispatch::{Dispatcher, EventSubscriber, SubscriptionHandle};
use crate::error::Result;
use crate::session::{ConnectParams, Connector, Session, SessionState, TcpConnector};

pub struct BridgeConnection<C: Connector = TcpConnector> {
    config: BridgeConfig,
    session: Arc<Session<C>>,
    dispatcher: Arc<Dispatcher>,
    opened: Mutex<bool>,
    started: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl BridgeConnection<TcpConnector> {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_connector(TcpConnector, config)
    }
}

impl<C: Connector> BridgeConnection<C> {
    pub fn with_connector(connector: C, config: BridgeConfig) -> Self {
        Self {
            config,
            session: Arc::new(Session::with_connector(connector)),
            dispatcher: Arc::new(Dispatcher::new()),
            opened: Mutex::new(false),
            started: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Open the underlying session.
    ///
    /// Idempotent: every adapter sharing this connection calls it during
    /// setup and only the first dials out. Stream loss later does not reset
    /// this; the read loop reopens the session in place.
    pub async fn open(&self) -> Result<()> {
        let mut opened = self.opened.lock().await;
        if *opened {
            return Ok(());
        }
        self.session.open(ConnectParams::from(&self.config)).await?;
        *opened = true;
        Ok(())
    }

    /// Launch the read loop and keepalive loop. Idempotent; the loops run
    /// until this connection is dropped.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting loops for bridge {}", self.config.host);
        let reader = tokio::spawn(read_loop(
            self.session.clone(),
            self.dispatcher.clone(),
            self.config.clone(),
        ));
        let keepalive = tokio::spawn(keepalive_loop(
            self.session.clone(),
            self.config.keepalive_interval_secs,
        ));
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(reader);
            tasks.push(keepalive);
        }
    }

    /// See [`Session::write_command`]. Declined (false) while not open.
    pub async fn write_command(
        &self,
        mode: &str,
        integration_id: u32,
        action: impl Into<u32>,
        value: f64,
        extras: &[Option<String>],
    ) -> Result<bool> {
        self.session
            .write_command(mode, integration_id, action, value, extras)
            .await
    }

    /// See [`Session::query`]. Declined (false) while not open.
    pub async fn query(
        &self,
        mode: &str,
        integration_id: u32,
        action: impl Into<u32>,
    ) -> Result<bool> {
        self.session.query(mode, integration_id, action).await
    }

    /// Subscribe to every event this connection reads.
    pub async fn register<S: EventSubscriber + 'static>(
        &self,
        subscriber: &Arc<S>,
    ) -> SubscriptionHandle {
        self.dispatcher.register(subscriber).await
    }

    pub async fn unregister(&self, handle: SubscriptionHandle) {
        self.dispatcher.unregister(handle).await
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.state().await
    }
}

impl<C: Connector> Drop for BridgeConnection<C> {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Perpetual read loop: pull events off the session and fan each one out,
/// sequentially, before reading the next. An empty cycle against a healthy
/// session continues immediately (the session blocks on the socket, so this
/// does not spin); an empty cycle against a closed session means the
/// in-place reconnect just failed, and the loop backs off with a capped
/// exponential delay before trying again.
async fn read_loop<C: Connector>(
    session: Arc<Session<C>>,
    dispatcher: Arc<Dispatcher>,
    config: BridgeConfig,
) {
    let mut failures: u32 = 0;
    loop {
        match session.read_event().await {
            Some(event) => {
                failures = 0;
                debug!("Event from {}: {:?}", config.host, event);
                dispatcher.dispatch(&event).await;
            }
            None => {
                if session.state().await == SessionState::Opened {
                    // Dropped line, or a reconnect that already succeeded
                    failures = 0;
                    continue;
                }
                let delay = config.reconnect_delay_ms << failures.min(config.max_backoff_shift);
                failures = failures.saturating_add(1);
                debug!(
                    "Session to {} is closed, next attempt in {}ms",
                    config.host, delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

/// Perpetual keepalive: ping on the configured interval. A declined ping
/// (session not open) is absorbed; the read loop owns recovery.
async fn keepalive_loop<C: Connector>(session: Arc<Session<C>>, interval_secs: u64) {
    loop {
        sleep(Duration::from_secs(interval_secs)).await;
        match session.ping().await {
            Ok(true) => debug!("Keepalive sent"),
            Ok(false) => debug!("Keepalive skipped, session not open"),
            Err(e) => debug!("Keepalive write failed: {}", e),
        }
    }
}
