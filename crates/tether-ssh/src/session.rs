//! Session state machine
//!
//! A [`Session`] owns one shell link at a time and drives it through
//! `idle -> connecting -> connected`, with `reconnecting(n)` retries on a
//! backoff schedule and `failed`/`disconnected` as resting states.
//!
//! State lives in a `watch` channel. Every transition is a compare-and-set
//! through `send_if_modified`, so a remote close racing an explicit
//! `close()` produces a single transition. `connect`/`reconnect` are
//! serialized by an async mutex; `close` never waits on it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tether_core::config::{ConnectionConfig, EngineConfig};
use tether_core::{ConnectionId, SessionError, SessionId, SessionState, TerminalSize};

use crate::bridge::{data_bridge, InboundSink, OutputStream};
use crate::channel::ShellChannel;
use crate::error::EngineError;
use crate::reactor::Reactor;
use crate::reconnect::ReconnectPolicy;
use crate::transport::ShellConnector;

/// The live link of one connection generation
struct Link {
    epoch: u64,
    channel: Arc<dyn ShellChannel>,
    inbound: InboundSink,
    output: Option<OutputStream>,
}

impl Link {
    async fn shutdown(self) {
        self.inbound.finish();
        self.channel.close().await;
    }
}

struct SessionCore {
    id: SessionId,
    connection_id: ConnectionId,
    config: ConnectionConfig,
    connector: Arc<dyn ShellConnector>,
    reactor: Reactor,
    policy: ReconnectPolicy,
    inbound_capacity: usize,

    state: watch::Sender<SessionState>,
    attempt: AtomicU32,
    /// Connection generation; bumped on every connect attempt
    epoch: AtomicU64,
    closed: CancellationToken,
    lifecycle: tokio::sync::Mutex<()>,
    link: Mutex<Option<Link>>,
}

impl SessionCore {
    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `next` unless the session was closed. Returns whether the
    /// state changed.
    fn transition(&self, next: impl FnOnce(&SessionState) -> Option<SessionState>) -> bool {
        self.state.send_if_modified(|state| {
            if self.closed.is_cancelled() {
                return false;
            }
            match next(state) {
                Some(new_state) if new_state != *state => {
                    tracing::debug!("Session {}: {} -> {}", self.id, state, new_state);
                    *state = new_state;
                    true
                }
                _ => false,
            }
        })
    }

    fn closed_error() -> SessionError {
        SessionError::unknown("Session closed")
    }

    async fn teardown_link(&self) {
        let link = self.lock_link().take();
        if let Some(link) = link {
            tracing::debug!("Tearing down link generation {} of session {}", link.epoch, self.id);
            link.shutdown().await;
        }
    }

    /// The channel of connection generation `epoch` stopped on its own
    fn channel_inactive(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Ignoring inactive notification from stale link {}", epoch);
            return;
        }

        let disconnected = self.transition(|state| {
            state
                .is_connected()
                .then_some(SessionState::Disconnected)
        });
        if !disconnected {
            return;
        }

        tracing::info!("Session {} disconnected by the remote end", self.id);

        let channel = self
            .lock_link()
            .as_ref()
            .filter(|link| link.epoch == epoch)
            .map(|link| Arc::clone(&link.channel));
        if let Some(channel) = channel {
            self.reactor.spawn(async move { channel.close().await });
        }
    }
}

/// One interactive shell session
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    pub fn new(
        connection_id: ConnectionId,
        config: ConnectionConfig,
        connector: Arc<dyn ShellConnector>,
        reactor: Reactor,
        engine: &EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            core: Arc::new(SessionCore {
                id: SessionId::new(),
                connection_id,
                config,
                connector,
                reactor,
                policy: ReconnectPolicy::from_config(&engine.reconnect),
                inbound_capacity: engine.inbound_capacity,
                state,
                attempt: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                closed: CancellationToken::new(),
                lifecycle: tokio::sync::Mutex::new(()),
                link: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.core.connection_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.core.config
    }

    pub fn state(&self) -> SessionState {
        self.core.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    /// Attempts made in the current reconnect campaign
    pub fn reconnect_attempt(&self) -> u32 {
        self.core.attempt.load(Ordering::SeqCst)
    }

    /// Establish the shell.
    ///
    /// A no-op when already connected. Fails once the session was closed.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let _guard = self.core.lifecycle.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<(), SessionError> {
        let core = &self.core;
        if core.closed.is_cancelled() {
            return Err(SessionCore::closed_error());
        }
        if core.state.borrow().is_connected() {
            return Ok(());
        }

        core.transition(|state| match state {
            SessionState::Reconnecting { .. } => None,
            _ => Some(SessionState::Connecting),
        });
        if core.closed.is_cancelled() {
            return Err(SessionCore::closed_error());
        }

        core.teardown_link().await;

        let epoch = core.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<SessionCore> = Arc::downgrade(core);
        let (inbound, output) = data_bridge(
            core.inbound_capacity,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.channel_inactive(epoch);
                }
            }),
        );

        tracing::info!(
            "Connecting session {} to {}@{}",
            core.id,
            core.config.username,
            core.config.address()
        );

        let channel = match core.connector.establish(&core.config, inbound.clone()).await {
            Ok(channel) => channel,
            Err(e) => {
                let error = SessionError::from(e);
                tracing::warn!("Session {} failed to connect: {}", core.id, error);
                inbound.finish();
                core.transition(|_| Some(SessionState::Failed(error.clone())));
                return Err(error);
            }
        };

        *core.lock_link() = Some(Link {
            epoch,
            channel,
            inbound: inbound.clone(),
            output: Some(output),
        });

        let connected = core.transition(|state| match state {
            SessionState::Connecting | SessionState::Reconnecting { .. } => {
                Some(SessionState::Connected)
            }
            _ => None,
        });
        if !connected {
            // Closed while the handshake was in flight
            core.teardown_link().await;
            return Err(SessionCore::closed_error());
        }

        core.attempt.store(0, Ordering::SeqCst);
        tracing::info!("Session {} connected", core.id);

        // The channel may have closed before the link was installed
        if inbound.is_terminated() {
            core.channel_inactive(epoch);
        }
        Ok(())
    }

    /// Retry the connection after the backoff delay for the next attempt.
    ///
    /// Once the attempt cap is reached the session settles in
    /// `failed(timeout)` without touching the network.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let _guard = self.core.lifecycle.lock().await;
        let core = &self.core;
        if core.closed.is_cancelled() {
            return Err(SessionCore::closed_error());
        }

        let attempt = core.attempt.load(Ordering::SeqCst) + 1;
        if !core.policy.allows(attempt) {
            let error = SessionError::timeout("Max reconnect attempts exceeded");
            tracing::warn!(
                "Session {} gave up after {} reconnect attempts",
                core.id,
                core.policy.max_attempts()
            );
            core.transition(|_| Some(SessionState::Failed(error.clone())));
            return Err(error);
        }

        core.attempt.store(attempt, Ordering::SeqCst);
        core.transition(|_| Some(SessionState::Reconnecting { attempt }));

        let delay = core.policy.delay_for(attempt);
        tracing::info!(
            "Reconnecting session {} in {:?} (attempt {}/{})",
            core.id,
            delay,
            attempt,
            core.policy.max_attempts()
        );

        tokio::select! {
            _ = core.closed.cancelled() => return Err(SessionCore::closed_error()),
            _ = tokio::time::sleep(delay) => {}
        }

        core.teardown_link().await;
        self.connect_locked().await
    }

    /// Send bytes to the remote shell
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<(), EngineError> {
        let channel = self.connected_channel().ok_or(EngineError::NotConnected)?;
        channel.write(data.into()).await?;
        Ok(())
    }

    /// Resize the remote PTY. Ignored unless connected with both dimensions
    /// non-zero.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), EngineError> {
        let size = TerminalSize::new(cols, rows);
        if !size.is_valid() {
            return Ok(());
        }
        match self.connected_channel() {
            Some(channel) => Ok(channel.resize(size).await?),
            None => Ok(()),
        }
    }

    /// Close the session. Idempotent.
    pub async fn close(&self) {
        let core = &self.core;
        core.closed.cancel();

        let changed = core.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                return false;
            }
            *state = SessionState::Disconnected;
            true
        });
        if changed {
            tracing::info!("Session {} closed", core.id);
        }

        core.teardown_link().await;
    }

    /// Take the output stream of the current connection.
    ///
    /// Each connection hands out its stream once.
    pub fn output_stream(&self) -> Option<OutputStream> {
        self.core
            .lock_link()
            .as_mut()
            .and_then(|link| link.output.take())
    }

    fn connected_channel(&self) -> Option<Arc<dyn ShellChannel>> {
        if !self.core.state.borrow().is_connected() {
            return None;
        }
        self.core
            .lock_link()
            .as_ref()
            .map(|link| Arc::clone(&link.channel))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.core.id)
            .field("connection_id", &self.core.connection_id)
            .field("state", &*self.core.state.borrow())
            .finish()
    }
}
