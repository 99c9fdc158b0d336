//! Session registry

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::watch;

use tether_core::config::{ConnectionConfig, ConnectionProfile, EngineConfig};
use tether_core::secrets::{resolve_credential, SecretStore};
use tether_core::{ConnectionId, SessionError, SessionId, SessionState};

use crate::bridge::OutputStream;
use crate::error::EngineError;
use crate::reactor::Reactor;
use crate::session::Session;
use crate::transport::{ShellConnector, SshConnector};

/// Tracks all open sessions and routes calls to them
pub struct SessionRegistry {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, Session>,
    connector: Arc<dyn ShellConnector>,
    reactor: Reactor,
    engine: EngineConfig,
}

impl SessionRegistry {
    /// Create a registry that connects through `connector`
    pub fn new(reactor: Reactor, connector: Arc<dyn ShellConnector>, engine: EngineConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            connector,
            reactor,
            engine,
        }
    }

    /// Create a registry backed by real SSH connections
    pub fn ssh(reactor: Reactor, engine: EngineConfig) -> Self {
        let connector = SshConnector::new(reactor.clone(), &engine);
        Self::new(reactor, Arc::new(connector), engine)
    }

    /// Create and connect a session.
    ///
    /// The session is only registered once it is connected.
    pub async fn open(
        &self,
        connection_id: ConnectionId,
        config: ConnectionConfig,
    ) -> Result<SessionId, SessionError> {
        let session = Session::new(
            connection_id,
            config,
            Arc::clone(&self.connector),
            self.reactor.clone(),
            &self.engine,
        );

        session.connect().await?;

        let id = session.id();
        self.sessions.insert(id, session);
        tracing::debug!("Registered session {} ({} open)", id, self.sessions.len());
        Ok(id)
    }

    /// Resolve the profile's credential and open a session for it
    pub async fn open_profile(
        &self,
        profile: &ConnectionProfile,
        secrets: &dyn SecretStore,
    ) -> Result<SessionId, SessionError> {
        let credential = resolve_credential(profile, secrets)?;
        self.open(profile.id, profile.snapshot(credential)).await
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.get(&id).map(|r| r.value().clone())
    }

    pub async fn write(&self, id: SessionId, data: impl Into<Bytes>) -> Result<(), EngineError> {
        let session = self.get(id).ok_or(EngineError::SessionNotFound(id))?;
        session.write(data).await
    }

    /// Resize a session's PTY; unknown sessions are ignored
    pub async fn resize(&self, id: SessionId, cols: u16, rows: u16) -> Result<(), EngineError> {
        match self.get(id) {
            Some(session) => session.resize(cols, rows).await,
            None => Ok(()),
        }
    }

    /// Reconnect a session; unknown sessions are ignored
    pub async fn reconnect(&self, id: SessionId) -> Result<(), SessionError> {
        match self.get(id) {
            Some(session) => session.reconnect().await,
            None => Ok(()),
        }
    }

    /// Close a session and forget it
    pub async fn close(&self, id: SessionId) {
        if let Some(session) = self.get(id) {
            session.close().await;
        }
        if self.sessions.remove(&id).is_some() {
            tracing::debug!("Removed session {} ({} open)", id, self.sessions.len());
        }
    }

    /// Close every session, one at a time
    pub async fn close_all(&self) {
        for id in self.ids() {
            self.close(id).await;
        }
    }

    /// State of a session; unknown sessions read as disconnected
    pub fn state(&self, id: SessionId) -> SessionState {
        self.get(id)
            .map(|session| session.state())
            .unwrap_or(SessionState::Disconnected)
    }

    /// Take the current connection's output stream
    pub fn output_stream(&self, id: SessionId) -> Option<OutputStream> {
        self.get(id).and_then(|session| session.output_stream())
    }

    pub fn subscribe(&self, id: SessionId) -> Option<watch::Receiver<SessionState>> {
        self.get(id).map(|session| session.subscribe())
    }

    /// IDs of all open sessions
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| *r.key()).collect()
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
