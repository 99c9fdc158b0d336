//! Outbound SSH connector
//!
//! Opens the TCP stream, runs the SSH handshake, authenticates and opens the
//! shell channel for one connect attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio::net::TcpStream;

use tether_core::config::{ConnectionConfig, EngineConfig};

use super::host_key::{AcceptAllHostKeys, HostKeyVerifier};
use super::ShellConnector;
use crate::auth::AuthNegotiator;
use crate::bridge::InboundSink;
use crate::channel::{open_shell, PtyRequest, ShellChannel};
use crate::error::ConnectError;
use crate::reactor::Reactor;

/// Connects sessions to real SSH servers
pub struct SshConnector {
    reactor: Reactor,
    pty: PtyRequest,
    verifier: Arc<dyn HostKeyVerifier>,
}

impl SshConnector {
    /// Create a connector that accepts any host key
    pub fn new(reactor: Reactor, engine: &EngineConfig) -> Self {
        Self {
            reactor,
            pty: PtyRequest::from_config(engine),
            verifier: Arc::new(AcceptAllHostKeys),
        }
    }

    /// Replace the host key verification policy
    pub fn with_verifier(mut self, verifier: Arc<dyn HostKeyVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Open the TCP stream, run the SSH handshake and authenticate, all
    /// within the connect timeout
    async fn connect_authenticated(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Handle<ClientHandler>, ConnectError> {
        let ssh_config = Arc::new(Config {
            keepalive_interval: keepalive(config.keepalive_interval),
            ..Default::default()
        });

        let host_key_rejected = Arc::new(AtomicBool::new(false));
        let handler = ClientHandler {
            host: config.host.clone(),
            port: config.port,
            verifier: Arc::clone(&self.verifier),
            rejected: Arc::clone(&host_key_rejected),
        };

        tracing::debug!("Connecting to {}", config.address());
        let attempt = async {
            let stream = open_stream(&config.host, config.port).await?;
            let mut handle = client::connect_stream(ssh_config, stream, handler).await?;

            let mut negotiator =
                AuthNegotiator::new(&config.username, config.credential.clone());
            if let Err(e) = negotiator.authenticate(&mut handle).await {
                let _ = handle
                    .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                    .await;
                return Err(e);
            }
            Ok::<_, ConnectError>(handle)
        };

        let result = tokio::time::timeout(config.connect_timeout, attempt)
            .await
            .map_err(|_| {
                ConnectError::Timeout(format!(
                    "Connection to {} timed out after {}s",
                    config.address(),
                    config.connect_timeout.as_secs()
                ))
            })?;

        // The handshake runs in the background, so a refused host key
        // surfaces as whatever error the next request hits.
        result.map_err(|e| match e {
            ConnectError::HostKeyRejected(_) => e,
            _ if host_key_rejected.load(Ordering::SeqCst) => ConnectError::HostKeyRejected(
                format!("host key for {} was not accepted", config.address()),
            ),
            _ => e,
        })
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn establish(
        &self,
        config: &ConnectionConfig,
        inbound: InboundSink,
    ) -> Result<Arc<dyn ShellChannel>, ConnectError> {
        let handle = self.connect_authenticated(config).await?;

        tracing::debug!("Authenticated to {}, opening shell", config.address());
        let channel = open_shell(handle, &self.pty, inbound, &self.reactor).await?;

        tracing::info!("Shell open on {}@{}", config.username, config.address());
        Ok(Arc::new(channel))
    }
}

/// Resolve the host and connect to the first address that accepts
async fn open_stream(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::Unreachable(format!("Failed to resolve {}: {}", host, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                }
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => ConnectError::from(e),
        None => ConnectError::Unreachable(format!("{} resolved to no addresses", host)),
    })
}

/// Keepalive interval for the SSH client; zero disables keepalives
fn keepalive(interval: Duration) -> Option<Duration> {
    (!interval.is_zero()).then_some(interval)
}

/// russh client callbacks for one connection
struct ClientHandler {
    host: String,
    port: u16,
    verifier: Arc<dyn HostKeyVerifier>,
    rejected: Arc<AtomicBool>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key for {}: {}", self.host, fingerprint);
        let trusted = self.verifier.verify(&self.host, self.port, &fingerprint);
        if !trusted {
            self.rejected.store(true, Ordering::SeqCst);
        }
        Ok(trusted)
    }
}
