//! Transport connector
//!
//! Turns a [`ConnectionConfig`] into a live shell: stream connection,
//! transport handshake, authentication and channel setup.

mod connector;
mod host_key;

pub use connector::SshConnector;
pub use host_key::{AcceptAllHostKeys, HostKeyVerifier, PinnedHostKeys};

use std::sync::Arc;

use async_trait::async_trait;

use tether_core::config::ConnectionConfig;

use crate::bridge::InboundSink;
use crate::channel::ShellChannel;
use crate::error::ConnectError;

/// Establishes shells for sessions
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Connect, authenticate and open a shell.
    ///
    /// Inbound output is pushed to `inbound`; its inactive notification fires
    /// when the shell's channel closes.
    async fn establish(
        &self,
        config: &ConnectionConfig,
        inbound: InboundSink,
    ) -> Result<Arc<dyn ShellChannel>, ConnectError>;
}
