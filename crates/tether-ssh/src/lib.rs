//! tether-ssh: Interactive SSH shell sessions
//!
//! The engine connects to SSH servers, authenticates with a single
//! credential, opens a PTY-backed shell and exposes it as an ordered output
//! stream plus write/resize calls. Sessions recover through a bounded
//! reconnect campaign with exponential backoff and are tracked in a
//! [`SessionRegistry`].

pub mod auth;
pub mod bridge;
pub mod channel;
pub mod error;
pub mod reactor;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod transport;

pub use auth::{AuthMethods, AuthNegotiator, AuthOffer};
pub use bridge::{data_bridge, InboundSink, OutputStream, StreamEnd};
pub use channel::{ChannelError, ShellChannel};
pub use error::{ConnectError, EngineError};
pub use reactor::{Reactor, ReactorRuntime};
pub use reconnect::ReconnectPolicy;
pub use registry::SessionRegistry;
pub use session::Session;
pub use transport::{AcceptAllHostKeys, HostKeyVerifier, PinnedHostKeys, ShellConnector, SshConnector};
