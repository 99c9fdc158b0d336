//! Scripted connector and channel for engine tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use tether_core::config::{ConnectionConfig, EngineConfig};
use tether_core::{ConnectionId, Credential, TerminalSize};
use tether_ssh::auth::AuthError;
use tether_ssh::{
    AuthMethods, AuthNegotiator, ChannelError, ConnectError, InboundSink, Reactor, SessionRegistry,
    ShellChannel, ShellConnector,
};

/// Channel that records everything sent to it
#[derive(Default)]
pub struct MockChannel {
    writes: Mutex<Vec<Bytes>>,
    resizes: Mutex<Vec<TerminalSize>>,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellChannel for MockChannel {
    async fn write(&self, data: Bytes) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::NotAvailable);
        }
        self.writes.lock().unwrap().push(data);
        Ok(())
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::NotAvailable);
        }
        self.resizes.lock().unwrap().push(size);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

/// Outcome of one scripted connect attempt
pub enum Step {
    Succeed,
    Fail(ConnectError),
}

/// Connector whose attempts follow a script.
///
/// Authentication runs through the real [`AuthNegotiator`] against the
/// methods the fake server accepts. Once the script runs out every attempt
/// succeeds.
pub struct MockConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
    server_methods: AuthMethods,
    accept_credentials: bool,
    channels: Mutex<Vec<Arc<MockChannel>>>,
    sinks: Mutex<Vec<InboundSink>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            server_methods: AuthMethods::all(),
            accept_credentials: true,
            channels: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Server that rejects every credential
    pub fn rejecting() -> Self {
        Self {
            accept_credentials: false,
            ..Self::new()
        }
    }

    /// Server that only accepts the given methods
    pub fn accepting_methods(methods: AuthMethods) -> Self {
        Self {
            server_methods: methods,
            ..Self::new()
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn push_step(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Channel opened by the `n`th successful attempt
    pub fn channel(&self, n: usize) -> Arc<MockChannel> {
        Arc::clone(&self.channels.lock().unwrap()[n])
    }

    pub fn last_channel(&self) -> Arc<MockChannel> {
        let channels = self.channels.lock().unwrap();
        Arc::clone(channels.last().expect("no channel opened"))
    }

    /// Server side of the `n`th successful attempt's output
    pub fn sink(&self, n: usize) -> InboundSink {
        self.sinks.lock().unwrap()[n].clone()
    }

    pub fn last_sink(&self) -> InboundSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .expect("no channel opened")
            .clone()
    }
}

#[async_trait]
impl ShellConnector for MockConnector {
    async fn establish(
        &self,
        config: &ConnectionConfig,
        inbound: InboundSink,
    ) -> Result<Arc<dyn ShellChannel>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Succeed);
        if let Step::Fail(e) = step {
            return Err(e);
        }

        let mut negotiator = AuthNegotiator::new(&config.username, config.credential.clone());
        match negotiator.next_offer(self.server_methods)? {
            None => return Err(AuthError::NoAcceptableMethod.into()),
            Some(_) if !self.accept_credentials => return Err(AuthError::Rejected.into()),
            Some(_) => {}
        }

        let channel = Arc::new(MockChannel::default());
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        self.sinks.lock().unwrap().push(inbound);
        Ok(channel)
    }
}

pub fn password_config() -> ConnectionConfig {
    ConnectionConfig::new("10.0.0.5", 22, "bob", Credential::Password("hunter2".into()))
}

pub fn registry(connector: Arc<MockConnector>) -> SessionRegistry {
    let reactor = Reactor::try_current().expect("tests run inside a tokio runtime");
    SessionRegistry::new(reactor, connector, EngineConfig::default())
}

pub fn connection_id() -> ConnectionId {
    ConnectionId::new()
}

pub fn refused() -> ConnectError {
    ConnectError::Refused("connection refused".into())
}
