//! Shell channel multiplexing
//!
//! One authenticated SSH connection carries exactly one session channel. The
//! channel is set up with a PTY request followed by a shell request, each
//! with a reply awaited. After setup a pump task owns the russh channel and
//! the connection handle: it forwards inbound data into the bridge and
//! executes write/resize/close commands in the order they were issued.
//!
//! Output the bridge cannot take yet stays queued in the pump, and no further
//! channel messages are read until that queue drains. Commands are still
//! executed meanwhile, so a reader that falls behind never blocks a writer.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use tether_core::config::EngineConfig;
use tether_core::TerminalSize;

use crate::bridge::InboundSink;
use crate::reactor::Reactor;

/// Channel capacity for commands sent to the pump.
///
/// Callers await each command's reply, so this only needs headroom for
/// concurrent writers.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel-level failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed or was never opened
    #[error("Channel not available")]
    NotAvailable,

    /// The server answered a setup request with a failure
    #[error("Server rejected the {0} request")]
    RequestRejected(&'static str),

    /// The channel closed while a setup request was pending
    #[error("Channel closed during the {0} request")]
    ClosedDuringSetup(&'static str),

    /// Transport failure while using the channel
    #[error("Channel transport error: {0}")]
    Transport(String),
}

impl From<russh::Error> for ChannelError {
    fn from(err: russh::Error) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

/// An open interactive shell
#[async_trait]
pub trait ShellChannel: Send + Sync {
    /// Send bytes to the remote shell
    async fn write(&self, data: Bytes) -> Result<(), ChannelError>;

    /// Send a window-change request
    async fn resize(&self, size: TerminalSize) -> Result<(), ChannelError>;

    /// Close the channel and its transport. Safe to call more than once.
    async fn close(&self);

    fn is_open(&self) -> bool;
}

/// PTY parameters for a new shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: TerminalSize,
}

impl PtyRequest {
    pub fn from_config(engine: &EngineConfig) -> Self {
        Self {
            term: engine.terminal_type.clone(),
            size: TerminalSize::default(),
        }
    }
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

enum Command {
    Write(Bytes, oneshot::Sender<Result<(), ChannelError>>),
    Resize(TerminalSize, oneshot::Sender<Result<(), ChannelError>>),
    Close(oneshot::Sender<()>),
}

/// [`ShellChannel`] backed by a russh session channel
pub struct RusshShellChannel {
    commands: mpsc::Sender<Command>,
}

impl RusshShellChannel {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ChannelError>>) -> Command,
    ) -> Result<T, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| ChannelError::NotAvailable)?;
        reply_rx.await.map_err(|_| ChannelError::NotAvailable)?
    }
}

#[async_trait]
impl ShellChannel for RusshShellChannel {
    async fn write(&self, data: Bytes) -> Result<(), ChannelError> {
        if data.is_empty() {
            return Ok(());
        }
        self.request(|reply| Command::Write(data, reply)).await
    }

    async fn resize(&self, size: TerminalSize) -> Result<(), ChannelError> {
        if !size.is_valid() {
            return Ok(());
        }
        self.request(|reply| Command::Resize(size, reply)).await
    }

    async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Close(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Open a session channel, request a PTY and a shell, and start the pump.
///
/// Data the server sends before the shell reply is delivered to `inbound`
/// ahead of anything read later.
pub async fn open_shell<H>(
    handle: Handle<H>,
    pty: &PtyRequest,
    inbound: InboundSink,
    reactor: &Reactor,
) -> Result<RusshShellChannel, ChannelError>
where
    H: client::Handler + 'static,
{
    let (mut channel, early_output) = match setup_channel(&handle, pty).await {
        Ok(opened) => opened,
        Err(e) => {
            disconnect(&handle).await;
            return Err(e);
        }
    };

    tracing::debug!("Shell ready on channel {:?}", channel.id());

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    reactor.spawn(async move {
        run_pump(&mut channel, commands_rx, &inbound, early_output).await;
        let _ = channel.close().await;
        disconnect(&handle).await;
    });

    Ok(RusshShellChannel {
        commands: commands_tx,
    })
}

async fn setup_channel<H>(
    handle: &Handle<H>,
    pty: &PtyRequest,
) -> Result<(Channel<Msg>, VecDeque<Bytes>), ChannelError>
where
    H: client::Handler,
{
    let mut channel = handle.channel_open_session().await?;
    let mut early_output = VecDeque::new();

    channel
        .request_pty(
            true,
            &pty.term,
            u32::from(pty.size.cols),
            u32::from(pty.size.rows),
            0,
            0,
            &[],
        )
        .await?;
    expect_reply(&mut channel, "pty", &mut early_output).await?;

    channel.request_shell(true).await?;
    expect_reply(&mut channel, "shell", &mut early_output).await?;

    Ok((channel, early_output))
}

/// Wait for the server's answer to a setup request, keeping any output that
/// arrives first
async fn expect_reply(
    channel: &mut Channel<Msg>,
    request: &'static str,
    early_output: &mut VecDeque<Bytes>,
) -> Result<(), ChannelError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(ChannelError::RequestRejected(request)),
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                early_output.push_back(Bytes::copy_from_slice(&data));
            }
            Some(ChannelMsg::Close) | None => {
                return Err(ChannelError::ClosedDuringSetup(request));
            }
            Some(other) => {
                tracing::trace!("Ignoring {:?} while waiting for {} reply", other, request);
            }
        }
    }
}

async fn run_pump(
    channel: &mut Channel<Msg>,
    mut commands: mpsc::Receiver<Command>,
    inbound: &InboundSink,
    mut pending: VecDeque<Bytes>,
) {
    loop {
        tokio::select! {
            accepted = deliver(inbound, pending.front().cloned()), if !pending.is_empty() => {
                pending.pop_front();
                if !accepted {
                    tracing::trace!("Dropping output after the stream ended");
                }
            },
            msg = channel.wait(), if pending.is_empty() => match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    pending.push_back(Bytes::copy_from_slice(&data));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    tracing::debug!("Remote end sent EOF");
                }
                Some(ChannelMsg::Close) => {
                    inbound.channel_inactive();
                    return;
                }
                None => {
                    inbound.channel_error("SSH connection lost");
                    return;
                }
                Some(_) => {}
            },
            command = commands.recv() => match command {
                Some(Command::Write(data, reply)) => {
                    let result = channel.data(&data[..]).await.map_err(ChannelError::from);
                    let failed = result.is_err();
                    if let Err(e) = &result {
                        inbound.channel_error(&e.to_string());
                    }
                    let _ = reply.send(result);
                    if failed {
                        return;
                    }
                }
                Some(Command::Resize(size, reply)) => {
                    let result = channel
                        .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                        .await
                        .map_err(ChannelError::from);
                    let _ = reply.send(result);
                }
                Some(Command::Close(reply)) => {
                    tracing::debug!("Closing shell channel");
                    let _ = reply.send(());
                    return;
                }
                None => return,
            },
        }
    }
}

/// Hand one chunk to the bridge. Dropped before completion, the chunk was not
/// delivered and stays at the front of the queue.
async fn deliver(inbound: &InboundSink, chunk: Option<Bytes>) -> bool {
    match chunk {
        Some(chunk) => inbound.push(chunk).await,
        None => true,
    }
}

async fn disconnect<H>(handle: &Handle<H>)
where
    H: client::Handler,
{
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await
    {
        tracing::debug!("Disconnect after close failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_request_from_config() {
        let mut engine = EngineConfig::default();
        assert_eq!(
            PtyRequest::from_config(&engine),
            PtyRequest {
                term: "xterm-256color".to_string(),
                size: TerminalSize::new(80, 24),
            }
        );

        engine.terminal_type = "vt100".to_string();
        assert_eq!(PtyRequest::from_config(&engine).term, "vt100");
    }

    #[tokio::test]
    async fn test_closed_pump_reports_not_available() {
        let (commands, receiver) = mpsc::channel(1);
        drop(receiver);
        let channel = RusshShellChannel { commands };

        assert!(!channel.is_open());
        assert_eq!(
            channel.write(Bytes::from("ls\n")).await,
            Err(ChannelError::NotAvailable)
        );
        channel.close().await;
        channel.close().await;
    }

    #[tokio::test]
    async fn test_zero_resize_is_not_sent() {
        let (commands, mut receiver) = mpsc::channel(1);
        let channel = RusshShellChannel { commands };

        channel.resize(TerminalSize::new(0, 24)).await.unwrap();
        channel.resize(TerminalSize::new(100, 0)).await.unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commands_reach_pump_in_order() {
        let (commands, mut receiver) = mpsc::channel(4);
        let channel = RusshShellChannel { commands };

        let pump = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Write(data, reply) => {
                        seen.push(data);
                        let _ = reply.send(Ok(()));
                    }
                    Command::Resize(_, reply) => {
                        let _ = reply.send(Ok(()));
                    }
                    Command::Close(reply) => {
                        let _ = reply.send(());
                        break;
                    }
                }
            }
            seen
        });

        for chunk in ["a", "b", "c"] {
            channel.write(Bytes::from(chunk)).await.unwrap();
        }
        channel.close().await;

        let seen = pump.await.unwrap();
        assert_eq!(
            seen,
            vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
        );
    }
}
