//! Interactive raw-mode terminal attached to a session

use std::io::{Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

use tether_core::{ErrorCode, SessionError, SessionId};
use tether_ssh::{OutputStream, SessionRegistry, StreamEnd};

use crate::output::print_notice;

/// How an interactive session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The user pressed Ctrl+]
    Detached,
    /// The remote shell exited
    Closed,
    /// The connection dropped and reconnecting was disabled
    Lost(String),
    /// Reconnecting failed for good
    Failed(SessionError),
}

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> std::io::Result<Self> {
        enable_raw_mode()?;
        let _ = crossterm::execute!(std::io::stdout(), EnableBracketedPaste);
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), DisableBracketedPaste);
        let _ = disable_raw_mode();
    }
}

/// Terminal events read on a blocking thread
struct EventReader {
    events: mpsc::Receiver<Event>,
    stop: Arc<AtomicBool>,
}

impl EventReader {
    fn spawn() -> Self {
        let (event_tx, events) = mpsc::channel::<Event>(256);
        let stop = Arc::new(AtomicBool::new(false));

        let stopped = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || {
            while !stopped.load(Ordering::Relaxed) {
                match event::poll(Duration::from_millis(10)) {
                    Ok(true) => match event::read() {
                        Ok(evt) => {
                            if event_tx.blocking_send(evt).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!("Terminal event read failed: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!("Terminal event poll failed: {}", e);
                        break;
                    }
                }
            }
        });

        Self { events, stop }
    }

    async fn next(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

enum Pump {
    Detached,
    Ended,
}

enum Recovery {
    Reconnected,
    Detached,
    GaveUp(SessionError),
}

/// Interactive terminal bound to one registered session
pub struct TerminalSession<'a> {
    registry: &'a SessionRegistry,
    id: SessionId,
    auto_reconnect: bool,
}

impl<'a> TerminalSession<'a> {
    pub fn new(registry: &'a SessionRegistry, id: SessionId, auto_reconnect: bool) -> Self {
        Self {
            registry,
            id,
            auto_reconnect,
        }
    }

    /// Run until the user detaches or the session ends
    pub async fn run(self) -> Result<SessionEnd> {
        let _raw = RawModeGuard::enter().context("Failed to enable raw terminal mode")?;
        let mut events = EventReader::spawn();
        let mut stdout = std::io::stdout();

        loop {
            let Some(mut output) = self.registry.output_stream(self.id) else {
                return Ok(SessionEnd::Closed);
            };
            self.sync_size().await;

            if let Pump::Detached = self.pump(&mut events, &mut output, &mut stdout).await? {
                return Ok(SessionEnd::Detached);
            }

            match output.end_reason() {
                Some(StreamEnd::Error(reason)) if self.auto_reconnect => {
                    print_notice(&format!("Connection lost: {}", reason));
                    match self.recover(&mut events).await {
                        Recovery::Reconnected => print_notice("Reconnected"),
                        Recovery::Detached => return Ok(SessionEnd::Detached),
                        Recovery::GaveUp(err) => return Ok(SessionEnd::Failed(err)),
                    }
                }
                Some(StreamEnd::Error(reason)) => return Ok(SessionEnd::Lost(reason)),
                _ => return Ok(SessionEnd::Closed),
            }
        }
    }

    /// Copy output to the screen and keystrokes to the shell until the
    /// stream ends
    async fn pump(
        &self,
        events: &mut EventReader,
        output: &mut OutputStream,
        stdout: &mut Stdout,
    ) -> Result<Pump> {
        loop {
            tokio::select! {
                chunk = output.next_chunk() => match chunk {
                    Some(data) => {
                        stdout.write_all(&data)?;
                        stdout.flush()?;
                    }
                    None => return Ok(Pump::Ended),
                },
                evt = events.next() => match evt {
                    Some(evt) => {
                        if self.handle_event(evt).await {
                            return Ok(Pump::Detached);
                        }
                    }
                    None => return Ok(Pump::Detached),
                },
            }
        }
    }

    /// Forward one terminal event. Returns true on the detach key.
    async fn handle_event(&self, evt: Event) -> bool {
        match evt {
            Event::Key(KeyEvent { kind, .. }) if kind == KeyEventKind::Release => {}
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => {
                if is_detach(code, modifiers) {
                    return true;
                }
                let data = key_to_bytes(code, modifiers);
                if !data.is_empty() {
                    self.send(data).await;
                }
            }
            Event::Paste(text) => self.send(text.into_bytes()).await,
            Event::Resize(cols, rows) => {
                if let Err(e) = self.registry.resize(self.id, cols, rows).await {
                    tracing::debug!("Resize to {}x{} failed: {}", cols, rows, e);
                }
            }
            _ => {}
        }
        false
    }

    async fn send(&self, data: Vec<u8>) {
        if let Err(e) = self.registry.write(self.id, data).await {
            tracing::debug!("Dropping input: {}", e);
        }
    }

    async fn sync_size(&self) {
        if let Ok((cols, rows)) = crossterm::terminal::size() {
            if let Err(e) = self.registry.resize(self.id, cols, rows).await {
                tracing::debug!("Initial resize failed: {}", e);
            }
        }
    }

    /// Drive reconnect attempts until one succeeds, the session gives up
    /// or the user detaches. Input typed meanwhile is discarded.
    async fn recover(&self, events: &mut EventReader) -> Recovery {
        let Some(session) = self.registry.get(self.id) else {
            return Recovery::GaveUp(SessionError::unknown("Session closed"));
        };

        loop {
            let before = session.reconnect_attempt();
            print_notice(&format!(
                "Reconnecting (attempt {}), press Ctrl+] to give up",
                before + 1
            ));

            let reconnect = session.reconnect();
            tokio::pin!(reconnect);
            let result = loop {
                tokio::select! {
                    result = &mut reconnect => break result,
                    evt = events.next() => match evt {
                        Some(Event::Key(KeyEvent { code, modifiers, kind, .. }))
                            if kind != KeyEventKind::Release && is_detach(code, modifiers) =>
                        {
                            return Recovery::Detached;
                        }
                        Some(_) => {}
                        None => return Recovery::Detached,
                    },
                }
            };

            match result {
                Ok(()) => return Recovery::Reconnected,
                Err(err) if matches!(err.code, ErrorCode::AuthFailed | ErrorCode::KeyNotFound) => {
                    return Recovery::GaveUp(err);
                }
                // The attempt counter only stays put once the cap is reached
                Err(err) if session.reconnect_attempt() == before => {
                    return Recovery::GaveUp(err);
                }
                Err(err) => print_notice(&format!("Reconnect failed: {}", err)),
            }
        }
    }
}

fn is_detach(code: KeyCode, modifiers: KeyModifiers) -> bool {
    modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char(']')
}

/// Encode a key press the way an xterm-compatible terminal would
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    let mut bytes = match code {
        Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match c.to_ascii_lowercase() {
            // Ctrl+A = 0x01 through Ctrl+Z = 0x1a
            c @ 'a'..='z' => vec![c as u8 - b'a' + 1],
            ' ' | '@' | '2' => vec![0x00],
            '[' | '3' => vec![0x1b],
            '\\' | '4' => vec![0x1c],
            ']' | '5' => vec![0x1d],
            '^' | '6' => vec![0x1e],
            '_' | '7' | '/' => vec![0x1f],
            '8' | '?' => vec![0x7f],
            _ => c.to_string().into_bytes(),
        },
        Char(c) => c.to_string().into_bytes(),
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => b"\x1b[Z".to_vec(),
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => b"\x1b[A".to_vec(),
        Down => b"\x1b[B".to_vec(),
        Right => b"\x1b[C".to_vec(),
        Left => b"\x1b[D".to_vec(),
        Home => b"\x1b[H".to_vec(),
        End => b"\x1b[F".to_vec(),
        PageUp => b"\x1b[5~".to_vec(),
        PageDown => b"\x1b[6~".to_vec(),
        Delete => b"\x1b[3~".to_vec(),
        Insert => b"\x1b[2~".to_vec(),
        F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => vec![],
        },
        _ => vec![],
    };

    // Alt sends ESC before the key
    if modifiers.contains(KeyModifiers::ALT) && !bytes.is_empty() {
        bytes.insert(0, 0x1b);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_characters() {
        assert_eq!(key_to_bytes(KeyCode::Char('a'), KeyModifiers::NONE), b"a");
        assert_eq!(key_to_bytes(KeyCode::Char('A'), KeyModifiers::SHIFT), b"A");
        assert_eq!(
            key_to_bytes(KeyCode::Char('é'), KeyModifiers::NONE),
            "é".as_bytes()
        );
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(key_to_bytes(KeyCode::Char('c'), KeyModifiers::CONTROL), [0x03]);
        assert_eq!(key_to_bytes(KeyCode::Char('D'), KeyModifiers::CONTROL), [0x04]);
        assert_eq!(key_to_bytes(KeyCode::Char(' '), KeyModifiers::CONTROL), [0x00]);
        assert_eq!(key_to_bytes(KeyCode::Char('\\'), KeyModifiers::CONTROL), [0x1c]);
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(key_to_bytes(KeyCode::Char('b'), KeyModifiers::ALT), b"\x1bb");
        assert_eq!(key_to_bytes(KeyCode::Left, KeyModifiers::ALT), b"\x1b\x1b[D");
        assert!(key_to_bytes(KeyCode::Null, KeyModifiers::ALT).is_empty());
    }

    #[test]
    fn test_special_keys() {
        assert_eq!(key_to_bytes(KeyCode::Enter, KeyModifiers::NONE), b"\r");
        assert_eq!(key_to_bytes(KeyCode::Backspace, KeyModifiers::NONE), [0x7f]);
        assert_eq!(key_to_bytes(KeyCode::Up, KeyModifiers::NONE), b"\x1b[A");
        assert_eq!(key_to_bytes(KeyCode::F(5), KeyModifiers::NONE), b"\x1b[15~");
        assert!(key_to_bytes(KeyCode::F(13), KeyModifiers::NONE).is_empty());
    }

    #[test]
    fn test_detach_key() {
        assert!(is_detach(KeyCode::Char(']'), KeyModifiers::CONTROL));
        assert!(!is_detach(KeyCode::Char(']'), KeyModifiers::NONE));
        assert!(!is_detach(KeyCode::Char('c'), KeyModifiers::CONTROL));
    }
}
