//! Terminal surface controller.
//!
//! Owns the local interactive display: renders decoded channel output,
//! captures keystrokes and resize events, and tracks the viewport
//! geometry. Rendering is delegated to the hosting terminal emulator via
//! crossterm; this module owns only the data pump into and out of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cterm_core::CtermResult;

/// How long the input reader blocks per poll before re-checking its stop
/// flag. Bounds how long a disposed reader thread can linger.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Visible terminal geometry, derived from the rendered surface size.
///
/// Recomputed on every resize trigger and after the initial mount; never
/// persisted and not part of the wire protocol (resize is a local-only
/// concern).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportGeometry {
    pub columns: u16,
    pub rows: u16,
}

/// Events produced by the interactive surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Raw bytes from a keystroke or paste, to forward to the channel.
    Input(Vec<u8>),
    /// The surface was resized to (columns, rows).
    Resized(u16, u16),
    /// The user asked to end the session (detach key).
    CloseRequested,
}

/// The seam between the lifecycle coordinator and a concrete display.
///
/// The production implementation is [`CrosstermSurface`]; tests drive the
/// coordinator with an in-memory double.
pub trait Surface: Send {
    /// Attach the display. Must be called before `write` output is
    /// rendered; the initial geometry fit is deferred until the surface
    /// has settled (the coordinator schedules it).
    fn mount(&mut self) -> CtermResult<()>;

    /// Take the surface's event receiver. Yields once, after `mount`.
    fn events(&mut self) -> Option<mpsc::Receiver<SurfaceEvent>>;

    /// Render decoded inbound bytes. Never blocks the caller; rendering
    /// is asynchronous relative to this call.
    fn write(&mut self, bytes: &[u8]);

    /// Recompute the viewport geometry from the current surface size.
    /// Fails silently (logged, never surfaced) when the surface is not
    /// mounted — resize events can race initialization.
    fn fit(&mut self);

    /// The last computed geometry, if any fit has succeeded.
    fn geometry(&self) -> Option<ViewportGeometry>;

    /// Release the display. Idempotent; safe even if `mount` never
    /// completed.
    fn dispose(&mut self);
}

/// Interactive surface over the local terminal via crossterm.
///
/// `mount` enters raw mode and starts a blocking input-reader thread plus
/// an async stdout writer task; `dispose` stops both and restores cooked
/// mode. The resize subscription lives inside the reader thread, so it is
/// scoped to this surface — no process-global listener to leak across
/// repeated open/close cycles.
pub struct CrosstermSurface {
    mounted: bool,
    disposed: bool,
    geometry: Option<ViewportGeometry>,
    stop: Arc<AtomicBool>,
    writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    events_rx: Option<mpsc::Receiver<SurfaceEvent>>,
}

impl CrosstermSurface {
    pub fn new() -> Self {
        Self {
            mounted: false,
            disposed: false,
            geometry: None,
            stop: Arc::new(AtomicBool::new(false)),
            writer_tx: None,
            writer: None,
            reader: None,
            events_rx: None,
        }
    }
}

impl Default for CrosstermSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for CrosstermSurface {
    fn mount(&mut self) -> CtermResult<()> {
        if self.mounted {
            return Ok(());
        }
        if self.disposed {
            // A racing close beat the mount; do not re-enter raw mode.
            return Err(cterm_core::CtermError::Surface(
                "surface already disposed".into(),
            ));
        }
        terminal::enable_raw_mode()?;
        self.mounted = true;

        // Blocking reader thread: keystrokes, pastes, resize, detach key.
        // Poll-based so the dispose stop flag ends it without waiting for
        // another input event.
        let (events_tx, events_rx) = mpsc::channel::<SurfaceEvent>(64);
        let stop = self.stop.clone();
        let reader = tokio::task::spawn_blocking(move || {
            read_loop(&stop, &events_tx, event::poll, event::read);
        });

        // Async writer task: write() must never block the caller.
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(bytes) = writer_rx.recv().await {
                if stdout.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        self.events_rx = Some(events_rx);
        self.writer_tx = Some(writer_tx);
        self.writer = Some(writer);
        self.reader = Some(reader);
        Ok(())
    }

    fn events(&mut self) -> Option<mpsc::Receiver<SurfaceEvent>> {
        self.events_rx.take()
    }

    fn write(&mut self, bytes: &[u8]) {
        match &self.writer_tx {
            Some(tx) => {
                let _ = tx.send(bytes.to_vec());
            }
            None => tracing::debug!(len = bytes.len(), "write before mount, dropping"),
        }
    }

    fn fit(&mut self) {
        if !self.mounted {
            // Resize triggers can race initialization; log and move on.
            tracing::debug!("fit before mount, ignoring");
            return;
        }
        match terminal::size() {
            Ok((columns, rows)) => {
                self.geometry = Some(ViewportGeometry { columns, rows });
                tracing::trace!(columns, rows, "viewport geometry refit");
            }
            Err(e) => tracing::debug!("viewport fit failed: {e}"),
        }
    }

    fn geometry(&self) -> Option<ViewportGeometry> {
        self.geometry
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.mounted = false;

        // Dropping the sender lets the writer drain queued output (the
        // inline close and error notices) before it exits on its own.
        self.writer_tx = None;
        self.writer.take();

        // The reader exits at its next poll tick.
        self.stop.store(true, Ordering::Relaxed);
        self.reader.take();

        if terminal::is_raw_mode_enabled().unwrap_or(false) {
            let _ = terminal::disable_raw_mode();
        }
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Reader loop for the mounted surface: polls for events until the stop
/// flag is raised, the detach key fires, or the event consumer goes away.
///
/// The poll and read sources are injected so the loop can run against
/// scripted events; production passes `event::poll` / `event::read`.
fn read_loop(
    stop: &AtomicBool,
    events_tx: &mpsc::Sender<SurfaceEvent>,
    mut poll: impl FnMut(Duration) -> std::io::Result<bool>,
    mut read: impl FnMut() -> std::io::Result<Event>,
) {
    while !stop.load(Ordering::Relaxed) {
        match poll(READ_POLL_INTERVAL) {
            Ok(false) => {}
            Ok(true) => match read() {
                Ok(event) => {
                    if !forward_event(event, events_tx) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("surface event read error: {e}");
                    break;
                }
            },
            Err(e) => {
                tracing::warn!("surface event poll error: {e}");
                break;
            }
        }
    }
}

/// Forward one terminal event into the surface event stream. Returns
/// `false` when the reader loop should end.
fn forward_event(event: Event, events_tx: &mpsc::Sender<SurfaceEvent>) -> bool {
    match event {
        Event::Key(key) => {
            if key.kind == KeyEventKind::Release {
                return true;
            }
            // Ctrl+] detaches, like ssh's escape sequence.
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(']') {
                let _ = events_tx.blocking_send(SurfaceEvent::CloseRequested);
                return false;
            }
            match key_event_to_bytes(&key) {
                Some(bytes) => events_tx.blocking_send(SurfaceEvent::Input(bytes)).is_ok(),
                None => true,
            }
        }
        Event::Paste(text) => events_tx
            .blocking_send(SurfaceEvent::Input(text.into_bytes()))
            .is_ok(),
        Event::Resize(cols, rows) => events_tx
            .blocking_send(SurfaceEvent::Resized(cols, rows))
            .is_ok(),
        _ => true,
    }
}

/// Translate a crossterm key event into the raw bytes a remote PTY expects.
fn key_event_to_bytes(event: &KeyEvent) -> Option<Vec<u8>> {
    match event.code {
        KeyCode::Char(c) => {
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                // Ctrl+A = 0x01 .. Ctrl+Z = 0x1a.
                let byte = (c.to_ascii_lowercase() as u8)
                    .wrapping_sub(b'a')
                    .wrapping_add(1);
                if byte <= 26 {
                    return Some(vec![byte]);
                }
            }
            let mut buf = [0u8; 4];
            Some(c.encode_utf8(&mut buf).as_bytes().to_vec())
        }
        KeyCode::Enter => Some(vec![b'\r']),
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(b"\x1b[A".to_vec()),
        KeyCode::Down => Some(b"\x1b[B".to_vec()),
        KeyCode::Right => Some(b"\x1b[C".to_vec()),
        KeyCode::Left => Some(b"\x1b[D".to_vec()),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::PageUp => Some(b"\x1b[5~".to_vec()),
        KeyCode::PageDown => Some(b"\x1b[6~".to_vec()),
        KeyCode::Insert => Some(b"\x1b[2~".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        KeyCode::F(n) => {
            let seq: &str = match n {
                1 => "\x1bOP",
                2 => "\x1bOQ",
                3 => "\x1bOR",
                4 => "\x1bOS",
                5 => "\x1b[15~",
                6 => "\x1b[17~",
                7 => "\x1b[18~",
                8 => "\x1b[19~",
                9 => "\x1b[20~",
                10 => "\x1b[21~",
                11 => "\x1b[23~",
                12 => "\x1b[24~",
                _ => return None,
            };
            Some(seq.as_bytes().to_vec())
        }
        _ => None,
    }
}
