//! Lifecycle coordinator for one terminal dialog.
//!
//! Sequences component creation on open (negotiate, channel, surface) and
//! guarantees idempotent, exactly-once teardown on every close path:
//! explicit close, surface detach, negotiation or channel failure. A
//! bridge serves one dialog; reopening for another cluster means building
//! a new bridge.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use cterm_core::transport::{BoxFuture, TransportPair};
use cterm_core::{CtermError, CtermResult};

use crate::channel::{ChannelState, TerminalChannel};
use crate::negotiate::Negotiator;
use crate::surface::{Surface, SurfaceEvent};
use crate::transport;

/// Delay before the first geometry fit, so the surface is measured after
/// it has settled rather than at zero size.
const SETTLE_DELAY: Duration = Duration::from_millis(75);

/// Dialog lifecycle state, observable by the host (spinner, error
/// banner, live terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unopened,
    Opening,
    Live,
    Closing,
    Closed,
}

/// Produces a connected transport pair for a channel URL. The default
/// implementation opens a credentialed WebSocket; tests substitute an
/// in-memory pair.
pub type ConnectFn =
    Box<dyn Fn(String) -> BoxFuture<'static, CtermResult<TransportPair>> + Send + Sync>;

/// The terminal dialog: negotiator + channel + surface under one
/// lifecycle.
///
/// Errors are reported through the state watch and [`last_error`], never
/// returned from `open` — the host sees state, not exceptions, and no
/// path parks the dialog in `Opening` forever.
///
/// [`last_error`]: TerminalBridge::last_error
pub struct TerminalBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    negotiator: Negotiator,
    connect: ConnectFn,
    state: watch::Sender<BridgeState>,
    surface: Mutex<Box<dyn Surface>>,
    channel: Mutex<Option<TerminalChannel>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    last_error: StdMutex<Option<String>>,
}

impl TerminalBridge {
    /// Build a bridge that opens its channel over a credentialed
    /// WebSocket derived from the negotiator's base URL.
    pub fn new(negotiator: Negotiator, surface: Box<dyn Surface>) -> Self {
        let credentials = negotiator.credentials().clone();
        let connect: ConnectFn = Box::new(move |url: String| {
            let credentials = credentials.clone();
            Box::pin(async move { transport::websocket::connect(&url, &credentials).await })
        });
        Self::with_connector(negotiator, surface, connect)
    }

    /// Build a bridge with an explicit transport connector.
    pub fn with_connector(
        negotiator: Negotiator,
        surface: Box<dyn Surface>,
        connect: ConnectFn,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Unopened);
        Self {
            inner: Arc::new(BridgeInner {
                negotiator,
                connect,
                state,
                surface: Mutex::new(surface),
                channel: Mutex::new(None),
                pump: Mutex::new(None),
                last_error: StdMutex::new(None),
            }),
        }
    }

    /// Open the dialog against `cluster`.
    ///
    /// Only valid from `Unopened`; duplicate or concurrent opens are
    /// ignored with a warning. Returns once the dialog is `Live` or has
    /// reached `Closed` after a failure — inspect [`last_error`] for the
    /// reason.
    ///
    /// [`last_error`]: TerminalBridge::last_error
    pub async fn open(&self, cluster: &str) {
        let proceed = self.inner.state.send_if_modified(|s| {
            if matches!(s, BridgeState::Unopened) {
                *s = BridgeState::Opening;
                true
            } else {
                false
            }
        });
        if !proceed {
            tracing::warn!(cluster, "open ignored: dialog already used");
            return;
        }

        if let Err(e) = self.try_open(cluster).await {
            // A close that raced the open is not a failure of the dialog.
            if matches!(*self.inner.state.borrow(), BridgeState::Opening) {
                self.inner.record_error(e.to_string());
            }
            // A finished teardown may have emptied the channel slot before
            // try_open stored into it.
            if let Some(channel) = self.inner.channel.lock().await.take() {
                channel.close();
            }
            self.inner.shutdown().await;
        }
    }

    async fn try_open(&self, cluster: &str) -> CtermResult<()> {
        let descriptor = self.inner.negotiator.negotiate(cluster).await?;

        // The dialog may have been closed while the negotiation was in
        // flight; a late descriptor must not open a channel.
        if !matches!(*self.inner.state.borrow(), BridgeState::Opening) {
            tracing::debug!("discarding negotiation result, dialog no longer opening");
            return Ok(());
        }

        let url = self.inner.negotiator.channel_url(&descriptor.session_id);
        let mut channel = TerminalChannel::open((self.inner.connect)(url));
        let frames = channel
            .take_frames()
            .ok_or_else(|| CtermError::Channel("channel frames already taken".into()))?;
        let mut channel_states = channel.states();

        // Stored before waiting so a racing close() can reach it.
        *self.inner.channel.lock().await = Some(channel);

        // The store may have landed after a racing teardown already
        // emptied the slot; release the channel it could not see.
        if !matches!(*self.inner.state.borrow(), BridgeState::Opening) {
            if let Some(channel) = self.inner.channel.lock().await.take() {
                channel.close();
            }
            return Ok(());
        }

        let settled = channel_states
            .wait_for(|s| !matches!(s, ChannelState::Idle | ChannelState::Connecting))
            .await
            .map_err(|_| CtermError::Channel("channel state watch closed".into()))?
            .clone();
        match settled {
            ChannelState::Open => {}
            ChannelState::Failed { reason } => return Err(CtermError::Transport(reason)),
            // Closed under us: teardown is already in progress.
            ChannelState::Closed => return Ok(()),
            ChannelState::Idle | ChannelState::Connecting => unreachable!(),
        }

        let events = {
            let mut surface = self.inner.surface.lock().await;
            surface.mount()?;
            surface
                .events()
                .ok_or_else(|| CtermError::Channel("surface events already taken".into()))?
        };

        let live = self.inner.state.send_if_modified(|s| {
            if matches!(s, BridgeState::Opening) {
                *s = BridgeState::Live;
                true
            } else {
                false
            }
        });
        if !live {
            // close() won the race; release the channel it may have missed.
            if let Some(channel) = self.inner.channel.lock().await.take() {
                channel.close();
            }
            return Ok(());
        }

        tracing::info!(endpoint = %descriptor.endpoint(), "terminal dialog live");
        let pump = tokio::spawn(pump(self.inner.clone(), frames, events, channel_states));
        *self.inner.pump.lock().await = Some(pump);
        Ok(())
    }

    /// Close the dialog. Idempotent and safe to call from racing
    /// triggers; the second caller observes `Closing`/`Closed` and does
    /// nothing.
    pub async fn close(&self) {
        // A close before open marks the dialog spent.
        self.inner.state.send_if_modified(|s| {
            if matches!(s, BridgeState::Unopened) {
                *s = BridgeState::Closed;
                true
            } else {
                false
            }
        });
        self.inner.shutdown().await;
    }

    /// Observe dialog state transitions.
    pub fn states(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// The current dialog state.
    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    /// The first recorded failure detail, if the dialog ended with one.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().unwrap().clone()
    }

    /// Resolve once the dialog reaches `Closed`.
    pub async fn wait(&self) {
        let mut states = self.inner.state.subscribe();
        let _ = states
            .wait_for(|s| matches!(s, BridgeState::Closed))
            .await;
    }
}

impl BridgeInner {
    /// Record the first failure; later failures are side effects of the
    /// teardown the first one triggered.
    fn record_error(&self, detail: String) {
        let mut slot = self.last_error.lock().unwrap();
        if slot.is_none() {
            tracing::warn!(detail = %detail, "terminal dialog error");
            *slot = Some(detail);
        }
    }

    /// Tear the dialog down exactly once. Channel close and surface
    /// dispose run independently; neither can skip the other.
    async fn shutdown(&self) {
        let proceed = self.state.send_if_modified(|s| {
            if matches!(s, BridgeState::Opening | BridgeState::Live) {
                *s = BridgeState::Closing;
                true
            } else {
                false
            }
        });
        if !proceed {
            return;
        }
        tracing::debug!("tearing down terminal dialog");

        if let Some(channel) = self.channel.lock().await.take() {
            channel.close();
        }
        self.surface.lock().await.dispose();

        self.state.send_replace(BridgeState::Closed);
    }
}

/// The dialog pump: shuttles frames to the surface and surface input to
/// the channel, refits geometry on resize, and initiates teardown when
/// any side ends.
async fn pump(
    inner: Arc<BridgeInner>,
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut events: mpsc::Receiver<SurfaceEvent>,
    mut channel_states: watch::Receiver<ChannelState>,
) {
    // Initial fit after a short settle delay, so the first measurement
    // does not see a zero-size surface.
    let settle = tokio::time::sleep(SETTLE_DELAY);
    tokio::pin!(settle);
    let mut settled = false;

    loop {
        tokio::select! {
            _ = &mut settle, if !settled => {
                settled = true;
                inner.surface.lock().await.fit();
            }

            frame = frames.recv() => match frame {
                Some(bytes) => inner.surface.lock().await.write(&bytes),
                // Channel pump ended; report why before tearing down.
                None => {
                    let state = channel_states.borrow_and_update().clone();
                    report_channel_end(&inner, state).await;
                    break;
                }
            },

            event = events.recv() => match event {
                Some(SurfaceEvent::Input(bytes)) => {
                    if let Some(channel) = inner.channel.lock().await.as_ref() {
                        channel.send(&bytes).await;
                    }
                }
                Some(SurfaceEvent::Resized(_, _)) => inner.surface.lock().await.fit(),
                Some(SurfaceEvent::CloseRequested) | None => {
                    tracing::debug!("surface requested close");
                    break;
                }
            },

            changed = channel_states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = channel_states.borrow_and_update().clone();
                if report_channel_end(&inner, state).await {
                    break;
                }
            }
        }
    }

    inner.shutdown().await;
}

/// If the channel reached a terminal state, write the inline notice to
/// the surface and record the failure. Returns whether the session ended.
///
/// Notices belong to channel-initiated endings only: when the dialog is
/// already `Closing`/`Closed` the teardown was host-driven, the surface
/// is on its way out, and the transition is a side effect not worth
/// reporting.
async fn report_channel_end(inner: &Arc<BridgeInner>, state: ChannelState) -> bool {
    let reason = match state {
        ChannelState::Failed { reason } => Some(reason),
        ChannelState::Closed => None,
        _ => return false,
    };
    if !matches!(*inner.state.borrow(), BridgeState::Live) {
        return true;
    }
    match reason {
        Some(reason) => {
            inner.record_error(reason.clone());
            inner
                .surface
                .lock()
                .await
                .write(format!("\r\n[cterm] connection error: {reason}\r\n").as_bytes());
        }
        None => {
            inner
                .surface
                .lock()
                .await
                .write(b"\r\n[cterm] connection closed\r\n");
        }
    }
    true
}
