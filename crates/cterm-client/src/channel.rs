//! Duplex channel adapter.
//!
//! Owns the persistent connection for one terminal session: encodes
//! outbound keystrokes, decodes inbound output, and surfaces
//! connection-state transitions. A spawned pump task drives the transport
//! pair; the handle only enqueues work and observes state.
//!
//! This is the only component that touches the wire encoding — swapping
//! transports never touches the terminal surface logic.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use cterm_core::frames::FrameEnvelope;
use cterm_core::transport::TransportPair;
use cterm_core::CtermResult;

/// Connection state of a terminal channel.
///
/// Transitions are owned exclusively by the channel pump and `close()`;
/// every other component only observes them. `Closed` is terminal — once
/// reached, no transition ever leaves it, which is what keeps a late
/// connect result from resurrecting a closed dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed { reason: String },
}

/// Handle to one duplex terminal channel.
///
/// One channel per dialog: a closed channel is discarded, never reopened.
pub struct TerminalChannel {
    state: Arc<watch::Sender<ChannelState>>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    frames_rx: Option<mpsc::Receiver<Vec<u8>>>,
    pump: Option<JoinHandle<()>>,
}

impl TerminalChannel {
    /// Begin opening a channel over the transport produced by `connect`.
    ///
    /// Returns immediately; the state watch moves `Idle → Connecting` and
    /// then to `Open` or `Failed`. A connect error is reported through the
    /// state watch, never as a panic.
    pub fn open<F>(connect: F) -> Self
    where
        F: Future<Output = CtermResult<TransportPair>> + Send + 'static,
    {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        let state = Arc::new(state_tx);
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (frames_tx, frames_rx) = mpsc::channel(256);

        let pump = tokio::spawn(pump(state.clone(), connect, outbound_rx, frames_tx));

        Self {
            state,
            outbound_tx,
            frames_rx: Some(frames_rx),
            pump: Some(pump),
        }
    }

    /// Queue raw bytes for transmission.
    ///
    /// Valid only while the channel is `Open`; in any other state the
    /// bytes are silently dropped (the UI disables input before the
    /// channel is ready, so this is not an error path worth surfacing).
    pub async fn send(&self, bytes: &[u8]) {
        if !matches!(*self.state.borrow(), ChannelState::Open) {
            tracing::trace!(len = bytes.len(), "dropping send while channel not open");
            return;
        }
        if self.outbound_tx.send(bytes.to_vec()).await.is_err() {
            tracing::trace!(len = bytes.len(), "dropping send, channel pump gone");
        }
    }

    /// Observe every state transition.
    pub fn states(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// The current channel state.
    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    /// Take the inbound frame receiver. Frames are decoded raw bytes,
    /// delivered in wire-arrival order with no batching. Yields once.
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.frames_rx.take()
    }

    /// Close the channel. Idempotent: forces `Closed` from any state;
    /// the pump observes the transition and closes the transport exactly
    /// once. Subsequent calls are no-ops.
    pub fn close(&self) {
        transition(&self.state, ChannelState::Closed);
    }
}

impl Drop for TerminalChannel {
    fn drop(&mut self) {
        // Signal only. The pump watches for `Closed` on every path, so it
        // finishes the transport close on its own; aborting here could cut
        // that side effect short.
        transition(&self.state, ChannelState::Closed);
        self.pump.take();
    }
}

/// Apply a state transition, enforcing that `Closed` is terminal and that
/// `Failed` can only move to `Closed`.
fn transition(state: &watch::Sender<ChannelState>, next: ChannelState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        let allowed = match current {
            ChannelState::Closed => false,
            ChannelState::Failed { .. } => matches!(next, ChannelState::Closed),
            _ => true,
        };
        if allowed {
            tracing::debug!(from = ?current, to = ?next, "channel state transition");
            *current = next;
            true
        } else {
            tracing::trace!(from = ?current, to = ?next, "suppressed channel transition");
            false
        }
    });
}

/// The channel pump: resolves the transport, then shuttles frames until a
/// close trigger fires.
async fn pump<F>(
    state: Arc<watch::Sender<ChannelState>>,
    connect: F,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    frames_tx: mpsc::Sender<Vec<u8>>,
) where
    F: Future<Output = CtermResult<TransportPair>> + Send + 'static,
{
    let mut close_watch = state.subscribe();
    transition(&state, ChannelState::Connecting);

    let pair = tokio::select! {
        result = connect => result,
        _ = close_watch.wait_for(|s| matches!(s, ChannelState::Closed)) => {
            tracing::debug!("channel closed while connecting");
            return;
        }
    };

    let (mut sink, mut stream) = match pair {
        Ok(pair) => pair,
        Err(e) => {
            transition(&state, ChannelState::Failed { reason: e.to_string() });
            return;
        }
    };

    // A close may have landed between the connect resolving and this point.
    if matches!(*close_watch.borrow(), ChannelState::Closed) {
        let _ = sink.close().await;
        return;
    }
    transition(&state, ChannelState::Open);

    loop {
        tokio::select! {
            // The watch guard must not live across the close await below.
            _ = async { let _ = close_watch.wait_for(|s| matches!(s, ChannelState::Closed)).await; } => {
                let _ = sink.close().await;
                break;
            }

            outbound = outbound_rx.recv() => match outbound {
                Some(bytes) => {
                    let text = FrameEnvelope::outbound(bytes).encode();
                    if let Err(e) = sink.send(&text).await {
                        transition(&state, ChannelState::Failed { reason: e.to_string() });
                        break;
                    }
                }
                // Handle dropped without an explicit close; release the transport.
                None => {
                    let _ = sink.close().await;
                    transition(&state, ChannelState::Closed);
                    break;
                }
            },

            inbound = stream.next() => match inbound {
                Some(Ok(text)) => match FrameEnvelope::decode_inbound(&text) {
                    Ok(frame) => {
                        if frames_tx.send(frame.payload).await.is_err() {
                            tracing::debug!("frame consumer gone, closing channel");
                            let _ = sink.close().await;
                            transition(&state, ChannelState::Closed);
                            break;
                        }
                    }
                    // A single malformed frame must not end the session.
                    Err(e) => tracing::warn!("dropping inbound frame: {e}"),
                },
                Some(Err(e)) if e.is_frame_local() => {
                    tracing::warn!("dropping inbound frame: {e}");
                }
                Some(Err(e)) => {
                    transition(&state, ChannelState::Failed { reason: e.to_string() });
                    break;
                }
                None => {
                    transition(&state, ChannelState::Closed);
                    break;
                }
            },
        }
    }

    tracing::debug!("channel pump ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    async fn wait_for_state(
        states: &mut watch::Receiver<ChannelState>,
        pred: impl FnMut(&ChannelState) -> bool,
    ) -> ChannelState {
        timeout(Duration::from_secs(2), states.wait_for(pred))
            .await
            .expect("timed out waiting for channel state")
            .expect("state watch closed")
            .clone()
    }

    /// Poll until `cond` holds or the deadline passes.
    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn open_transitions_through_connecting_to_open() {
        let (pair, _remote) = mock::link();
        let (go_tx, go_rx) = oneshot::channel::<()>();

        let channel = TerminalChannel::open(async move {
            go_rx.await.expect("gate dropped");
            Ok(pair)
        });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Connecting)).await;
        go_tx.send(()).unwrap();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;
    }

    #[tokio::test]
    async fn send_before_open_is_dropped() {
        let (pair, remote) = mock::link();
        let (go_tx, go_rx) = oneshot::channel::<()>();

        let channel = TerminalChannel::open(async move {
            go_rx.await.expect("gate dropped");
            Ok(pair)
        });

        // Still connecting: nothing may reach the wire.
        channel.send(b"early").await;
        sleep(Duration::from_millis(20)).await;
        assert!(remote.sent_frames().is_empty());

        go_tx.send(()).unwrap();
        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;
        assert!(remote.sent_frames().is_empty());

        // Closed: also dropped.
        channel.close();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;
        channel.send(b"late").await;
        sleep(Duration::from_millis(20)).await;
        assert!(remote.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn outbound_keystrokes_are_encoded() {
        let (pair, remote) = mock::link();
        let channel = TerminalChannel::open(async move { Ok(pair) });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        channel.send(b"ls\n").await;
        eventually(|| remote.sent_frames() == vec!["bHMK".to_string()]).await;
    }

    #[tokio::test]
    async fn inbound_frames_arrive_decoded_and_in_order() {
        let (pair, remote) = mock::link();
        let mut channel = TerminalChannel::open(async move { Ok(pair) });
        let mut frames = channel.take_frames().unwrap();

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        for payload in [&b"one"[..], b"two", b"three"] {
            let text = FrameEnvelope::outbound(payload.to_vec()).encode();
            remote.inbound.send(Ok(text)).await.unwrap();
        }

        assert_eq!(frames.recv().await.unwrap(), b"one");
        assert_eq!(frames.recv().await.unwrap(), b"two");
        assert_eq!(frames.recv().await.unwrap(), b"three");
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped_not_fatal() {
        let (pair, remote) = mock::link();
        let mut channel = TerminalChannel::open(async move { Ok(pair) });
        let mut frames = channel.take_frames().unwrap();

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        remote.inbound.send(Ok("!!!not-base64!!!".into())).await.unwrap();
        let good = FrameEnvelope::outbound(b"ok".to_vec()).encode();
        remote.inbound.send(Ok(good)).await.unwrap();

        // Only the well-formed frame comes through, session still open.
        assert_eq!(frames.recv().await.unwrap(), b"ok");
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test]
    async fn transport_error_fails_the_channel() {
        let (pair, remote) = mock::link();
        let channel = TerminalChannel::open(async move { Ok(pair) });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        remote
            .inbound
            .send(Err(cterm_core::CtermError::Transport("boom".into())))
            .await
            .unwrap();

        let failed = wait_for_state(&mut states, |s| matches!(s, ChannelState::Failed { .. })).await;
        match failed {
            ChannelState::Failed { reason } => assert!(reason.contains("boom")),
            other => panic!("unexpected state: {other:?}"),
        }

        // Input is disabled after failure.
        channel.send(b"x").await;
        sleep(Duration::from_millis(20)).await;
        assert!(remote.sent_frames().is_empty());

        // Close still lands.
        channel.close();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;
    }

    #[tokio::test]
    async fn remote_close_transitions_to_closed() {
        let (pair, remote) = mock::link();
        let channel = TerminalChannel::open(async move { Ok(pair) });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        drop(remote.inbound);
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (pair, remote) = mock::link();
        let channel = TerminalChannel::open(async move { Ok(pair) });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        channel.close();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;
        eventually(|| remote.closes() == 1).await;

        channel.close();
        channel.close();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(remote.closes(), 1, "transport must close exactly once");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_round_trip_on_a_multithreaded_runtime() {
        let (pair, remote) = mock::link();
        let channel = TerminalChannel::open(async move { Ok(pair) });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Open)).await;

        channel.send(b"ls\n").await;
        eventually(|| remote.sent_frames() == vec!["bHMK".to_string()]).await;

        channel.close();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;
        eventually(|| remote.closes() == 1).await;
    }

    #[tokio::test]
    async fn close_while_connecting_never_opens() {
        let (pair, _remote) = mock::link();
        let (_go_tx, go_rx) = oneshot::channel::<()>();

        let channel = TerminalChannel::open(async move {
            let _ = go_rx.await;
            Ok(pair)
        });

        let mut states = channel.states();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Connecting)).await;
        channel.close();
        wait_for_state(&mut states, |s| matches!(s, ChannelState::Closed)).await;

        // Even after the gate resolves (dropped sender), the channel must
        // stay closed.
        sleep(Duration::from_millis(30)).await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn connect_failure_reports_failed_state() {
        let channel = TerminalChannel::open(async move {
            Err(cterm_core::CtermError::Transport("no route".into()))
        });

        let mut states = channel.states();
        let failed = wait_for_state(&mut states, |s| matches!(s, ChannelState::Failed { .. })).await;
        match failed {
            ChannelState::Failed { reason } => assert!(reason.contains("no route")),
            other => panic!("unexpected state: {other:?}"),
        }
    }
}
