//! In-memory transport pair for channel and bridge tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use cterm_core::error::CtermResult;
use cterm_core::transport::{BoxFuture, TransportPair, TransportSink, TransportStream};

/// The remote end of a mock transport: inspect what the channel sent,
/// feed it inbound frames, and count close calls.
pub(crate) struct MockRemote {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub inbound: mpsc::Sender<CtermResult<String>>,
    pub close_count: Arc<AtomicUsize>,
}

impl MockRemote {
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

/// Build a connected mock transport pair plus its remote handle.
pub(crate) fn link() -> (TransportPair, MockRemote) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let close_count = Arc::new(AtomicUsize::new(0));
    let (inbound_tx, inbound_rx) = mpsc::channel(64);

    let sink: Box<dyn TransportSink> = Box::new(MockSink {
        sent: sent.clone(),
        close_count: close_count.clone(),
    });
    let stream: Box<dyn TransportStream> = Box::new(MockStream { rx: inbound_rx });

    (
        (sink, stream),
        MockRemote {
            sent,
            inbound: inbound_tx,
            close_count,
        },
    )
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    close_count: Arc<AtomicUsize>,
}

impl TransportSink for MockSink {
    fn send<'a>(&'a mut self, text: &'a str) -> BoxFuture<'a, CtermResult<()>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, CtermResult<()>> {
        Box::pin(async move {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct MockStream {
    rx: mpsc::Receiver<CtermResult<String>>,
}

impl TransportStream for MockStream {
    fn next(&mut self) -> BoxFuture<'_, Option<CtermResult<String>>> {
        Box::pin(async move { self.rx.recv().await })
    }
}
