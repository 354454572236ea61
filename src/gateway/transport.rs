//! Frame channel between a stream session and the HTTP body serving it.
//!
//! A frame only counts as written once the transport side has taken it out
//! of the channel. Frames still sitting in the buffer when the receiving side
//! goes away report a failed write, so the session can put the command back.

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::heartbeat::SEND_TIMEOUT;

/// Why a frame could not be written.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("stream closed by peer")]
    Closed,
    #[error("transport did not take the frame within {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug)]
struct Frame {
    data: String,
    taken: oneshot::Sender<()>,
}

impl Frame {
    fn take(self) -> String {
        let _ = self.taken.send(());
        self.data
    }
}

/// Create a connected sink/source pair. The buffer holds a single frame, so
/// at most one frame is ever between the session and the transport.
pub fn channel() -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::channel(1);
    (EventSink { tx }, EventSource { rx })
}

/// Session side of the channel.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<Frame>,
}

impl EventSink {
    /// Write one frame and wait until the transport has taken it.
    pub async fn send(&self, data: String) -> Result<(), SendError> {
        let (taken_tx, taken_rx) = oneshot::channel();
        let frame = Frame {
            data,
            taken: taken_tx,
        };
        let delivered = async {
            self.tx.send(frame).await.map_err(|_| SendError::Closed)?;
            taken_rx.await.map_err(|_| SendError::Closed)
        };
        tokio::time::timeout(SEND_TIMEOUT, delivered)
            .await
            .map_err(|_| SendError::Timeout(SEND_TIMEOUT))?
    }

    /// Resolves once the receiving side has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Transport side of the channel. Dropping it closes the stream.
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::Receiver<Frame>,
}

impl EventSource {
    /// Take the next frame, acknowledging it to the session. `None` once the
    /// session has ended.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await.map(Frame::take)
    }

    pub fn into_stream(self) -> impl Stream<Item = String> + Send + 'static {
        ReceiverStream::new(self.rx).map(Frame::take)
    }
}
