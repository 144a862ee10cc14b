//! Off-path recording of proxy completions
//!
//! Instrumented dispatchers hand each completion to a single consumer task
//! through a bounded queue with a non-blocking send, so bookkeeping never
//! adds latency to the request path and a burst cannot grow memory without
//! bound. When the queue is full the new record is dropped and counted.
//! Without a tokio runtime at construction time records are applied inline.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::constants::RECORDER_DROP_LOG_EVERY;
use crate::metrics::{Counter, Histogram};

/// One completed dispatch, bound to the metrics it updates
#[derive(Debug)]
pub struct Record {
    counter: Arc<Counter>,
    latency: Arc<Histogram>,
    nanos: i64,
}

impl Record {
    pub fn new(counter: Arc<Counter>, latency: Arc<Histogram>, elapsed: Duration) -> Self {
        Self {
            counter,
            latency,
            nanos: i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    fn apply(self) {
        self.counter.inc(1);
        self.latency.update(self.nanos);
    }
}

enum Message {
    Record(Record),
    Flush(oneshot::Sender<()>),
}

enum Mode {
    Queued(mpsc::Sender<Message>),
    Inline,
}

/// Handle used by instrumented dispatchers to submit completions
pub struct Recorder {
    mode: Mode,
    dropped: Arc<Counter>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            Mode::Queued(_) => "queued",
            Mode::Inline => "inline",
        };
        f.debug_struct("Recorder")
            .field("mode", &mode)
            .field("dropped", &self.dropped.count())
            .finish()
    }
}

impl Recorder {
    /// Start a recorder whose queue holds `capacity` pending records
    ///
    /// `dropped` counts records discarded because the queue was full.
    pub fn new(capacity: usize, dropped: Arc<Counter>) -> Self {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No tokio runtime available, proxy metrics recorded inline");
                return Self::inline(dropped);
            }
        };

        let (tx, mut rx) = mpsc::channel::<Message>(capacity.max(1));
        handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Record(record) => record.apply(),
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Proxy metrics recorder stopped");
        });

        Self {
            mode: Mode::Queued(tx),
            dropped,
        }
    }

    /// Recorder applying every record on the caller's thread
    pub fn inline(dropped: Arc<Counter>) -> Self {
        Self {
            mode: Mode::Inline,
            dropped,
        }
    }

    /// Hand a record over without waiting
    pub fn submit(&self, record: Record) {
        let tx = match &self.mode {
            Mode::Queued(tx) => tx,
            Mode::Inline => return record.apply(),
        };

        match tx.try_send(Message::Record(record)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.inc(1);
                let dropped = self.dropped.count();
                if dropped % RECORDER_DROP_LOG_EVERY == 1 {
                    tracing::warn!(
                        dropped = dropped,
                        "Proxy metrics queue full, dropping completion records"
                    );
                }
            }
            Err(mpsc::error::TrySendError::Closed(Message::Record(record))) => record.apply(),
            Err(mpsc::error::TrySendError::Closed(Message::Flush(_))) => {}
        }
    }

    /// Wait until every record submitted before this call has been applied
    pub async fn flush(&self) {
        let tx = match &self.mode {
            Mode::Queued(tx) => tx,
            Mode::Inline => return,
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Message::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Records discarded on overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.count()
    }
}
