//! Progress reporting for running jobs.
//!
//! A [`ProgressSink`] is an append-only log with a single writer (the running
//! adapter, plus the supervisor around it) and any number of readers. Readers
//! get a [`ProgressStream`] that replays the log from the start and then
//! follows it until the job is sealed.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percent complete, 0-100. Never decreases within a job.
    pub percent: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct ProgressLog {
    events: Vec<ProgressEvent>,
    sealed: bool,
}

struct Shared {
    log: Mutex<ProgressLog>,
    /// Bumped on every append and on seal.
    version: watch::Sender<u64>,
}

impl Shared {
    fn log(&self) -> MutexGuard<'_, ProgressLog> {
        // A panic while holding the lock cannot leave the log half-written.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

/// Append-only progress channel for one job.
#[derive(Clone)]
pub struct ProgressSink {
    shared: Arc<Shared>,
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                log: Mutex::new(ProgressLog::default()),
                version,
            }),
        }
    }

    /// Append an event.
    ///
    /// `percent` is clamped to 100 and to the last reported value, so readers
    /// always observe a non-decreasing sequence. Events after [`seal`](Self::seal)
    /// are dropped.
    pub fn emit(&self, percent: u8, message: impl Into<String>) {
        {
            let mut log = self.shared.log();
            if log.sealed {
                return;
            }
            let floor = log.events.last().map_or(0, |e| e.percent);
            let percent = percent.min(100).max(floor);
            log.events.push(ProgressEvent {
                percent,
                message: message.into(),
                timestamp: Utc::now(),
            });
        }
        self.shared.bump();
    }

    /// Emit progress for `done` out of `total` items.
    pub fn emit_fraction(&self, done: usize, total: usize, message: impl Into<String>) {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        self.emit(percent, message);
    }

    /// Close the log. Streams end after delivering every event.
    pub fn seal(&self) {
        {
            let mut log = self.shared.log();
            if log.sealed {
                return;
            }
            log.sealed = true;
        }
        self.shared.bump();
    }

    pub fn is_sealed(&self) -> bool {
        self.shared.log().sealed
    }

    /// A copy of every event so far.
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.shared.log().events.clone()
    }

    /// Subscribe from the beginning of the log.
    pub fn subscribe(&self) -> ProgressStream {
        let shared = self.shared.clone();
        let rx = shared.version.subscribe();

        let stream = futures::stream::unfold((shared, rx, 0usize), |(shared, mut rx, cursor)| {
            async move {
                loop {
                    {
                        let log = shared.log();
                        if let Some(event) = log.events.get(cursor) {
                            let event = event.clone();
                            drop(log);
                            return Some((event, (shared, rx, cursor + 1)));
                        }
                        if log.sealed {
                            return None;
                        }
                    }
                    // The sender lives in `shared`, so it cannot close under us.
                    if rx.changed().await.is_err() {
                        return None;
                    }
                }
            }
        });

        ProgressStream {
            inner: Box::pin(stream),
        }
    }
}

/// Stream of [`ProgressEvent`]s for one job; ends when the job is sealed.
pub struct ProgressStream {
    inner: Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>,
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_percent_never_decreases() {
        let sink = ProgressSink::new();
        sink.emit(40, "a");
        sink.emit(10, "b");
        sink.emit(250, "c");

        let percents: Vec<u8> = sink.snapshot().iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![40, 40, 100]);
    }

    #[test]
    fn test_emit_fraction() {
        let sink = ProgressSink::new();
        sink.emit_fraction(1, 3, "one");
        sink.emit_fraction(3, 3, "three");
        let percents: Vec<u8> = sink.snapshot().iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![33, 100]);
    }

    #[test]
    fn test_events_after_seal_are_dropped() {
        let sink = ProgressSink::new();
        sink.emit(5, "before");
        sink.seal();
        sink.emit(50, "after");
        assert_eq!(sink.snapshot().len(), 1);
        assert!(sink.is_sealed());
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_everything() {
        let sink = ProgressSink::new();
        sink.emit(10, "a");
        sink.emit(20, "b");
        sink.seal();

        let events: Vec<_> = sink.subscribe().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].message, "b");
    }

    #[tokio::test]
    async fn test_stream_follows_writer_until_sealed() {
        let sink = ProgressSink::new();
        let stream = sink.subscribe();

        let writer = sink.clone();
        let handle = std::thread::spawn(move || {
            for i in 1..=5u8 {
                writer.emit(i * 20, format!("step {i}"));
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            writer.seal();
        });

        let events: Vec<_> = stream.collect().await;
        handle.join().unwrap();

        assert_eq!(events.len(), 5);
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events.last().unwrap().percent, 100);
    }
}
