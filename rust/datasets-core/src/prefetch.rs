// rust/datasets-core/src/prefetch.rs

//! Read-ahead for example streams: a producer thread decodes into a
//! bounded lock-free queue while the consumer works on earlier examples.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;

use crate::config::{ReaderConfig, DEFAULT_PREFETCH_BUFFER};
use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream};

/// Read-ahead settings; usually derived from [`ReaderConfig`].
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    pub buffer_size: usize,
    /// When false the wrapped stream is read on the caller's thread.
    pub enabled: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_PREFETCH_BUFFER,
            enabled: true,
        }
    }
}

impl From<&ReaderConfig> for PrefetchConfig {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            buffer_size: config.prefetch_buffer,
            enabled: config.prefetch_enabled,
        }
    }
}

type Slot = Result<Example>;

const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Shared between the consumer and the producer thread.
struct Shared {
    queue: ArrayQueue<Slot>,
    stop: AtomicBool,
    finished: AtomicBool,
}

impl Shared {
    /// Blocks until `slot` is queued. False if asked to stop first.
    fn push(&self, mut slot: Slot) -> bool {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return false;
            }
            match self.queue.push(slot) {
                Ok(()) => return true,
                Err(back) => {
                    slot = back;
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

fn produce(shared: &Shared, stream: ExampleStream) {
    for slot in stream {
        let failed = slot.is_err();
        if !shared.push(slot) {
            return;
        }
        if failed {
            break;
        }
    }
    shared.finished.store(true, Ordering::Release);
}

/// Yields the wrapped stream's items, decoded ahead of time on a background
/// thread.
///
/// Order is preserved. An error from the wrapped stream is forwarded and
/// ends iteration.
pub struct Prefetcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    inline: Option<ExampleStream>,
    done: bool,
}

impl Prefetcher {
    pub fn new(stream: ExampleStream, config: PrefetchConfig) -> Self {
        let background = config.enabled && config.buffer_size > 0;
        let shared = Arc::new(Shared {
            queue: ArrayQueue::new(config.buffer_size.max(1)),
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });

        if !background {
            return Self {
                shared,
                worker: None,
                inline: Some(stream),
                done: false,
            };
        }

        let producer = Arc::clone(&shared);
        let worker = thread::spawn(move || produce(&producer, stream));
        Self {
            shared,
            worker: Some(worker),
            inline: None,
            done: false,
        }
    }

    pub fn is_prefetching_enabled(&self) -> bool {
        self.worker.is_some()
    }

    /// Items decoded but not yet consumed.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Signals the producer and joins it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn pop_blocking(&mut self) -> Option<Slot> {
        loop {
            if let Some(slot) = self.shared.queue.pop() {
                return Some(slot);
            }
            // The flag may be set after the last push; pop once more.
            if self.shared.finished.load(Ordering::Acquire) {
                return self.shared.queue.pop();
            }
            let worker = self.worker.as_ref()?;
            if worker.is_finished() {
                return self.shared.queue.pop().or_else(|| self.reap());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Joins a producer that exited without finishing its stream.
    fn reap(&mut self) -> Option<Slot> {
        let panic = self.worker.take()?.join().err()?;
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        tracing::error!(%reason, "Prefetch worker panicked");
        Some(Err(DatasetError::invalid_state(format!(
            "prefetch worker panicked: {reason}"
        ))))
    }
}

impl Iterator for Prefetcher {
    type Item = Result<Example>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let slot = match self.inline.as_mut() {
            Some(stream) => stream.next(),
            None => self.pop_blocking(),
        };
        self.done = !matches!(slot, Some(Ok(_)));
        slot
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.stop();
    }
}
