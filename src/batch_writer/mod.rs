//! Asynchronous bounded-queue batch writer (§4.5): one worker per entity
//! kind, flushing on size or time, retrying transient failures with
//! backoff, discarding after the retry budget following the teacher's
//! `workers.rs` fire-and-forget channel-worker idiom.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::db::MysqlPool;

const CHANNEL_CAPACITY: usize = 10_000;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct BatchWriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// A persist function: runs on a blocking thread, returns the row count
/// written or a diesel error for the retry loop to act on.
pub type PersistFn<T> =
    Arc<dyn Fn(&mut crate::db::MysqlPooledConnection, &[T]) -> diesel::QueryResult<usize> + Send + Sync>;

pub struct BatchWriterHandle<T> {
    sender: mpsc::Sender<T>,
    kind: &'static str,
}

impl<T: Send + 'static> BatchWriterHandle<T> {
    /// Non-blocking enqueue. Returns `Err(())` ("queue-full", §4.5) when
    /// the channel is saturated; the packet is still in the live store.
    pub fn enqueue(&self, item: T) -> Result<(), ()> {
        match self.sender.try_send(item) {
            Ok(()) => {
                metrics::counter!("batch_writer_queued_total", "kind" => self.kind).increment(1);
                Ok(())
            }
            Err(_) => {
                metrics::counter!("batch_writer_errors_total", "kind" => self.kind, "reason" => "queue_full")
                    .increment(1);
                Err(())
            }
        }
    }
}

/// Spawns the worker task and returns a handle to enqueue items.
/// `kind` labels metrics (`"pilot"`, `"thermal"`, `"station"`).
pub fn spawn<T: Send + 'static>(
    kind: &'static str,
    pool: MysqlPool,
    persist: PersistFn<T>,
    config: BatchWriterConfig,
    cancel: CancellationToken,
) -> BatchWriterHandle<T> {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    metrics::gauge!("batch_writer_queue_depth", "kind" => kind).set(0.0);
    metrics::counter!("batch_writer_processed_total", "kind" => kind).increment(0);
    metrics::counter!("batch_writer_errors_total", "kind" => kind, "reason" => "queue_full").increment(0);

    tokio::spawn(
        run_worker(kind, pool, persist, config, receiver, cancel)
            .instrument(tracing::debug_span!("batch_writer", kind)),
    );

    BatchWriterHandle { sender, kind }
}

async fn run_worker<T: Send + 'static>(
    kind: &'static str,
    pool: MysqlPool,
    persist: PersistFn<T>,
    config: BatchWriterConfig,
    mut receiver: mpsc::Receiver<T>,
    cancel: CancellationToken,
) {
    let mut buffer: Vec<T> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                flush(kind, &pool, &persist, &mut buffer).await;
                break;
            }
            item = receiver.recv() => {
                match item {
                    Some(item) => {
                        buffer.push(item);
                        metrics::gauge!("batch_writer_queue_depth", "kind" => kind).set(buffer.len() as f64);
                        if buffer.len() >= config.batch_size {
                            flush(kind, &pool, &persist, &mut buffer).await;
                        }
                    }
                    None => {
                        flush(kind, &pool, &persist, &mut buffer).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(kind, &pool, &persist, &mut buffer).await;
                }
            }
        }
    }
}

async fn flush<T: Send + 'static>(
    kind: &'static str,
    pool: &MysqlPool,
    persist: &PersistFn<T>,
    buffer: &mut Vec<T>,
) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let batch_size = batch.len();
    let started = std::time::Instant::now();

    let pool = pool.clone();
    let persist = persist.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = pool
                .get()
                .map_err(anyhow::Error::from)
                .and_then(|mut conn| persist(&mut conn, &batch).map_err(anyhow::Error::from));

            match outcome {
                Ok(count) => return Ok(count),
                Err(err) if attempt >= RETRY_ATTEMPTS => return Err(err),
                Err(err) => {
                    tracing::warn!(kind, attempt, error = %err, "batch flush failed, retrying");
                    std::thread::sleep(RETRY_BASE * 2u32.pow(attempt - 1));
                }
            }
        }
    })
    .await;

    let duration = started.elapsed();
    metrics::histogram!("batch_writer_flush_duration_seconds", "kind" => kind)
        .record(duration.as_secs_f64());
    metrics::gauge!("batch_writer_last_batch_size", "kind" => kind).set(batch_size as f64);
    metrics::gauge!("batch_writer_queue_depth", "kind" => kind).set(0.0);

    match result {
        Ok(Ok(written)) => {
            metrics::counter!("batch_writer_processed_total", "kind" => kind).increment(written as u64);
        }
        Ok(Err(err)) => {
            tracing::error!(kind, error = %err, batch_size, "batch flush exhausted retries, discarding batch");
            metrics::counter!("batch_writer_errors_total", "kind" => kind, "reason" => "persist_failed")
                .increment(1);
        }
        Err(join_err) => {
            tracing::error!(kind, error = %join_err, "batch flush task panicked");
            metrics::counter!("batch_writer_errors_total", "kind" => kind, "reason" => "panic").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_respects_capacity() {
        // A channel of capacity 4: the first 4 sends succeed synchronously
        // (no consumer draining yet), the 5th observes backpressure.
        let (sender, _receiver) = mpsc::channel::<u32>(4);
        let handle = BatchWriterHandle { sender, kind: "pilot" };
        for i in 0..4 {
            assert!(handle.enqueue(i).is_ok());
        }
        assert!(handle.enqueue(4).is_err());
    }
}
