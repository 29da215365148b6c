use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::Instant;

/// Splits `items` into consecutive chunks of at most `chunk_size` elements,
/// keeping the order. A `chunk_size` of 0 is treated as 1.
pub fn chunkify<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut items = items.into_iter();
    loop {
        let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    chunks
}

#[derive(Debug)]
pub struct ChunkFailure<E> {
    /// Position of the chunk, chunk `i` holds items `i * chunk_size..`
    pub index: usize,
    pub len: usize,
    pub error: E,
}

#[derive(Debug)]
pub struct BatchOutcome<R, E> {
    /// Results of the successful chunks, in the order the chunks ran
    pub results: Vec<R>,
    pub failures: Vec<ChunkFailure<E>>,
}

/// Runs `fetch_chunk` for every chunk of `items`, one chunk at a time, with
/// at least `min_interval` between two consecutive dispatches.
///
/// The interval is measured from one dispatch to the next, so time spent
/// inside `fetch_chunk` counts towards the wait. A failed chunk is recorded
/// and skipped, the remaining chunks still run.
pub async fn run_batched<T, R, E, F, Fut>(
    items: Vec<T>,
    chunk_size: usize,
    min_interval: Duration,
    mut fetch_chunk: F,
) -> BatchOutcome<R, E>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, E>>,
    E: Display,
{
    let chunks = chunkify(items, chunk_size);
    let total = chunks.len();
    let mut outcome = BatchOutcome {
        results: Vec::new(),
        failures: Vec::new(),
    };
    let mut last_dispatch: Option<Instant> = None;

    for (index, chunk) in chunks.into_iter().enumerate() {
        if let Some(last_dispatch) = last_dispatch {
            let next_dispatch = last_dispatch + min_interval;
            if Instant::now() < next_dispatch {
                log::debug!(
                    "Throttling chunk {}/{total} for {:?}",
                    index + 1,
                    next_dispatch - Instant::now()
                );
                tokio::time::sleep_until(next_dispatch).await;
            }
        }
        last_dispatch = Some(Instant::now());

        let len = chunk.len();
        match fetch_chunk(chunk).await {
            Ok(results) => outcome.results.extend(results),
            Err(error) => {
                log::warn!("Chunk {}/{total} ({len} items) failed: {error}", index + 1);
                outcome.failures.push(ChunkFailure { index, len, error });
            }
        }
    }

    outcome
}
