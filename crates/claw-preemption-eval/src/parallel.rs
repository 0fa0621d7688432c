//! Bounded fan-out over independent pieces of work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs work items on a fixed-size pool of scoped worker threads.
///
/// Workers pull piece indices from a shared counter, so at most
/// `parallelism` pieces run at once and every piece runs at most once.
#[derive(Debug, Clone, Copy)]
pub struct Parallelizer {
    parallelism: usize,
}

impl Parallelizer {
    /// Creates a parallelizer. A parallelism of zero is treated as one.
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// Maximum number of concurrent pieces.
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Calls `work(i)` for every `i` in `0..pieces` and blocks until all
    /// calls return.
    ///
    /// Pieces not yet started when `cancel` fires are skipped; pieces already
    /// running finish normally. Returns the number of pieces that ran.
    ///
    /// A panic in `work` resumes on the caller's thread once every worker
    /// has stopped; callers that run untrusted code catch it per piece.
    pub fn until<F>(&self, cancel: &CancellationToken, pieces: usize, work: F) -> usize
    where
        F: Fn(usize) + Sync,
    {
        if pieces == 0 {
            return 0;
        }

        let next = AtomicUsize::new(0);
        let ran = AtomicUsize::new(0);
        let workers = self.parallelism.min(pieces);

        let worker = || loop {
            if cancel.is_cancelled() {
                break;
            }
            let piece = next.fetch_add(1, Ordering::Relaxed);
            if piece >= pieces {
                break;
            }
            work(piece);
            ran.fetch_add(1, Ordering::Relaxed);
        };

        if workers == 1 {
            worker();
        } else {
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(worker);
                }
            });
        }

        let ran = ran.into_inner();
        if ran < pieces {
            debug!(ran, pieces, "parallel work cut short by cancellation");
        }
        ran
    }
}

impl Default for Parallelizer {
    fn default() -> Self {
        Self::new(16)
    }
}
