//! Settle detection by size sampling.
//!
//! A file is considered completely written once two consecutive size samples
//! agree. A zero-size sample ends the wait immediately; unreadable paths probe
//! as zero, so a file deleted mid-wait releases its waiter. Without a
//! configured bound the wait is unbounded: a file that grows forever blocks its
//! dispatch forever.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// Source of file size samples.
#[async_trait]
pub trait SizeProbe: Send + Sync {
    /// Current size of `path` in bytes; `0` when the path cannot be read.
    async fn size(&self, path: &Path) -> u64;
}

/// Probe backed by filesystem metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSizeProbe;

#[async_trait]
impl SizeProbe for FsSizeProbe {
    async fn size(&self, path: &Path) -> u64 {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "unable to read file size");
                0
            }
        }
    }
}

/// Blocks a dispatch until its file stops growing.
#[derive(Clone)]
pub struct QuiescenceDetector {
    probe: Arc<dyn SizeProbe>,
    sample_interval: Duration,
    limit: Option<Duration>,
}

impl QuiescenceDetector {
    /// Detector sampling real file sizes every `sample_interval`, with no upper bound.
    #[must_use]
    pub fn new(sample_interval: Duration) -> Self {
        Self::with_probe(Arc::new(FsSizeProbe), sample_interval)
    }

    /// Detector using a custom probe.
    #[must_use]
    pub fn with_probe(probe: Arc<dyn SizeProbe>, sample_interval: Duration) -> Self {
        Self {
            probe,
            sample_interval,
            limit: None,
        }
    }

    /// Bound the wait; `None` keeps it unbounded.
    #[must_use]
    pub const fn with_limit(mut self, limit: Option<Duration>) -> Self {
        self.limit = limit;
        self
    }

    /// Wait until `path` settles and return its final size.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::StabilityTimeout`] only when a bound is configured
    /// and elapses first.
    pub async fn wait_until_stable(&self, path: &Path) -> FsOpsResult<u64> {
        match self.limit {
            None => Ok(self.sample_until_stable(path).await),
            Some(limit) => tokio::time::timeout(limit, self.sample_until_stable(path))
                .await
                .map_err(|_| FsOpsError::StabilityTimeout {
                    path: path.to_path_buf(),
                    waited: limit,
                }),
        }
    }

    async fn sample_until_stable(&self, path: &Path) -> u64 {
        let mut previous = self.probe.size(path).await;
        loop {
            if previous == 0 {
                return 0;
            }
            tokio::time::sleep(self.sample_interval).await;
            let current = self.probe.size(path).await;
            if current == previous || current == 0 {
                return current;
            }
            debug!(
                path = %path.display(),
                previous,
                current,
                "file still changing; sampling again"
            );
            previous = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(1);

    /// Replays scripted sizes; the last one repeats forever.
    struct ScriptedProbe {
        sizes: Mutex<VecDeque<u64>>,
        last: Mutex<u64>,
        samples: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(sizes: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                sizes: Mutex::new(sizes.iter().copied().collect()),
                last: Mutex::new(0),
                samples: AtomicUsize::new(0),
            })
        }

        fn samples(&self) -> usize {
            self.samples.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SizeProbe for ScriptedProbe {
        async fn size(&self, _path: &Path) -> u64 {
            self.samples.fetch_add(1, Ordering::SeqCst);
            let mut last = self.last.lock().expect("probe lock");
            if let Some(next) = self.sizes.lock().expect("probe lock").pop_front() {
                *last = next;
            }
            *last
        }
    }

    /// Grows by one byte on every sample.
    struct GrowingProbe(AtomicUsize);

    #[async_trait]
    impl SizeProbe for GrowingProbe {
        async fn size(&self, _path: &Path) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst) as u64 + 1
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_after_two_equal_samples_never_before() -> FsOpsResult<()> {
        let probe = ScriptedProbe::new(&[10, 20, 30, 30, 40]);
        let detector = QuiescenceDetector::with_probe(probe.clone(), INTERVAL);

        let started = Instant::now();
        let size = detector.wait_until_stable(Path::new("/in/growing.bin")).await?;

        assert_eq!(size, 30);
        assert_eq!(probe.samples(), 4);
        assert_eq!(started.elapsed(), INTERVAL * 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn zero_first_sample_returns_without_waiting() -> FsOpsResult<()> {
        let probe = ScriptedProbe::new(&[0, 5, 5]);
        let detector = QuiescenceDetector::with_probe(probe.clone(), INTERVAL);

        let started = Instant::now();
        let size = detector.wait_until_stable(Path::new("/in/empty.txt")).await?;

        assert_eq!(size, 0);
        assert_eq!(probe.samples(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn zero_mid_wait_releases_the_waiter() -> FsOpsResult<()> {
        let probe = ScriptedProbe::new(&[7, 9, 0, 0]);
        let detector = QuiescenceDetector::with_probe(probe.clone(), INTERVAL);

        let size = detector.wait_until_stable(Path::new("/in/vanished.txt")).await?;

        assert_eq!(size, 0);
        assert_eq!(probe.samples(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn configured_bound_stops_a_file_that_never_settles() {
        let detector =
            QuiescenceDetector::with_probe(Arc::new(GrowingProbe(AtomicUsize::new(0))), INTERVAL)
                .with_limit(Some(Duration::from_secs(10)));

        let result = detector.wait_until_stable(Path::new("/in/stream.log")).await;

        assert!(matches!(
            result,
            Err(FsOpsError::StabilityTimeout { waited, .. }) if waited == Duration::from_secs(10)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_wait_keeps_sampling_a_growing_file() {
        let probe = Arc::new(GrowingProbe(AtomicUsize::new(0)));
        let detector = QuiescenceDetector::with_probe(probe.clone(), INTERVAL);

        let outcome = tokio::time::timeout(
            Duration::from_secs(3_600),
            detector.wait_until_stable(Path::new("/in/stream.log")),
        )
        .await;

        assert!(outcome.is_err(), "an unbounded wait must not give up on its own");
        assert!(probe.0.load(Ordering::SeqCst) > 3_000);
    }

    #[tokio::test]
    async fn fs_probe_reports_zero_for_missing_paths() {
        let size = FsSizeProbe
            .size(Path::new("/definitely/not/here.bin"))
            .await;
        assert_eq!(size, 0);
    }
}
