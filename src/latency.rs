//! Latency simulation.
//!
//! Computes the delay a response should be held back by and hands it to a
//! [`Sleeper`]. The sleeper is a seam: the server uses [`TokioSleeper`],
//! tests substitute one that only records what was requested.

use crate::config::{LatencyConfig, LatencyKind};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Suspends the current request for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer, suspending only the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Applies a response's latency policy before it is emitted.
pub struct LatencyInjector {
    sleeper: Arc<dyn Sleeper>,
    /// Seeded once; only locked long enough to draw a sample.
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for LatencyInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyInjector").finish_non_exhaustive()
    }
}

impl Default for LatencyInjector {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}

impl LatencyInjector {
    /// Create an injector with an entropy-seeded random source.
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            sleeper,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create an injector whose random delays are reproducible.
    pub fn with_seed(sleeper: Arc<dyn Sleeper>, seed: u64) -> Self {
        Self {
            sleeper,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// The delay a policy asks for, or `None` when it asks for no sleep.
    pub fn delay_for(&self, policy: &LatencyConfig) -> Option<Duration> {
        match policy.kind {
            LatencyKind::None => None,
            LatencyKind::Simple => Some(policy.delay),
            LatencyKind::Random => {
                // zero bounds are rejected when the configuration is loaded
                let bound = u64::try_from(policy.delay.as_nanos()).unwrap_or(u64::MAX);
                if bound == 0 {
                    return Some(Duration::ZERO);
                }
                let nanos = self
                    .rng
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .gen_range(0..bound);
                Some(Duration::from_nanos(nanos))
            }
        }
    }

    /// Sleep according to `policy`, returning the duration requested.
    pub async fn apply(&self, policy: Option<&LatencyConfig>) -> Option<Duration> {
        let delay = policy.and_then(|p| self.delay_for(p))?;
        debug!(delay_ms = delay.as_millis() as u64, "Applying latency");
        self.sleeper.sleep(delay).await;
        Some(delay)
    }
}
