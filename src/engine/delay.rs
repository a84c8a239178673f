use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::limits::MAX_PROCESSING_DELAY;

/// Simulated booking latency. Real latency is what makes races between
/// concurrent attempts on one seat reproducible; tests use [`ProcessingDelay::Zero`].
#[derive(Clone, Default)]
pub enum ProcessingDelay {
    #[default]
    Zero,
    Fixed(Duration),
    /// Uniform in `[min, max)`; `max <= min` collapses to `min`.
    Uniform { min: Duration, max: Duration },
    Custom(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl ProcessingDelay {
    pub fn custom(f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        ProcessingDelay::Custom(Arc::new(f))
    }

    /// Draw the next delay, capped at [`MAX_PROCESSING_DELAY`].
    pub fn sample(&self) -> Duration {
        let d = match self {
            ProcessingDelay::Zero => Duration::ZERO,
            ProcessingDelay::Fixed(d) => *d,
            ProcessingDelay::Uniform { min, max } => {
                if max <= min {
                    *min
                } else {
                    rand::thread_rng().gen_range(*min..*max)
                }
            }
            ProcessingDelay::Custom(f) => f(),
        };
        d.min(MAX_PROCESSING_DELAY)
    }

    pub async fn wait(&self) {
        let d = self.sample();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

impl fmt::Debug for ProcessingDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingDelay::Zero => f.write_str("Zero"),
            ProcessingDelay::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            ProcessingDelay::Uniform { min, max } => f
                .debug_struct("Uniform")
                .field("min", min)
                .field("max", max)
                .finish(),
            ProcessingDelay::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
