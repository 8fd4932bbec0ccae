use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Span;

use crate::config::Config;
use crate::strategies::VideoId;

/// Source of time for timeouts and delays
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that advances only when slept on. Sleeps return immediately.
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Total simulated time slept so far
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Every sleep requested, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(|p| p.into_inner()) += duration;
        self.sleeps
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(duration);
    }
}

/// Run-scoped state handed to the executor and every strategy.
///
/// Holds the configuration, the clock used for waits, the random source for
/// jitter and the tracing span all events of this run are recorded under.
pub struct RunContext {
    config: Config,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    span: Span,
    show_progress: bool,
}

impl RunContext {
    pub fn new(config: Config, video_id: &VideoId) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            rng: Mutex::new(StdRng::from_entropy()),
            span: tracing::info_span!("transcript_run", video_id = %video_id),
            show_progress: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fix the jitter random source so delays are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Random delay in the configured settle window, inclusive of both bounds
    pub fn settle_delay(&self) -> Duration {
        let browser = &self.config.browser;
        let (min, max) = (browser.settle_min_ms, browser.settle_max_ms.max(browser.settle_min_ms));
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        Duration::from_millis(rng.gen_range(min..=max))
    }

    /// Spinner for a long-running step; hidden unless progress output is enabled
    pub fn spinner(&self, message: impl Into<String>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            progress.set_style(style);
        }
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(120));
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> VideoId {
        VideoId::new("ABC123").unwrap()
    }

    #[test]
    fn test_settle_delay_within_bounds() {
        let ctx = RunContext::new(Config::default(), &video()).with_seed(7);
        for _ in 0..200 {
            let delay = ctx.settle_delay();
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_seeded_delays_repeat() {
        let a = RunContext::new(Config::default(), &video()).with_seed(42);
        let b = RunContext::new(Config::default(), &video()).with_seed(42);
        let first: Vec<_> = (0..5).map(|_| a.settle_delay()).collect();
        let second: Vec<_> = (0..5).map(|_| b.settle_delay()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_degenerate_settle_window() {
        let mut config = Config::default();
        config.browser.settle_min_ms = 3000;
        config.browser.settle_max_ms = 3000;
        let ctx = RunContext::new(config, &video());
        assert_eq!(ctx.settle_delay(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(250)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.now() - start, Duration::from_millis(2250));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250), Duration::from_secs(2)]);
    }
}
