//! Pacing Controller (C6): produces context-aware delays for named
//! situations, with progressive scaling and occasional extended breaks,
//! as a pure function of (situation, run-so-far counter, RNG) so scrapes
//! stay deterministic in tests behind an injectable sleeper.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand_distr::{Distribution, Triangular};
use scout_core::PacingSituation;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Probability of an extra "stealth pause" of uniform(15, 45)s on top of
/// the drawn delay.
const STEALTH_PAUSE_PROBABILITY: f64 = 0.03;
const STEALTH_PAUSE_RANGE: (f64, f64) = (15.0, 45.0);

/// Abstraction over "wait for this long", so tests can inject a fake that
/// records durations instead of actually sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct RealSleeper;

#[async_trait]
impl Sleeper for RealSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Draw a delay in seconds for `situation`, given how many stores have
/// been scraped so far this run. Triangular distribution on
/// `(min, mode, max)` when a mode is defined; uniform on `(min, max)`
/// otherwise. The progressive scale factor `1 + 0.01 * stores_scraped`
/// is applied to whatever is drawn, then a 3% chance adds a stealth
/// pause of uniform(15, 45)s.
pub fn draw_delay_seconds(situation: PacingSituation, stores_scraped: u64, rng: &mut impl Rng) -> f64 {
    let (min, mode, max) = situation.bounds();

    let base = match mode {
        Some(mode) => Triangular::new(min, max, mode)
            .expect("situation bounds are always a valid triangular distribution")
            .sample(rng),
        None => rng.gen_range(min..=max),
    };

    let scale = 1.0 + 0.01 * stores_scraped as f64;
    let mut delay = base * scale;

    if rng.gen_bool(STEALTH_PAUSE_PROBABILITY) {
        delay += rng.gen_range(STEALTH_PAUSE_RANGE.0..=STEALTH_PAUSE_RANGE.1);
    }

    delay
}

pub struct PacingController<S: Sleeper = RealSleeper> {
    sleeper: S,
    stores_scraped: u64,
}

impl PacingController<RealSleeper> {
    pub fn new() -> Self {
        Self { sleeper: RealSleeper, stores_scraped: 0 }
    }
}

impl Default for PacingController<RealSleeper> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sleeper> PacingController<S> {
    pub fn with_sleeper(sleeper: S) -> Self {
        Self { sleeper, stores_scraped: 0 }
    }

    /// Advance the run-so-far counter the progressive scale factor reads
    /// from. Called by the orchestrator once per completed store visit.
    pub fn record_store_scraped(&mut self) {
        self.stores_scraped += 1;
    }

    pub fn stores_scraped(&self) -> u64 {
        self.stores_scraped
    }

    /// Sleep for the named situation, cancellable via `cancel`. Returns
    /// `true` if the sleep completed, `false` if it was cut short by
    /// cancellation.
    pub async fn pace(&self, situation: PacingSituation, cancel: &CancellationToken) -> bool {
        let mut rng = rand::thread_rng();
        let seconds = draw_delay_seconds(situation, self.stores_scraped, &mut rng);
        let duration = Duration::from_secs_f64(seconds.max(0.0));
        debug!(?situation, seconds, "pacing");

        tokio::select! {
            _ = self.sleeper.sleep(duration) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct RecordingSleeper {
        durations: Arc<std::sync::Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.durations.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn draw_delay_respects_bounds_for_every_situation() {
        let mut rng = rand::thread_rng();
        for situation in [
            PacingSituation::StoreVisit,
            PacingSituation::PageLoad,
            PacingSituation::DataExtract,
            PacingSituation::Pagination,
            PacingSituation::ErrorRecovery,
            PacingSituation::ExtendedBreak,
        ] {
            let (min, _, max) = situation.bounds();
            // Allow for the rare stealth-pause addition by drawing many
            // samples and checking the bulk fall within [min*scale, max*scale].
            let mut within_base_bounds = 0;
            for _ in 0..500 {
                let v = draw_delay_seconds(situation, 0, &mut rng);
                if v >= min - 1e-9 && v <= max + STEALTH_PAUSE_RANGE.1 + 1e-9 {
                    within_base_bounds += 1;
                }
            }
            assert_eq!(within_base_bounds, 500, "{situation:?} produced an out-of-range delay");
        }
    }

    #[test]
    fn progressive_scale_increases_with_stores_scraped() {
        let mut rng = rand::rngs::mock::StepRng::new(u64::MAX / 2, 0);
        let early = draw_delay_seconds(PacingSituation::StoreVisit, 0, &mut rng);
        let later = draw_delay_seconds(PacingSituation::StoreVisit, 100, &mut rng);
        assert!(later > early);
    }

    #[tokio::test]
    async fn pace_records_a_single_sleep_call() {
        let durations = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sleeper = RecordingSleeper { durations: Arc::clone(&durations) };
        let controller = PacingController::with_sleeper(sleeper);
        let cancel = CancellationToken::new();

        let completed = controller.pace(PacingSituation::DataExtract, &cancel).await;
        assert!(completed);
        assert_eq!(durations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pace_is_cancellable() {
        struct ForeverSleeper;
        #[async_trait]
        impl Sleeper for ForeverSleeper {
            async fn sleep(&self, _duration: Duration) {
                std::future::pending::<()>().await;
            }
        }
        let controller = PacingController::with_sleeper(ForeverSleeper);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let completed = controller.pace(PacingSituation::ExtendedBreak, &cancel).await;
        assert!(!completed);
    }
}
