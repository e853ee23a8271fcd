use crate::classify::ContentKind;
use crate::config::HumanBehaviorConfig;
use chrono::{Datelike, Local, Weekday};
use rand::Rng;
use std::time::Duration;

/// What the previous page looked like; feeds the complexity adaptation
#[derive(Debug, Clone, Copy)]
pub struct PageContext {
    pub word_count: usize,
    pub image_count: usize,
    pub kind: ContentKind,
}

/// Closed-form human pacing state
///
/// A small struct updated after each fetch: no timers, no background tasks.
/// The delay before request N+1 is a pure function of this state, the
/// config, and the page that was just read.
pub struct HumanPacing {
    cfg: HumanBehaviorConfig,
    /// Floor from crawling.request_delay
    request_delay_floor: f64,
    pages_visited: usize,
    cooldown_remaining: usize,
}

impl HumanPacing {
    pub fn new(cfg: HumanBehaviorConfig, request_delay_floor: f64) -> Self {
        Self {
            cfg,
            request_delay_floor,
            pages_visited: 0,
            cooldown_remaining: 0,
        }
    }

    /// The sleep to take before the next request
    ///
    /// Simulated reading time plus a navigation decision, scaled by content
    /// complexity, content kind, fatigue, the weekend factor, random
    /// variance, and any active rate-limit cooldown; clamped to the
    /// configured bounds.
    pub fn pre_request_delay(&self, previous: Option<&PageContext>) -> Duration {
        self.compute_delay(previous, is_weekend())
    }

    fn compute_delay(&self, previous: Option<&PageContext>, weekend: bool) -> Duration {
        let mut rng = rand::rng();
        let cfg = &self.cfg;

        let mut delay = sample_range(&mut rng, cfg.base_reading_time)
            + sample_range(&mut rng, cfg.navigation_decision);

        if let Some(page) = previous {
            if page.word_count > 1000 {
                delay *= cfg.complexity_multiplier;
            } else if page.word_count > 500 {
                delay *= 1.2;
            }

            // Half a second of looking per image, capped
            delay += (page.image_count as f64 * 0.5).min(2.0);

            match page.kind {
                ContentKind::Documentation => delay *= 1.3,
                ContentKind::Navigation => delay *= 0.7,
                _ => {}
            }
        }

        delay *= self.fatigue_multiplier();

        if weekend {
            delay *= cfg.weekend_factor;
        }

        if cfg.variance_percent > 0 {
            let v = cfg.variance_percent as f64 / 100.0;
            delay *= 1.0 + rng.random_range(-v..=v);
        }

        if self.cooldown_remaining > 0 {
            delay *= 2.0;
        }

        let floor = self.cfg.minimum_delay.max(self.request_delay_floor);
        Duration::from_secs_f64(delay.clamp(floor, self.cfg.maximum_delay.max(floor)))
    }

    /// Grows stepwise: one fatigue_factor increment per completed
    /// session_break_after interval
    pub fn fatigue_multiplier(&self) -> f64 {
        let intervals = self.pages_visited / self.cfg.session_break_after;
        1.0 + self.cfg.fatigue_factor * intervals as f64
    }

    /// Whether a long break is due before the next request
    pub fn should_take_break(&self) -> bool {
        self.pages_visited > 0 && self.pages_visited % self.cfg.session_break_after == 0
    }

    /// Duration of a session break
    pub fn session_break(&self) -> Duration {
        let mut rng = rand::rng();
        Duration::from_secs_f64(sample_range(&mut rng, self.cfg.session_break_duration))
    }

    /// Records a completed page fetch; ticks down any cooldown
    pub fn record_page(&mut self) {
        self.pages_visited += 1;
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
    }

    /// A 429 arrived: double base delays for the next cooldown_pages pages
    pub fn note_rate_limited(&mut self) {
        self.cooldown_remaining = self.cfg.cooldown_pages;
        tracing::warn!(
            "Rate limit observed; doubling delays for the next {} pages",
            self.cooldown_remaining
        );
    }

    pub fn cooldown_active(&self) -> bool {
        self.cooldown_remaining > 0
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited
    }

    /// The contractual lower bound on the gap between adjacent same-host
    /// requests
    pub fn minimum_gap(&self) -> Duration {
        let floor = self.cfg.minimum_delay.max(self.request_delay_floor);
        let base = self.cfg.base_reading_time[0] * self.fatigue_multiplier();
        Duration::from_secs_f64(base.max(floor))
    }
}

fn sample_range<R: Rng>(rng: &mut R, range: [f64; 2]) -> f64 {
    if range[1] <= range[0] {
        return range[0];
    }
    rng.random_range(range[0]..=range[1])
}

fn is_weekend() -> bool {
    matches!(Local::now().weekday(), Weekday::Sat | Weekday::Sun)
}
