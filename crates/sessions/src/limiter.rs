use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window admission counter: at most `max` admissions per window.
///
/// One limiter is created per connection. Refused frames are not recorded,
/// so a refusal never extends the window.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            hits: VecDeque::new(),
        }
    }

    /// Per-minute limiter, the protocol default.
    pub fn per_minute(max: u32) -> Self {
        Self::new(max, Duration::from_secs(60))
    }

    /// Evict expired timestamps, then admit and record `now` if under the
    /// cap.
    pub fn allow(&mut self, now: Instant) -> bool {
        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if (self.hits.len() as u32) < self.max {
            self.hits.push_back(now);
            true
        } else {
            false
        }
    }

    pub fn current_count(&self) -> usize {
        self.hits.len()
    }
}
