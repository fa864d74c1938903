use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::extensions::{Clock, SystemClock};
use crate::util::{lock_unpoisoned, read_unpoisoned, write_unpoisoned};

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Admissions counted for one host since `window_start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: Instant,
    pub count: u32,
}

impl RateLimitWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    fn try_admit(&mut self, now: Instant, limit_per_minute: u32) -> bool {
        if now.saturating_duration_since(self.window_start) >= RATE_LIMIT_WINDOW {
            self.window_start = now;
            self.count = 1;
            return true;
        }
        if self.count < limit_per_minute {
            self.count += 1;
            return true;
        }
        false
    }
}

/// Fixed one-minute windows keyed by lowercase host.
///
/// The host map is only write-locked to insert a new host; each window has
/// its own mutex, so admissions for different hosts never wait on each
/// other. Bursts of up to twice the limit across a window boundary are
/// accepted.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: RwLock<HashMap<String, Arc<Mutex<RateLimitWindow>>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RateLimiter")
            .field("tracked_hosts", &self.tracked_hosts())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Counts one request against `host`. A limit of zero disables limiting.
    pub fn admit(&self, host: &str, limit_per_minute: u32) -> bool {
        if limit_per_minute == 0 {
            return true;
        }

        let window = self.window_for(&host.to_ascii_lowercase());
        let mut window = lock_unpoisoned(&window);
        window.try_admit(self.clock.now(), limit_per_minute)
    }

    pub fn window(&self, host: &str) -> Option<RateLimitWindow> {
        let windows = read_unpoisoned(&self.windows);
        let window = windows.get(&host.to_ascii_lowercase())?;
        Some(*lock_unpoisoned(window))
    }

    pub fn tracked_hosts(&self) -> usize {
        read_unpoisoned(&self.windows).len()
    }

    pub fn clear(&self) {
        write_unpoisoned(&self.windows).clear();
    }

    fn window_for(&self, host_key: &str) -> Arc<Mutex<RateLimitWindow>> {
        if let Some(window) = read_unpoisoned(&self.windows).get(host_key) {
            return Arc::clone(window);
        }

        let mut windows = write_unpoisoned(&self.windows);
        let window = windows
            .entry(host_key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitWindow::new(self.clock.now()))));
        Arc::clone(window)
    }
}
