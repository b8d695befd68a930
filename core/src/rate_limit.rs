//! Fixed-window request limiter.
//!
//! A single in-memory counter map keyed by caller address. Entries reset when
//! their window expires; there is no background sweeper, a stale entry is
//! replaced on the key's next request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key`. Returns `false` when the key already spent
    /// its budget for the current window.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned map only happens after a panic elsewhere; letting the
            // request through is the harmless direction.
            return true;
        };

        match windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.max_requests {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }
}

impl Default for RateLimiter {
    /// 10 requests per minute, the portal's historical budget.
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}
