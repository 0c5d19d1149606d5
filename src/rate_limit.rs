use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

// Longest window a limiter will track; longer ones are clamped
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// Rate limit entry - tracks requests per IP/key inside one fixed window
#[derive(Debug, Clone, Copy)]
pub struct WindowEntry {
    pub count: u32,
    pub reset_at: Instant,
}

impl WindowEntry {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }
}

// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

impl Decision {
    /// Time left until the window this decision belongs to resets.
    pub fn retry_after(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

/// Fixed-window request counter keyed by an opaque client identifier.
///
/// Entries are only replaced when their identifier is seen again after the
/// window has passed. There is no background sweep, so the map holds one
/// entry per distinct identifier ever checked.
pub struct AdmissionLimiter {
    window: Duration,
    max_requests: u32,
    entries: DashMap<String, WindowEntry>,
}

impl AdmissionLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window: window.min(MAX_WINDOW),
            max_requests,
            entries: DashMap::new(),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, identifier: &str) -> Decision {
        self.check_at(identifier, Instant::now())
    }

    pub fn check_at(&self, identifier: &str, now: Instant) -> Decision {
        // the entry guard holds the shard lock for the whole read-modify-write
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry::open(now, self.window));

        // window expired..? start a new one
        if now > entry.reset_at {
            *entry = WindowEntry::open(now, self.window);
        }

        if entry.count >= self.max_requests {
            return Decision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        Decision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            reset_at: entry.reset_at,
        }
    }

    // Tracked identifiers, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Endpoint classes, each gated by its own limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    Auth,
    Api,
    Submission,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Auth => "auth",
            LimitClass::Api => "api",
            LimitClass::Submission => "submission",
        }
    }
}

impl fmt::Display for LimitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent limiter instances for every endpoint class. Quotas never
/// interact across classes.
pub struct Limiters {
    pub auth: AdmissionLimiter,
    pub api: AdmissionLimiter,
    pub submission: AdmissionLimiter,
}

impl Limiters {
    pub fn for_class(&self, class: LimitClass) -> &AdmissionLimiter {
        match class {
            LimitClass::Auth => &self.auth,
            LimitClass::Api => &self.api,
            LimitClass::Submission => &self.submission,
        }
    }
}
