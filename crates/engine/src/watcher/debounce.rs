// Save debouncer for one watched workbook.
//
// A single logical save shows up as a burst of raw events (temp file write,
// rename, metadata touch). The debouncer holds one pending slot for the
// watched file: every event refreshes it, the latest kind wins, and the slot
// settles once the file has been quiet for the window. A file that never
// goes quiet still settles after `MAX_WAIT_WINDOWS` windows.

use std::time::{Duration, Instant};

use super::FsEventKind;

/// Default quiet window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
const MIN_DEBOUNCE_MS: u64 = 50;
const MAX_DEBOUNCE_MS: u64 = 2000;
/// Upper bound on how long a burst can hold back a notification, in windows.
const MAX_WAIT_WINDOWS: u32 = 4;

#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Window in milliseconds, clamped to [50, 2000].
    pub fn with_millis(ms: u64) -> Self {
        Self { window: Duration::from_millis(ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS)) }
    }

    fn max_wait(&self) -> Duration {
        self.window * MAX_WAIT_WINDOWS
    }
}

/// A burst that has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledSave {
    /// Kind of the last raw event in the burst.
    pub kind: FsEventKind,
    /// How many raw events the burst collapsed.
    pub events: u32,
}

#[derive(Debug)]
struct Burst {
    kind: FsEventKind,
    events: u32,
    first_seen: Instant,
    last_seen: Instant,
}

/// Call `record()` for every raw event on the watched file and
/// `take_settled()` periodically.
#[derive(Debug)]
pub struct Debouncer {
    config: DebounceConfig,
    burst: Option<Burst>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, burst: None }
    }

    pub fn record(&mut self, kind: FsEventKind) {
        self.record_at(kind, Instant::now());
    }

    fn record_at(&mut self, kind: FsEventKind, now: Instant) {
        match &mut self.burst {
            Some(burst) => {
                burst.kind = kind;
                burst.events += 1;
                burst.last_seen = now;
            }
            None => {
                self.burst = Some(Burst { kind, events: 1, first_seen: now, last_seen: now });
            }
        }
    }

    /// Take the pending burst if it has settled.
    pub fn take_settled(&mut self) -> Option<SettledSave> {
        self.take_settled_at(Instant::now())
    }

    fn take_settled_at(&mut self, now: Instant) -> Option<SettledSave> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.burst.take().map(|burst| SettledSave { kind: burst.kind, events: burst.events })
    }

    pub fn is_pending(&self) -> bool {
        self.burst.is_some()
    }

    /// When the pending burst settles: a quiet window after the last event,
    /// or the max wait after the first, whichever comes first.
    pub fn deadline(&self) -> Option<Instant> {
        self.burst.as_ref().map(|burst| {
            let quiet = burst.last_seen + self.config.window;
            let cap = burst.first_seen + self.config.max_wait();
            quiet.min(cap)
        })
    }
}
