use std::collections::HashMap;

use crate::types::TimeMs;

// ---------------------------------------------------------------------------
// TimingEnv
// ---------------------------------------------------------------------------

/// The placement window of one compiled fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentTiming {
    pub start: TimeMs,
    pub end: TimeMs,
    pub duration: TimeMs,
}

/// Live mapping of fragment id to its timing window, filled in fragment by
/// fragment as a sequence compiles. Later sequences observe entries only for
/// fragments whose compilation has already completed, which is what makes
/// lazy offset expressions structurally cycle-free.
#[derive(Debug, Default)]
pub struct TimingEnv {
    entries: HashMap<String, FragmentTiming>,
}

impl TimingEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: impl Into<String>, timing: FragmentTiming) {
        self.entries.insert(id.into(), timing);
    }

    pub fn get(&self, id: &str) -> Option<&FragmentTiming> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The furthest end recorded so far: the timeline length once every
    /// sequence has compiled.
    pub fn max_end(&self) -> TimeMs {
        self.entries
            .values()
            .map(|t| t.end)
            .max()
            .unwrap_or(TimeMs::ZERO)
    }

    /// Walks a dotted property path below a fragment entry. Only
    /// `time.start`, `time.end` and `time.duration` exist.
    pub fn lookup(&self, id: &str, path: &[String]) -> Option<f64> {
        let timing = self.entries.get(id)?;
        match path {
            [first, second] if first == "time" => match second.as_str() {
                "start" => Some(timing.start.millis() as f64),
                "end" => Some(timing.end.millis() as f64),
                "duration" => Some(timing.duration.millis() as f64),
                _ => None,
            },
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
