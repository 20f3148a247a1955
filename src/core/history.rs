#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Commits closer together than this are treated as the same instant.
pub const TIME_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeSample {
    pub time: f64,
    pub value: f64,
}

impl TimeSample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// What a lookup returns once the delayed time runs past the newest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Extrapolation {
    /// Clamp to the newest value.
    #[default]
    Hold,
    /// Continue the newest segment. A lone sample holds.
    Linear,
}

/// Outcome of [`SignalHistory::add_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Appended,
    /// Arrived out of order and was placed at its sorted position.
    Inserted,
    /// Overwrote the value of a sample at the same time.
    Replaced,
    /// Non-finite time or value.
    Rejected,
}

/// Time series of one sensed quantity, kept sorted by time.
///
/// Samples only enter through [`add_point`](Self::add_point); lookups never
/// mutate. A host integrating with step-size control should record samples
/// for accepted steps only and use [`delayed_value_with`](Self::delayed_value_with)
/// for trial evaluations.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    owner: String,
    samples: Vec<TimeSample>,
    extrapolation: Extrapolation,

    // Oldest age worth keeping. None keeps everything.
    retention: Option<f64>,
}

impl SignalHistory {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            samples: Vec::new(),
            extrapolation: Extrapolation::default(),
            retention: None,
        }
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Drop samples older than `window` behind the newest one.
    ///
    /// Safe as long as `window` is at least the largest delay ever queried
    /// against this history. Invalid windows disable retention.
    pub fn with_retention(mut self, window: f64) -> Self {
        self.retention = (window.is_finite() && window >= 0.0).then_some(window);
        self.enforce_retention();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn extrapolation(&self) -> Extrapolation {
        self.extrapolation
    }

    pub fn retention(&self) -> Option<f64> {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TimeSample] {
        &self.samples
    }

    pub fn first_time(&self) -> Option<f64> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Record a sample, keeping the series sorted.
    ///
    /// Re-recording an instant overwrites it, so committing the same step
    /// twice leaves a single sample behind.
    pub fn add_point(&mut self, time: f64, value: f64) -> Insertion {
        if !time.is_finite() || !value.is_finite() {
            warn!(owner = %self.owner, time, value, "rejected non-finite sample");
            return Insertion::Rejected;
        }

        let sample = TimeSample::new(time, value);
        let outcome = match self.samples.last() {
            Some(last) if time <= last.time + TIME_EPSILON => {
                let idx = self
                    .samples
                    .partition_point(|s| s.time < time - TIME_EPSILON);
                match self.samples.get_mut(idx) {
                    Some(existing) if (existing.time - time).abs() <= TIME_EPSILON => {
                        existing.value = value;
                        Insertion::Replaced
                    }
                    _ => {
                        self.samples.insert(idx, sample);
                        Insertion::Inserted
                    }
                }
            }
            _ => {
                self.samples.push(sample);
                Insertion::Appended
            }
        };

        self.enforce_retention();
        outcome
    }

    /// Value at `time` with no delay applied.
    pub fn value_at(&self, time: f64) -> f64 {
        self.lookup(time, None)
    }

    /// Value recorded `delay` seconds before `query_time`.
    ///
    /// Zero until something has been recorded at or before the delayed time.
    pub fn delayed_value(&self, query_time: f64, delay: f64) -> f64 {
        self.lookup(query_time - delay, None)
    }

    /// Like [`delayed_value`](Self::delayed_value), with `live` treated as if
    /// it had been recorded. `live` shadows a stored sample at the same time.
    pub fn delayed_value_with(&self, query_time: f64, delay: f64, live: TimeSample) -> f64 {
        self.lookup(query_time - delay, Some(live))
    }

    fn lookup(&self, t: f64, live: Option<TimeSample>) -> f64 {
        let live = live.filter(|l| l.time.is_finite() && l.value.is_finite());

        let Some(lo) = self.floor(t, live, true) else {
            // Cold start: nothing recorded at or before `t`.
            return 0.0;
        };

        if let Some(hi) = self.ceil(t, live) {
            let span = hi.time - lo.time;
            if span <= 0.0 {
                return lo.value;
            }
            return lo.value + (hi.value - lo.value) * (t - lo.time) / span;
        }

        match self.extrapolation {
            Extrapolation::Hold => lo.value,
            Extrapolation::Linear => match self.floor(lo.time, live, false) {
                Some(prev) if lo.time > prev.time => {
                    let slope = (lo.value - prev.value) / (lo.time - prev.time);
                    lo.value + slope * (t - lo.time)
                }
                _ => lo.value,
            },
        }
    }

    // Newest sample at or before `t` (strictly before when `inclusive` is false).
    fn floor(&self, t: f64, live: Option<TimeSample>, inclusive: bool) -> Option<TimeSample> {
        let admits = |time: f64| {
            if inclusive {
                time <= t
            } else {
                time < t - TIME_EPSILON
            }
        };

        let idx = self.samples.partition_point(|s| admits(s.time));
        let stored = idx.checked_sub(1).map(|i| self.samples[i]);

        match live.filter(|l| admits(l.time)) {
            Some(l) if stored.map_or(true, |s| l.time >= s.time - TIME_EPSILON) => Some(l),
            _ => stored,
        }
    }

    // Oldest sample strictly after `t`.
    fn ceil(&self, t: f64, live: Option<TimeSample>) -> Option<TimeSample> {
        let idx = self.samples.partition_point(|s| s.time <= t);
        let stored = self.samples.get(idx).copied();

        match live.filter(|l| l.time > t) {
            Some(l) if stored.map_or(true, |s| l.time <= s.time + TIME_EPSILON) => Some(l),
            _ => stored,
        }
    }

    fn enforce_retention(&mut self) {
        let (Some(window), Some(last)) = (self.retention, self.samples.last()) else {
            return;
        };
        let cutoff = last.time - window;

        // Keep the newest sample at or before the cutoff so lookups right at
        // the cutoff still have a left neighbour.
        let keep_from = self
            .samples
            .partition_point(|s| s.time <= cutoff)
            .saturating_sub(1);
        if keep_from > 0 {
            self.samples.drain(..keep_from);
        }
    }
}
