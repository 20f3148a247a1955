use hashbrown::HashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReflexError, ReflexResult};
use crate::history::{Extrapolation, Insertion, SignalHistory, TimeSample};
use crate::host::{find_process, Process, ProcessId, SimState};

/// Index of a channel in a [`ChannelArena`].
pub type ChannelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelKind {
    /// Muscle spindle: fiber stretch and lengthening speed.
    StretchVelocity,
    /// Golgi tendon organ: tendon elongation beyond slack.
    TendonLength,
    /// Pure transport delay of an externally supplied signal.
    Delay,
}

impl ChannelKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::StretchVelocity => "stretch-velocity sensor",
            Self::TendonLength => "tendon-length sensor",
            Self::Delay => "delay element",
        }
    }
}

/// Which signals a stretch-velocity sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpindleMode {
    /// Delayed stretch only; speed reads as zero.
    Stretch,
    /// Delayed stretch plus undelayed lengthening speed.
    #[default]
    StretchVelocity,
}

/// A sample produced by a read that has not been recorded yet.
///
/// Hosts hand these back through [`ChannelArena::commit`] once the step that
/// produced them is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSample {
    pub channel: ChannelId,
    pub sample: TimeSample,
}

impl PendingSample {
    pub fn new(channel: ChannelId, sample: TimeSample) -> Self {
        Self { channel, sample }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpindleReading {
    pub stretch: f64,
    pub speed: f64,
    pub live: TimeSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TendonReading {
    pub length: f64,
    pub live: TimeSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayReading {
    pub value: f64,
    pub live: TimeSample,
}

const UNSET_PROCESS: &str = "<unset process>";

#[derive(Debug, Clone)]
struct ProcessRef {
    name: String,
    id: Option<ProcessId>,
}

impl ProcessRef {
    fn label(&self) -> &str {
        if self.name.is_empty() {
            UNSET_PROCESS
        } else {
            &self.name
        }
    }

    fn resolve<P: Process>(&mut self, owner: &str, processes: &[P]) -> ReflexResult<ProcessId> {
        self.id = None;
        if self.name.is_empty() {
            return Err(ReflexError::binding(owner, UNSET_PROCESS));
        }
        let id = find_process(processes, &self.name)
            .ok_or_else(|| ReflexError::binding(owner, self.name.as_str()))?;
        self.id = Some(id);
        Ok(id)
    }

    fn get<'a, P: Process>(&self, owner: &str, processes: &'a [P]) -> ReflexResult<&'a P> {
        let id = self
            .id
            .ok_or_else(|| ReflexError::binding(owner, self.label()))?;
        match processes.get(id) {
            Some(p) if p.name() == self.name => Ok(p),
            _ => Err(ReflexError::binding(owner, self.label())),
        }
    }
}

// Shared plumbing of every channel kind: identity, process binding, delay and
// the history the delay reads from.
#[derive(Debug, Clone)]
struct Tap {
    kind: ChannelKind,
    name: String,
    process: ProcessRef,
    delay: f64,
    extrapolation: Extrapolation,
    retention: Option<f64>,
    history: Option<SignalHistory>,
}

impl Tap {
    fn new(kind: ChannelKind, name: String, process: String, delay: f64) -> ReflexResult<Self> {
        if name.is_empty() {
            return Err(ReflexError::config(
                format!("<unnamed {}>", kind.label()),
                "channel name must not be empty",
            ));
        }
        if !delay.is_finite() || delay < 0.0 {
            return Err(ReflexError::config(
                name,
                format!("delay must be finite and non-negative, got {delay}"),
            ));
        }

        Ok(Self {
            kind,
            name,
            process: ProcessRef { name: process, id: None },
            delay,
            extrapolation: Extrapolation::default(),
            retention: None,
            history: None,
        })
    }

    // A window shorter than the delay would drop the samples every delayed
    // lookup needs and read zero forever.
    fn set_retention(&mut self, window: f64) -> ReflexResult<()> {
        if !window.is_finite() || window < self.delay {
            return Err(ReflexError::config(
                self.name.as_str(),
                format!(
                    "retention window must be finite and at least the delay ({}), got {window}",
                    self.delay
                ),
            ));
        }
        self.retention = Some(window);
        Ok(())
    }

    fn bind_process(&mut self, process: String) {
        self.process = ProcessRef { name: process, id: None };
    }

    fn connect<P: Process>(&mut self, processes: &[P]) -> ReflexResult<ProcessId> {
        let id = self.process.resolve(&self.name, processes)?;

        let stale = self
            .history
            .as_ref()
            .map_or(true, |h| h.owner() != self.process.name);
        if stale {
            let mut history =
                SignalHistory::new(self.process.name.clone()).with_extrapolation(self.extrapolation);
            if let Some(window) = self.retention {
                history = history.with_retention(window);
            }
            self.history = Some(history);
        }

        debug!(
            channel = %self.name,
            kind = self.kind.label(),
            process = %self.process.name,
            id,
            "channel connected"
        );
        Ok(id)
    }

    fn process<'a, P: Process>(&self, processes: &'a [P]) -> ReflexResult<&'a P> {
        self.process.get(&self.name, processes)
    }

    fn read(&self, time: f64, value: f64) -> ReflexResult<(f64, TimeSample)> {
        let history = self
            .history
            .as_ref()
            .ok_or_else(|| ReflexError::binding(self.name.as_str(), self.process.label()))?;
        let live = TimeSample::new(time, value);
        Ok((history.delayed_value_with(time, self.delay, live), live))
    }

    fn commit(&mut self, sample: TimeSample) -> Insertion {
        match &mut self.history {
            Some(history) => history.add_point(sample.time, sample.value),
            None => {
                warn!(channel = %self.name, "commit on a channel that was never connected");
                Insertion::Rejected
            }
        }
    }
}

/// Muscle spindle model.
///
/// `stretch = length - rest_fraction * optimal_fiber_length`, reported after
/// the channel's delay. In [`SpindleMode::StretchVelocity`] the lengthening
/// speed is passed through undelayed.
#[derive(Debug, Clone)]
pub struct StretchVelocitySensor {
    tap: Tap,
    rest_fraction: f64,
    mode: SpindleMode,
}

impl StretchVelocitySensor {
    pub fn new(
        name: impl Into<String>,
        process: impl Into<String>,
        rest_fraction: f64,
        delay: f64,
    ) -> ReflexResult<Self> {
        let tap = Tap::new(ChannelKind::StretchVelocity, name.into(), process.into(), delay)?;
        if !rest_fraction.is_finite() {
            return Err(ReflexError::config(
                tap.name,
                format!("rest length fraction must be finite, got {rest_fraction}"),
            ));
        }
        Ok(Self {
            tap,
            rest_fraction,
            mode: SpindleMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: SpindleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.tap.extrapolation = extrapolation;
        self
    }

    /// Keep `window` seconds of signal. Must cover the delay.
    pub fn with_retention(mut self, window: f64) -> ReflexResult<Self> {
        self.tap.set_retention(window)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.tap.name
    }

    pub fn rest_fraction(&self) -> f64 {
        self.rest_fraction
    }

    pub fn delay(&self) -> f64 {
        self.tap.delay
    }

    pub fn mode(&self) -> SpindleMode {
        self.mode
    }

    /// Undelayed stretch of the monitored fibers.
    pub fn raw_stretch<P: Process>(&self, processes: &[P], state: &P::State) -> ReflexResult<f64> {
        let p = self.tap.process(processes)?;
        Ok(p.length(state) - self.rest_fraction * p.optimal_fiber_length())
    }

    /// Delayed stretch and (mode permitting) speed. Does not touch history.
    pub fn sample<P: Process>(
        &self,
        processes: &[P],
        state: &P::State,
    ) -> ReflexResult<SpindleReading> {
        let p = self.tap.process(processes)?;
        let raw = p.length(state) - self.rest_fraction * p.optimal_fiber_length();
        let (stretch, live) = self.tap.read(state.time(), raw)?;
        let speed = match self.mode {
            SpindleMode::Stretch => 0.0,
            SpindleMode::StretchVelocity => p.lengthening_speed(state),
        };
        Ok(SpindleReading {
            stretch,
            speed,
            live,
        })
    }
}

/// Golgi tendon organ model: `tendon_length - tendon_slack_length`.
#[derive(Debug, Clone)]
pub struct TendonLengthSensor {
    tap: Tap,
}

impl TendonLengthSensor {
    pub fn new(name: impl Into<String>, process: impl Into<String>, delay: f64) -> ReflexResult<Self> {
        Ok(Self {
            tap: Tap::new(ChannelKind::TendonLength, name.into(), process.into(), delay)?,
        })
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.tap.extrapolation = extrapolation;
        self
    }

    /// Keep `window` seconds of signal. Must cover the delay.
    pub fn with_retention(mut self, window: f64) -> ReflexResult<Self> {
        self.tap.set_retention(window)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.tap.name
    }

    pub fn delay(&self) -> f64 {
        self.tap.delay
    }

    pub fn raw_length<P: Process>(&self, processes: &[P], state: &P::State) -> ReflexResult<f64> {
        let p = self.tap.process(processes)?;
        Ok(p.tendon_length(state) - p.tendon_slack_length())
    }

    pub fn sample<P: Process>(
        &self,
        processes: &[P],
        state: &P::State,
    ) -> ReflexResult<TendonReading> {
        let raw = self.raw_length(processes, state)?;
        let (length, live) = self.tap.read(state.time(), raw)?;
        Ok(TendonReading { length, live })
    }
}

/// Delays any externally supplied signal by a fixed duration.
///
/// The bound process only names the history; the signal itself comes from
/// the caller.
#[derive(Debug, Clone)]
pub struct DelayElement {
    tap: Tap,
}

impl DelayElement {
    pub fn new(name: impl Into<String>, process: impl Into<String>, delay: f64) -> ReflexResult<Self> {
        Ok(Self {
            tap: Tap::new(ChannelKind::Delay, name.into(), process.into(), delay)?,
        })
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.tap.extrapolation = extrapolation;
        self
    }

    /// Keep `window` seconds of signal. Must cover the delay.
    pub fn with_retention(mut self, window: f64) -> ReflexResult<Self> {
        self.tap.set_retention(window)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.tap.name
    }

    pub fn delay(&self) -> f64 {
        self.tap.delay
    }

    pub fn sample(&self, time: f64, input: f64) -> ReflexResult<DelayReading> {
        let (value, live) = self.tap.read(time, input)?;
        Ok(DelayReading { value, live })
    }
}

#[derive(Debug, Clone)]
pub enum Channel {
    StretchVelocity(StretchVelocitySensor),
    TendonLength(TendonLengthSensor),
    Delay(DelayElement),
}

impl From<StretchVelocitySensor> for Channel {
    fn from(sensor: StretchVelocitySensor) -> Self {
        Self::StretchVelocity(sensor)
    }
}

impl From<TendonLengthSensor> for Channel {
    fn from(sensor: TendonLengthSensor) -> Self {
        Self::TendonLength(sensor)
    }
}

impl From<DelayElement> for Channel {
    fn from(element: DelayElement) -> Self {
        Self::Delay(element)
    }
}

impl Channel {
    fn tap(&self) -> &Tap {
        match self {
            Self::StretchVelocity(s) => &s.tap,
            Self::TendonLength(s) => &s.tap,
            Self::Delay(s) => &s.tap,
        }
    }

    fn tap_mut(&mut self) -> &mut Tap {
        match self {
            Self::StretchVelocity(s) => &mut s.tap,
            Self::TendonLength(s) => &mut s.tap,
            Self::Delay(s) => &mut s.tap,
        }
    }

    pub fn name(&self) -> &str {
        &self.tap().name
    }

    pub fn kind(&self) -> ChannelKind {
        self.tap().kind
    }

    pub fn delay(&self) -> f64 {
        self.tap().delay
    }

    pub fn process_name(&self) -> &str {
        &self.tap().process.name
    }

    /// Resolved process, once connected.
    pub fn process_id(&self) -> Option<ProcessId> {
        self.tap().process.id
    }

    /// Point the channel at another process. Takes effect on the next connect.
    pub fn bind_process(&mut self, process: impl Into<String>) {
        self.tap_mut().bind_process(process.into());
    }

    pub fn history(&self) -> Option<&SignalHistory> {
        self.tap().history.as_ref()
    }

    pub fn connect<P: Process>(&mut self, processes: &[P]) -> ReflexResult<ProcessId> {
        self.tap_mut().connect(processes)
    }

    pub fn commit(&mut self, sample: TimeSample) -> Insertion {
        self.tap_mut().commit(sample)
    }

    pub fn reset_history(&mut self) {
        if let Some(history) = &mut self.tap_mut().history {
            history.clear();
        }
    }

    pub fn as_spindle(&self) -> Option<&StretchVelocitySensor> {
        match self {
            Self::StretchVelocity(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tendon(&self) -> Option<&TendonLengthSensor> {
        match self {
            Self::TendonLength(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_delay(&self) -> Option<&DelayElement> {
        match self {
            Self::Delay(s) => Some(s),
            _ => None,
        }
    }
}

/// Model-owned storage for every channel. Controllers and registries refer
/// to channels by [`ChannelId`].
#[derive(Debug, Clone, Default)]
pub struct ChannelArena {
    channels: Vec<Channel>,
    by_name: HashMap<String, ChannelId>,
}

impl ChannelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Names are unique within an arena.
    pub fn add(&mut self, channel: impl Into<Channel>) -> ReflexResult<ChannelId> {
        let channel = channel.into();
        if self.by_name.contains_key(channel.name()) {
            return Err(ReflexError::config(
                channel.name(),
                "a channel with this name already exists",
            ));
        }
        let id = self.channels.len();
        self.by_name.insert(channel.name().to_string(), id);
        self.channels.push(channel);
        Ok(id)
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(id)
    }

    pub fn find(&self, name: &str) -> Option<ChannelId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Resolve every channel's process. Stops at the first failure.
    pub fn connect<P: Process>(&mut self, processes: &[P]) -> ReflexResult<()> {
        for channel in &mut self.channels {
            channel.connect(processes)?;
        }
        Ok(())
    }

    pub fn spindle(&self, id: ChannelId) -> ReflexResult<&StretchVelocitySensor> {
        self.get(id)
            .and_then(Channel::as_spindle)
            .ok_or_else(|| self.kind_mismatch(id, ChannelKind::StretchVelocity))
    }

    pub fn tendon(&self, id: ChannelId) -> ReflexResult<&TendonLengthSensor> {
        self.get(id)
            .and_then(Channel::as_tendon)
            .ok_or_else(|| self.kind_mismatch(id, ChannelKind::TendonLength))
    }

    pub fn delay_element(&self, id: ChannelId) -> ReflexResult<&DelayElement> {
        self.get(id)
            .and_then(Channel::as_delay)
            .ok_or_else(|| self.kind_mismatch(id, ChannelKind::Delay))
    }

    pub fn sample_spindle<P: Process>(
        &self,
        id: ChannelId,
        processes: &[P],
        state: &P::State,
    ) -> ReflexResult<SpindleReading> {
        self.spindle(id)?.sample(processes, state)
    }

    pub fn sample_tendon<P: Process>(
        &self,
        id: ChannelId,
        processes: &[P],
        state: &P::State,
    ) -> ReflexResult<TendonReading> {
        self.tendon(id)?.sample(processes, state)
    }

    pub fn sample_delay(&self, id: ChannelId, time: f64, input: f64) -> ReflexResult<DelayReading> {
        self.delay_element(id)?.sample(time, input)
    }

    /// Record samples from an accepted step. Returns how many were stored.
    pub fn commit(&mut self, pending: &[PendingSample]) -> usize {
        let mut stored = 0;
        for p in pending {
            match self.channels.get_mut(p.channel) {
                Some(channel) => {
                    if channel.commit(p.sample) != Insertion::Rejected {
                        stored += 1;
                    }
                }
                None => warn!(channel = p.channel, "commit for unknown channel id ignored"),
            }
        }
        stored
    }

    /// Forget all recorded signals, e.g. before a new run.
    pub fn reset_histories(&mut self) {
        for channel in &mut self.channels {
            channel.reset_history();
        }
    }

    fn kind_mismatch(&self, id: ChannelId, expected: ChannelKind) -> ReflexError {
        match self.get(id) {
            Some(channel) => ReflexError::binding(
                channel.name(),
                format!("expected a {}, found a {}", expected.label(), channel.kind().label()),
            ),
            None => ReflexError::binding(expected.label(), format!("channel #{id}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{at, FixedMuscle};

    fn muscles() -> Vec<FixedMuscle> {
        let mut soleus = FixedMuscle::new("soleus");
        soleus.length = 0.25;
        soleus.speed = 0.4;
        soleus.tendon_length = 0.12;
        vec![soleus, FixedMuscle::new("tib_ant")]
    }

    #[test]
    fn empty_name_is_a_config_error() {
        let err = StretchVelocitySensor::new("", "soleus", 1.0, 0.0).unwrap_err();
        assert!(matches!(err, ReflexError::Config { .. }));
        assert!(TendonLengthSensor::new("", "soleus", 0.0).is_err());
        assert!(DelayElement::new("", "soleus", 0.0).is_err());
    }

    #[test]
    fn invalid_delay_is_a_config_error() {
        assert!(TendonLengthSensor::new("gto", "soleus", -0.1).is_err());
        assert!(DelayElement::new("d", "soleus", f64::NAN).is_err());
        assert!(StretchVelocitySensor::new("s", "soleus", f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn unset_process_fails_when_connected_or_queried() {
        let processes = muscles();
        let mut channel = Channel::from(StretchVelocitySensor::new("spindle", "", 1.0, 0.0).unwrap());

        let queried = channel.as_spindle().unwrap().sample(&processes, &at(0.0));
        assert!(matches!(queried, Err(ReflexError::Binding { .. })));

        let connected = channel.connect(&processes);
        assert!(matches!(connected, Err(ReflexError::Binding { .. })));
    }

    #[test]
    fn unknown_process_is_a_binding_error() {
        let processes = muscles();
        let mut channel = Channel::from(TendonLengthSensor::new("gto", "gastroc", 0.0).unwrap());
        let err = channel.connect(&processes).unwrap_err();
        assert_eq!(err, ReflexError::binding("gto", "gastroc"));
    }

    #[test]
    fn spindle_reports_stretch_and_speed() {
        let processes = muscles();
        let mut channel = Channel::from(StretchVelocitySensor::new("spindle", "soleus", 1.0, 0.0).unwrap());
        assert_eq!(channel.connect(&processes).unwrap(), 0);

        let sensor = channel.as_spindle().unwrap();
        let reading = sensor.sample(&processes, &at(0.0)).unwrap();
        assert!((reading.stretch - 0.05).abs() < 1e-12);
        assert!((reading.speed - 0.4).abs() < 1e-12);
        assert!((sensor.raw_stretch(&processes, &at(0.0)).unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn stretch_mode_silences_speed() {
        let processes = muscles();
        let mut channel = Channel::from(
            StretchVelocitySensor::new("spindle", "soleus", 1.0, 0.0)
                .unwrap()
                .with_mode(SpindleMode::Stretch),
        );
        channel.connect(&processes).unwrap();

        let reading = channel.as_spindle().unwrap().sample(&processes, &at(0.0)).unwrap();
        assert_eq!(reading.speed, 0.0);
        assert!(reading.stretch > 0.0);
    }

    #[test]
    fn delayed_reads_start_cold_and_follow_commits() {
        let processes = muscles();
        let mut channel = Channel::from(TendonLengthSensor::new("gto", "soleus", 0.1).unwrap());
        channel.connect(&processes).unwrap();

        let first = channel.as_tendon().unwrap().sample(&processes, &at(0.0)).unwrap();
        assert_eq!(first.length, 0.0);
        channel.commit(first.live);

        // Still cold: 0.05 - 0.1 precedes the first commit.
        let early = channel.as_tendon().unwrap().sample(&processes, &at(0.05)).unwrap();
        assert_eq!(early.length, 0.0);

        let later = channel.as_tendon().unwrap().sample(&processes, &at(0.2)).unwrap();
        assert!((later.length - 0.02).abs() < 1e-12);
    }

    #[test]
    fn sampling_does_not_record() {
        let processes = muscles();
        let mut arena = ChannelArena::new();
        let id = arena
            .add(StretchVelocitySensor::new("spindle", "soleus", 1.0, 0.02).unwrap())
            .unwrap();
        arena.connect(&processes).unwrap();

        for i in 0..5 {
            arena.sample_spindle(id, &processes, &at(i as f64 * 0.01)).unwrap();
        }
        assert_eq!(arena.get(id).unwrap().history().unwrap().len(), 0);

        let reading = arena.sample_spindle(id, &processes, &at(0.0)).unwrap();
        assert_eq!(arena.commit(&[PendingSample::new(id, reading.live)]), 1);
        assert_eq!(arena.get(id).unwrap().history().unwrap().len(), 1);
    }

    #[test]
    fn delay_element_shifts_an_external_signal() {
        let processes = muscles();
        let mut arena = ChannelArena::new();
        let id = arena.add(DelayElement::new("efferent", "soleus", 0.5).unwrap()).unwrap();
        arena.connect(&processes).unwrap();

        for i in 0..=10 {
            let t = i as f64 * 0.1;
            let reading = arena.sample_delay(id, t, 2.0 * t).unwrap();
            arena.commit(&[PendingSample::new(id, reading.live)]);
        }

        assert_eq!(arena.sample_delay(id, 0.3, 0.6).unwrap().value, 0.0);
        let v = arena.sample_delay(id, 1.0, 2.0).unwrap().value;
        assert!((v - 1.0).abs() < 1e-9);
        assert_eq!(arena.get(id).unwrap().history().unwrap().owner(), "soleus");
    }

    #[test]
    fn arena_rejects_duplicate_names_and_wrong_kinds() {
        let mut arena = ChannelArena::new();
        let gto = arena.add(TendonLengthSensor::new("gto", "soleus", 0.0).unwrap()).unwrap();
        assert!(arena.add(DelayElement::new("gto", "soleus", 0.0).unwrap()).is_err());

        assert_eq!(arena.find("gto"), Some(gto));
        assert!(matches!(arena.spindle(gto), Err(ReflexError::Binding { .. })));
        assert!(matches!(arena.tendon(7), Err(ReflexError::Binding { .. })));
    }

    #[test]
    fn reordered_processes_are_caught() {
        let mut processes = muscles();
        let mut channel = Channel::from(TendonLengthSensor::new("gto", "soleus", 0.0).unwrap());
        channel.connect(&processes).unwrap();

        processes.swap(0, 1);
        let result = channel.as_tendon().unwrap().sample(&processes, &at(0.0));
        assert!(matches!(result, Err(ReflexError::Binding { .. })));
    }

    #[test]
    fn retention_must_cover_the_delay() {
        let err = DelayElement::new("efferent", "soleus", 0.03)
            .unwrap()
            .with_retention(0.01)
            .unwrap_err();
        assert!(matches!(err, ReflexError::Config { .. }));
        assert!(TendonLengthSensor::new("gto", "soleus", 0.0)
            .unwrap()
            .with_retention(f64::NAN)
            .is_err());
        assert!(StretchVelocitySensor::new("spindle", "soleus", 1.0, 0.03)
            .unwrap()
            .with_retention(0.03)
            .is_ok());
    }

    #[test]
    fn retained_delay_keeps_reading_the_signal() {
        let processes = muscles();
        let mut arena = ChannelArena::new();
        let id = arena
            .add(DelayElement::new("efferent", "soleus", 0.03).unwrap().with_retention(0.03).unwrap())
            .unwrap();
        arena.connect(&processes).unwrap();

        for i in 0..=100 {
            let reading = arena.sample_delay(id, i as f64 * 1e-3, 1.0).unwrap();
            arena.commit(&[PendingSample::new(id, reading.live)]);
        }
        let history = arena.get(id).unwrap().history().unwrap();
        assert!(history.len() < 101);
        assert!((arena.sample_delay(id, 0.1, 1.0).unwrap().value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_recorded_signal() {
        let processes = muscles();
        let mut arena = ChannelArena::new();
        let id = arena.add(DelayElement::new("d", "tib_ant", 0.0).unwrap()).unwrap();
        arena.connect(&processes).unwrap();
        arena.commit(&[PendingSample::new(id, TimeSample::new(0.0, 1.0))]);

        arena.reset_histories();
        assert!(arena.get(id).unwrap().history().unwrap().is_empty());
    }
}
