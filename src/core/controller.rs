#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channel::{ChannelArena, ChannelId, ChannelKind, PendingSample};
use crate::error::{ReflexError, ReflexResult};
use crate::host::{find_process, Controls, Process, ProcessId};
use crate::registry::{BindReport, ChannelRegistry};

/// `0.5 * (|x| + x)`, i.e. `max(x, 0)`.
#[inline]
pub fn half_wave(x: f64) -> f64 {
    0.5 * (x.abs() + x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GainMode {
    /// One gain on every length term; no velocity feedback.
    #[default]
    Single,
    /// Separate length and velocity gains.
    Split,
}

/// How spindle and golgi channels are grouped before the control law runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pairing {
    /// Group channels by the process they monitor.
    #[default]
    ByProcess,
    /// Pair the i-th spindle with the i-th golgi channel and command the
    /// spindle's process, whatever the golgi channel monitors.
    Positional,
}

/// Gains after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Gains {
    Single { gain: f64 },
    Split { length: f64, velocity: f64 },
}

impl Gains {
    pub fn length(&self) -> f64 {
        match *self {
            Self::Single { gain } => gain,
            Self::Split { length, .. } => length,
        }
    }

    pub fn velocity(&self) -> Option<f64> {
        match *self {
            Self::Single { .. } => None,
            Self::Split { velocity, .. } => Some(velocity),
        }
    }

    pub fn mode(&self) -> GainMode {
        match self {
            Self::Single { .. } => GainMode::Single,
            Self::Split { .. } => GainMode::Split,
        }
    }
}

/// Controller properties as a host would configure them.
///
/// Gains are optional so that a partially specified configuration can be
/// rejected at bind time instead of silently defaulted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ReflexConfig {
    pub normalized_rest_length: f64,

    pub gain_mode: GainMode,
    pub gain: Option<f64>,
    pub gain_length: Option<f64>,
    pub gain_velocity: Option<f64>,

    pub pairing: Pairing,

    // Channel names; "ALL" binds every channel of the kind.
    pub spindle_list: Vec<String>,
    pub golgi_list: Vec<String>,

    // Controlled process names. Empty: every process a bound channel monitors.
    pub actuators: Vec<String>,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            normalized_rest_length: 1.0,
            gain_mode: GainMode::Single,
            gain: Some(1.0),
            gain_length: None,
            gain_velocity: None,
            pairing: Pairing::ByProcess,
            spindle_list: Vec::new(),
            golgi_list: Vec::new(),
            actuators: Vec::new(),
        }
    }
}

impl ReflexConfig {
    pub fn single(gain: f64) -> Self {
        Self {
            gain: Some(gain),
            ..Self::default()
        }
    }

    pub fn split(gain_length: f64, gain_velocity: f64) -> Self {
        Self {
            gain_mode: GainMode::Split,
            gain: None,
            gain_length: Some(gain_length),
            gain_velocity: Some(gain_velocity),
            ..Self::default()
        }
    }

    pub fn with_spindles<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spindle_list = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_golgis<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.golgi_list = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actuators<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actuators = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pairing(mut self, pairing: Pairing) -> Self {
        self.pairing = pairing;
        self
    }

    pub fn with_rest_length(mut self, normalized_rest_length: f64) -> Self {
        self.normalized_rest_length = normalized_rest_length;
        self
    }

    /// Check that the gains match the requested mode.
    pub fn resolve_gains(&self, component: &str) -> ReflexResult<Gains> {
        let gains = match self.gain_mode {
            GainMode::Single => match self.gain {
                Some(gain) => Gains::Single { gain },
                None => {
                    return Err(ReflexError::config(
                        component,
                        "single-gain mode requires `gain`",
                    ))
                }
            },
            GainMode::Split => match (self.gain_length, self.gain_velocity) {
                (Some(length), Some(velocity)) => Gains::Split { length, velocity },
                _ => {
                    let hint = if self.gain.is_some() {
                        " (only `gain` is set)"
                    } else {
                        ""
                    };
                    return Err(ReflexError::config(
                        component,
                        format!("split-gain mode requires `gain_length` and `gain_velocity`{hint}"),
                    ));
                }
            },
        };

        check_finite(component, gains)
    }
}

fn check_finite(component: &str, gains: Gains) -> ReflexResult<Gains> {
    let finite = gains.length().is_finite() && gains.velocity().map_or(true, f64::is_finite);
    if !finite {
        return Err(ReflexError::config(component, "gains must be finite"));
    }
    Ok(gains)
}

/// Contribution of one spindle reading.
pub fn spindle_drive(
    gains: Gains,
    stretch: f64,
    speed: f64,
    optimal_fiber_length: f64,
    max_contraction_velocity: f64,
) -> f64 {
    let mut drive = gains.length() * half_wave(stretch) / optimal_fiber_length;
    if let Some(gain_velocity) = gains.velocity() {
        drive += gain_velocity * half_wave(speed) / (optimal_fiber_length * max_contraction_velocity);
    }
    drive
}

/// Contribution of one golgi reading.
pub fn golgi_drive(gains: Gains, golgi_length: f64, tendon_slack_length: f64) -> f64 {
    gains.length() * half_wave(golgi_length) / tendon_slack_length
}

/// Channels whose readings are summed into one process's command.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bundle {
    pub process: ProcessId,
    pub spindles: Vec<ChannelId>,
    pub golgis: Vec<ChannelId>,
}

impl Bundle {
    fn new(process: ProcessId) -> Self {
        Self {
            process,
            spindles: Vec::new(),
            golgis: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    Unbound,
    Bound,
}

/// Result of one control evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// What was added to each commanded process.
    pub excitations: Vec<(ProcessId, f64)>,
    /// Samples to record if the host accepts this step.
    pub pending: Vec<PendingSample>,
}

impl Evaluation {
    /// Total added to `process`, summed over every bundle commanding it.
    pub fn excitation(&self, process: ProcessId) -> Option<f64> {
        self.excitations
            .iter()
            .filter(|(p, _)| *p == process)
            .map(|(_, v)| *v)
            .reduce(|a, b| a + b)
    }
}

/// Stretch reflex with optional tendon (golgi) feedback.
///
/// Lifecycle: build with a [`ReflexConfig`], [`connect`](Self::connect) once
/// per run against the host's processes and the channel arena, then call
/// [`compute_controls`](Self::compute_controls) every control evaluation.
#[derive(Debug, Clone)]
pub struct ReflexController {
    name: String,
    config: ReflexConfig,
    spindles: ChannelRegistry,
    golgis: ChannelRegistry,
    gains: Option<Gains>,
    bundles: Vec<Bundle>,
    phase: Phase,
}

impl ReflexController {
    pub fn new(name: impl Into<String>, config: ReflexConfig) -> ReflexResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ReflexError::config(
                "<unnamed reflex controller>",
                "controller name must not be empty",
            ));
        }

        let spindles = ChannelRegistry::new(ChannelKind::StretchVelocity, &config.spindle_list);
        let golgis = ChannelRegistry::new(ChannelKind::TendonLength, &config.golgi_list);

        Ok(Self {
            name,
            config,
            spindles,
            golgis,
            gains: None,
            bundles: Vec::new(),
            phase: Phase::Unbound,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ReflexConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Gains in effect; `None` until connected.
    pub fn gains(&self) -> Option<Gains> {
        self.gains
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn spindles(&self) -> &ChannelRegistry {
        &self.spindles
    }

    pub fn golgis(&self) -> &ChannelRegistry {
        &self.golgis
    }

    /// Replace the gains between runs. Takes effect immediately if bound.
    /// Non-finite gains are refused and leave the current ones in place.
    pub fn set_gains(&mut self, gains: Gains) -> ReflexResult<()> {
        let gains = check_finite(&self.name, gains)?;
        match gains {
            Gains::Single { gain } => {
                self.config.gain_mode = GainMode::Single;
                self.config.gain = Some(gain);
            }
            Gains::Split { length, velocity } => {
                self.config.gain_mode = GainMode::Split;
                self.config.gain_length = Some(length);
                self.config.gain_velocity = Some(velocity);
            }
        }
        if self.phase == Phase::Bound {
            self.gains = Some(gains);
        }
        Ok(())
    }

    /// Bind a spindle channel directly, in addition to the configured list.
    pub fn add_spindle(&mut self, arena: &ChannelArena, id: ChannelId) -> bool {
        self.spindles.add_channel(arena, id)
    }

    /// Bind a golgi channel directly, in addition to the configured list.
    pub fn add_golgi(&mut self, arena: &ChannelArena, id: ChannelId) -> bool {
        self.golgis.add_channel(arena, id)
    }

    /// Resolve channels and controlled processes.
    ///
    /// Channels must already be connected (see [`ChannelArena::connect`]).
    /// Configuration and mandatory-binding problems fail here; requested
    /// channel names that cannot be found are only reported.
    pub fn connect<P: Process>(
        &mut self,
        arena: &ChannelArena,
        processes: &[P],
    ) -> ReflexResult<BindReport> {
        self.phase = Phase::Unbound;
        self.gains = None;
        self.bundles.clear();

        let gains = self.config.resolve_gains(&self.name)?;
        let rest = self.config.normalized_rest_length;
        if !rest.is_finite() || rest <= 0.0 {
            return Err(ReflexError::config(
                self.name.as_str(),
                format!("normalized rest length must be positive, got {rest}"),
            ));
        }

        let mut report = self.spindles.bind(arena);
        report.merge(self.golgis.bind(arena));

        let controlled = self.controlled_processes(arena, processes)?;
        let bundles = match self.config.pairing {
            Pairing::ByProcess => self.bundle_by_process(arena, &controlled)?,
            Pairing::Positional => self.bundle_positionally(arena, &controlled)?,
        };

        for bundle in &bundles {
            check_normalizers(&self.name, processes, bundle.process)?;
            for &id in bundle.spindles.iter().chain(&bundle.golgis) {
                check_normalizers(&self.name, processes, self.channel_process(arena, id)?)?;
            }
        }

        debug!(
            controller = %self.name,
            bundles = bundles.len(),
            spindles = self.spindles.len(),
            golgis = self.golgis.len(),
            skipped = report.skipped.len(),
            "reflex controller connected"
        );

        self.gains = Some(gains);
        self.bundles = bundles;
        self.phase = Phase::Bound;
        Ok(report)
    }

    /// Evaluate the control law at `state` and add the result into `controls`.
    ///
    /// Histories are not touched; pass the returned evaluation to
    /// [`commit`](Self::commit) once the host accepts the step.
    pub fn compute_controls<P: Process>(
        &self,
        arena: &ChannelArena,
        processes: &[P],
        state: &P::State,
        controls: &mut Controls,
    ) -> ReflexResult<Evaluation> {
        let gains = match (self.phase, self.gains) {
            (Phase::Bound, Some(gains)) => gains,
            _ => {
                return Err(ReflexError::binding(
                    self.name.as_str(),
                    "controller is not connected",
                ))
            }
        };

        let mut evaluation = Evaluation::default();
        for bundle in &self.bundles {
            let mut control = 0.0;

            for &id in &bundle.spindles {
                let reading = arena.sample_spindle(id, processes, state)?;
                let p = monitored(&self.name, arena, processes, id)?;
                control += spindle_drive(
                    gains,
                    reading.stretch,
                    reading.speed,
                    p.optimal_fiber_length(),
                    p.max_contraction_velocity(),
                );
                evaluation.pending.push(PendingSample::new(id, reading.live));
            }

            for &id in &bundle.golgis {
                let reading = arena.sample_tendon(id, processes, state)?;
                let p = monitored(&self.name, arena, processes, id)?;
                control += golgi_drive(gains, reading.length, p.tendon_slack_length());
                evaluation.pending.push(PendingSample::new(id, reading.live));
            }

            controls.add_in(bundle.process, control);
            evaluation.excitations.push((bundle.process, control));
        }

        Ok(evaluation)
    }

    /// Record the samples of an accepted evaluation.
    pub fn commit(&self, arena: &mut ChannelArena, evaluation: &Evaluation) -> usize {
        arena.commit(&evaluation.pending)
    }

    fn channel_process(&self, arena: &ChannelArena, id: ChannelId) -> ReflexResult<ProcessId> {
        let channel = arena
            .get(id)
            .ok_or_else(|| ReflexError::binding(self.name.as_str(), format!("channel #{id}")))?;
        channel
            .process_id()
            .ok_or_else(|| ReflexError::binding(self.name.as_str(), channel.name()))
    }

    fn controlled_processes<P: Process>(
        &self,
        arena: &ChannelArena,
        processes: &[P],
    ) -> ReflexResult<Vec<ProcessId>> {
        let mut controlled: Vec<ProcessId> = Vec::new();

        if self.config.actuators.is_empty() {
            for &id in self.spindles.bound().iter().chain(self.golgis.bound()) {
                let p = self.channel_process(arena, id)?;
                if !controlled.contains(&p) {
                    controlled.push(p);
                }
            }
        } else {
            for name in &self.config.actuators {
                let p = find_process(processes, name)
                    .ok_or_else(|| ReflexError::binding(self.name.as_str(), name.as_str()))?;
                if !controlled.contains(&p) {
                    controlled.push(p);
                }
            }
        }

        let mut muscles = Vec::with_capacity(controlled.len());
        for p in controlled {
            let process = processes
                .get(p)
                .ok_or_else(|| ReflexError::binding(self.name.as_str(), format!("process #{p}")))?;
            if process.is_muscle() {
                muscles.push(p);
            } else {
                warn!(
                    controller = %self.name,
                    actuator = process.name(),
                    "non-muscle actuator will be ignored"
                );
            }
        }
        Ok(muscles)
    }

    fn bundle_by_process(
        &self,
        arena: &ChannelArena,
        controlled: &[ProcessId],
    ) -> ReflexResult<Vec<Bundle>> {
        let mut bundles: Vec<Bundle> = controlled.iter().map(|&p| Bundle::new(p)).collect();

        for &id in self.spindles.bound() {
            let p = self.channel_process(arena, id)?;
            match bundles.iter_mut().find(|b| b.process == p) {
                Some(bundle) => bundle.spindles.push(id),
                None => self.warn_uncontrolled(arena, id),
            }
        }
        for &id in self.golgis.bound() {
            let p = self.channel_process(arena, id)?;
            match bundles.iter_mut().find(|b| b.process == p) {
                Some(bundle) => bundle.golgis.push(id),
                None => self.warn_uncontrolled(arena, id),
            }
        }

        Ok(bundles)
    }

    fn bundle_positionally(
        &self,
        arena: &ChannelArena,
        controlled: &[ProcessId],
    ) -> ReflexResult<Vec<Bundle>> {
        let spindles = self.spindles.bound();
        let golgis = self.golgis.bound();
        if spindles.len() != golgis.len() {
            warn!(
                controller = %self.name,
                spindles = spindles.len(),
                golgis = golgis.len(),
                "positional pairing with unequal channel counts"
            );
        }

        let mut bundles = Vec::new();
        for i in 0..spindles.len().max(golgis.len()) {
            let spindle = spindles.get(i).copied();
            let golgi = golgis.get(i).copied();
            let spindle_process = spindle.map(|id| self.channel_process(arena, id)).transpose()?;
            let golgi_process = golgi.map(|id| self.channel_process(arena, id)).transpose()?;

            if let (Some(a), Some(b)) = (spindle_process, golgi_process) {
                if a != b {
                    warn!(
                        controller = %self.name,
                        pair = i,
                        "positional pair monitors two different processes"
                    );
                }
            }

            let Some(target) = spindle_process.or(golgi_process) else {
                continue;
            };
            if !controlled.contains(&target) {
                if let Some(id) = spindle.or(golgi) {
                    self.warn_uncontrolled(arena, id);
                }
                continue;
            }

            bundles.push(Bundle {
                process: target,
                spindles: spindle.into_iter().collect(),
                golgis: golgi.into_iter().collect(),
            });
        }

        Ok(bundles)
    }

    fn warn_uncontrolled(&self, arena: &ChannelArena, id: ChannelId) {
        let name = arena.get(id).map_or("?", |c| c.name());
        warn!(
            controller = %self.name,
            channel = name,
            "channel monitors a process this controller does not command; ignored"
        );
    }
}

fn monitored<'a, P: Process>(
    controller: &str,
    arena: &ChannelArena,
    processes: &'a [P],
    id: ChannelId,
) -> ReflexResult<&'a P> {
    arena
        .get(id)
        .and_then(|c| c.process_id())
        .and_then(|p| processes.get(p))
        .ok_or_else(|| ReflexError::binding(controller, format!("process of channel #{id}")))
}

fn check_normalizers<P: Process>(controller: &str, processes: &[P], id: ProcessId) -> ReflexResult<()> {
    let p = processes
        .get(id)
        .ok_or_else(|| ReflexError::binding(controller, format!("process #{id}")))?;
    let constants = [
        ("optimal fiber length", p.optimal_fiber_length()),
        ("tendon slack length", p.tendon_slack_length()),
        ("max contraction velocity", p.max_contraction_velocity()),
    ];
    for (label, value) in constants {
        if !value.is_finite() || value <= 0.0 {
            return Err(ReflexError::config(
                controller,
                format!("{label} of `{}` must be positive, got {value}", p.name()),
            ));
        }
    }
    Ok(())
}
