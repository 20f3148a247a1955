//! The seam between the reflex machinery and the simulation that owns the
//! muscles.
//!
//! The host keeps its processes in a slice; everything here refers to them by
//! [`ProcessId`] (an index into that slice) and never holds a reference across
//! evaluations.

/// Index of a process in the host's process slice.
pub type ProcessId = usize;

/// Opaque simulation state. The reflex code only needs to know when it is.
pub trait SimState {
    fn time(&self) -> f64;
}

/// A muscle-like actuator that sensors monitor and controllers excite.
pub trait Process {
    type State: SimState;

    fn name(&self) -> &str;

    /// Controllers only command muscles; other actuators are skipped at bind time.
    fn is_muscle(&self) -> bool {
        true
    }

    /// Fiber length.
    fn length(&self, state: &Self::State) -> f64;

    fn lengthening_speed(&self, state: &Self::State) -> f64;

    fn tendon_length(&self, state: &Self::State) -> f64;

    fn optimal_fiber_length(&self) -> f64;

    fn tendon_slack_length(&self) -> f64;

    /// Maximum contraction velocity in optimal fiber lengths per second.
    fn max_contraction_velocity(&self) -> f64;
}

/// Position of the process called `name`, if any.
pub fn find_process<P: Process>(processes: &[P], name: &str) -> Option<ProcessId> {
    processes.iter().position(|p| p.name() == name)
}

/// Per-process excitation commands, owned by the host.
///
/// Controllers add into it; several controllers may layer their
/// contributions onto the same process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Controls {
    values: Vec<f64>,
}

impl Controls {
    pub fn new(process_count: usize) -> Self {
        Self {
            values: vec![0.0; process_count],
        }
    }

    /// Add `value` to the command of `id`, growing the vector if needed.
    pub fn add_in(&mut self, id: ProcessId, value: f64) {
        if id >= self.values.len() {
            self.values.resize(id + 1, 0.0);
        }
        self.values[id] += value;
    }

    pub fn get(&self, id: ProcessId) -> f64 {
        self.values.get(id).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, id: ProcessId, value: f64) {
        if id >= self.values.len() {
            self.values.resize(id + 1, 0.0);
        }
        self.values[id] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Zero every command, keeping the size.
    pub fn reset(&mut self) {
        for v in &mut self.values {
            *v = 0.0;
        }
    }
}
