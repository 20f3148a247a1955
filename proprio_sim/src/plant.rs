//! A block on a slider, held by a spring-damper and pulled toward an anchor
//! by a single muscle.
//!
//! `position` is the block's displacement away from the anchor, so positive
//! displacement lengthens the muscle.

use proprio::{Process, SimState};

use crate::config::{BlockConfig, MuscleConfig, PerturbationConfig};

// Force-length curve width, passive shape factor and the strain at which
// passive force equals max isometric force.
const ACTIVE_WIDTH: f64 = 0.45;
const PASSIVE_SHAPE: f64 = 4.0;
const PASSIVE_STRAIN: f64 = 0.6;
const MAX_ECCENTRIC_FORCE: f64 = 1.8;

/// Plant state at one instant. Layout of the integrated vector: position,
/// speed, activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockState {
    pub time: f64,
    pub position: f64,
    pub speed: f64,
    pub activation: f64,
}

impl BlockState {
    pub const DIM: usize = 3;

    pub fn from_slice(time: f64, y: &[f64]) -> Self {
        Self {
            time,
            position: y.first().copied().unwrap_or(0.0),
            speed: y.get(1).copied().unwrap_or(0.0),
            activation: y.get(2).copied().unwrap_or(0.0),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.position, self.speed, self.activation]
    }
}

impl SimState for BlockState {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Hill-type muscle with a rigid tendon.
#[derive(Debug, Clone)]
pub struct SlidingMuscle {
    config: MuscleConfig,
    // Muscle-tendon length with the block at zero displacement.
    path_rest_length: f64,
}

impl SlidingMuscle {
    pub fn new(config: MuscleConfig) -> Self {
        let path_rest_length = config.optimal_fiber_length + config.tendon_slack_length;
        Self {
            config,
            path_rest_length,
        }
    }

    pub fn fiber_length(&self, position: f64) -> f64 {
        self.path_rest_length + position - self.config.tendon_slack_length
    }

    pub fn force(&self, state: &BlockState) -> f64 {
        let c = &self.config;
        let length = self.fiber_length(state.position) / c.optimal_fiber_length;
        let speed = state.speed / (c.optimal_fiber_length * c.max_contraction_velocity);
        let activation = state.activation.clamp(0.0, 1.0);

        let force = activation * active_force_length(length) * force_velocity(speed)
            + passive_force_length(length);
        c.max_isometric_force * force.max(0.0)
    }

    /// First-order activation dynamics, faster when rising.
    pub fn activation_rate(&self, excitation: f64, activation: f64) -> f64 {
        let tau = if excitation > activation {
            self.config.activation_time_constant
        } else {
            self.config.deactivation_time_constant
        };
        (excitation - activation) / tau
    }
}

fn active_force_length(normalized_length: f64) -> f64 {
    let x = (normalized_length - 1.0) / ACTIVE_WIDTH;
    (-x * x).exp()
}

fn passive_force_length(normalized_length: f64) -> f64 {
    if normalized_length <= 1.0 {
        return 0.0;
    }
    let strain = normalized_length - 1.0;
    ((PASSIVE_SHAPE * strain / PASSIVE_STRAIN).exp() - 1.0) / (PASSIVE_SHAPE.exp() - 1.0)
}

// Linear in normalized lengthening speed.
fn force_velocity(normalized_speed: f64) -> f64 {
    (1.0 + normalized_speed).clamp(0.0, MAX_ECCENTRIC_FORCE)
}

impl Process for SlidingMuscle {
    type State = BlockState;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn length(&self, state: &BlockState) -> f64 {
        self.fiber_length(state.position)
    }

    fn lengthening_speed(&self, state: &BlockState) -> f64 {
        state.speed
    }

    fn tendon_length(&self, state: &BlockState) -> f64 {
        self.config.tendon_slack_length + self.force(state) / self.config.tendon_stiffness
    }

    fn optimal_fiber_length(&self) -> f64 {
        self.config.optimal_fiber_length
    }

    fn tendon_slack_length(&self) -> f64 {
        self.config.tendon_slack_length
    }

    fn max_contraction_velocity(&self) -> f64 {
        self.config.max_contraction_velocity
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Block {
    config: BlockConfig,
    perturbation: PerturbationConfig,
}

impl Block {
    pub fn new(config: BlockConfig, perturbation: PerturbationConfig) -> Self {
        Self {
            config,
            perturbation,
        }
    }

    pub fn external_force(&self, time: f64) -> f64 {
        let p = &self.perturbation;
        if time >= p.start && time < p.start + p.duration {
            p.force
        } else {
            0.0
        }
    }

    pub fn acceleration(&self, state: &BlockState, muscle_force: f64) -> f64 {
        let c = &self.config;
        let net = self.external_force(state.time)
            - muscle_force
            - c.spring_stiffness * state.position
            - c.damping * state.speed;
        net / c.mass
    }

    /// Resting displacement with constant `activation`, found by damped
    /// fixed-point iteration on the static force balance.
    pub fn equilibrium(&self, muscle: &SlidingMuscle, activation: f64) -> f64 {
        let k = self.config.spring_stiffness;
        if k <= 0.0 {
            return 0.0;
        }
        let mut position = 0.0;
        for _ in 0..200 {
            let state = BlockState {
                time: 0.0,
                position,
                speed: 0.0,
                activation,
            };
            let next = -muscle.force(&state) / k;
            if (next - position).abs() < 1e-12 {
                return next;
            }
            position += 0.5 * (next - position);
        }
        position
    }
}
