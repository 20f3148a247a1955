use std::path::Path;

use proprio::controller::{Pairing, ReflexConfig};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuscleConfig {
    pub name: String,
    pub max_isometric_force: f64,
    pub optimal_fiber_length: f64,
    pub tendon_slack_length: f64,
    /// Optimal fiber lengths per second.
    pub max_contraction_velocity: f64,
    /// N/m; only used to report tendon elongation.
    pub tendon_stiffness: f64,
    pub activation_time_constant: f64,
    pub deactivation_time_constant: f64,
    pub baseline_excitation: f64,
}

impl Default for MuscleConfig {
    fn default() -> Self {
        Self {
            name: "muscle".to_string(),
            max_isometric_force: 1000.0,
            optimal_fiber_length: 0.2,
            tendon_slack_length: 0.1,
            max_contraction_velocity: 10.0,
            tendon_stiffness: 350_000.0,
            activation_time_constant: 0.01,
            deactivation_time_constant: 0.04,
            baseline_excitation: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub mass: f64,
    pub spring_stiffness: f64,
    pub damping: f64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            mass: 20.0,
            spring_stiffness: 2000.0,
            damping: 100.0,
        }
    }
}

/// Rectangular force pulse that pulls the block away from the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    pub start: f64,
    pub duration: f64,
    pub force: f64,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            start: 1.0,
            duration: 0.1,
            force: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub spindle_delay: f64,
    pub golgi_delay: f64,
    pub efferent_delay: f64,
    /// Spindle rest length as a fraction of optimal fiber length.
    pub rest_fraction: f64,
    /// Seconds of signal each channel keeps; `None` keeps the whole run.
    pub retention: Option<f64>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            spindle_delay: 0.03,
            golgi_delay: 0.03,
            efferent_delay: 0.01,
            rest_fraction: 1.0,
            retention: Some(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub initial_time: f64,
    pub final_time: f64,
    /// Relative accuracy of the embedded error estimate.
    pub tolerance: f64,
    pub min_step: f64,
    pub max_step: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            initial_time: 0.0,
            final_time: 10.0,
            tolerance: 1.0e-6,
            min_step: 1.0e-8,
            max_step: 1.0e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub muscle: MuscleConfig,
    pub block: BlockConfig,
    pub perturbation: PerturbationConfig,
    pub sensors: SensorConfig,
    pub reflex: ReflexConfig,
    pub integrator: IntegratorConfig,
    /// Seconds between report rows.
    pub report_interval: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            muscle: MuscleConfig::default(),
            block: BlockConfig::default(),
            perturbation: PerturbationConfig::default(),
            sensors: SensorConfig::default(),
            reflex: ReflexConfig::split(1.0, 0.5)
                .with_spindles(["ALL"])
                .with_golgis(["ALL"])
                .with_pairing(Pairing::ByProcess),
            integrator: IntegratorConfig::default(),
            report_interval: 0.01,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks the settings the plant and integrator rely on. Sensor and
    /// controller settings are validated when the model is built.
    pub fn validate(&self) -> SimResult<()> {
        let m = &self.muscle;
        positive("muscle.max_isometric_force", m.max_isometric_force)?;
        positive("muscle.tendon_stiffness", m.tendon_stiffness)?;
        positive("muscle.activation_time_constant", m.activation_time_constant)?;
        positive("muscle.deactivation_time_constant", m.deactivation_time_constant)?;
        if !(0.0..=1.0).contains(&m.baseline_excitation) {
            return Err(SimError::config(
                "muscle.baseline_excitation",
                format!("must lie in [0, 1], got {}", m.baseline_excitation),
            ));
        }

        positive("block.mass", self.block.mass)?;
        non_negative("block.spring_stiffness", self.block.spring_stiffness)?;
        non_negative("block.damping", self.block.damping)?;
        non_negative("perturbation.duration", self.perturbation.duration)?;

        let i = &self.integrator;
        positive("integrator.tolerance", i.tolerance)?;
        positive("integrator.min_step", i.min_step)?;
        positive("integrator.max_step", i.max_step)?;
        if i.min_step > i.max_step {
            return Err(SimError::config("integrator.min_step", "exceeds integrator.max_step"));
        }
        if !i.initial_time.is_finite() || !(i.final_time > i.initial_time) {
            return Err(SimError::config(
                "integrator.final_time",
                format!("must be after initial_time ({})", i.initial_time),
            ));
        }

        positive("report_interval", self.report_interval)
    }
}

fn positive(field: &'static str, value: f64) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::config(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f64) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::config(field, format!("must be non-negative, got {value}")))
    }
}
