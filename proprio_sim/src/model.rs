use proprio::channel::{DelayElement, StretchVelocitySensor, TendonLengthSensor};
use proprio::observer::{ControllerAdapter, ControllerSnapshot};
use proprio::{ChannelArena, ChannelId, Controls, PendingSample, Process, ReflexController};
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::integrator::System;
use crate::plant::{Block, BlockState, SlidingMuscle};
use crate::report::Row;

const MUSCLE: usize = 0;

/// Excitation reaching the muscle at one instant, plus the samples to
/// record if that instant is accepted.
#[derive(Debug, Clone)]
pub struct Drive {
    pub reflex: f64,
    pub excitation: f64,
    pub pending: Vec<PendingSample>,
}

/// Block, muscle, sensors and stretch reflex wired together.
pub struct ReflexModel {
    muscles: Vec<SlidingMuscle>,
    block: Block,
    arena: ChannelArena,
    controller: ReflexController,
    efferent: ChannelId,
    baseline: f64,
    controls: Controls,
}

impl ReflexModel {
    pub fn build(config: &SimConfig) -> SimResult<Self> {
        let muscle = SlidingMuscle::new(config.muscle.clone());
        let block = Block::new(config.block, config.perturbation);
        let name = config.muscle.name.as_str();
        let s = &config.sensors;

        let mut spindle =
            StretchVelocitySensor::new("spindle", name, s.rest_fraction, s.spindle_delay)?;
        let mut golgi = TendonLengthSensor::new("golgi_tendon", name, s.golgi_delay)?;
        let mut efferent = DelayElement::new("efferent", name, s.efferent_delay)?;
        if let Some(window) = s.retention {
            spindle = spindle.with_retention(window)?;
            golgi = golgi.with_retention(window)?;
            efferent = efferent.with_retention(window)?;
        }

        let mut arena = ChannelArena::new();
        arena.add(spindle)?;
        arena.add(golgi)?;
        let efferent = arena.add(efferent)?;

        let muscles = vec![muscle];
        arena.connect(&muscles)?;

        let mut controller = ReflexController::new("stretch_reflex", config.reflex.clone())?;
        let report = controller.connect(&arena, &muscles)?;
        if !report.is_complete() {
            warn!(skipped = ?report.skipped, "some requested sensors were not found");
        }
        if controller.bundles().is_empty() {
            return Err(SimError::config("reflex", "controller commands no muscle"));
        }
        info!(
            muscle = name,
            bundles = controller.bundles().len(),
            "reflex model built"
        );

        Ok(Self {
            muscles,
            block,
            arena,
            controller,
            efferent,
            baseline: config.muscle.baseline_excitation,
            controls: Controls::new(1),
        })
    }

    pub fn muscle(&self) -> &SlidingMuscle {
        &self.muscles[MUSCLE]
    }

    pub fn arena(&self) -> &ChannelArena {
        &self.arena
    }

    /// Equilibrium state at `time` under baseline excitation.
    pub fn initial_state(&self, time: f64) -> BlockState {
        let activation = self.baseline;
        BlockState {
            time,
            position: self.block.equilibrium(self.muscle(), activation),
            speed: 0.0,
            activation,
        }
    }

    /// Evaluate the reflex loop at `state` without recording anything.
    pub fn drive(&mut self, state: &BlockState) -> SimResult<Drive> {
        self.controls.reset();
        let evaluation = self.controller.compute_controls(
            &self.arena,
            &self.muscles,
            state,
            &mut self.controls,
        )?;
        let reflex = self.controls.get(MUSCLE);
        let delayed = self.arena.sample_delay(self.efferent, state.time, reflex)?;

        let mut pending = evaluation.pending;
        pending.push(PendingSample::new(self.efferent, delayed.live));

        Ok(Drive {
            reflex,
            excitation: (self.baseline + delayed.value).clamp(0.0, 1.0),
            pending,
        })
    }

    pub fn observe(&mut self, state: &BlockState) -> SimResult<Row> {
        let drive = self.drive(state)?;
        let muscle = &self.muscles[MUSCLE];
        Ok(Row {
            time: state.time,
            position: state.position,
            speed: state.speed,
            activation: state.activation,
            excitation: drive.excitation,
            fiber_length: muscle.fiber_length(state.position),
            tendon_length: muscle.tendon_length(state),
            muscle_force: muscle.force(state),
        })
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerAdapter::new(&self.controller, &self.arena).snapshot()
    }
}

impl System for ReflexModel {
    fn dimension(&self) -> usize {
        BlockState::DIM
    }

    fn derivatives(&mut self, time: f64, y: &[f64], dy: &mut [f64]) -> SimResult<()> {
        let state = BlockState::from_slice(time, y);
        let drive = self.drive(&state)?;
        let muscle = &self.muscles[MUSCLE];
        let force = muscle.force(&state);

        dy[0] = state.speed;
        dy[1] = self.block.acceleration(&state, force);
        dy[2] = muscle.activation_rate(drive.excitation, state.activation);
        Ok(())
    }

    fn accept(&mut self, time: f64, y: &[f64]) -> SimResult<()> {
        let state = BlockState::from_slice(time, y);
        let drive = self.drive(&state)?;
        self.arena.commit(&drive.pending);
        Ok(())
    }
}
