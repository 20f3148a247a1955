use tracing::{debug, warn};

use crate::config::IntegratorConfig;
use crate::error::{SimError, SimResult};

const SAFETY: f64 = 0.9;
const MIN_SHRINK: f64 = 0.2;
const MAX_GROWTH: f64 = 5.0;
const TIME_SNAP: f64 = 1e-12;

/// An ODE system whose right-hand side may be evaluated at trial states.
///
/// `derivatives` can be called any number of times, at times earlier than a
/// previous call, for steps that end up rejected. `accept` is called exactly
/// once per accepted state, in increasing time order, starting with the
/// initial state.
pub trait System {
    fn dimension(&self) -> usize;

    fn derivatives(&mut self, time: f64, y: &[f64], dy: &mut [f64]) -> SimResult<()>;

    fn accept(&mut self, time: f64, y: &[f64]) -> SimResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub accepted: usize,
    pub rejected: usize,
    /// Steps accepted at the minimum step size despite a failed error test.
    pub floor_hits: usize,
    pub evaluations: usize,
}

/// Heun's method with an embedded Euler error estimate.
#[derive(Debug, Clone)]
pub struct HeunEuler {
    config: IntegratorConfig,
    stats: Stats,
}

impl HeunEuler {
    pub fn new(config: IntegratorConfig) -> Self {
        Self {
            config,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Integrate `y` from `initial_time` to `final_time`.
    ///
    /// Steps are shortened to land on every multiple of `output_interval`
    /// past the initial time; `output` is called there, at the initial time
    /// and at the final time.
    pub fn integrate<S, F>(
        &mut self,
        system: &mut S,
        y: &mut [f64],
        output_interval: f64,
        mut output: F,
    ) -> SimResult<Stats>
    where
        S: System,
        F: FnMut(&mut S, f64, &[f64]) -> SimResult<()>,
    {
        let IntegratorConfig {
            initial_time: t0,
            final_time: t_end,
            tolerance,
            min_step,
            max_step,
        } = self.config;

        let n = system.dimension();
        if y.len() != n {
            return Err(SimError::Integration {
                time: t0,
                reason: format!("state has {} entries, system expects {n}", y.len()),
            });
        }

        self.stats = Stats::default();
        let mut t = t0;
        system.accept(t, y)?;
        output(system, t, y)?;

        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut euler = vec![0.0; n];
        let mut heun = vec![0.0; n];

        let mut outputs = 1u64;
        let mut next_output = (t0 + output_interval).min(t_end);
        let mut h = max_step.min(output_interval);

        while t_end - t > TIME_SNAP {
            let remaining = next_output - t;
            let truncated = remaining < h;
            let step = if truncated { remaining } else { h };

            system.derivatives(t, y, &mut k1)?;
            for i in 0..n {
                euler[i] = y[i] + step * k1[i];
            }
            system.derivatives(t + step, &euler, &mut k2)?;
            for i in 0..n {
                heun[i] = y[i] + 0.5 * step * (k1[i] + k2[i]);
            }
            self.stats.evaluations += 2;

            let error = heun
                .iter()
                .zip(&euler)
                .map(|(a, b)| (a - b).abs() / (tolerance * (1.0 + a.abs())))
                .fold(0.0_f64, f64::max);

            if !error.is_finite() {
                if step <= min_step {
                    return Err(SimError::Integration {
                        time: t,
                        reason: "non-finite state at minimum step".to_string(),
                    });
                }
                self.stats.rejected += 1;
                h = (step * MIN_SHRINK).max(min_step);
                continue;
            }

            let accepted = error <= 1.0 || step <= min_step;
            if accepted {
                if error > 1.0 {
                    self.stats.floor_hits += 1;
                    warn!(time = t, step, error, "step size at floor; accepting inexact step");
                }

                t += step;
                if (next_output - t).abs() <= TIME_SNAP * t.abs().max(1.0) {
                    t = next_output;
                }
                y.copy_from_slice(&heun);
                system.accept(t, y)?;
                self.stats.accepted += 1;

                if t >= next_output {
                    output(system, t, y)?;
                    outputs += 1;
                    next_output = (t0 + outputs as f64 * output_interval).min(t_end);
                }
            } else {
                self.stats.rejected += 1;
            }

            let factor = if error == 0.0 {
                MAX_GROWTH
            } else {
                (SAFETY * error.powf(-0.5)).clamp(MIN_SHRINK, MAX_GROWTH)
            };
            let proposed = (step * factor).clamp(min_step, max_step);
            h = if truncated && accepted { h.max(proposed) } else { proposed };
        }

        debug!(
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            evaluations = self.stats.evaluations,
            "integration finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // dy/dt = -y, recording every call.
    struct Decay {
        accepted: Vec<f64>,
        evaluated: Vec<f64>,
    }

    impl System for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(&mut self, time: f64, y: &[f64], dy: &mut [f64]) -> SimResult<()> {
            self.evaluated.push(time);
            dy[0] = -y[0];
            Ok(())
        }

        fn accept(&mut self, time: f64, _y: &[f64]) -> SimResult<()> {
            self.accepted.push(time);
            Ok(())
        }
    }

    fn config(final_time: f64) -> IntegratorConfig {
        IntegratorConfig {
            initial_time: 0.0,
            final_time,
            tolerance: 1e-6,
            min_step: 1e-10,
            max_step: 0.1,
        }
    }

    #[test]
    fn exponential_decay_is_accurate() {
        let mut system = Decay {
            accepted: Vec::new(),
            evaluated: Vec::new(),
        };
        let mut y = vec![1.0];
        let mut integrator = HeunEuler::new(config(1.0));
        let stats = integrator
            .integrate(&mut system, &mut y, 0.25, |_, _, _| Ok(()))
            .unwrap();

        assert!((y[0] - (-1.0_f64).exp()).abs() < 1e-4);
        assert!(stats.accepted > 0);
        assert_eq!(stats.floor_hits, 0);
    }

    #[test]
    fn accepted_times_increase_and_outputs_land_on_grid() {
        let mut system = Decay {
            accepted: Vec::new(),
            evaluated: Vec::new(),
        };
        let mut y = vec![1.0];
        let mut outputs = Vec::new();
        let mut integrator = HeunEuler::new(config(1.0));
        integrator
            .integrate(&mut system, &mut y, 0.25, |_, t, _| {
                outputs.push(t);
                Ok(())
            })
            .unwrap();

        assert_eq!(outputs, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(system.accepted[0], 0.0);
        assert!(system.accepted.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(system.accepted.last().copied(), Some(1.0));
    }

    #[test]
    fn rejections_revisit_earlier_times() {
        let mut system = Decay {
            accepted: Vec::new(),
            evaluated: Vec::new(),
        };
        let mut y = vec![1.0];
        // A huge initial step on a tight tolerance must be rejected.
        let mut integrator = HeunEuler::new(IntegratorConfig {
            tolerance: 1e-9,
            max_step: 0.5,
            ..config(1.0)
        });
        let stats = integrator
            .integrate(&mut system, &mut y, 1.0, |_, _, _| Ok(()))
            .unwrap();

        assert!(stats.rejected > 0);
        assert!(system.evaluated.windows(2).any(|w| w[1] < w[0]));
        assert_eq!(stats.accepted + 1, system.accepted.len());
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let mut system = Decay {
            accepted: Vec::new(),
            evaluated: Vec::new(),
        };
        let mut y = vec![1.0, 2.0];
        let mut integrator = HeunEuler::new(config(1.0));
        let result = integrator.integrate(&mut system, &mut y, 0.1, |_, _, _| Ok(()));
        assert!(matches!(result, Err(SimError::Integration { .. })));
    }
}
