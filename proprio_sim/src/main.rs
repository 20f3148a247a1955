//! proprio_sim - stretch reflex on a perturbed sliding block
//!
//! Builds a single-muscle plant with a muscle spindle, a golgi tendon organ
//! and a delayed stretch reflex, integrates it with an adaptive step and
//! writes the trajectory as CSV.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use tracing::{info, warn};

mod config;
mod error;
mod integrator;
mod model;
mod plant;
mod report;

use config::SimConfig;
use error::{SimError, SimResult};
use integrator::{HeunEuler, Stats};
use model::ReflexModel;
use plant::BlockState;
use report::Report;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    print_config: bool,
    help: bool,
}

fn print_usage() {
    eprintln!("proprio_sim - delayed stretch reflex on a sliding block\n");
    eprintln!("Usage: proprio_sim [--config <file.json>] [--out <file.csv>] [--print-config]\n");
    eprintln!("Options:");
    eprintln!("  --config <path>   Read settings from JSON; missing fields use defaults");
    eprintln!("  --out <path>      Write the CSV report here instead of stdout");
    eprintln!("  --print-config    Print the effective settings as JSON and exit");
    eprintln!("  --help            Show this message");
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> SimResult<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| SimError::Usage("--config needs a path".to_string()))?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--out" => {
                let path = args
                    .next()
                    .ok_or_else(|| SimError::Usage("--out needs a path".to_string()))?;
                parsed.out = Some(PathBuf::from(path));
            }
            "--print-config" => parsed.print_config = true,
            "-h" | "--help" => parsed.help = true,
            other => return Err(SimError::Usage(format!("unknown argument `{other}`"))),
        }
    }
    Ok(parsed)
}

/// Run the configured scenario from start to end.
fn simulate(config: &SimConfig) -> SimResult<(Report, Stats)> {
    config.validate()?;
    let mut model = ReflexModel::build(config)?;
    let t0 = config.integrator.initial_time;
    let mut y = model.initial_state(t0).to_vec();

    let mut report = Report::new();
    let mut integrator = HeunEuler::new(config.integrator);
    let stats = integrator.integrate(
        &mut model,
        &mut y,
        config.report_interval,
        |model, t, y| {
            report.push(model.observe(&BlockState::from_slice(t, y))?);
            Ok(())
        },
    )?;

    Ok((report, stats))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n");
            print_usage();
            std::process::exit(2);
        }
    };
    if args.help {
        print_usage();
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            SimConfig::load(path)?
        }
        None => SimConfig::default(),
    };
    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    info!(
        "Integrating from {} to {}",
        config.integrator.initial_time, config.integrator.final_time
    );
    let (report, stats) = simulate(&config)?;
    if stats.floor_hits > 0 {
        warn!("{} steps were taken at the minimum step size", stats.floor_hits);
    }

    match &args.out {
        Some(path) => {
            report.write_csv(BufWriter::new(File::create(path)?))?;
            info!("Report written to {:?}", path);
        }
        None => report.write_csv(io::stdout().lock())?,
    }

    let summary = report.summary();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        "Simulation finished: {}",
        serde_json::to_string(&summary)?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proprio::controller::GainMode;

    fn args(list: &[&str]) -> SimResult<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    fn short_run() -> SimConfig {
        let mut config = SimConfig::default();
        config.integrator.final_time = 2.0;
        config
    }

    #[test]
    fn arguments_parse() {
        let parsed = args(&["--config", "a.json", "--out", "b.csv"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("a.json")));
        assert_eq!(parsed.out, Some(PathBuf::from("b.csv")));
        assert!(!parsed.print_config);

        assert!(args(&["--print-config"]).unwrap().print_config);
        assert!(args(&["--help"]).unwrap().help);
        assert!(matches!(args(&["--out"]), Err(SimError::Usage(_))));
        assert!(matches!(args(&["--fast"]), Err(SimError::Usage(_))));
    }

    #[test]
    fn reflex_resists_the_perturbation() {
        let (with_reflex, stats) = simulate(&short_run()).unwrap();
        assert!(stats.accepted > 0);
        assert_eq!(with_reflex.len(), 201);

        let mut config = short_run();
        config.reflex.gain_length = Some(0.0);
        config.reflex.gain_velocity = Some(0.0);
        let (without_reflex, _) = simulate(&config).unwrap();

        let active = with_reflex.summary();
        let passive = without_reflex.summary();
        assert!(active.peak_excitation > passive.peak_excitation);
        assert!(active.max_position < passive.max_position);
        assert!((passive.peak_excitation - config.muscle.baseline_excitation).abs() < 1e-9);
    }

    #[test]
    fn single_gain_mode_runs() {
        let mut config = short_run();
        config.reflex.gain_mode = GainMode::Single;
        config.reflex.gain = Some(0.5);
        let (report, _) = simulate(&config).unwrap();
        assert!(report.summary().peak_excitation > config.muscle.baseline_excitation);
    }

    #[test]
    fn invalid_config_stops_before_integration() {
        let mut config = short_run();
        config.integrator.tolerance = 0.0;
        assert!(matches!(simulate(&config), Err(SimError::Config { .. })));

        let mut config = short_run();
        config.reflex.gain_mode = GainMode::Split;
        config.reflex.gain_velocity = None;
        assert!(matches!(simulate(&config), Err(SimError::Reflex(_))));
    }
}
