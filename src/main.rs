// ============================================================================
// main.rs — Morphtree
// Entry point. Initializes logging, parses the command line and starts either
// the windowed event loop or the headless runner.
// ============================================================================

mod app;
mod camera;
mod config;
mod gesture;
mod headless;
mod input;
mod metrics;
mod morph;
mod panels;
mod particles;
mod pipeline;
mod recorder;
mod renderer;
mod scene;
mod shapes;
mod state;

use std::path::PathBuf;

use app::{App, AppConfig};
use config::{load_config, SceneConfig};
use headless::{run_headless, HeadlessConfig};
use winit::event_loop::EventLoop;

#[derive(Clone, Debug, Default, PartialEq)]
struct CliArgs {
    headless: bool,
    frames: Option<u32>,
    dt: Option<f32>,
    config_path: Option<String>,
    export_dir: Option<PathBuf>,
    low_power: bool,
    seed: Option<u64>,
}

const USAGE: &str = "usage: morphtree [--headless] [--frames N] [--dt SECONDS] \
                     [--config PATH] [--export DIR] [--low-power] [--seed N]";

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{} expects a value\n{}", name, USAGE))
        };
        match arg.as_str() {
            "--headless" => cli.headless = true,
            "--low-power" => cli.low_power = true,
            "--frames" => {
                let v = value("--frames")?;
                cli.frames = Some(v.parse().map_err(|e| format!("Invalid --frames {}: {}", v, e))?);
            }
            "--dt" => {
                let v = value("--dt")?;
                cli.dt = Some(v.parse().map_err(|e| format!("Invalid --dt {}: {}", v, e))?);
            }
            "--seed" => {
                let v = value("--seed")?;
                cli.seed = Some(v.parse().map_err(|e| format!("Invalid --seed {}: {}", v, e))?);
            }
            "--config" => cli.config_path = Some(value("--config")?),
            "--export" => cli.export_dir = Some(PathBuf::from(value("--export")?)),
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("Unknown argument '{}'\n{}", other, USAGE)),
        }
    }
    Ok(cli)
}

/// Resolve the scene config: file (falling back to defaults on failure),
/// then the low-power preset, then the seed override.
fn scene_config(cli: &CliArgs) -> SceneConfig {
    let mut config = match &cli.config_path {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            log::warn!("{}; using default scene", e);
            SceneConfig::default()
        }),
        None => SceneConfig::default(),
    };
    if cli.low_power {
        config.particles = SceneConfig::low_power().particles;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config
}

fn main() {
    env_logger::init();

    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };
    let scene = scene_config(&cli);

    if cli.headless {
        let defaults = HeadlessConfig::default();
        let config = HeadlessConfig {
            frames: cli.frames.unwrap_or(defaults.frames),
            dt: cli.dt.unwrap_or(defaults.dt),
            export_dir: cli.export_dir.clone(),
            ..defaults
        };
        match run_headless(&scene, &config) {
            Ok(report) => {
                if let Some(dir) = report.session_dir {
                    log::info!("Session written to {:?}", dir);
                }
            }
            Err(e) => {
                log::error!("Headless run failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

    let mut app = App::new(AppConfig {
        scene,
        export_dir: cli.export_dir,
    });
    event_loop.run_app(&mut app).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let cli = parse_args(args(&[
            "--headless", "--frames", "120", "--dt", "0.02", "--config", "scene.json",
            "--export", "out", "--low-power", "--seed", "9",
        ]))
        .unwrap();
        assert_eq!(
            cli,
            CliArgs {
                headless: true,
                frames: Some(120),
                dt: Some(0.02),
                config_path: Some("scene.json".into()),
                export_dir: Some(PathBuf::from("out")),
                low_power: true,
                seed: Some(9),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["--frames"])).is_err());
        assert!(parse_args(args(&["--frames", "many"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let cli = CliArgs {
            config_path: Some("/nonexistent/scene.json".into()),
            low_power: true,
            seed: Some(3),
            ..CliArgs::default()
        };
        let config = scene_config(&cli);
        assert_eq!(config.total_particles(), 800);
        assert_eq!(config.seed, Some(3));
    }
}
