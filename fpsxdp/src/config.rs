//! Command line and environment configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fpsxdp_core::EngineConfig;

const DEFAULT_OBJECT: &str = "target/bpfel-unknown-none/release/fpsxdp";
const DEFAULT_PIN_PATH: &str = "/sys/fs/bpf/fpsxdp";

#[derive(Debug, Parser)]
#[command(name = "fpsxdp", version, about = "XDP game server control plane")]
pub struct Cli {
    /// Interface to attach the fast path to
    #[arg(env = "FPSXDP_INTERFACE")]
    pub interface: String,

    /// Compiled eBPF object
    #[arg(long, env = "FPSXDP_OBJECT", default_value = DEFAULT_OBJECT)]
    pub object: PathBuf,

    /// Directory the shared maps are pinned under
    #[arg(long, env = "FPSXDP_PIN_PATH", default_value = DEFAULT_PIN_PATH)]
    pub pin_path: PathBuf,

    /// Attach in generic (skb) mode instead of trying the driver first
    #[arg(long, env = "FPSXDP_SKB")]
    pub skb: bool,

    #[arg(long, env = "FPSXDP_STATS_INTERVAL_MS", default_value_t = 1000)]
    pub stats_interval_ms: u64,

    /// Pages per CPU for the input event perf buffers
    #[arg(long, env = "FPSXDP_PERF_PAGES", default_value_t = 64)]
    pub perf_pages: usize,

    /// JSON file with engine sizing (queue depth, capacities, batch)
    #[arg(long, env = "FPSXDP_ENGINE_CONFIG")]
    pub engine_config: Option<PathBuf>,

    /// Pin the control plane to this CPU, away from the queues XDP runs on
    #[arg(long, env = "FPSXDP_CONTROL_CPU")]
    pub control_cpu: Option<usize>,

    /// Log each stats report as a JSON line
    #[arg(long, env = "FPSXDP_STATS_JSON")]
    pub stats_json: bool,

    #[arg(short, long, env = "FPSXDP_VERBOSE")]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interface: String,
    pub object: PathBuf,
    pub pin_path: PathBuf,
    pub force_skb: bool,
    pub stats_interval: Duration,
    pub perf_pages: usize,
    pub engine_config: Option<PathBuf>,
    pub control_cpu: Option<usize>,
    pub stats_json: bool,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: String::new(),
            object: PathBuf::from(DEFAULT_OBJECT),
            pin_path: PathBuf::from(DEFAULT_PIN_PATH),
            force_skb: false,
            stats_interval: Duration::from_secs(1),
            perf_pages: 64,
            engine_config: None,
            control_cpu: None,
            stats_json: false,
            verbose: false,
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            interface: cli.interface,
            object: cli.object,
            pin_path: cli.pin_path,
            force_skb: cli.skb,
            stats_interval: Duration::from_millis(cli.stats_interval_ms.max(1)),
            // perf buffers need a power of two
            perf_pages: cli.perf_pages.max(1).next_power_of_two(),
            engine_config: cli.engine_config,
            control_cpu: cli.control_cpu,
            stats_json: cli.stats_json,
            verbose: cli.verbose,
        }
    }
}

impl Config {
    /// Parses the command line. Usage errors exit with status 1 like any
    /// other startup failure; `--help` and `--version` exit 0.
    pub fn from_args() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli.into(),
            Err(err) => {
                let code = usage_exit_code(&err);
                let _ = err.print();
                std::process::exit(code)
            }
        }
    }

    /// Engine sizing from `--engine-config`, or the defaults. The stats
    /// interval always comes from `--stats-interval-ms`.
    pub fn engine(&self) -> Result<EngineConfig> {
        let mut engine = match &self.engine_config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read engine config {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("invalid engine config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        engine.stats_interval = self.stats_interval;
        Ok(engine)
    }

    /// `debug` with `--verbose`, else `info`. `RUST_LOG` wins over both.
    pub fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Cli::try_parse_from(std::iter::once("fpsxdp").chain(args.iter().copied()))
            .unwrap()
            .into()
    }

    #[test]
    fn defaults() {
        let config = parse(&["eth0"]);
        assert_eq!(
            config,
            Config {
                interface: "eth0".into(),
                ..Config::default()
            }
        );
        assert_eq!(config.default_log_level(), "info");
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "enp3s0",
            "--object",
            "/opt/fpsxdp.o",
            "--pin-path",
            "/sys/fs/bpf/game",
            "--skb",
            "--stats-interval-ms",
            "250",
            "--perf-pages",
            "48",
            "-v",
        ]);
        assert_eq!(config.interface, "enp3s0");
        assert_eq!(config.object, PathBuf::from("/opt/fpsxdp.o"));
        assert_eq!(config.pin_path, PathBuf::from("/sys/fs/bpf/game"));
        assert!(config.force_skb);
        assert_eq!(config.stats_interval, Duration::from_millis(250));
        assert_eq!(config.perf_pages, 64);
        assert_eq!(config.default_log_level(), "debug");
        assert_eq!(config.engine().unwrap().stats_interval, Duration::from_millis(250));
    }

    #[test]
    fn interface_is_required() {
        let err = Cli::try_parse_from(["fpsxdp"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(usage_exit_code(&err), 1);
    }

    #[test]
    fn help_exits_cleanly() {
        let err = Cli::try_parse_from(["fpsxdp", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 0);
    }

    #[test]
    fn control_plane_options() {
        let config = parse(&["eth0", "--control-cpu", "3", "--stats-json"]);
        assert_eq!(config.control_cpu, Some(3));
        assert!(config.stats_json);
    }

    #[test]
    fn engine_sizing_from_file() {
        let path = std::env::temp_dir().join(format!("fpsxdp-engine-{}.json", std::process::id()));
        fs::write(&path, r#"{ "input_queue_depth": 128, "updater_batch": 32 }"#).unwrap();
        let config = parse(&["eth0", "--stats-interval-ms", "500", "--engine-config", path.to_str().unwrap()]);
        let engine = config.engine().unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(engine.input_queue_depth, 128);
        assert_eq!(engine.updater_batch, 32);
        assert_eq!(engine.max_sessions, EngineConfig::default().max_sessions);
        assert_eq!(engine.stats_interval, Duration::from_millis(500));
    }

    #[test]
    fn missing_engine_config_is_an_error() {
        let config = Config {
            engine_config: Some(PathBuf::from("/nonexistent/fpsxdp-engine.json")),
            ..Config::default()
        };
        let err = config.engine().unwrap_err();
        assert!(format!("{err:#}").contains("failed to read engine config"));
    }
}
