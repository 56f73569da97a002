use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use triage_core::config::default_config_toml;
use triage_core::mesh::{MeshWarpEngine, SuctionDirection};
use triage_core::{Point, Rect, TriageConfig};

use crate::error::{ReplayError, Result};
use crate::replay::replay;
use crate::script::Script;

#[derive(Debug, Parser)]
#[command(
    name = "triage-replay",
    about = "Replay recorded swipe scripts against the triage card deck",
    version
)]
pub struct Cli {
    /// Print errors as JSON on stderr.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `triage_core=trace`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a script; prints one JSON line per action, then a summary.
    Run(RunArgs),

    /// Print one genie mesh frame as JSON.
    Mesh(MeshArgs),

    /// Print the built-in configuration file.
    #[command(name = "default-config")]
    DefaultConfig,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    pub script: PathBuf,

    /// TOML configuration; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Top,
    Bottom,
}

#[derive(Debug, Args)]
pub struct MeshArgs {
    #[arg(long, default_value_t = 12)]
    pub rows: usize,
    #[arg(long, default_value_t = 24)]
    pub cols: usize,
    #[arg(long, default_value_t = 0.5)]
    pub progress: f32,
    #[arg(long, value_enum, default_value_t = Direction::Bottom)]
    pub direction: Direction,
    /// Source rectangle as `x,y,width,height`.
    #[arg(long, default_value = "40,120,320,480")]
    pub source: String,
    /// Destination point as `x,y`.
    #[arg(long, default_value = "250,760")]
    pub destination: String,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_level.as_deref());
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Run(args) => run_script(&args, &mut out),
        Commands::Mesh(args) => print_mesh(&args, &mut out),
        Commands::DefaultConfig => {
            out.write_all(default_config_toml().as_bytes())?;
            Ok(())
        }
    }
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_script<W: Write>(args: &RunArgs, out: &mut W) -> Result<()> {
    let config = match &args.config {
        Some(path) => TriageConfig::load(path)?,
        None => TriageConfig::default(),
    };
    let script = Script::load(&args.script)?;
    let summary = replay(&script, config, out)?;
    serde_json::to_writer(&mut *out, &serde_json::json!({ "summary": summary }))?;
    out.write_all(b"\n")?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MeshDump {
    rows: usize,
    cols: usize,
    progress: f32,
    vertices: Vec<[f32; 2]>,
}

pub fn print_mesh<W: Write>(args: &MeshArgs, out: &mut W) -> Result<()> {
    let source = match parse_floats::<4>(&args.source, "--source")? {
        [x, y, w, h] => Rect::new(x, y, w, h),
    };
    let destination = match parse_floats::<2>(&args.destination, "--destination")? {
        [x, y] => Point::new(x, y),
    };
    let direction = match args.direction {
        Direction::Top => SuctionDirection::TowardTop,
        Direction::Bottom => SuctionDirection::TowardBottom,
    };
    if !(0.0..=1.0).contains(&args.progress) {
        return Err(ReplayError::invalid("--progress must be within [0, 1]"));
    }
    let engine = MeshWarpEngine::new(args.rows, args.cols);
    let grid = engine.warp(source, destination, args.progress, direction);
    let dump = MeshDump {
        rows: grid.rows(),
        cols: grid.cols(),
        progress: args.progress,
        vertices: grid.vertices().iter().map(|v| [v.x, v.y]).collect(),
    };
    serde_json::to_writer(&mut *out, &dump)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn parse_floats<const N: usize>(text: &str, flag: &str) -> Result<[f32; N]> {
    let mut values = [0.0; N];
    let mut parts = text.split(',');
    for value in &mut values {
        let part = parts
            .next()
            .ok_or_else(|| ReplayError::invalid(format!("{flag} needs {N} comma-separated numbers")))?;
        *value = part
            .trim()
            .parse()
            .map_err(|_| ReplayError::invalid(format!("{flag}: `{part}` is not a number")))?;
    }
    if parts.next().is_some() {
        return Err(ReplayError::invalid(format!(
            "{flag} needs {N} comma-separated numbers"
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_args() -> MeshArgs {
        MeshArgs {
            rows: 4,
            cols: 6,
            progress: 1.0,
            direction: Direction::Top,
            source: "0,0,100,200".to_string(),
            destination: "50,-20".to_string(),
        }
    }

    #[test]
    fn mesh_dump_has_full_grid() {
        let mut out = Vec::new();
        print_mesh(&mesh_args(), &mut out).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["rows"], 4);
        let vertices = v["vertices"].as_array().unwrap();
        assert_eq!(vertices.len(), 5 * 7);
        assert!(vertices.iter().all(|p| p[0] == 50.0 && p[1] == -20.0));
    }

    #[test]
    fn malformed_rect_is_an_argument_error() {
        let args = MeshArgs {
            source: "1,2,3".to_string(),
            ..mesh_args()
        };
        let err = print_mesh(&args, &mut Vec::new()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn progress_out_of_range_is_rejected() {
        let args = MeshArgs {
            progress: 1.5,
            ..mesh_args()
        };
        assert!(matches!(
            print_mesh(&args, &mut Vec::new()),
            Err(ReplayError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["triage-replay", "run", "s.json", "--json", "--log-level", "debug"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Run(RunArgs { ref script, .. }) if script == std::path::Path::new("s.json")));
    }
}
