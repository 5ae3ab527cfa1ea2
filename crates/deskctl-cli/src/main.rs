//! `deskctl`: runs one computer-control operation and prints a JSON result.
//!
//! # Usage
//!
//! ```text
//! deskctl [OPTIONS] <COMMAND>
//!
//! Commands:
//!   screenshot                 capture the display, print path + base64 PNG
//!   click X Y [--button NAME]  left/right/middle/back/forward
//!   double-click X Y
//!   move X Y
//!   scroll X Y DX DY           pixel deltas, positive DY scrolls down
//!   type TEXT
//!   keypress KEY...            pressed together, e.g. `keypress CTRL c`
//!   drag X,Y X,Y...
//!   wait MS
//!   dimensions
//!   environment
//!
//! Options:
//!   --backend <exec|protocol>  [default: protocol]
//!   --config <FILE>            TOML driver file
//!   --host, --port, --username, --password, --display, --container,
//!   --screenshot-dir           override the driver file
//! ```
//!
//! Every option can also come from a `DESKCTL_*` environment variable.
//! Results go to stdout as a single JSON object (`{"ok":true,...}`); logs go
//! to stderr, filtered by `RUST_LOG` (default `info`).

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use deskctl_computer::{
    ComputerBackend, ComputerController, ExecBackedComputer, ProtocolBackedComputer,
    ScreenshotPipeline,
};
use deskctl_core::{Point, PointerButton};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::DriverConfig;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// `xdotool` inside a docker compose service.
    Exec,
    /// A direct RFB (VNC) session.
    Protocol,
}

/// Drives a remote Linux desktop over VNC or `docker compose exec`.
#[derive(Debug, Parser)]
#[command(name = "deskctl", version)]
struct Cli {
    /// Which backend carries the operation.
    #[arg(long, value_enum, default_value_t = BackendKind::Protocol, env = "DESKCTL_BACKEND")]
    backend: BackendKind,

    /// TOML driver file.
    #[arg(long, short, env = "DESKCTL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "DESKCTL_HOST")]
    host: Option<String>,

    #[arg(long, env = "DESKCTL_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DESKCTL_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "DESKCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// X display inside the container (exec backend).
    #[arg(long, env = "DESKCTL_DISPLAY")]
    display: Option<String>,

    /// Compose service hosting the display (exec backend).
    #[arg(long, env = "DESKCTL_CONTAINER")]
    container: Option<String>,

    /// Where screenshots are written.
    #[arg(long, env = "DESKCTL_SCREENSHOT_DIR")]
    screenshot_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Capture the display.
    Screenshot,
    /// Click at a position.
    Click {
        x: i32,
        y: i32,
        #[arg(long, default_value = "left")]
        button: String,
    },
    /// Left-click twice at a position.
    DoubleClick { x: i32, y: i32 },
    /// Move the pointer.
    Move { x: i32, y: i32 },
    /// Scroll at a position by pixel deltas.
    Scroll {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(allow_negative_numbers = true)]
        dx: i32,
        #[arg(allow_negative_numbers = true)]
        dy: i32,
    },
    /// Type text literally.
    Type { text: String },
    /// Press keys together as one combination.
    Keypress {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Drag the left button along a path of `X,Y` points.
    Drag {
        #[arg(required = true, value_parser = parse_point)]
        path: Vec<Point>,
    },
    /// Pause for a number of milliseconds.
    Wait { ms: u64 },
    /// Print the display size.
    Dimensions,
    /// Print the target environment.
    Environment,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in '{s}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in '{s}': {e}"))?;
    Ok(Point::new(x, y))
}

impl Cli {
    /// Loads the driver file and applies flag/env overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the named driver file cannot be read or parsed.
    fn into_driver_config(self) -> anyhow::Result<(DriverConfig, BackendKind, Command)> {
        let mut cfg = DriverConfig::load(self.config.as_deref())
            .context("failed to load driver configuration")?;

        let computer = &mut cfg.computer;
        if let Some(host) = self.host {
            computer.host = host;
        }
        if let Some(port) = self.port {
            computer.port = port;
        }
        computer.username = self.username.or(computer.username.take());
        computer.password = self.password.or(computer.password.take());
        computer.display = self.display.or(computer.display.take());
        computer.container = self.container.or(computer.container.take());
        if let Some(dir) = self.screenshot_dir {
            cfg.screenshots.dir = dir;
        }
        Ok((cfg, self.backend, self.command))
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Runs `command` and returns the JSON fields to report next to `"ok"`.
async fn run<B: ComputerBackend>(
    ctl: &ComputerController<B>,
    command: Command,
) -> anyhow::Result<Value> {
    let fields = match command {
        Command::Screenshot => {
            let shot = ctl.screenshot().await?;
            serde_json::to_value(shot)?
        }
        Command::Click { x, y, button } => {
            let button = PointerButton::from_name_or_left(&button);
            ctl.click(x, y, button).await?;
            json!({ "action": "click", "x": x, "y": y, "button": button })
        }
        Command::DoubleClick { x, y } => {
            ctl.double_click(x, y).await?;
            json!({ "action": "double_click", "x": x, "y": y })
        }
        Command::Move { x, y } => {
            ctl.move_to(x, y).await?;
            json!({ "action": "move", "x": x, "y": y })
        }
        Command::Scroll { x, y, dx, dy } => {
            ctl.scroll(x, y, dx, dy).await?;
            json!({ "action": "scroll", "x": x, "y": y, "dx": dx, "dy": dy })
        }
        Command::Type { text } => {
            ctl.type_text(&text).await?;
            json!({ "action": "type", "chars": text.chars().count() })
        }
        Command::Keypress { keys } => {
            ctl.keypress(keys.as_slice()).await?;
            json!({ "action": "keypress", "keys": keys })
        }
        Command::Drag { path } => {
            ctl.drag(&path).await?;
            json!({ "action": "drag", "path": path })
        }
        Command::Wait { ms } => {
            ctl.wait(ms).await?;
            json!({ "action": "wait", "ms": ms })
        }
        Command::Dimensions => {
            let dims = ctl.dimensions().await;
            json!({ "width": dims.width, "height": dims.height })
        }
        Command::Environment => json!({ "environment": ctl.environment() }),
    };
    Ok(fields)
}

/// Runs one command on `ctl` and always closes it afterwards.
async fn run_and_close<B: ComputerBackend>(
    ctl: ComputerController<B>,
    command: Command,
) -> anyhow::Result<Value> {
    let result = run(&ctl, command).await;
    if let Err(e) = ctl.close().await {
        tracing::warn!("closing controller failed: {e}");
    }
    result
}

fn with_ok(fields: Value) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("ok".to_string(), Value::Bool(true));
    if let Value::Object(map) = fields {
        out.extend(map);
    }
    Value::Object(out)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (cfg, backend, command) = Cli::parse().into_driver_config()?;
    let pipeline = ScreenshotPipeline::new(&cfg.screenshots.dir);

    let fields = match backend {
        BackendKind::Exec => {
            let computer = ExecBackedComputer::from_config(&cfg.computer);
            info!(
                display = computer.display(),
                container = computer.container(),
                "using exec backend"
            );
            computer
                .ensure_running()
                .await
                .context("exec backend is not available")?;
            run_and_close(ComputerController::new(computer, pipeline), command).await?
        }
        BackendKind::Protocol => {
            info!(address = %cfg.computer.address(), "using protocol backend");
            let computer =
                ProtocolBackedComputer::from_config(cfg.computer, cfg.reconnect.to_policy());
            run_and_close(ComputerController::new(computer, pipeline), command).await?
        }
    };

    println!("{}", with_ok(fields));
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
