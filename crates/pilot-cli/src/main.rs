use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::Arc;
use tracing::{info, warn};

use pilot_command::{doctor, schema, Backend, ControlSession, FunctionDispatcher, SessionConfig};
use pilot_fc::{FlightLimits, LinkConfig};
use pilot_proto::{FunctionCall, FunctionResult, Mission};
use pilot_sim::SimConfig;

#[derive(Debug, Parser)]
#[command(name = "pilot", version, about = "Natural-language flight command dispatch for autopilots and simulators")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config without connecting.
    Doctor,
    /// Dispatch a directive (argument or stdin) and print the result as JSON.
    Exec { text: Option<String> },
    /// Dispatch one function by name with JSON arguments.
    Call {
        name: String,
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Upload and start a mission from a TOML file.
    Mission { file: String },
    /// Connect and print the vehicle status.
    Status,
    /// Print the function prompt for models without native function calling.
    Prompt {
        /// JSON schema list instead of prompt text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    session: SessionCfg,
    live: Option<LinkConfig>,
    sim: Option<SimConfig>,
    #[serde(default)]
    flight: FlightLimits,
}

#[derive(Debug, serde::Deserialize)]
struct SessionCfg {
    backend: Backend,
}

impl Config {
    fn session(&self) -> SessionConfig {
        SessionConfig {
            backend: self.session.backend,
            live: self.live.clone(),
            sim: self.sim.clone(),
            flight: self.flight.clone(),
        }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor_cmd(&cfg)?,
        Command::Exec { text } => {
            let text = match text {
                Some(t) => t,
                None => read_stdin()?,
            };
            exec(&cfg, Job::Text(text)).await?
        }
        Command::Call { name, args } => {
            let arguments = serde_json::from_str(&args).context("--args must be a JSON object")?;
            exec(&cfg, Job::Call(FunctionCall { name, arguments })).await?
        }
        Command::Mission { file } => {
            let mission = load_mission(&file)?;
            exec(&cfg, Job::Mission(mission)).await?
        }
        Command::Status => exec(&cfg, Job::Call(FunctionCall::new("get_status"))).await?,
        Command::Prompt { json } => {
            if json {
                let list: Vec<_> = schema::SCHEMAS.iter().map(|s| s.to_json()).collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", schema::render_prompt());
            }
        }
    }
    Ok(())
}

fn doctor_cmd(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    doctor::check_session(&cfg.session())?;
    if cfg.session.backend == Backend::Sim && cfg.live.is_some() {
        warn!("doctor: [live] section present but backend=sim, it will be ignored");
    }
    info!("doctor: OK");
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut s = String::new();
    std::io::stdin().read_to_string(&mut s).context("read directive from stdin")?;
    Ok(s)
}

#[derive(Debug, serde::Deserialize)]
struct MissionFile {
    home: Option<HomeCfg>,
    #[serde(default)]
    waypoints: Vec<pilot_proto::Waypoint>,
}

#[derive(Debug, serde::Deserialize)]
struct HomeCfg {
    lat: f64,
    lon: f64,
}

fn load_mission(path: &str) -> Result<Mission> {
    let s = std::fs::read_to_string(path).context("read mission file")?;
    let f: MissionFile = toml::from_str(&s).context("parse mission toml")?;
    let mut mission = Mission::new(f.waypoints)?;
    if let Some(h) = f.home {
        mission = mission.with_home(h.lat, h.lon);
    }
    Ok(mission)
}

enum Job {
    Text(String),
    Call(FunctionCall),
    Mission(Mission),
}

/// Connects, runs one job on a blocking worker, and disconnects. Ctrl-C
/// cancels the job in flight.
async fn exec(cfg: &Config, job: Job) -> Result<()> {
    let session = Arc::new(ControlSession::new(cfg.session()));
    {
        let s = session.clone();
        tokio::task::spawn_blocking(move || s.connect()).await.context("connect task")??;
    }

    let worker = {
        let session = session.clone();
        tokio::task::spawn_blocking(move || run_job(session, job))
    };
    tokio::pin!(worker);

    let result = tokio::select! {
        res = &mut worker => res.context("dispatch task")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling");
            session.cancel();
            worker.await.context("dispatch task")?
        }
    };

    match result {
        Some(res) => println!("{}", serde_json::to_string_pretty(&res)?),
        None => println!("no function call found"),
    }

    let s = session.clone();
    tokio::task::spawn_blocking(move || s.disconnect()).await.context("disconnect task")?;
    Ok(())
}

fn run_job(session: Arc<ControlSession>, job: Job) -> Option<FunctionResult> {
    match job {
        Job::Text(text) => FunctionDispatcher::new(session).dispatch_text(&text),
        Job::Call(call) => Some(FunctionDispatcher::new(session).dispatch(&call)),
        Job::Mission(mission) => Some(match session.execute_mission(&mission) {
            Ok(()) => FunctionResult::ok(format!("Mission started ({} waypoints)", mission.len())),
            Err(e) => FunctionResult::failed("Mission failed", e.to_string()),
        }),
    }
}
