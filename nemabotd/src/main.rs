//! nemabot daemon - runs a simulation in the background and serves it over TCP
//!
//! The daemon owns one simulation inside an arena and steps it at a fixed
//! rate (or one step per request in step mode). Clients speak newline-delimited
//! JSON on 127.0.0.1:9877; see `nemabot-cli`.
//!
//! Storage locations:
//! - Linux: ~/.local/share/nemabot/
//! - Windows: %APPDATA%\nemabot\
//! - MacOS: ~/Library/Application Support/nemabot/
//!
//! An optional `config.json` there overrides the defaults; each run writes a
//! CSV step log under `logs/`.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nemabot::connectome::Connectome;
use nemabot::engine::{SimConfig, Simulation};
use nemabot::error::NemabotError;
use nemabot::observer::{NeuronTrace, SimulationAdapter, SimulationSnapshot, Trace};
use nemabot::prng::Prng;
use nemabot::storage::CsvStepLog;
use nemabot::world::{Arena, Controls, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time;
use tracing::{error, info, warn};

mod paths;

use paths::{AppPaths, PathsError};

const ADDR: &str = "127.0.0.1:9877";

#[derive(Debug, Error)]
enum DaemonError {
    #[error(transparent)]
    Paths(#[from] PathsError),

    #[error(transparent)]
    Nemabot(#[from] NemabotError),
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DaemonConfig {
    sim: SimConfig,
    /// Wiring JSON; the bundled sample when absent.
    connectome: Option<PathBuf>,
    steps_per_second: u32,
    arena_width: f32,
    arena_height: f32,
    food_count: usize,
    obstacle_count: usize,
    write_logs: bool,
    /// Samples kept per watched neuron.
    trace_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            connectome: None,
            steps_per_second: 10,
            arena_width: 1920.0,
            arena_height: 1080.0,
            food_count: 6,
            obstacle_count: 6,
            write_logs: true,
            trace_capacity: 500,
        }
    }
}

fn load_config(paths: &AppPaths) -> DaemonConfig {
    let path = paths.config_file();
    let Ok(text) = fs::read_to_string(&path) else {
        return DaemonConfig::default();
    };
    match serde_json::from_str(&text) {
        Ok(cfg) => {
            info!("Loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            DaemonConfig::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Protocol
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    SetStepMode { enabled: bool },
    Step,
    SetStepsPerSecond { sps: u32 },
    /// `None` returns to the food level sensed in the arena.
    SetFood { level: Option<f32> },
    SetTouch { active: bool },
    SetTouchNeurons { enabled: bool },
    SetFunction { name: String, active: bool },
    ListFunctions,
    Force { neuron: String },
    Release { neuron: String },
    Watch { neuron: String },
    ResetRun,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(StateSnapshot),
    Functions { groups: Vec<FunctionInfo> },
    Success { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSnapshot {
    running: bool,
    step_mode: bool,
    steps_per_second: u32,
    food_level: f32,
    touch: bool,
    obstacle_distance: Option<f32>,
    controls: Controls,
    sim: SimulationSnapshot,
    traces: Vec<Trace>,
    log_file: Option<String>,
    arena: ArenaView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArenaView {
    width: f32,
    height: f32,
    food: Vec<(f32, f32)>,
    obstacles: Vec<Rect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionInfo {
    name: String,
    prefixes: Vec<String>,
    active: bool,
    neurons: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon state
// ═══════════════════════════════════════════════════════════════════════════

struct DaemonState {
    paths: AppPaths,
    cfg: DaemonConfig,
    sim: Simulation,
    arena: Arena,
    rng: Prng,
    controls: Controls,
    trace: NeuronTrace,
    running: bool,
    step_mode: bool,
    step_ready: bool,
    steps_per_second: u32,
    run: u32,
    log_file: Option<PathBuf>,
}

impl DaemonState {
    fn new(paths: AppPaths, cfg: DaemonConfig) -> Result<Self, DaemonError> {
        let connectome = match &cfg.connectome {
            Some(p) => Connectome::load(p)?,
            None => Connectome::sample()?,
        };
        let sim = Simulation::new(connectome, cfg.sim)?;
        let mut rng = cfg.sim.seed.map_or_else(Prng::from_entropy, Prng::new);
        let mut arena = Arena::scatter(
            cfg.arena_width,
            cfg.arena_height,
            cfg.food_count,
            cfg.obstacle_count,
            &mut rng,
        );
        arena.reset(sim.pose());

        let mut state = Self {
            steps_per_second: cfg.steps_per_second.clamp(1, 1000),
            trace: NeuronTrace::new(cfg.trace_capacity),
            paths,
            cfg,
            sim,
            arena,
            rng,
            controls: Controls::default(),
            running: false,
            step_mode: true,
            step_ready: false,
            run: 0,
            log_file: None,
        };
        state.start_log();
        Ok(state)
    }

    /// Open a fresh CSV step log for the current run. Failure only disables
    /// logging.
    fn start_log(&mut self) {
        self.close_log();
        if !self.cfg.write_logs {
            return;
        }
        self.run += 1;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = self.paths.run_log(stamp, self.run);
        let attached = File::create(&path).map_err(NemabotError::from).and_then(|f| {
            self.sim
                .attach_log(Box::new(CsvStepLog::new(BufWriter::new(f))))
        });
        match attached {
            Ok(()) => {
                info!("Step log: {}", path.display());
                self.log_file = Some(path);
            }
            Err(e) => warn!("Step log disabled: {}", e),
        }
    }

    fn close_log(&mut self) {
        if let Err(e) = self.sim.detach_log() {
            warn!("Step log flush failed: {}", e);
        }
        self.log_file = None;
    }

    fn tick(&mut self) {
        if !self.running {
            return;
        }
        if self.step_mode {
            if !self.step_ready {
                return;
            }
            self.step_ready = false;
        }
        self.arena.advance(&mut self.sim, &self.controls);
        self.trace.record(&self.sim);
        if self.log_file.is_some() && !self.sim.is_logging() {
            self.log_file = None;
        }
    }

    /// New run: network at rest, body at the start pose, new arena layout,
    /// traces cleared, new log file.
    fn reset_run(&mut self) {
        self.close_log();
        self.sim.reset_for_new_run();
        self.arena = Arena::scatter(
            self.cfg.arena_width,
            self.cfg.arena_height,
            self.cfg.food_count,
            self.cfg.obstacle_count,
            &mut self.rng,
        );
        self.arena.reset(self.sim.pose());
        self.trace.clear();
        self.step_ready = false;
        self.start_log();
    }

    fn snapshot(&self) -> StateSnapshot {
        let senses = self.arena.senses();
        StateSnapshot {
            running: self.running,
            step_mode: self.step_mode,
            steps_per_second: self.steps_per_second,
            food_level: senses.food_level,
            touch: senses.touch,
            obstacle_distance: senses
                .obstacle_distance
                .is_finite()
                .then_some(senses.obstacle_distance),
            controls: self.controls,
            sim: SimulationAdapter::new(&self.sim).snapshot(),
            traces: self.trace.traces().to_vec(),
            log_file: self.log_file.as_ref().map(|p| p.display().to_string()),
            arena: ArenaView {
                width: self.arena.width,
                height: self.arena.height,
                food: self.arena.food.clone(),
                obstacles: self.arena.obstacles.clone(),
            },
        }
    }

    fn functions(&self) -> Vec<FunctionInfo> {
        let panel = self.sim.panel();
        panel
            .groups()
            .iter()
            .enumerate()
            .map(|(i, g)| FunctionInfo {
                name: g.name.clone(),
                prefixes: g.prefixes.clone(),
                active: panel.is_active(i),
                neurons: g.expand(self.sim.connectome()).len(),
            })
            .collect()
    }

    /// Everything except shutdown, which needs the runtime.
    fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::GetState => Response::State(self.snapshot()),
            Request::ListFunctions => Response::Functions {
                groups: self.functions(),
            },
            Request::Start => {
                self.running = true;
                info!("Simulation started");
                success("Simulation started")
            }
            Request::Stop => {
                self.running = false;
                info!("Simulation stopped");
                success("Simulation stopped")
            }
            Request::SetStepMode { enabled } => {
                self.step_mode = enabled;
                self.step_ready = false;
                success(format!("Step mode {}", on_off(enabled)))
            }
            Request::Step => {
                if !self.step_mode {
                    return failure("Not in step mode");
                }
                self.step_ready = true;
                success("Step queued")
            }
            Request::SetStepsPerSecond { sps } => {
                let clamped = sps.clamp(1, 1000);
                self.steps_per_second = clamped;
                info!("Rate set to {} steps/s", clamped);
                success(format!("Rate set to {clamped} steps/s"))
            }
            Request::SetFood { level } => {
                self.controls.food_override = level;
                match level {
                    Some(l) => success(format!("Food level pinned at {l}")),
                    None => success("Food level follows the arena"),
                }
            }
            Request::SetTouch { active } => {
                self.controls.touch_override = active;
                success(format!("Touch {}", on_off(active)))
            }
            Request::SetTouchNeurons { enabled } => {
                self.controls.touch_neurons_enabled = enabled;
                success(format!("Touch neurons {}", on_off(enabled)))
            }
            Request::SetFunction { name, active } => {
                match self.sim.set_function_active(&name, active) {
                    Ok(()) => success(format!(
                        "{name} {} ({} neurons forced)",
                        on_off(active),
                        self.sim.forced().len()
                    )),
                    Err(e) => failure(e),
                }
            }
            Request::Force { neuron } => match self.sim.force(&neuron) {
                Ok(_) => success(format!("{neuron} forced")),
                Err(e) => failure(e),
            },
            Request::Release { neuron } => match self.sim.release(&neuron) {
                Ok(true) => success(format!("{neuron} released")),
                Ok(false) => success(format!("{neuron} was not forced")),
                Err(e) => failure(e),
            },
            Request::Watch { neuron } => match self.trace.watch(&self.sim, &neuron) {
                Ok(()) => success(format!("Watching {neuron}")),
                Err(e) => failure(e),
            },
            Request::ResetRun => {
                self.reset_run();
                success("Run reset")
            }
            Request::Shutdown => failure("Shutdown must go through the server"),
        }
    }
}

fn success(message: impl Into<String>) -> Response {
    Response::Success {
        message: message.into(),
    }
}

fn failure(message: impl ToString) -> Response {
    Response::Error {
        message: message.to_string(),
    }
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Server
// ═══════════════════════════════════════════════════════════════════════════

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<Request>(&line) {
            Err(e) => failure(format!("Invalid request: {e}")),
            Ok(Request::GetState) => Response::State(state.read().await.snapshot()),
            Ok(Request::ListFunctions) => Response::Functions {
                groups: state.read().await.functions(),
            },
            Ok(Request::Shutdown) => {
                state.write().await.close_log();
                info!("Shutdown requested; step log closed");
                tokio::spawn(async {
                    // Give the response a moment to flush before exiting.
                    time::sleep(Duration::from_millis(50)).await;
                    std::process::exit(0);
                });
                success("Shutting down")
            }
            Ok(req) => state.write().await.handle(req),
        };
        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let paths = AppPaths::new()?;
    info!("Data directory: {}", paths.data_dir().display());
    let cfg = load_config(&paths);
    let state = Arc::new(RwLock::new(DaemonState::new(paths, cfg)?));

    // Flush the step log on Ctrl-C.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                state.write().await.close_log();
                info!("Ctrl-C: step log closed");
                std::process::exit(0);
            }
        });
    }

    let listener = TcpListener::bind(ADDR).await?;
    info!("nemabot daemon listening on {}", ADDR);

    // Step loop
    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let sps = state_clone.read().await.steps_per_second;
            let step_millis = (1000 / sps.max(1)).max(1) as u64;
            time::sleep(Duration::from_millis(step_millis)).await;
            state_clone.write().await.tick();
        }
    });

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state_clone).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}
