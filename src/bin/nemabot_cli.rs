//! CLI client for the `nemabotd` daemon.
//!
//! Examples:
//!   nemabot-cli status
//!   nemabot-cli start
//!   nemabot-cli stepmode on
//!   nemabot-cli step
//!   nemabot-cli function "Avoidance reflex" on
//!   nemabot-cli force AVBL
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use nemabot::observer::{SimulationSnapshot, Trace};
use nemabot::world::Controls;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    SetStepMode { enabled: bool },
    Step,
    SetStepsPerSecond { sps: u32 },
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
    #[serde(default)]
    traces: Vec<Trace>,
    log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionInfo {
    name: String,
    prefixes: Vec<String>,
    active: bool,
    neurons: usize,
}

fn usage() -> ! {
    eprintln!("nemabot-cli (talks to nemabotd @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: nemabot-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show daemon state");
    eprintln!("  start | stop                Control the step loop");
    eprintln!("  stepmode <on|off>           Manual stepping");
    eprintln!("  step                        Queue one step (step mode)");
    eprintln!("  sps <1-1000>                Set steps per second");
    eprintln!("  food <level|auto>           Pin the food level or follow the arena");
    eprintln!("  touch <on|off>              Force touch");
    eprintln!("  touchneurons <on|off>       Distance-triggered touch");
    eprintln!("  functions                   List function groups");
    eprintln!("  function <name> <on|off>    Toggle a function group");
    eprintln!("  force | release <neuron>    Pin or unpin a neuron");
    eprintln!("  watch <neuron>              Trace a neuron");
    eprintln!("  reset                       Start a new run");
    eprintln!("  shutdown                    Close the step log and exit daemon");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn print_state(s: StateSnapshot) {
    let sim = &s.sim;
    println!(
        "running={} step_mode={} sps={} step={} log={}",
        s.running,
        s.step_mode,
        s.steps_per_second,
        sim.step,
        s.log_file.as_deref().unwrap_or("-"),
    );
    println!(
        "body: pos=({:.1},{:.1}) heading={:+.1} drive=({:+.1},{:+.1}) cmd={:?}/{:?}",
        sim.pose.x,
        sim.pose.y,
        sim.pose.heading_deg,
        sim.drive.left,
        sim.drive.right,
        sim.command.turn,
        sim.command.travel,
    );
    println!(
        "senses: food={} touch={} obstacle={} stim={:?} | overrides: food={:?} touch={} touch_neurons={}",
        s.food_level,
        s.touch,
        s.obstacle_distance
            .map_or_else(|| "-".to_string(), |d| format!("{d:.1}")),
        sim.stimulus,
        s.controls.food_override,
        s.controls.touch_override,
        s.controls.touch_neurons_enabled,
    );
    println!(
        "neurons: total={} active={} refractory={} forced={} functions=[{}]",
        sim.summary.neurons,
        sim.summary.active,
        sim.summary.refractory,
        sim.forced.len(),
        sim.active_functions.join(", "),
    );
    for t in &s.traces {
        println!(
            "  {:<8} last={:+.2} activations={}",
            t.name,
            t.values.last().copied().unwrap_or(0.0),
            t.activations.len()
        );
    }
}

fn on_off(args: &[String], what: &str) -> bool {
    match args.get(1).map(String::as_str) {
        Some("on") => true,
        Some("off") => false,
        _ => {
            eprintln!("{what} must be 'on' or 'off'");
            process::exit(1);
        }
    }
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = &args[0];

    let make_error = |msg: &str| -> ! {
        eprintln!("{}", msg);
        process::exit(1);
    };
    let arg = |i: usize| -> String { args.get(i).cloned().unwrap_or_else(|| usage()) };

    let req = match cmd.as_str() {
        "status" => Request::GetState,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "step" => Request::Step,
        "stepmode" => Request::SetStepMode {
            enabled: on_off(&args, "stepmode"),
        },
        "sps" => {
            let sps: u32 = arg(1)
                .parse()
                .unwrap_or_else(|_| make_error("sps must be a number (1-1000)"));
            Request::SetStepsPerSecond { sps }
        }
        "food" => {
            let level = match arg(1).as_str() {
                "auto" => None,
                v => Some(
                    v.parse()
                        .unwrap_or_else(|_| make_error("food must be a number or 'auto'")),
                ),
            };
            Request::SetFood { level }
        }
        "touch" => Request::SetTouch {
            active: on_off(&args, "touch"),
        },
        "touchneurons" => Request::SetTouchNeurons {
            enabled: on_off(&args, "touchneurons"),
        },
        "functions" => Request::ListFunctions,
        "function" => {
            if args.len() < 3 {
                usage();
            }
            let name = args[1..args.len() - 1].join(" ");
            let active = match args[args.len() - 1].as_str() {
                "on" => true,
                "off" => false,
                _ => make_error("function state must be 'on' or 'off'"),
            };
            Request::SetFunction { name, active }
        }
        "force" => Request::Force { neuron: arg(1) },
        "release" => Request::Release { neuron: arg(1) },
        "watch" => Request::Watch { neuron: arg(1) },
        "reset" => Request::ResetRun,
        "shutdown" => Request::Shutdown,
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::State(s)) => print_state(s),
        Ok(Response::Functions { groups }) => {
            for g in groups {
                println!(
                    "{} {:<28} {:>4} neurons  [{}]",
                    if g.active { "*" } else { " " },
                    g.name,
                    g.neurons,
                    g.prefixes.join(", ")
                );
            }
        }
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
