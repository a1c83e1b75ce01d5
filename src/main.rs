//! Headless runner.
//!
//!   nemabot run --steps 500 --seed 7 --arena --csv run.csv
//!   nemabot dump run.bin run.csv
//!   nemabot groups

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;

use nemabot::prelude::*;
use nemabot::prng::Prng;
use nemabot::storage::StepLogData;
use nemabot::world::Controls;
use tracing::info;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first() else {
        print_help();
        return;
    };

    let result = match cmd.as_str() {
        "run" => parse_run(&args[1..]).and_then(run),
        "dump" => dump(&args[1..]),
        "groups" => groups(&args[1..]),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn print_help() {
    println!("nemabot (connectome activation engine)");
    println!("usage:");
    println!("  nemabot run [options]");
    println!("      --steps N            steps to run (default 200)");
    println!("      --seed N             PRNG seed");
    println!("      --traversal T        masked | shuffle | declaration");
    println!("      --connectome PATH    wiring JSON (default: bundled sample)");
    println!("      --config PATH        SimConfig JSON");
    println!("      --food LEVEL         constant food level");
    println!("      --touch              constant touch");
    println!("      --touch-neurons      distance-triggered touch");
    println!("      --arena              scatter food and obstacles and sense from them");
    println!("      --group NAME         enable a function group (repeatable)");
    println!("      --force NAME         pin a neuron (repeatable)");
    println!("      --watch NAME         trace a neuron (repeatable)");
    println!("      --csv PATH           write a CSV step log");
    println!("      --bin PATH           write a binary step log");
    println!("      --every N            report interval (default 50)");
    println!("      --json               print the final snapshot as JSON");
    println!("  nemabot dump LOG.bin [OUT.csv]");
    println!("  nemabot groups [--connectome PATH]");
    println!("  nemabot help");
}

#[derive(Debug, Default)]
struct RunArgs {
    steps: u64,
    seed: Option<u64>,
    traversal: Option<TraversalOrder>,
    connectome: Option<PathBuf>,
    config: Option<PathBuf>,
    food: Option<f32>,
    touch: bool,
    touch_neurons: bool,
    arena: bool,
    groups: Vec<String>,
    force: Vec<String>,
    watch: Vec<String>,
    csv: Option<PathBuf>,
    bin: Option<PathBuf>,
    every: u64,
    json: bool,
}

fn bad_arg(msg: &str) -> ! {
    eprintln!("{msg}");
    print_help();
    process::exit(2);
}

fn parse_run(args: &[String]) -> Result<RunArgs> {
    let mut out = RunArgs {
        steps: 200,
        every: 50,
        ..RunArgs::default()
    };
    let mut it = args.iter();
    while let Some(flag) = it.next() {
        let mut value = |name: &str| -> String {
            it.next()
                .cloned()
                .unwrap_or_else(|| bad_arg(&format!("{name} needs a value")))
        };
        match flag.as_str() {
            "--steps" => out.steps = parse_num(&value("--steps"), "--steps"),
            "--seed" => out.seed = Some(parse_num(&value("--seed"), "--seed")),
            "--every" => out.every = parse_num::<u64>(&value("--every"), "--every").max(1),
            "--traversal" => {
                out.traversal = Some(match value("--traversal").as_str() {
                    "masked" => TraversalOrder::MaskedXor,
                    "shuffle" => TraversalOrder::Shuffle,
                    "declaration" => TraversalOrder::Declaration,
                    _ => bad_arg("--traversal must be masked|shuffle|declaration"),
                })
            }
            "--connectome" => out.connectome = Some(value("--connectome").into()),
            "--config" => out.config = Some(value("--config").into()),
            "--food" => out.food = Some(parse_num(&value("--food"), "--food")),
            "--touch" => out.touch = true,
            "--touch-neurons" => out.touch_neurons = true,
            "--arena" => out.arena = true,
            "--group" => out.groups.push(value("--group")),
            "--force" => out.force.push(value("--force")),
            "--watch" => out.watch.push(value("--watch")),
            "--csv" => out.csv = Some(value("--csv").into()),
            "--bin" => out.bin = Some(value("--bin").into()),
            "--json" => out.json = true,
            other => bad_arg(&format!("unknown option {other}")),
        }
    }
    Ok(out)
}

fn parse_num<T: std::str::FromStr>(s: &str, name: &str) -> T {
    s.parse()
        .unwrap_or_else(|_| bad_arg(&format!("{name}: not a number: {s}")))
}

fn load_connectome(path: Option<&PathBuf>) -> Result<Connectome> {
    match path {
        Some(p) => Connectome::load(p),
        None => Connectome::sample(),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(p) => serde_json::from_reader(io::BufReader::new(File::open(p)?))?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg = cfg.with_seed(seed);
    }
    if let Some(t) = args.traversal {
        cfg = cfg.with_traversal(t);
    }

    let connectome = load_connectome(args.connectome.as_ref())?;
    let mut sim = Simulation::new(connectome, cfg)?;
    for g in &args.groups {
        sim.set_function_active(g, true)?;
    }
    for n in &args.force {
        sim.force(n)?;
    }
    let mut trace = NeuronTrace::default();
    for n in &args.watch {
        trace.watch(&sim, n)?;
    }
    if let Some(p) = &args.csv {
        sim.attach_log(Box::new(CsvStepLog::new(BufWriter::new(File::create(p)?))))?;
    } else if let Some(p) = &args.bin {
        sim.attach_log(Box::new(BinaryStepLog::new(BufWriter::new(File::create(p)?))))?;
    }

    let controls = Controls {
        touch_neurons_enabled: args.touch_neurons,
        food_override: args.food,
        touch_override: args.touch,
    };
    let mut arena = if args.arena {
        let mut rng = cfg.seed.map_or_else(Prng::from_entropy, Prng::new);
        Arena::scatter(1920.0, 1080.0, 6, 6, &mut rng)
    } else {
        Arena::new(1920.0, 1080.0)
    };
    arena.reset(sim.pose());

    info!(steps = args.steps, neurons = sim.connectome().len(), "run started");
    for _ in 0..args.steps {
        if args.arena {
            arena.advance(&mut sim, &controls);
        } else {
            sim.tick(&SensoryInput {
                food_level: controls.food_override.unwrap_or(0.0),
                touch_active: controls.touch_override,
                touch_distance: cfg.initial_touch_distance,
                touch_neurons_enabled: controls.touch_neurons_enabled,
            });
        }
        trace.record(&sim);
        if sim.step_count() % args.every == 0 {
            report(&sim);
        }
    }
    sim.detach_log()?;

    for t in trace.traces() {
        println!(
            "{:<8} last={:+.2} activations={:?}",
            t.name,
            t.values.last().copied().unwrap_or(0.0),
            t.activations
        );
    }
    if args.json {
        let snap = SimulationAdapter::new(&sim).snapshot();
        println!("{}", serde_json::to_string_pretty(&snap)?);
    }
    Ok(())
}

fn report(sim: &Simulation) {
    let pose = sim.pose();
    let drive = sim.drive();
    let summary = SimulationAdapter::new(sim).summary();
    println!(
        "step={:5} pos=({:7.1},{:7.1}) heading={:+7.1} drive=({:+8.1},{:+8.1}) cmd={:?}/{:?} stim={:?} active={} refractory={}",
        sim.step_count(),
        pose.x,
        pose.y,
        pose.heading_deg,
        drive.left,
        drive.right,
        sim.command().turn,
        sim.command().travel,
        sim.last_stimulus(),
        summary.active,
        summary.refractory,
    );
}

fn dump(args: &[String]) -> Result<()> {
    let Some(input) = args.first() else {
        bad_arg("dump needs a log path");
    };
    let data = StepLogData::read_from(&mut io::BufReader::new(File::open(input)?))?;
    match args.get(1) {
        Some(out) => {
            data.write_csv(BufWriter::new(File::create(out)?))?;
        }
        None => {
            data.write_csv(io::stdout())?;
        }
    }
    Ok(())
}

fn groups(args: &[String]) -> Result<()> {
    let path = match args {
        [flag, p] if flag == "--connectome" => Some(PathBuf::from(p)),
        [] => None,
        _ => bad_arg("usage: nemabot groups [--connectome PATH]"),
    };
    let connectome = load_connectome(path.as_ref())?;
    let panel = FunctionPanel::default();
    for g in panel.groups() {
        let matched = g.expand(&connectome).len();
        println!("{:<28} {:>4} neurons  [{}]", g.name, matched, g.prefixes.join(", "));
    }
    Ok(())
}
