// Race Runner - Load a race file, repeat the race and write TSV reports
//
// Usage:
//   cargo run --bin race_runner scenarios/two_day_race.yaml out.tsv
//   cargo run --bin race_runner scenarios/two_day_race.yaml out.tsv 1000
//   cargo run --bin race_runner scenarios/two_day_race.yaml out.tsv 1000 --unlim --seed 0x1234...

mod race;

use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use cp_rust::RunAggregator;
use log::info;
use race::config::{parse_level, parse_seed_hex};
use race::report::TsvReport;
use race::{RaceFile, RaceStartOrder};
use simple_logger::SimpleLogger;

struct Options {
    runs: Option<usize>,
    unlimited: bool,
    seed: Option<[u8; 32]>,
    level: Option<f64>,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <race.yaml> <out.tsv> [RUNS] [--unlim] [--seed SEED_HEX] [--level L]",
        program
    );
    eprintln!("\n  RUNS      number of repeated runs (default from the race file, else 1)");
    eprintln!("  --unlim   ignore stage capacities to estimate required throughput");
    eprintln!("  --seed    fixed 32-byte seed in hex for a reproducible series");
    eprintln!("  --level   quantile level for stage statistics (default 0.95)");
    std::process::exit(1);
}

fn parse_options(program: &str, args: &[String]) -> Options {
    let mut options = Options {
        runs: None,
        unlimited: false,
        seed: None,
        level: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--unlim" | "-unlim" => options.unlimited = true,
            "--seed" => {
                let hex = iter.next().unwrap_or_else(|| usage(program));
                options.seed = Some(parse_seed_hex(hex).unwrap_or_else(|| {
                    eprintln!("Invalid hex seed: {}", hex);
                    std::process::exit(1);
                }));
            }
            "--level" => {
                let level = iter.next().unwrap_or_else(|| usage(program));
                options.level = Some(parse_level(level).unwrap_or_else(|e| {
                    eprintln!("Invalid level: {}", e);
                    std::process::exit(1);
                }));
            }
            other => match other.parse::<usize>() {
                Ok(runs) if options.runs.is_none() => options.runs = Some(runs),
                _ => usage(program),
            },
        }
    }

    options
}

fn main() {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
    }
    let race_path = Path::new(&args[1]);
    let out_path = Path::new(&args[2]);
    let options = parse_options(&args[0], &args[3..]);

    info!("Loading race from: {}", race_path.display());
    let race = RaceFile::load(race_path).unwrap_or_else(|e| {
        eprintln!("Failed to load {}: {}", race_path.display(), e);
        std::process::exit(1);
    });

    if let Some(ref name) = race.meta.name {
        info!("Race: {}", name);
    }
    if let Some(ref desc) = race.meta.description {
        info!("{}", desc);
    }

    let mut config = race.race_config().unwrap_or_else(|e| {
        eprintln!("Invalid race file {}: {}", race_path.display(), e);
        std::process::exit(1);
    });
    if let Some(runs) = options.runs {
        config.runs = runs.max(1);
    }
    if let Some(level) = options.level {
        config.level = level;
    }
    config.seed = options.seed;
    config.settings.unlimited = options.unlimited;

    let topology = race.topology().unwrap_or_else(|e| {
        eprintln!("Invalid race network: {}", e);
        std::process::exit(1);
    });

    info!("Configuration:");
    info!("  Stages: {}", topology.len());
    info!("  Teams: {}", race.teams.len());
    info!("  Days: {}", config.days.len());
    info!("  Runs: {}", config.runs);
    info!("  Unlimited capacity: {}", config.settings.unlimited);

    let level = config.level;
    let mut aggregator = RunAggregator::new(
        config,
        topology,
        &race.teams,
        RaceStartOrder::new(race.grade_threshold),
    )
    .unwrap_or_else(|e| {
        eprintln!("Invalid race days: {}", e);
        std::process::exit(1);
    });
    info!("Seed: {}", hex_seed(&aggregator.seed()));

    let file = File::create(out_path).unwrap_or_else(|e| {
        eprintln!("Failed to create {}: {}", out_path.display(), e);
        std::process::exit(1);
    });
    let mut report = TsvReport::new(BufWriter::new(file));

    let mut write_error = None;
    let result = aggregator.run_all(|run| {
        if (run.run + 1) % 10 == 0 {
            info!("{} runs complete", run.run + 1);
        }
        if write_error.is_none() {
            write_error = report.write_run(run).err();
        }
    });

    if let Err(e) = result {
        eprintln!("Run {} failed: {}", aggregator.completed_runs() + 1, e);
        std::process::exit(1);
    }

    let written = match write_error {
        Some(e) => Err(e),
        None if aggregator.completed_runs() > 1 => {
            report.write_stages(&aggregator.stage_reports(), level)
        }
        None => report.write_details(aggregator.scheduler().teams(), &aggregator.stage_details()),
    };
    if let Err(e) = written.and_then(|_| report.flush()) {
        eprintln!("Failed to write {}: {}", out_path.display(), e);
        std::process::exit(1);
    }

    info!(
        "✓ {} runs written to {}",
        aggregator.completed_runs(),
        out_path.display()
    );
}

fn hex_seed(seed: &[u8; 32]) -> String {
    let mut hex = String::from("0x");
    for byte in seed {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}
