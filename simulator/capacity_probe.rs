//! Capacity Probe - compare stage load with and without channel limits
//!
//! Runs the same race twice with the same seed: once with the configured
//! channels and once with capacities ignored. The unlimited peak load is the
//! number of channels a stage would need so that nobody waits.
//!
//! Run with:
//!   cargo run --bin capacity_probe scenarios/two_day_race.yaml [RUNS] [--seed HEX] [--level L]

mod race;

use std::env;
use std::path::Path;

use cp_rust::{RaceConfig, RunAggregator, StageReport};
use log::info;
use race::config::{parse_level, parse_seed_hex};
use race::{RaceFile, RaceStartOrder};
use simple_logger::SimpleLogger;

fn main() {
    SimpleLogger::new().init().unwrap();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <race.yaml> [RUNS] [--seed HEX] [--level L]", args[0]);
        std::process::exit(1);
    }
    let path = Path::new(&args[1]);

    let mut runs = 100;
    let mut seed = None;
    let mut level = None;
    let mut iter = args[2..].iter();
    while let Some(arg) = iter.next() {
        let value = |name: &str, value: Option<&String>| -> String {
            value.cloned().unwrap_or_else(|| {
                eprintln!("Missing value for {}", name);
                std::process::exit(1);
            })
        };
        match arg.as_str() {
            "--seed" => {
                let hex = value(arg, iter.next());
                seed = Some(parse_seed_hex(&hex).unwrap_or_else(|| {
                    eprintln!("Invalid hex seed: {}", hex);
                    std::process::exit(1);
                }));
            }
            "--level" => {
                let text = value(arg, iter.next());
                level = Some(parse_level(&text).unwrap_or_else(|e| {
                    eprintln!("Invalid level: {}", e);
                    std::process::exit(1);
                }));
            }
            other => {
                runs = other.parse::<usize>().unwrap_or_else(|_| {
                    eprintln!("Invalid run count: {}", other);
                    std::process::exit(1);
                });
            }
        }
    }

    let race = RaceFile::load(path).unwrap_or_else(|e| {
        eprintln!("Failed to load {}: {}", path.display(), e);
        std::process::exit(1);
    });
    let mut config = race.race_config().unwrap_or_else(|e| {
        eprintln!("Invalid race file: {}", e);
        std::process::exit(1);
    });
    config.runs = runs.max(1);
    if let Some(level) = level {
        config.level = level;
    }
    // both capacity modes replay the same seed
    config.seed = seed;
    config.seed = Some(config.resolve_seed());

    println!("╔════════════════════════════════════════════════════════╗");
    println!("║        Capacity Probe                                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let limited = play(&race, config.clone());
    config.settings.unlimited = true;
    let unlimited = play(&race, config.clone());

    let pct = (config.level * 100.0).round() as u32;
    println!(
        "{:<24} {:>8} {:>8} {:>8} {:>10} {:>10} {:>8}",
        "stage",
        "channels",
        "load",
        format!("load{}", pct),
        "need",
        format!("need{}", pct),
        "waits"
    );
    for (with, without) in limited.iter().zip(unlimited.iter()) {
        let channels = race
            .stages
            .iter()
            .find(|s| s.name == with.name)
            .map_or(0, |s| s.channels);
        let flag = if channels != 0 && without.row.max_load_high > channels {
            "  <- short"
        } else {
            ""
        };
        println!(
            "{:<24} {:>8} {:>8} {:>8} {:>10} {:>10} {:>8}{}",
            with.name,
            channels,
            with.row.max_load,
            with.row.max_load_high,
            without.row.max_load,
            without.row.max_load_high,
            with.row.waits_per_run,
            flag
        );
    }

    info!("✓ Probe complete ({} runs each)", config.runs);
}

fn play(race: &RaceFile, config: RaceConfig) -> Vec<StageReport> {
    let topology = race.topology().unwrap_or_else(|e| {
        eprintln!("Invalid race network: {}", e);
        std::process::exit(1);
    });
    let unlimited = config.settings.unlimited;

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

    info!("Running (unlimited capacity: {})...", unlimited);
    if let Err(e) = aggregator.run_all(|_| {}) {
        eprintln!("Run failed: {}", e);
        std::process::exit(1);
    }

    aggregator.stage_reports()
}
