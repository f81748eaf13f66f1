//! Two-stage race walked event by event
//!
//! Run with: cargo run --example two_stage_demo

use cp_rust::{
    format_duration, format_time, LinkSpec, Scheduler, SimSettings, StageKind, StageSpec,
    StageTimes, TeamSpec, Topology,
};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use simple_logger::SimpleLogger;

fn main() {
    SimpleLogger::new().init().unwrap();

    info!("Setting up a start line and one single-channel stage...");

    let stages = vec![
        StageSpec::new("start", StageKind::Start, 2, StageTimes::new(0, 5, 5, 0.0)),
        StageSpec::new("crossing", StageKind::Tech, 1, StageTimes::new(10, 20, 40, 0.3)),
        StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
    ];
    let links = vec![LinkSpec::new(0, &["start", "crossing", "finish"])];
    let topology = Topology::build(&stages, &links).unwrap();

    let teams = vec![
        TeamSpec::new("Alpha", 0, 0.9),
        TeamSpec::new("Beta", 0, 1.0),
        TeamSpec::new("Gamma", 0, 1.2),
    ];
    let settings = SimSettings {
        before: 5,
        after: 3,
        unlimited: false,
    };
    let mut scheduler = Scheduler::new(topology, &teams, settings);

    // two teams share the first slot, the third starts one slot later
    scheduler.add_team(0, 0, 360).unwrap();
    scheduler.add_team(1, 0, 360).unwrap();
    scheduler.add_team(2, 0, 365).unwrap();

    let mut rng = StdRng::from_seed([7u8; 32]);
    while let Some(event) = scheduler.step(&mut rng).unwrap() {
        let team = scheduler.team(event.team).unwrap();
        let stage = scheduler.topology().stage(event.stage).unwrap();
        info!(
            "{} {:<14} {:<6} at {}",
            format_time(event.time),
            format!("{:?}", event.phase),
            team.name,
            stage.name
        );
    }

    info!("Simulation complete! {} events", scheduler.dispatched());

    for stage in scheduler.topology().stages() {
        for record in stage.log() {
            let team = scheduler.team(record.team).unwrap();
            info!(
                "{:<10} {:<6} when {} wait {} work {}{}",
                stage.name,
                team.name,
                format_time(record.when),
                format_duration(record.outcome.wait),
                format_duration(record.outcome.work),
                if record.outcome.rejected { " (rejected)" } else { "" }
            );
        }
    }
}
