//! Global event loop
//!
//! Each step scans every stage for its earliest pending event, takes the
//! overall minimum by [`EventKey`] and dispatches it to the owning stage.
//! Events produced by a dispatch get the next sequence numbers, so events
//! sharing a timestamp and phase run in the order they were scheduled. A run
//! ends when no stage has anything pending.

use rand::Rng;

use crate::cp_error::CpError;
use crate::cp_interface::{CpTime, Event, EventKey, SimSettings, StageId, TeamId};
use crate::cp_team::{Team, TeamSpec};
use crate::cp_topology::Topology;

pub struct Scheduler {
    topology: Topology,
    teams: Vec<Team>,
    settings: SimSettings,

    next_sequence: u64,
    dispatched: u64,
    now: CpTime,

    // scratch buffer for events produced by one dispatch
    produced: Vec<Event>,
}

impl Scheduler {
    pub fn new(topology: Topology, roster: &[TeamSpec], settings: SimSettings) -> Self {
        let teams = roster
            .iter()
            .enumerate()
            .map(|(id, spec)| Team::new(id, spec))
            .collect();

        Self {
            topology,
            teams,
            settings,
            next_sequence: 0,
            dispatched: 0,
            now: 0,
            produced: Vec::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn teams_mut(&mut self) -> &mut [Team] {
        &mut self.teams
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// Total events dispatched since creation
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Timestamp of the last dispatched event
    pub fn now(&self) -> CpTime {
        self.now
    }

    /// Inject `team` at the start-line `stage` at `time`
    pub fn add_team(&mut self, team: TeamId, stage: StageId, time: CpTime) -> Result<(), CpError> {
        let t = self
            .teams
            .get_mut(team)
            .ok_or(CpError::UnknownTeam { id: team })?;

        if let Some(at) = t.location() {
            return Err(CpError::TeamAlreadyActive {
                team: t.name.clone(),
                stage: stage_name(&self.topology, at),
            });
        }

        let s = self
            .topology
            .stage_mut(stage)
            .ok_or_else(|| CpError::UnknownStage {
                name: stage.to_string(),
            })?;

        s.add_to_start(t, time, &mut self.produced)?;
        self.schedule_produced();
        Ok(())
    }

    /// Dispatch the earliest pending event.
    ///
    /// Returns the dispatched event, or `None` once nothing is pending.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<Event>, CpError> {
        let (stage_id, _) = match self.topology.next_event() {
            Some(next) => next,
            None => return Ok(None),
        };

        let stage = self
            .topology
            .stage_mut(stage_id)
            .ok_or_else(|| CpError::UnknownStage {
                name: stage_id.to_string(),
            })?;
        let (_, event) = match stage.pop_next() {
            Some(next) => next,
            None => return Ok(None),
        };
        let team = self
            .teams
            .get_mut(event.team)
            .ok_or(CpError::UnknownTeam { id: event.team })?;

        log::trace!(
            "{} {:?} team '{}' at '{}'",
            event.time,
            event.phase,
            team.name,
            stage.name
        );

        self.now = event.time;
        self.dispatched += 1;
        stage.dispatch(&event, team, &self.settings, rng, &mut self.produced)?;
        self.schedule_produced();

        Ok(Some(event))
    }

    /// Drive the loop until no event is pending.
    ///
    /// Returns the number of events dispatched. An error aborts the run and
    /// leaves the stages mid-run; call [`Topology::reset_run`] before reuse.
    pub fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u64, CpError> {
        let mut count = 0;
        while self.step(rng)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Forget all per-run state of stages and teams
    pub fn reset_run(&mut self) {
        self.topology.reset_run();
        for team in self.teams.iter_mut() {
            team.reset();
        }
        self.now = 0;
    }

    fn schedule_produced(&mut self) {
        for event in self.produced.drain(..) {
            let key = EventKey::new(&event, self.next_sequence);
            self.next_sequence += 1;

            if let Some(stage) = self.topology.stage_mut(event.stage) {
                stage.schedule(key, event);
            }
        }
    }
}

fn stage_name(topology: &Topology, id: StageId) -> String {
    topology
        .stage(id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp_duration::StageTimes;
    use crate::cp_interface::StageKind;
    use crate::cp_stage::StageSpec;
    use crate::cp_topology::LinkSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn rng() -> StdRng {
        StdRng::from_seed([11u8; 32])
    }

    fn chain(stages: Vec<StageSpec>, links: Vec<LinkSpec>, teams: &[TeamSpec]) -> Scheduler {
        let topology = Topology::build(&stages, &links).unwrap();
        Scheduler::new(topology, teams, SimSettings::default())
    }

    #[test]
    fn test_two_stage_chain_exact_duration() {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 1, StageTimes::new(5, 10, 20, 0.0)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let links = vec![LinkSpec::new(0, &["start", "finish"])];
        let mut sched = chain(stages, links, &[TeamSpec::new("A", 0, 1.0)]);
        let mut rng = rng();

        sched.add_team(0, 0, 360).unwrap();
        sched.run(&mut rng).unwrap();

        let start = sched.topology().by_name("start").unwrap();
        let finish = sched.topology().by_name("finish").unwrap();
        assert_eq!(start.log()[0].outcome.work, 10);
        assert_eq!(start.log()[0].outcome.wait, 0);
        assert_eq!(finish.log()[0].when, 370);

        let history = sched.team(0).unwrap().history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.outcome.wait == 0));
        assert!(sched.topology().is_idle());
    }

    #[test]
    fn test_simultaneous_arrivals_queue_in_order() {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 2, StageTimes::new(0, 0, 0, 0.0)),
            StageSpec::new("rope", StageKind::Tech, 1, StageTimes::new(0, 5, 0, 0.0)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let links = vec![LinkSpec::new(0, &["start", "rope", "finish"])];
        let teams = [TeamSpec::new("A", 0, 1.0), TeamSpec::new("B", 0, 1.0)];
        let mut sched = chain(stages, links, &teams);
        let mut rng = rng();

        sched.add_team(0, 0, 0).unwrap();
        sched.add_team(1, 0, 0).unwrap();
        sched.run(&mut rng).unwrap();

        let rope = sched.topology().by_name("rope").unwrap();
        let a = rope.team_record(0).unwrap();
        let b = rope.team_record(1).unwrap();
        assert_eq!((a.when, a.outcome.wait, a.outcome.work), (0, 0, 5));
        assert_eq!((b.when, b.outcome.wait, b.outcome.work), (0, 5, 5));

        let finish = sched.topology().by_name("finish").unwrap();
        assert_eq!(finish.team_record(0).unwrap().when, 5);
        assert_eq!(finish.team_record(1).unwrap().when, 10);

        sched.topology_mut().end_of_run();
        let rope = sched.topology().by_name("rope").unwrap();
        assert_eq!(rope.run_summaries()[0].max_load, 2);
        assert_eq!(rope.run_summaries()[0].last_departure, 10);
    }

    #[test]
    fn test_missing_route_aborts_run() {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 0, StageTimes::new(0, 3, 0, 0.0)),
            StageSpec::new("river", StageKind::Tech, 0, StageTimes::new(0, 3, 0, 0.0)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let mut links = vec![LinkSpec::new(3, &["start", "river"])];
        for grade in 0..3 {
            links.push(LinkSpec::new(grade, &["start", "river", "finish"]));
        }
        let mut sched = chain(stages, links, &[TeamSpec::new("C", 3, 1.0)]);
        let mut rng = rng();

        sched.add_team(0, 0, 0).unwrap();
        let err = sched.run(&mut rng).unwrap_err();
        assert_eq!(
            err,
            CpError::MissingRoute {
                stage: "river".to_string(),
                kind: StageKind::Tech,
                grade: 3,
            }
        );
    }

    #[test]
    fn test_team_cannot_start_twice() {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 0, StageTimes::new(0, 3, 0, 0.0)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let links = vec![LinkSpec::new(0, &["start", "finish"])];
        let mut sched = chain(stages, links, &[TeamSpec::new("A", 0, 1.0)]);

        sched.add_team(0, 0, 0).unwrap();
        let err = sched.add_team(0, 0, 5).unwrap_err();
        assert!(matches!(err, CpError::TeamAlreadyActive { .. }));

        assert_eq!(sched.add_team(9, 0, 0), Err(CpError::UnknownTeam { id: 9 }));
    }

    fn busy_race() -> Scheduler {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 2, StageTimes::new(0, 4, 4, 0.1)),
            StageSpec::new("rope", StageKind::Tech, 2, StageTimes::new(5, 15, 25, 0.3)),
            StageSpec::new("bog", StageKind::Pass, 1, StageTimes::new(0, 6, 0, 0.3)),
            StageSpec::new("cliff", StageKind::Tech, 1, StageTimes::new(5, 12, 20, 0.4)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let links = vec![
            LinkSpec::new(0, &["start", "rope", "bog", "finish"]),
            LinkSpec::new(1, &["start", "rope", "cliff", "bog", "finish"]),
        ];
        let teams: Vec<TeamSpec> = (0..12)
            .map(|i| TeamSpec::new(&format!("T{}", i), (i % 2) as i32, 0.8 + 0.05 * i as f64))
            .collect();
        let settings = SimSettings {
            before: 3,
            after: 2,
            unlimited: false,
        };

        let topology = Topology::build(&stages, &links).unwrap();
        let mut sched = Scheduler::new(topology, &teams, settings);
        // two per slot, all at identical timestamps within a slot
        for i in 0..12 {
            sched.add_team(i, 0, (i / 2) as u64 * 4).unwrap();
        }
        sched
    }

    #[test]
    fn test_capacity_and_membership_hold_at_every_step() {
        let mut sched = busy_race();
        let mut rng = StdRng::from_seed([21u8; 32]);

        while sched.step(&mut rng).unwrap().is_some() {
            let mut seen = BTreeSet::new();
            for stage in sched.topology().stages() {
                if stage.channels > 0 {
                    assert!(
                        stage.in_service_len() <= stage.channels,
                        "stage {} over capacity at {}",
                        stage.name,
                        sched.now()
                    );
                }
                for team in stage.in_service().chain(stage.waiting()) {
                    assert!(seen.insert(team), "team {} held twice", team);
                }
            }
        }

        assert!(sched.topology().is_idle());
        let finish = sched.topology().by_name("finish").unwrap();
        assert_eq!(finish.log().len(), 12);
    }

    #[test]
    fn test_same_seed_same_outcomes_with_ties() {
        let run = || {
            let mut sched = busy_race();
            let mut rng = StdRng::from_seed([33u8; 32]);
            let mut order = Vec::new();
            while let Some(event) = sched.step(&mut rng).unwrap() {
                order.push(event);
            }
            let logs: Vec<_> = sched
                .topology()
                .stages()
                .iter()
                .map(|s| s.log().to_vec())
                .collect();
            (order, logs)
        };

        let (order_a, logs_a) = run();
        let (order_b, logs_b) = run();
        assert_eq!(order_a, order_b);
        assert_eq!(logs_a, logs_b);

        // dispatch order never goes back in time
        assert!(order_a.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_reset_run_clears_teams_and_stages() {
        let mut sched = busy_race();
        let mut rng = rng();
        for _ in 0..10 {
            sched.step(&mut rng).unwrap();
        }
        assert!(!sched.topology().is_idle());

        sched.reset_run();
        assert!(sched.topology().is_idle());
        assert!(sched.teams().iter().all(|t| t.location().is_none()));
        assert!(sched.teams().iter().all(|t| t.history().is_empty()));
    }
}
