//! Stage state machine
//!
//! Every team visiting a stage moves through
//! `Appear -> StartOfService -> EndOfService -> Leave`, one scheduled event per
//! transition. Between `StartOfService` and `EndOfService` the team holds a
//! channel (in service) or sits in the FIFO wait queue. Kinds share this
//! machine and differ only in a few places:
//!
//! - `Start`: start-line injections skip the queue and overheads, and a
//!   sampled duration over the limit is clamped without rejection.
//! - `Tech`: the only kind with pre/post overheads.
//! - `Finish`: an arriving team is logged at once and never routed on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;

use crate::cp_duration::{apply_limit, sample_duration, scale_overhead, StageTimes};
use crate::cp_error::CpError;
use crate::cp_interface::{
    CpDuration, CpTime, Event, EventKey, EventPhase, Grade, SimSettings, StageId, StageKind,
    StageOutcome, TeamId,
};
use crate::cp_stats::{PhaseStat, StageRunSummary, StageTeamRecord, TeamStageRecord};
use crate::cp_team::Team;

/// Stage as described in the race file
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct StageSpec {
    pub name: String,
    /// Simultaneously served teams (0 = unlimited)
    #[serde(default)]
    pub channels: usize,
    #[serde(default)]
    pub kind: StageKind,
    #[serde(default)]
    pub times: StageTimes,
}

impl StageSpec {
    pub fn new(name: &str, kind: StageKind, channels: usize, times: StageTimes) -> Self {
        Self {
            name: name.to_string(),
            channels,
            kind,
            times,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    /// Injected at the start line, service begins at the scheduled time
    Launching,
    /// Pre-service overhead running
    Preparing,
    Waiting,
    Working,
    /// Post-service overhead running, channel already released
    Leaving,
}

/// A team currently at the stage
#[derive(Debug, Clone)]
struct Visit {
    state: VisitState,
    appeared: CpTime,
    started: CpTime,
    speed: f64,
    outcome: StageOutcome,
}

/// Runtime node of the race network
#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub channels: usize,
    pub kind: StageKind,
    pub times: StageTimes,

    links: BTreeMap<Grade, StageId>,

    // per-run state
    pending: BTreeMap<EventKey, Event>,
    visits: BTreeMap<TeamId, Visit>,
    in_service: BTreeSet<TeamId>,
    waiting: VecDeque<TeamId>,
    max_load: usize,
    first_arrival: Option<CpTime>,
    last_departure: Option<CpTime>,
    // teams reaching a finish at the latest arrival instant
    finishers: Option<(CpTime, usize)>,

    // long-run statistics, kept until cleared
    runs: Vec<StageRunSummary>,
    log: Vec<StageTeamRecord>,
    /// Log length at the last closed run
    committed: usize,
}

impl Stage {
    pub fn new(id: StageId, spec: &StageSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            channels: spec.channels,
            kind: spec.kind,
            times: spec.times,
            links: BTreeMap::new(),
            pending: BTreeMap::new(),
            visits: BTreeMap::new(),
            in_service: BTreeSet::new(),
            waiting: VecDeque::new(),
            max_load: 0,
            first_arrival: None,
            last_departure: None,
            finishers: None,
            runs: Vec::new(),
            log: Vec::new(),
            committed: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------------

    /// Route teams of `grade` to `next`. A later link for the same grade wins.
    pub fn add_link(&mut self, grade: Grade, next: StageId) {
        self.links.insert(grade, next);
    }

    pub fn next_stage(&self, grade: Grade) -> Option<StageId> {
        self.links.get(&grade).copied()
    }

    pub fn links(&self) -> &BTreeMap<Grade, StageId> {
        &self.links
    }

    // ------------------------------------------------------------------------
    // Pending events
    // ------------------------------------------------------------------------

    pub fn schedule(&mut self, key: EventKey, event: Event) {
        self.pending.insert(key, event);
    }

    /// Key of the earliest pending event
    pub fn next_key(&self) -> Option<EventKey> {
        self.pending.keys().next().copied()
    }

    pub fn pop_next(&mut self) -> Option<(EventKey, Event)> {
        self.pending.pop_first()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------------
    // Occupancy
    // ------------------------------------------------------------------------

    pub fn in_service(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.in_service.iter().copied()
    }

    pub fn waiting(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.waiting.iter().copied()
    }

    pub fn in_service_len(&self) -> usize {
        self.in_service.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// In service plus waiting
    pub fn load(&self) -> usize {
        self.in_service.len() + self.waiting.len()
    }

    /// Nothing pending and no team present
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.visits.is_empty()
    }

    fn has_free_channel(&self, settings: &SimSettings) -> bool {
        settings.unlimited || self.channels == 0 || self.in_service.len() < self.channels
    }

    fn note_arrival(&mut self, time: CpTime) {
        if self.first_arrival.map_or(true, |first| time < first) {
            self.first_arrival = Some(time);
        }
    }

    fn note_departure(&mut self, time: CpTime) {
        if self.last_departure.map_or(true, |last| time > last) {
            self.last_departure = Some(time);
        }
    }

    fn note_load(&mut self) {
        self.max_load = self.max_load.max(self.load());
    }

    /// A finish holds nobody; its load is the number of simultaneous arrivals
    fn note_finisher(&mut self, time: CpTime) {
        let count = match self.finishers {
            Some((instant, count)) if instant == time => count + 1,
            _ => 1,
        };
        self.finishers = Some((time, count));
        self.max_load = self.max_load.max(count);
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    /// Inject a team at the start line at `time`.
    ///
    /// Service begins at `time` regardless of free channels; the start-order
    /// policy is responsible for spacing teams.
    pub fn add_to_start(
        &mut self,
        team: &mut Team,
        time: CpTime,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        if self.kind != StageKind::Start {
            return Err(CpError::NotAStartStage {
                stage: self.name.clone(),
                kind: self.kind,
            });
        }
        self.check_absent(team)?;

        self.visits.insert(
            team.id,
            Visit {
                state: VisitState::Launching,
                appeared: time,
                started: time,
                speed: team.speed,
                outcome: StageOutcome::default(),
            },
        );
        team.set_start(time);
        team.set_location(Some(self.id));
        out.push(Event::new(time, team.id, self.id, EventPhase::StartOfService));
        Ok(())
    }

    /// Advance `team` through the transition named by `event`
    pub fn dispatch<R: Rng + ?Sized>(
        &mut self,
        event: &Event,
        team: &mut Team,
        settings: &SimSettings,
        rng: &mut R,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        match event.phase {
            EventPhase::Appear => self.appear(team, event.time, settings, rng, out),
            EventPhase::StartOfService => self.try_start(team, event.time, settings, rng, out),
            EventPhase::EndOfService => self.end_of_service(team, event.time, settings, rng, out),
            EventPhase::Leave => self.leave(team, event.time, out),
        }
    }

    fn appear<R: Rng + ?Sized>(
        &mut self,
        team: &mut Team,
        time: CpTime,
        settings: &SimSettings,
        rng: &mut R,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        self.check_absent(team)?;
        self.note_arrival(time);

        if self.kind == StageKind::Finish {
            self.note_finisher(time);
            self.note_departure(time);
            self.record(team, StageOutcome::default(), time);
            team.set_location(None);
            return Ok(());
        }
        self.note_load();

        let before = if self.kind == StageKind::Tech {
            scale_overhead(rng, settings.before, self.times.sigma, team.speed)
        } else {
            0
        };

        self.visits.insert(
            team.id,
            Visit {
                state: VisitState::Preparing,
                appeared: time,
                started: time,
                speed: team.speed,
                outcome: StageOutcome {
                    before,
                    ..StageOutcome::default()
                },
            },
        );
        team.set_location(Some(self.id));
        out.push(Event::new(
            time + before,
            team.id,
            self.id,
            EventPhase::StartOfService,
        ));
        Ok(())
    }

    fn try_start<R: Rng + ?Sized>(
        &mut self,
        team: &Team,
        time: CpTime,
        settings: &SimSettings,
        rng: &mut R,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        let state = self.visit(team)?.state;
        match state {
            VisitState::Launching => {
                self.note_arrival(time);
                self.begin_service(team.id, time, rng, out)?;
            }
            VisitState::Preparing => {
                if self.has_free_channel(settings) {
                    self.begin_service(team.id, time, rng, out)?;
                } else {
                    self.visit_mut(team)?.state = VisitState::Waiting;
                    self.waiting.push_back(team.id);
                }
            }
            _ => return Err(self.not_present(team)),
        }
        self.note_load();
        Ok(())
    }

    /// Occupy a channel and schedule the end of service
    fn begin_service<R: Rng + ?Sized>(
        &mut self,
        team: TeamId,
        time: CpTime,
        rng: &mut R,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        let kind = self.kind;
        let times = self.times;
        let stage = self.id;
        let name = &self.name;

        let visit = self
            .visits
            .get_mut(&team)
            .ok_or_else(|| CpError::TeamNotPresent {
                stage: name.clone(),
                team: team.to_string(),
            })?;

        let sampled = sample_duration(rng, &times, visit.speed);
        let (work, rejected) = match kind {
            // no rejections at the start line
            StageKind::Start => (apply_limit(sampled, times.max).0, false),
            _ => apply_limit(sampled, times.max),
        };

        visit.state = VisitState::Working;
        visit.started = time;
        visit.outcome.work = work;
        visit.outcome.rejected = rejected;
        visit.outcome.wait = time.saturating_sub(visit.appeared + visit.outcome.before);

        self.in_service.insert(team);
        out.push(Event::new(time + work, team, stage, EventPhase::EndOfService));
        Ok(())
    }

    fn end_of_service<R: Rng + ?Sized>(
        &mut self,
        team: &Team,
        time: CpTime,
        settings: &SimSettings,
        rng: &mut R,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        let state = self.visit(team)?.state;
        if state != VisitState::Working || !self.in_service.remove(&team.id) {
            return Err(self.not_present(team));
        }

        // the freed channel goes to the longest-waiting team, same instant
        if let Some(next) = self.waiting.pop_front() {
            self.begin_service(next, time, rng, out)?;
        }

        let work = self.visit(team)?.outcome.work;
        let after = self.post_overhead(work, settings, rng);

        let visit = self.visit_mut(team)?;
        visit.state = VisitState::Leaving;
        visit.outcome.after = after;

        out.push(Event::new(time + after, team.id, self.id, EventPhase::Leave));
        Ok(())
    }

    /// Post-service overhead scaled by actual work relative to the stage mean.
    /// Not capped: slow teams can exceed the nominal overhead.
    fn post_overhead<R: Rng + ?Sized>(
        &self,
        work: CpDuration,
        settings: &SimSettings,
        rng: &mut R,
    ) -> CpDuration {
        if self.kind != StageKind::Tech || settings.after == 0 {
            return 0;
        }
        let factor = if self.times.mean == 0 {
            1.0
        } else {
            work as f64 / self.times.mean as f64
        };
        scale_overhead(rng, settings.after, self.times.sigma, factor)
    }

    fn leave(
        &mut self,
        team: &mut Team,
        time: CpTime,
        out: &mut Vec<Event>,
    ) -> Result<(), CpError> {
        let state = self.visit(team)?.state;
        if state != VisitState::Leaving {
            return Err(self.not_present(team));
        }
        let visit = match self.visits.remove(&team.id) {
            Some(visit) => visit,
            None => return Err(self.not_present(team)),
        };

        self.note_departure(time);
        let when = match self.kind {
            StageKind::Start => visit.started,
            _ => visit.appeared,
        };
        self.record(team, visit.outcome, when);

        let next = match self.next_stage(team.grade) {
            Some(next) => next,
            None => {
                log::warn!(
                    "no route from '{}' for team '{}' (grade {})",
                    self.name,
                    team.name,
                    team.grade
                );
                team.set_location(None);
                return Err(CpError::MissingRoute {
                    stage: self.name.clone(),
                    kind: self.kind,
                    grade: team.grade,
                });
            }
        };

        team.set_location(Some(next));
        out.push(Event::new(time, team.id, next, EventPhase::Appear));
        Ok(())
    }

    fn record(&mut self, team: &mut Team, outcome: StageOutcome, when: CpTime) {
        self.log.push(StageTeamRecord {
            team: team.id,
            outcome,
            when,
        });
        team.add_stage(TeamStageRecord {
            stage: self.id,
            stage_name: self.name.clone(),
            outcome,
        });
    }

    fn check_absent(&self, team: &Team) -> Result<(), CpError> {
        if self.visits.contains_key(&team.id) {
            return Err(CpError::TeamAlreadyActive {
                team: team.name.clone(),
                stage: self.name.clone(),
            });
        }
        Ok(())
    }

    fn visit(&self, team: &Team) -> Result<&Visit, CpError> {
        self.visits
            .get(&team.id)
            .ok_or_else(|| self.not_present(team))
    }

    fn visit_mut(&mut self, team: &Team) -> Result<&mut Visit, CpError> {
        let stage = &self.name;
        self.visits
            .get_mut(&team.id)
            .ok_or_else(|| CpError::TeamNotPresent {
                stage: stage.clone(),
                team: team.name.clone(),
            })
    }

    fn not_present(&self, team: &Team) -> CpError {
        CpError::TeamNotPresent {
            stage: self.name.clone(),
            team: team.name.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Run boundaries and statistics
    // ------------------------------------------------------------------------

    /// Close the run: append the run summary and reset per-run tracking.
    /// A stage nobody visited adds no summary.
    pub fn end_of_run(&mut self) {
        if let Some(first_arrival) = self.first_arrival {
            self.runs.push(StageRunSummary {
                max_load: self.max_load,
                first_arrival,
                last_departure: self.last_departure.unwrap_or(first_arrival),
            });
        }
        self.committed = self.log.len();
        self.clear_run_tracking();
    }

    /// Drop all per-run state, e.g. after a failed run. Visits logged since
    /// the last closed run are discarded as well.
    pub fn reset_run(&mut self) {
        self.pending.clear();
        self.visits.clear();
        self.in_service.clear();
        self.waiting.clear();
        self.log.truncate(self.committed);
        self.clear_run_tracking();
    }

    fn clear_run_tracking(&mut self) {
        self.max_load = 0;
        self.first_arrival = None;
        self.last_departure = None;
        self.finishers = None;
    }

    pub fn run_summaries(&self) -> &[StageRunSummary] {
        &self.runs
    }

    /// Every completed visit since the statistics were last cleared
    pub fn log(&self) -> &[StageTeamRecord] {
        &self.log
    }

    /// Most recent visit of `team`
    pub fn team_record(&self, team: TeamId) -> Option<&StageTeamRecord> {
        self.log.iter().rev().find(|r| r.team == team)
    }

    pub fn stats(&self) -> PhaseStat {
        PhaseStat::new(&self.log, &self.runs)
    }

    pub fn clear_stats(&mut self) {
        self.runs.clear();
        self.log.clear();
        self.committed = 0;
    }
}
