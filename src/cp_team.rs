use crate::cp_interface::{CpTime, Grade, StageId, TeamId};
use crate::cp_stats::{TeamStageRecord, TeamStat};

/// Team as described in the race file
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct TeamSpec {
    pub name: String,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub grade: Grade,
    /// Multiplier on expected stage durations (below 1 is faster)
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_size() -> u32 {
    1
}

fn default_speed() -> f64 {
    1.0
}

impl TeamSpec {
    pub fn new(name: &str, grade: Grade, speed: f64) -> Self {
        Self {
            name: name.to_string(),
            size: default_size(),
            grade,
            speed,
        }
    }
}

/// Runtime state of a team.
///
/// Created once from the roster; during a run only its history grows. Day
/// statistics are folded out of the history at the end of each day and
/// cleared between runs.
#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub size: u32,
    pub grade: Grade,
    pub speed: f64,

    history: Vec<TeamStageRecord>,
    start: CpTime,
    location: Option<StageId>,
    days: Vec<TeamStat>,
}

impl Team {
    pub fn new(id: TeamId, spec: &TeamSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            size: spec.size,
            grade: spec.grade,
            speed: spec.speed,
            history: Vec::new(),
            start: 0,
            location: None,
            days: Vec::new(),
        }
    }

    /// Stage outcomes of the current day, in completion order
    pub fn history(&self) -> &[TeamStageRecord] {
        &self.history
    }

    pub fn add_stage(&mut self, record: TeamStageRecord) {
        self.history.push(record);
    }

    /// Start time of the current day
    pub fn start(&self) -> CpTime {
        self.start
    }

    pub fn set_start(&mut self, time: CpTime) {
        self.start = time;
    }

    /// Stage the team currently occupies, if any
    pub fn location(&self) -> Option<StageId> {
        self.location
    }

    pub(crate) fn set_location(&mut self, stage: Option<StageId>) {
        self.location = stage;
    }

    /// Fold the current day's history into a day statistic and clear it
    pub fn close_day(&mut self) -> &TeamStat {
        let stat = TeamStat::from_records(self.start, &self.history);
        self.history.clear();
        self.days.push(stat);
        &self.days[self.days.len() - 1]
    }

    pub fn day_stat(&self, day: usize) -> Option<&TeamStat> {
        self.days.get(day)
    }

    pub fn days(&self) -> &[TeamStat] {
        &self.days
    }

    /// All closed days of the run combined
    pub fn total_stat(&self) -> TeamStat {
        let mut days = self.days.iter();
        match days.next() {
            Some(first) => days.fold(first.clone(), |acc, day| acc + day),
            None => TeamStat::default(),
        }
    }

    /// Forget everything recorded during the last run
    pub fn reset(&mut self) {
        self.history.clear();
        self.days.clear();
        self.start = 0;
        self.location = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp_interface::StageOutcome;

    fn record(name: &str, work: u64, wait: u64) -> TeamStageRecord {
        TeamStageRecord {
            stage: 0,
            stage_name: name.to_string(),
            outcome: StageOutcome {
                work,
                wait,
                ..StageOutcome::default()
            },
        }
    }

    #[test]
    fn test_days_are_folded_and_combined() {
        let mut team = Team::new(0, &TeamSpec::new("Alpha", 1, 1.0));

        team.set_start(360);
        team.add_stage(record("rope", 30, 0));
        team.add_stage(record("river", 20, 10));
        let day1 = team.close_day().clone();
        assert_eq!(day1.start, 360);
        assert_eq!(day1.work, 50);
        assert!(team.history().is_empty());

        team.set_start(1800);
        team.add_stage(record("cliff", 40, 0));
        team.close_day();

        let total = team.total_stat();
        assert_eq!(total.start, 360);
        assert_eq!(total.work, 90);
        assert_eq!(total.wait, 10);
        assert_eq!(team.day_stat(1).map(|d| d.start), Some(1800));
    }

    #[test]
    fn test_reset_clears_run_state() {
        let mut team = Team::new(3, &TeamSpec::new("Beta", 0, 0.8));
        team.set_start(100);
        team.add_stage(record("rope", 10, 0));
        team.close_day();
        team.set_location(Some(2));

        team.reset();
        assert!(team.days().is_empty());
        assert!(team.history().is_empty());
        assert_eq!(team.location(), None);
        assert_eq!(team.total_stat(), TeamStat::default());
    }
}
