// Race file format and loading

use std::fs;
use std::path::Path;

use cp_rust::{
    CpDuration, CpError, CpTime, DayPlan, Grade, LinkSpec, RaceConfig, SimSettings, StageSpec,
    TeamSpec, Topology, DEFAULT_LEVEL, MINUTES_PER_DAY, MINUTES_PER_HOUR,
};
use hashbrown::HashSet;

/// Grade from which teams form the senior start pool
pub const DEFAULT_GRADE_THRESHOLD: Grade = 2;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read race file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse race file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("team '{0}' is listed twice")]
    DuplicateTeam(String),

    #[error("race file defines no days")]
    NoDays,

    #[error("bad time '{0}', expected HH:MM or d+HH:MM")]
    BadTime(String),

    #[error("quantile level '{0}' is not a fraction in (0, 1]")]
    BadLevel(String),

    #[error(transparent)]
    Race(#[from] CpError),
}

/// Race file (YAML)
#[derive(Debug, serde::Deserialize)]
pub struct RaceFile {
    /// Race metadata
    #[serde(default)]
    pub meta: RaceMeta,

    pub stages: Vec<StageSpec>,
    pub links: Vec<LinkSpec>,
    pub teams: Vec<TeamSpec>,
    pub days: Vec<DayFile>,

    // Optional run settings, overridden from the command line
    #[serde(default)]
    pub runs: Option<usize>,
    #[serde(default)]
    pub level: Option<f64>,

    /// Nominal overheads for technical stages (minutes)
    #[serde(default)]
    pub before: CpDuration,
    #[serde(default)]
    pub after: CpDuration,

    #[serde(default = "default_grade_threshold")]
    pub grade_threshold: Grade,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RaceMeta {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct DayFile {
    pub start_stage: String,
    /// `HH:MM` or `d+HH:MM`, day 0 being the first race day
    pub start: String,
}

fn default_grade_threshold() -> Grade {
    DEFAULT_GRADE_THRESHOLD
}

impl RaceFile {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let yaml_content = fs::read_to_string(path)?;
        Self::parse(&yaml_content)
    }

    pub fn parse(yaml: &str) -> Result<Self, LoadError> {
        let race: RaceFile = serde_yaml::from_str(yaml)?;
        race.validate()?;
        Ok(race)
    }

    fn validate(&self) -> Result<(), LoadError> {
        let mut names = HashSet::new();
        for team in &self.teams {
            if !names.insert(team.name.as_str()) {
                return Err(LoadError::DuplicateTeam(team.name.clone()));
            }
        }
        if self.days.is_empty() {
            return Err(LoadError::NoDays);
        }
        for day in &self.days {
            parse_time(&day.start)?;
        }
        if let Some(level) = self.level {
            check_level(level)?;
        }
        Ok(())
    }

    pub fn topology(&self) -> Result<Topology, LoadError> {
        Ok(Topology::build(&self.stages, &self.links)?)
    }

    /// Run configuration with file values; `runs` and `level` fall back to 1
    /// and the default level when absent
    pub fn race_config(&self) -> Result<RaceConfig, LoadError> {
        let days = self
            .days
            .iter()
            .map(|day| Ok(DayPlan::new(&day.start_stage, parse_time(&day.start)?)))
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(RaceConfig {
            runs: self.runs.unwrap_or(1),
            seed: None,
            level: self.level.unwrap_or(DEFAULT_LEVEL),
            settings: SimSettings {
                before: self.before,
                after: self.after,
                unlimited: false,
            },
            days,
        })
    }
}

/// Parse `HH:MM` or `d+HH:MM` into minutes since the start of day 0
pub fn parse_time(text: &str) -> Result<CpTime, LoadError> {
    let bad = || LoadError::BadTime(text.to_string());

    let (day, clock) = match text.split_once('+') {
        Some((day, clock)) => (day.trim().parse::<CpTime>().map_err(|_| bad())?, clock),
        None => (0, text),
    };
    let (hours, minutes) = clock.trim().split_once(':').ok_or_else(bad)?;
    let hours = hours.parse::<CpTime>().map_err(|_| bad())?;
    let minutes = minutes.parse::<CpTime>().map_err(|_| bad())?;
    if minutes >= MINUTES_PER_HOUR {
        return Err(bad());
    }

    Ok(day * MINUTES_PER_DAY + hours * MINUTES_PER_HOUR + minutes)
}

/// Quantile level of the stage statistics, a fraction in (0, 1]
pub fn check_level(level: f64) -> Result<f64, LoadError> {
    if level > 0.0 && level <= 1.0 {
        Ok(level)
    } else {
        Err(LoadError::BadLevel(level.to_string()))
    }
}

/// Parse a quantile level given on the command line
pub fn parse_level(text: &str) -> Result<f64, LoadError> {
    let level = text
        .trim()
        .parse::<f64>()
        .map_err(|_| LoadError::BadLevel(text.to_string()))?;
    check_level(level)
}

/// Parse a 32-byte seed from hex, with or without a `0x` prefix.
/// Missing trailing bytes stay zero.
pub fn parse_seed_hex(hex: &str) -> Option<[u8; 32]> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut seed = [0u8; 32];

    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        if i >= 32 {
            break;
        }
        let byte_str = std::str::from_utf8(chunk).ok()?;
        seed[i] = u8::from_str_radix(byte_str, 16).ok()?;
    }

    Some(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RACE: &str = r#"
meta:
  name: Test race
stages:
  - name: start
    kind: Start
    channels: 2
    times: { min: 0, mean: 5, max: 5, sigma: 0.0 }
  - name: rope
    channels: 1
    times: { min: 10, mean: 20, max: 40 }
  - name: finish
    kind: Finish
links:
  - grade: 0
    sequence: [start, rope, finish]
teams:
  - name: Alpha
    grade: 0
  - name: Beta
    grade: 1
    speed: 0.9
days:
  - start_stage: start
    start: "06:00"
before: 5
"#;

    #[test]
    fn test_parse_race_file() {
        let race = RaceFile::parse(RACE).unwrap();
        assert_eq!(race.meta.name.as_deref(), Some("Test race"));
        assert_eq!(race.stages.len(), 3);
        assert_eq!(race.stages[1].times.sigma, 0.2);
        assert_eq!(race.teams[0].speed, 1.0);
        assert_eq!(race.grade_threshold, DEFAULT_GRADE_THRESHOLD);

        let config = race.race_config().unwrap();
        assert_eq!(config.runs, 1);
        assert_eq!(config.days, vec![DayPlan::new("start", 360)]);
        assert_eq!(config.settings.before, 5);

        let topology = race.topology().unwrap();
        assert_eq!(topology.len(), 3);
    }

    #[test]
    fn test_duplicate_team_rejected() {
        let yaml = RACE.replace("name: Beta", "name: Alpha");
        let err = RaceFile::parse(&yaml).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateTeam(name) if name == "Alpha"));
    }

    #[test]
    fn test_bundled_scenario_routes_every_grade() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/two_day_race.yaml");
        let race = RaceFile::load(&path).unwrap();
        let topology = race.topology().unwrap();
        let config = race.race_config().unwrap();
        assert_eq!(config.days[1].start_time, MINUTES_PER_DAY + 360);

        for day in &config.days {
            let start = topology.id_of(&day.start_stage).unwrap();
            for team in &race.teams {
                let route = topology.trace_route(start, team.grade).unwrap();
                let last = route.last().and_then(|&id| topology.stage(id)).unwrap();
                assert_eq!(last.kind, cp_rust::StageKind::Finish);
            }
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("06:00").unwrap(), 360);
        assert_eq!(parse_time("1+06:00").unwrap(), 1800);
        assert!(parse_time("6").is_err());
        assert!(parse_time("06:75").is_err());
    }

    #[test]
    fn test_level_outside_unit_interval_rejected() {
        let yaml = format!("{}level: 95\n", RACE);
        let err = RaceFile::parse(&yaml).unwrap_err();
        assert!(matches!(err, LoadError::BadLevel(level) if level == "95"));

        let yaml = format!("{}level: 0.9\n", RACE);
        assert_eq!(RaceFile::parse(&yaml).unwrap().level, Some(0.9));

        assert_eq!(parse_level("1").unwrap(), 1.0);
        assert!(parse_level("95").is_err());
        assert!(parse_level("0").is_err());
        assert!(parse_level("-0.5").is_err());
        assert!(parse_level("NaN").is_err());
        assert!(parse_level("high").is_err());
    }

    #[test]
    fn test_parse_seed_hex() {
        let seed = parse_seed_hex("0x0102ff").unwrap();
        assert_eq!(&seed[..3], &[1, 2, 255]);
        assert!(seed[3..].iter().all(|&b| b == 0));
        assert_eq!(parse_seed_hex("zz"), None);
    }
}
