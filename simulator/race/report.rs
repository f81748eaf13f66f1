// TSV report writer

use std::io::{self, Write};

use cp_rust::cp_stats::TimeSummary;
use cp_rust::{
    format_duration, format_time, RunReport, StageDetail, StageKind, StageReport, Team, TeamStat,
};

/// Tab-separated report: per-run team tables, then either the aggregate
/// stage table (several runs) or the detailed per-team table (single run)
pub struct TsvReport<W: Write> {
    writer: W,
}

impl<W: Write> TsvReport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Team table of one run
    pub fn write_run(&mut self, report: &RunReport) -> io::Result<()> {
        writeln!(
            self.writer,
            "team\tstart\twork\twaits\twait\trejects\trejected at\twaited at"
        )?;
        for row in &report.teams {
            writeln!(self.writer, "{}\t{}", row.name, team_cells(&row.total))?;
        }
        Ok(())
    }

    /// Aggregate table over all runs
    pub fn write_stages(&mut self, stages: &[StageReport], level: f64) -> io::Result<()> {
        let pct = (level * 100.0).round() as u32;
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "stage\tteams\tmax load\tmax load {p}%\tbusy from\tfrom {p}%\tto {p}%\tbusy to\t\
             work {s}\twaits\twait {s}\trejects\tlimit",
            p = pct,
            s = summary_header(pct),
        )?;

        for stage in stages {
            let row = &stage.row;
            let limit = if row.limit == 0 {
                String::new()
            } else {
                format_duration(row.limit)
            };
            writeln!(
                self.writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                stage.name,
                row.teams_per_run,
                row.max_load,
                row.max_load_high,
                format_time(row.busy_from),
                format_time(row.busy_from_low),
                format_time(row.busy_to_high),
                format_time(row.busy_to),
                summary_cells(&row.work),
                row.waits_per_run,
                summary_cells(&row.wait),
                row.rejects_per_run,
                limit,
            )?;
        }
        Ok(())
    }

    /// Per-team cells of every stage: two lines per stage
    pub fn write_details(&mut self, teams: &[Team], stages: &[StageDetail]) -> io::Result<()> {
        writeln!(self.writer)?;
        write!(self.writer, "stage\t")?;
        for team in teams {
            write!(self.writer, "\t{}", team.name)?;
        }
        writeln!(self.writer)?;

        for stage in stages {
            let (first, second) = match stage.kind {
                StageKind::Start => ("start time", "work"),
                StageKind::Finish => ("work", "finish time"),
                StageKind::Tech | StageKind::Pass => ("wait", "work"),
            };

            let mut top = format!("{}\t{}", stage.name, first);
            let mut bottom = format!("\t{}", second);
            for cell in &stage.cells {
                let (a, b) = match cell {
                    None => (String::new(), String::new()),
                    Some(record) => {
                        let work = format_duration(record.outcome.work);
                        match stage.kind {
                            StageKind::Start => (format_time(record.when), work),
                            StageKind::Finish => (work, format_time(record.when)),
                            StageKind::Tech | StageKind::Pass => {
                                let wait = if record.outcome.wait == 0 {
                                    String::new()
                                } else {
                                    format_duration(record.outcome.wait)
                                };
                                (wait, work)
                            }
                        }
                    }
                };
                top.push('\t');
                top.push_str(&a);
                bottom.push('\t');
                bottom.push_str(&b);
            }

            writeln!(self.writer, "{}", top)?;
            writeln!(self.writer, "{}", bottom)?;
            if stage.kind == StageKind::Finish {
                writeln!(self.writer)?;
            }
        }
        Ok(())
    }
}

fn team_cells(stat: &TeamStat) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        format_time(stat.start),
        format_duration(stat.work),
        stat.waits,
        format_duration(stat.wait),
        stat.rejects,
        stat.rejected_at.join(" "),
        stat.waited_at.join(" "),
    )
}

fn summary_header(pct: u32) -> String {
    format!("min\tlow {p}%\thigh {p}%\tmax\tmean", p = pct)
}

fn summary_cells(summary: &TimeSummary) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        format_duration(summary.min),
        format_duration(summary.low),
        format_duration(summary.high),
        format_duration(summary.max),
        format_duration(summary.mean),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_rust::{
        DayPlan, LinkSpec, RaceConfig, RosterOrder, RunAggregator, StageSpec, StageTimes,
        TeamSpec, Topology,
    };

    fn aggregator() -> RunAggregator<RosterOrder> {
        let stages = vec![
            StageSpec::new("start", StageKind::Start, 1, StageTimes::new(0, 5, 5, 0.0)),
            StageSpec::new("rope", StageKind::Tech, 1, StageTimes::new(0, 20, 30, 0.0)),
            StageSpec::new("finish", StageKind::Finish, 0, StageTimes::default()),
        ];
        let links = vec![LinkSpec::new(0, &["start", "rope", "finish"])];
        let topology = Topology::build(&stages, &links).unwrap();
        let config = RaceConfig {
            seed: Some([2u8; 32]),
            days: vec![DayPlan::new("start", 360)],
            ..RaceConfig::default()
        };
        let teams = vec![TeamSpec::new("Alpha", 0, 1.0), TeamSpec::new("Beta", 0, 1.0)];
        RunAggregator::new(config, topology, &teams, RosterOrder).unwrap()
    }

    fn text(report: TsvReport<Vec<u8>>) -> String {
        String::from_utf8(report.into_inner()).unwrap()
    }

    #[test]
    fn test_team_table() {
        let mut agg = aggregator();
        let run = agg.run_once().unwrap();

        let mut report = TsvReport::new(Vec::new());
        report.write_run(&run).unwrap();
        let out = text(report);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Alpha\t0+06:00\t00:25\t0\t00:00\t0\t\t");
        assert_eq!(lines[2], "Beta\t0+06:05\t00:25\t1\t00:15\t0\t\trope");
    }

    #[test]
    fn test_stage_and_detail_tables() {
        let mut agg = aggregator();
        agg.run_once().unwrap();

        let mut report = TsvReport::new(Vec::new());
        report.write_stages(&agg.stage_reports(), 0.95).unwrap();
        report
            .write_details(agg.scheduler().teams(), &agg.stage_details())
            .unwrap();
        let out = text(report);

        assert!(out.contains("max load 95%"));
        let rope = out.lines().find(|l| l.starts_with("rope\t2\t")).unwrap();
        assert!(rope.ends_with("\t00:30"), "limit column: {}", rope);

        assert!(out.contains("\nstage\t\tAlpha\tBeta\n"));
        assert!(out.contains("start\tstart time\t0+06:00\t0+06:05\n"));
        assert!(out.contains("rope\twait\t\t00:15\n"));
        assert!(out.contains("finish\twork\t00:00\t00:00\n\tfinish time\t0+06:25\t0+06:45\n\n"));
    }
}
