// Start-order policies
//
// Teams are split into two pools by grade. The first day mixes both pools in
// random order; later days start teams by their previous-day work time, one
// from each pool per slot.

use cp_rust::{CpTime, Grade, StartContext, StartOrder, StartSlot, Team, TeamId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Split into the senior pool (`grade >= threshold`) and the junior pool
fn pools(teams: &[Team], threshold: Grade) -> (Vec<&Team>, Vec<&Team>) {
    teams.iter().partition(|team| team.grade >= threshold)
}

/// Shuffle each pool, then alternate between them. `channels` teams start
/// per slot and slots are spaced by the start line's max time.
#[derive(Debug, Clone, Copy)]
pub struct InterleavedShuffle {
    pub threshold: Grade,
}

impl StartOrder for InterleavedShuffle {
    fn slots(&mut self, ctx: &StartContext<'_>, rng: &mut StdRng) -> Vec<StartSlot> {
        let (mut senior, mut junior) = pools(ctx.teams, self.threshold);
        senior.shuffle(rng);
        junior.shuffle(rng);

        let mut order: Vec<TeamId> = Vec::with_capacity(ctx.teams.len());
        let mut senior = senior.into_iter();
        let mut junior = junior.into_iter();
        loop {
            match (senior.next(), junior.next()) {
                (Some(a), Some(b)) => order.extend([a.id, b.id]),
                (Some(a), None) => {
                    order.push(a.id);
                    order.extend(senior.by_ref().map(|t| t.id));
                }
                (None, Some(b)) => {
                    order.push(b.id);
                    order.extend(junior.by_ref().map(|t| t.id));
                }
                (None, None) => break,
            }
        }

        let per_slot = ctx.stage.channels.max(1);
        order
            .into_iter()
            .enumerate()
            .map(|(i, team)| StartSlot {
                team,
                time: ctx.time + (i / per_slot) as CpTime * ctx.stage.times.max,
            })
            .collect()
    }
}

/// Fastest first by previous-day work time, one team from each pool per
/// slot. Whatever remains of the longer pool starts two per slot.
#[derive(Debug, Clone, Copy)]
pub struct PreviousDayOrder {
    pub threshold: Grade,
}

impl StartOrder for PreviousDayOrder {
    fn slots(&mut self, ctx: &StartContext<'_>, _rng: &mut StdRng) -> Vec<StartSlot> {
        let previous_work = |team: &Team| {
            ctx.day
                .checked_sub(1)
                .and_then(|day| team.day_stat(day))
                .map_or(0, |stat| stat.work)
        };

        let (mut senior, mut junior) = pools(ctx.teams, self.threshold);
        senior.sort_by_key(|team| previous_work(team));
        junior.sort_by_key(|team| previous_work(team));

        let step = ctx.stage.times.max;
        let mut time = ctx.time;
        let mut slots = Vec::with_capacity(ctx.teams.len());

        let pairs = senior.len().min(junior.len());
        for i in 0..pairs {
            slots.push(StartSlot { team: senior[i].id, time });
            slots.push(StartSlot { team: junior[i].id, time });
            time += step;
        }

        let rest = if junior.len() > pairs {
            &junior[pairs..]
        } else {
            &senior[pairs..]
        };
        for chunk in rest.chunks(2) {
            slots.extend(chunk.iter().map(|team| StartSlot { team: team.id, time }));
            time += step;
        }

        slots
    }
}

/// Interleaved shuffle on the first day, previous-day order afterwards
#[derive(Debug, Clone, Copy)]
pub struct RaceStartOrder {
    first_day: InterleavedShuffle,
    later_days: PreviousDayOrder,
}

impl RaceStartOrder {
    pub fn new(threshold: Grade) -> Self {
        Self {
            first_day: InterleavedShuffle { threshold },
            later_days: PreviousDayOrder { threshold },
        }
    }
}

impl StartOrder for RaceStartOrder {
    fn slots(&mut self, ctx: &StartContext<'_>, rng: &mut StdRng) -> Vec<StartSlot> {
        if ctx.day == 0 {
            self.first_day.slots(ctx, rng)
        } else {
            self.later_days.slots(ctx, rng)
        }
    }
}
