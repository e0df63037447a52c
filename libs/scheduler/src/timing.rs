//! Time arithmetic over schedule entries.
//!
//! Everything here is generic over the [`TimeZone`] of the reference instant.
//! Recurring templates are projected onto calendar days of that zone, so the
//! daemon evaluates in `Local` while tests pin `Utc`.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Timelike};

use crate::model::{ScheduledProgram, Timing};

/// How far ahead recurring programs are searched for their next start.
pub const LOOKAHEAD_DAYS: u64 = 7;

/// A concrete `[start, end)` occurrence of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> Window<Tz> {
    pub fn contains(&self, instant: &DateTime<Tz>) -> bool {
        self.start <= *instant && *instant < self.end
    }
}

/// The program active at some instant, together with the occurrence that
/// made it active.
#[derive(Debug, Clone)]
pub struct ActiveMatch<'a, Tz: TimeZone> {
    pub program: &'a ScheduledProgram,
    pub window: Window<Tz>,
}

/// The earliest upcoming start found by [`find_next_program_after`].
#[derive(Debug, Clone)]
pub struct UpcomingStart<'a, Tz: TimeZone> {
    pub program: &'a ScheduledProgram,
    pub start: DateTime<Tz>,
}

impl Timing {
    /// The occurrence of this timing that contains `now`, if any.
    ///
    /// Recurring templates are tried on `now`'s day and on the day before, so
    /// an overnight occurrence that began yesterday is still found.
    pub fn window_containing<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Window<Tz>> {
        let (start, end) = (self.start.as_ref()?, self.end.as_ref()?);

        if !self.is_recurring {
            let tz = now.timezone();
            let window = Window {
                start: start.with_timezone(&tz),
                end: end.with_timezone(&tz),
            };
            return window.contains(now).then_some(window);
        }

        let today = now.date_naive();
        let candidates = [Some(today), today.checked_sub_days(Days::new(1))];
        candidates
            .into_iter()
            .flatten()
            .filter(|day| self.recurrence.covers(*day))
            .filter_map(|day| self.project(&now.timezone(), day))
            .find(|window| window.contains(now))
    }

    /// The first start of this timing strictly after `after`.
    pub fn next_start_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start = self.start.as_ref()?;
        let tz = after.timezone();

        if !self.is_recurring {
            let start = start.with_timezone(&tz);
            return (start > *after).then_some(start);
        }

        let template = time_of_day(start);
        let first_day = after.date_naive();
        (0..=LOOKAHEAD_DAYS)
            .filter_map(|offset| first_day.checked_add_days(Days::new(offset)))
            .filter(|day| self.recurrence.covers(*day))
            .filter_map(|day| local_instant(&tz, day, template))
            .find(|candidate| candidate > after)
    }

    /// Project the recurring templates onto `day`. An end template at or
    /// before the start template rolls over to the following day.
    fn project<Tz: TimeZone>(&self, tz: &Tz, day: NaiveDate) -> Option<Window<Tz>> {
        let start_time = time_of_day(self.start.as_ref()?);
        let end_time = time_of_day(self.end.as_ref()?);

        let start = local_instant(tz, day, start_time)?;
        let mut end = local_instant(tz, day, end_time)?;
        if end <= start {
            end = local_instant(tz, day.checked_add_days(Days::new(1))?, end_time)?;
        }
        Some(Window { start, end })
    }
}

/// First enabled program, in list order, whose occurrence contains `now`.
/// Entries using the default source's reserved id are never matched.
pub fn find_active_program<'a, Tz: TimeZone>(
    programs: &'a [ScheduledProgram],
    now: &DateTime<Tz>,
) -> Option<ActiveMatch<'a, Tz>> {
    programs
        .iter()
        .filter(|program| program.is_candidate())
        .find_map(|program| {
            program
                .timing
                .window_containing(now)
                .map(|window| ActiveMatch { program, window })
        })
}

/// Enabled program with the earliest start strictly after `after`. Ties go
/// to the program listed first.
pub fn find_next_program_after<'a, Tz: TimeZone>(
    programs: &'a [ScheduledProgram],
    after: &DateTime<Tz>,
) -> Option<UpcomingStart<'a, Tz>> {
    let mut best: Option<UpcomingStart<'a, Tz>> = None;
    for program in programs.iter().filter(|program| program.is_candidate()) {
        let Some(start) = program.timing.next_start_after(after) else {
            continue;
        };
        if best.as_ref().is_none_or(|current| start < current.start) {
            best = Some(UpcomingStart { program, start });
        }
    }
    best
}

fn time_of_day<Tz: TimeZone>(template: &DateTime<Tz>) -> NaiveTime {
    let local = template.naive_local();
    NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second()).unwrap_or(NaiveTime::MIN)
}

/// Resolve a wall-clock time on `day` in `tz`. Ambiguous times take the
/// earlier instant; times inside a DST gap move forward by an hour.
fn local_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = day.and_time(time);
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        let shifted = naive.checked_add_signed(chrono::Duration::hours(1))?;
        tz.from_local_datetime(&shifted).earliest()
    })
}
