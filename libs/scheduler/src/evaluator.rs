//! Pure evaluation: schedule + fallback + instant in, declaration out.

use chrono::{DateTime, TimeZone, Utc};
use scenesched_shared::Program;
use scenesched_shared::events::TargetProgramState;

use crate::model::Schedule;
use crate::timing::{find_active_program, find_next_program_after};

/// Work out what should be on air at `now` and what comes next.
///
/// With an active program the next-program search starts at the end of the
/// occurrence that matched; otherwise it starts at `now`. The seek offset is
/// how far `now` is into the matched occurrence, zero for the fallback.
pub fn evaluate<Tz: TimeZone>(
    schedule: Option<&Schedule>,
    default_program: Option<&Program>,
    now: &DateTime<Tz>,
) -> TargetProgramState {
    let programs = schedule.map(|s| s.programs.as_slice()).unwrap_or_default();

    let (target, seek_offset, lookahead_from) = match find_active_program(programs, now) {
        Some(active) => {
            let offset = now
                .clone()
                .signed_duration_since(active.window.start.clone())
                .to_std()
                .unwrap_or_default();
            (Some(active.program.to_program()), offset, active.window.end)
        }
        None => (default_program.cloned(), Default::default(), now.clone()),
    };

    let next = find_next_program_after(programs, &lookahead_from)
        .map(|upcoming| upcoming.program.to_program());

    TargetProgramState {
        timestamp: now.with_timezone(&Utc),
        target,
        next,
        seek_offset,
    }
}
