use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use scenesched_scheduler::{
    Schedule, ScheduleStore, evaluate, find_active_program, find_next_program_after,
};
use scenesched_shared::{Program, display_title};
use tracing::warn;

use crate::config::AppConfig;

/// Outcome of evaluating the schedule at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub at: DateTime<FixedOffset>,
    pub target: Option<Program>,
    pub next: Option<Program>,
    pub next_start: Option<DateTime<FixedOffset>>,
    pub seek_offset: Duration,
}

impl CheckReport {
    pub fn evaluate(
        schedule: Option<&Schedule>,
        default_program: Option<&Program>,
        at: DateTime<FixedOffset>,
    ) -> Self {
        let state = evaluate(schedule, default_program, &at);
        // The declaration only carries the template times of recurring
        // programs; look the concrete occurrence up again for display.
        let next_start = state.next.as_ref().and_then(|next| {
            let programs = schedule.map(|s| s.programs.as_slice()).unwrap_or_default();
            let after = find_active_program(programs, &at)
                .map(|active| active.window.end)
                .unwrap_or(at);
            find_next_program_after(programs, &after)
                .filter(|upcoming| upcoming.program.id == next.id)
                .map(|upcoming| upcoming.start)
        });
        Self {
            at,
            target: state.target,
            next: state.next,
            next_start,
            seek_offset: state.seek_offset,
        }
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "at:     {}", self.at.to_rfc3339())?;
        write!(f, "target: {}", display_title(self.target.as_ref()))?;
        if let Some(target) = &self.target {
            write!(f, " [{}] source {} ({})", target.id, target.source_name, target.input_kind)?;
        }
        writeln!(f)?;
        writeln!(f, "seek:   {}s", self.seek_offset.as_secs())?;
        write!(f, "next:   {}", display_title(self.next.as_ref()))?;
        if let Some(start) = self.next_start {
            write!(f, " at {}", start.to_rfc3339())?;
        }
        Ok(())
    }
}

pub fn parse_instant(value: Option<&str>) -> Result<DateTime<FixedOffset>> {
    match value {
        Some(text) => DateTime::parse_from_rfc3339(text.trim())
            .with_context(|| format!("invalid --at value {text:?}, expected RFC 3339")),
        None => Ok(Local::now().fixed_offset()),
    }
}

pub async fn run(config: &AppConfig, at: Option<&str>) -> Result<()> {
    let at = parse_instant(at)?;
    let store = ScheduleStore::new(&config.paths.schedule);
    // Mirrors the daemon: an unreadable schedule leaves only the fallback.
    let schedule = match store.load().await {
        Ok(schedule) => Some(schedule),
        Err(e) => {
            warn!(error = %e, "evaluating without a schedule");
            None
        }
    };
    let default_program = config.scheduler.default_program();

    let report = CheckReport::evaluate(schedule.as_ref(), default_program.as_ref(), at);
    println!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scenesched_scheduler::DefaultSource;
    use scenesched_scheduler::config::SchedulerConfig;
    use scenesched_scheduler::store::parse_schedule;

    use super::{CheckReport, parse_instant};

    fn schedule() -> scenesched_scheduler::Schedule {
        parse_schedule(
            br#"{
                "scheduleName": "Weekly",
                "schedule": [
                    {
                        "id": "late-show",
                        "title": "Late Show",
                        "enabled": true,
                        "source": {"name": "late", "inputKind": "ffmpeg_source", "uri": "/media/late.mp4"},
                        "timing": {
                            "start": "2026-01-01T22:00:00+02:00",
                            "end": "2026-01-01T23:30:00+02:00",
                            "isRecurring": true,
                            "recurrence": {"daysOfWeek": ["FRI"]}
                        }
                    },
                    {
                        "id": "news",
                        "title": "News",
                        "enabled": true,
                        "source": {"name": "news", "inputKind": "ffmpeg_source", "uri": "/media/news.mp4"},
                        "timing": {"start": "2026-10-17T08:00:00+02:00", "end": "2026-10-17T09:00:00+02:00"}
                    }
                ]
            }"#,
        )
        .expect("schedule parses")
    }

    #[test]
    fn reports_active_program_with_offset_and_next() {
        let schedule = schedule();
        // Friday 2026-10-16, 22:15 local.
        let at = parse_instant(Some("2026-10-16T22:15:00+02:00")).expect("instant");

        let report = CheckReport::evaluate(Some(&schedule), None, at);

        assert_eq!(report.target.as_ref().map(|p| p.id.as_str()), Some("late-show"));
        assert_eq!(report.seek_offset, Duration::from_secs(15 * 60));
        assert_eq!(report.next.as_ref().map(|p| p.id.as_str()), Some("news"));
        assert_eq!(
            report.next_start,
            Some(parse_instant(Some("2026-10-17T08:00:00+02:00")).expect("instant"))
        );
        let text = report.to_string();
        assert!(text.contains("target: Late Show [late-show]"));
        assert!(text.contains("seek:   900s"));
    }

    #[test]
    fn falls_back_to_default_source() {
        let schedule = schedule();
        let config = SchedulerConfig {
            default_source: Some(DefaultSource {
                name: "idle".to_string(),
                input_kind: "image_source".to_string(),
                uri: "/media/idle.png".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let fallback = config.default_program();
        let at = parse_instant(Some("2026-10-16T12:00:00+02:00")).expect("instant");

        let report = CheckReport::evaluate(Some(&schedule), fallback.as_ref(), at);

        assert_eq!(report.target.as_ref().map(|p| p.is_default()), Some(true));
        assert_eq!(report.seek_offset, Duration::ZERO);
        assert_eq!(report.next.as_ref().map(|p| p.id.as_str()), Some("late-show"));
        assert!(report.to_string().contains("target: Default Source"));
    }

    #[test]
    fn empty_evaluation_prints_none() {
        let at = parse_instant(Some("2026-10-16T12:00:00Z")).expect("instant");
        let report = CheckReport::evaluate(None, None, at);
        assert!(report.target.is_none());
        assert!(report.to_string().contains("target: <none>"));
        assert!(report.to_string().contains("next:   <none>"));
    }

    #[test]
    fn rejects_malformed_instant() {
        assert!(parse_instant(Some("tomorrow")).is_err());
    }
}
