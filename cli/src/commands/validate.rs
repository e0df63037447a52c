use std::fmt;

use anyhow::{Context, Result};
use scenesched_scheduler::model::parse_weekday;
use scenesched_scheduler::{Schedule, ScheduleStore, ScheduledProgram};
use tracing::info;

use crate::config::AppConfig;

/// What `validate` found in a schedule that parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSummary {
    pub name: String,
    pub version: String,
    pub programs: usize,
    pub enabled: usize,
    /// Enabled programs whose timing can never match.
    pub unreachable: Vec<String>,
    /// Enabled programs using the id reserved for the default source.
    pub reserved: Vec<String>,
}

impl ValidationSummary {
    pub fn of(schedule: &Schedule) -> Self {
        Self {
            name: schedule.schedule_name.clone(),
            version: schedule.version.clone(),
            programs: schedule.programs.len(),
            enabled: schedule.enabled_programs().count(),
            unreachable: schedule
                .enabled_programs()
                .filter(|program| !program.uses_reserved_id() && !can_match(program))
                .map(|program| program.id.clone())
                .collect(),
            reserved: schedule
                .reserved_id_programs()
                .map(|program| program.id.clone())
                .collect(),
        }
    }
}

impl fmt::Display for ValidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "<unnamed>" } else { &self.name };
        write!(
            f,
            "schedule {name} (version {}): {} programs, {} enabled",
            if self.version.is_empty() { "?" } else { &self.version },
            self.programs,
            self.enabled
        )?;
        for id in &self.unreachable {
            write!(f, "\n  warning: program {id} has incomplete timing and will never play")?;
        }
        for id in &self.reserved {
            write!(
                f,
                "\n  warning: program id {id:?} is reserved for the default source and will never play"
            )?;
        }
        Ok(())
    }
}

fn can_match(program: &ScheduledProgram) -> bool {
    let timing = &program.timing;
    let (Some(start), Some(end)) = (timing.start, timing.end) else {
        return false;
    };
    if timing.is_recurring {
        timing
            .recurrence
            .days_of_week
            .iter()
            .any(|day| parse_weekday(day).is_some())
    } else {
        end > start
    }
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let store = ScheduleStore::new(&config.paths.schedule);
    let schedule = store
        .load()
        .await
        .with_context(|| format!("schedule {} is not valid", store.path().display()))?;

    let summary = ValidationSummary::of(&schedule);
    info!(
        path = %store.path().display(),
        programs = summary.programs,
        enabled = summary.enabled,
        "schedule validated"
    );
    println!("{summary}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use scenesched_scheduler::store::parse_schedule;

    use super::ValidationSummary;

    #[test]
    fn summary_counts_and_flags_incomplete_programs() {
        let schedule = parse_schedule(
            br#"{
                "version": "1.0",
                "scheduleName": "Main",
                "schedule": [
                    {
                        "id": "news",
                        "title": "News",
                        "enabled": true,
                        "source": {"name": "news", "inputKind": "ffmpeg_source", "uri": "/media/news.mp4"},
                        "timing": {"start": "2026-10-16T20:00:00+02:00", "end": "2026-10-16T21:00:00+02:00"}
                    },
                    {
                        "id": "broken",
                        "title": "Broken",
                        "enabled": true,
                        "source": {"name": "b", "inputKind": "ffmpeg_source", "uri": "/media/b.mp4"},
                        "timing": {"start": "", "end": ""}
                    },
                    {
                        "id": "off",
                        "title": "Off",
                        "enabled": false,
                        "source": {"name": "off", "inputKind": "ffmpeg_source", "uri": "/media/off.mp4"},
                        "timing": {"start": "", "end": ""}
                    }
                ]
            }"#,
        )
        .expect("schedule parses");

        let summary = ValidationSummary::of(&schedule);

        assert_eq!(summary.programs, 3);
        assert_eq!(summary.enabled, 2);
        assert_eq!(summary.unreachable, vec!["broken".to_string()]);
        let text = summary.to_string();
        assert!(text.starts_with("schedule Main (version 1.0): 3 programs, 2 enabled"));
        assert!(text.contains("program broken has incomplete timing"));
        assert!(summary.reserved.is_empty());
    }

    #[test]
    fn summary_flags_unknown_weekdays_and_reserved_ids() {
        let schedule = parse_schedule(
            br#"{
                "schedule": [
                    {
                        "id": "weekly",
                        "enabled": true,
                        "timing": {
                            "start": "2026-01-01T20:00:00+02:00",
                            "end": "2026-01-01T21:00:00+02:00",
                            "isRecurring": true,
                            "recurrence": {"daysOfWeek": ["XYZ"]}
                        }
                    },
                    {
                        "id": "weekend",
                        "enabled": true,
                        "timing": {
                            "start": "2026-01-01T20:00:00+02:00",
                            "end": "2026-01-01T21:00:00+02:00",
                            "isRecurring": true,
                            "recurrence": {"daysOfWeek": ["XYZ", "SAT"]}
                        }
                    },
                    {
                        "id": "default-source",
                        "enabled": true,
                        "timing": {"start": "2026-10-16T10:00:00+02:00", "end": "2026-10-16T11:00:00+02:00"}
                    }
                ]
            }"#,
        )
        .expect("schedule parses");

        let summary = ValidationSummary::of(&schedule);

        assert_eq!(summary.unreachable, vec!["weekly".to_string()]);
        assert_eq!(summary.reserved, vec!["default-source".to_string()]);
        assert!(summary.to_string().contains("reserved for the default source"));
    }
}
