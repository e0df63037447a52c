//! Schedule document model. Maps one-to-one onto `schedule.json`.

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};
use scenesched_shared::{DEFAULT_PROGRAM_ID, Program, Settings};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Root of a schedule document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub schedule_name: String,
    #[serde(default, rename = "schedule")]
    pub programs: Vec<ScheduledProgram>,
}

impl Schedule {
    pub fn enabled_programs(&self) -> impl Iterator<Item = &ScheduledProgram> {
        self.programs.iter().filter(|program| program.enabled)
    }

    /// Enabled entries that claim the id reserved for the default source.
    /// The evaluator ignores them.
    pub fn reserved_id_programs(&self) -> impl Iterator<Item = &ScheduledProgram> {
        self.enabled_programs().filter(|program| program.uses_reserved_id())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledProgram {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub behavior: Behavior,
}

impl ScheduledProgram {
    pub fn uses_reserved_id(&self) -> bool {
        self.id == DEFAULT_PROGRAM_ID
    }

    /// Whether evaluation may pick this entry at all.
    pub fn is_candidate(&self) -> bool {
        self.enabled && !self.uses_reserved_id()
    }

    /// Executable view handed to the convergence engine.
    pub fn to_program(&self) -> Program {
        Program {
            id: self.id.clone(),
            title: self.title.clone(),
            source_name: self.source.name.clone(),
            input_kind: self.source.input_kind.clone(),
            uri: self.source.uri.clone(),
            input_settings: self.source.input_settings.clone(),
            transform: self.source.transform.clone(),
            start: self.timing.start,
            end: self.timing.end,
        }
    }
}

/// Calendar display metadata. Carried for clients, ignored by evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct General {
    pub description: String,
    pub tags: Vec<String>,
    pub class_names: Vec<String>,
    pub text_color: String,
    pub background_color: String,
    pub border_color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    /// Technical input name; the engine prefixes it to build the remote name.
    pub name: String,
    pub input_kind: String,
    pub uri: String,
    pub input_settings: Settings,
    pub transform: Settings,
}

/// When a program runs.
///
/// For recurring programs `start` and `end` are time-of-day templates: only
/// their hour, minute and second are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    #[serde(default, with = "optional_timestamp")]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default, with = "optional_timestamp")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence: Recurrence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    /// Weekday tokens such as `MON`, `WED`, `FRI`.
    #[serde(default)]
    pub days_of_week: Vec<String>,
    #[serde(default, with = "optional_date")]
    pub start_recur: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub end_recur: Option<NaiveDate>,
}

impl Recurrence {
    /// True when `day` is inside the optional date bounds and falls on one of
    /// the listed weekdays.
    pub fn covers(&self, day: NaiveDate) -> bool {
        if self.start_recur.is_some_and(|first| day < first) {
            return false;
        }
        if self.end_recur.is_some_and(|last| day > last) {
            return false;
        }
        let weekday = chrono::Datelike::weekday(&day);
        self.days_of_week
            .iter()
            .filter_map(|token| parse_weekday(token))
            .any(|listed| listed == weekday)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Behavior {
    /// What the frontend asked for when the program ends (`hide`, `none`,
    /// `stop`).
    pub on_end_action: String,
    pub preload_seconds: i64,
}

/// Parse a three-letter weekday token, case-insensitively.
pub fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_uppercase().as_str() {
        "SUN" => Some(Weekday::Sun),
        "MON" => Some(Weekday::Mon),
        "TUE" => Some(Weekday::Tue),
        "WED" => Some(Weekday::Wed),
        "THU" => Some(Weekday::Thu),
        "FRI" => Some(Weekday::Fri),
        "SAT" => Some(Weekday::Sat),
        _ => None,
    }
}

mod optional_timestamp {
    use super::*;

    pub fn serialize<S>(
        value: &Option<DateTime<FixedOffset>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(timestamp) => serializer.serialize_str(&timestamp.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

mod optional_date {
    use super::*;

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
