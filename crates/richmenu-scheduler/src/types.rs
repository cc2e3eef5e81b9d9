use chrono::{NaiveDate, NaiveTime};
use richmenu_line::MenuLayout;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Which of a project's menus a job publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every menu of the project, in project order.
    All,
    /// Only the menu at `current_tab_index`.
    Single,
}

/// What happens after the menus are uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTarget {
    /// Set a default menu for every user of the channel.
    All,
    /// Link the first uploaded menu to each listed user.
    Users,
}

/// Recurrence rule. Only these four are supported; there is no cron syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    Daily,
    /// On `repeat_weekday` (0 = Monday … 6 = Sunday).
    Weekly,
    /// On `repeat_day` of the month (1-31).
    Monthly,
    /// On `start_date` only; the job disables itself after the attempt.
    Once,
}

/// Outcome of the most recent execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(Scope, "scope", { All => "all", Single => "single" });
text_enum!(PublishTarget, "publish target", { All => "all", Users => "users" });
text_enum!(RepeatType, "repeat type", {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
    Once => "once",
});
text_enum!(RunStatus, "run status", { Success => "success", Error => "error" });

/// A persisted scheduled publishing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub project_id: i64,
    pub scope: Scope,
    /// Index into the project's menus; used only when `scope` is `Single`.
    pub current_tab_index: i64,
    pub publish_target: PublishTarget,
    /// LINE user ids, in binding order. Only used with `PublishTarget::Users`.
    pub user_ids: Vec<String>,
    /// Index into the uploaded menus; -1 means "no explicit default".
    pub default_menu_index: i64,
    /// First day of the window (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the window (inclusive).
    pub end_date: NaiveDate,
    /// Wall-clock minute the job fires at. Seconds are always zero.
    pub run_time: NaiveTime,
    pub repeat_type: RepeatType,
    pub repeat_weekday: Option<u32>,
    pub repeat_day: Option<u32>,
    pub enabled: bool,
    /// RFC 3339 timestamp of the most recent attempt.
    pub last_run_at: Option<String>,
    pub last_run_status: Option<RunStatus>,
    pub last_run_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: i64,
    pub scope: Scope,
    pub current_tab_index: i64,
    pub publish_target: PublishTarget,
    pub user_ids: Vec<String>,
    pub default_menu_index: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub run_time: NaiveTime,
    pub repeat_type: RepeatType,
    pub repeat_weekday: Option<u32>,
    pub repeat_day: Option<u32>,
}

impl NewJob {
    /// Reject definitions the selector could never match or the pipeline
    /// could never finish.
    pub fn validate(&self) -> Result<()> {
        match self.repeat_type {
            RepeatType::Weekly if !matches!(self.repeat_weekday, Some(0..=6)) => {
                return Err(SchedulerError::InvalidSchedule(
                    "weekly jobs need repeat_weekday 0-6 (Monday = 0)".to_string(),
                ));
            }
            RepeatType::Monthly if !matches!(self.repeat_day, Some(1..=31)) => {
                return Err(SchedulerError::InvalidSchedule(
                    "monthly jobs need repeat_day 1-31".to_string(),
                ));
            }
            _ => {}
        }
        if self.start_date > self.end_date {
            return Err(SchedulerError::InvalidSchedule(
                "start_date is after end_date".to_string(),
            ));
        }
        if self.publish_target == PublishTarget::Users && self.user_ids.is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "publishing to users needs at least one user id".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update of a job. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub enabled: Option<bool>,
    pub last_run_at: Option<String>,
    pub last_run_status: Option<RunStatus>,
    pub last_run_message: Option<String>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self == &JobPatch::default()
    }
}

/// A LINE channel whose access token authenticates every publish call.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub channel_access_token: String,
}

/// One locally edited rich menu.
#[derive(Debug, Clone)]
pub struct MenuDefinition {
    pub id: i64,
    pub project_id: i64,
    /// Id LINE assigned on the most recent successful publish.
    pub rich_menu_id: Option<String>,
    pub name: String,
    /// Empty when the menu has no alias.
    pub alias: String,
    pub layout: MenuLayout,
    /// Path of the source image, relative to the upload directory.
    pub image_path: Option<String>,
}

/// Fields required to create a menu definition.
#[derive(Debug, Clone, Default)]
pub struct NewMenuDefinition {
    pub name: String,
    pub alias: String,
    pub layout: MenuLayout,
    pub image_path: Option<String>,
}

/// A project together with its menus, in editor order.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub menus: Vec<MenuDefinition>,
}
