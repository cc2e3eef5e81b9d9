//! `richmenu-scheduler` — timed publishing of rich menus to LINE.
//!
//! # Overview
//!
//! Scheduled jobs live in the editor's SQLite database next to the accounts,
//! projects and menu definitions they refer to. The [`engine::SchedulerEngine`]
//! wakes once per poll interval, reads the wall clock in the configured
//! timezone and runs every job due at that minute through the
//! [`pipeline::Publisher`], one job at a time.
//!
//! # Recurrence
//!
//! | `repeat_type` | Fires when (inside the start/end window, at `run_time`) |
//! |---------------|---------------------------------------------------------|
//! | `daily`       | Every day                                               |
//! | `weekly`      | `repeat_weekday` matches (0 = Monday)                   |
//! | `monthly`     | `repeat_day` matches the day of month                   |
//! | `once`        | Today is `start_date`; disabled after the attempt        |
//!
//! A job that already ran on the current calendar day is skipped.

pub mod db;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod schedule;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutil;

pub use encoder::ImageEncoder;
pub use engine::{CheckSummary, SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use pipeline::{PublishReport, Publisher, Trigger, UploadedMenu};
pub use store::{JobStore, SqliteJobStore};
pub use types::{
    Account, JobPatch, MenuDefinition, NewJob, NewMenuDefinition, Project, PublishTarget,
    RepeatType, RunStatus, ScheduledJob, Scope,
};
