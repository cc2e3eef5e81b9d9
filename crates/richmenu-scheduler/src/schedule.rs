use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::Result;
use crate::store::{JobStore, RUN_TIME_FORMAT};
use crate::types::{RepeatType, ScheduledJob};

/// One wall-clock reading, taken once per check.
///
/// Every job evaluated in the same check sees the same date, minute and
/// weekday, even if the check itself runs across a minute boundary.
#[derive(Debug, Clone)]
pub struct Moment {
    pub now: DateTime<Tz>,
    pub today: NaiveDate,
    /// `HH:MM`, zero padded.
    pub time_of_day: String,
    /// 0 = Monday … 6 = Sunday.
    pub weekday: u32,
    /// 1-31.
    pub day_of_month: u32,
}

impl Moment {
    pub fn at(now: DateTime<Tz>) -> Self {
        Self {
            today: now.date_naive(),
            time_of_day: now.format(RUN_TIME_FORMAT).to_string(),
            weekday: now.weekday().num_days_from_monday(),
            day_of_month: now.day(),
            now,
        }
    }
}

/// Whether the job's recurrence rule fires on this day.
///
/// Window and time-of-day are checked by the store query; this only applies
/// the rule itself.
pub fn matches_recurrence(job: &ScheduledJob, moment: &Moment) -> bool {
    match job.repeat_type {
        RepeatType::Daily => true,
        RepeatType::Weekly => job.repeat_weekday == Some(moment.weekday),
        RepeatType::Monthly => job.repeat_day == Some(moment.day_of_month),
        RepeatType::Once => job.start_date == moment.today,
    }
}

/// Whether `last_run_at` falls on `moment`'s calendar day.
///
/// Timestamps are compared in the moment's timezone. A value that is not
/// RFC 3339 falls back to comparing its `YYYY-MM-DD` prefix.
pub fn ran_today(job: &ScheduledJob, moment: &Moment) -> bool {
    let Some(ref last) = job.last_run_at else {
        return false;
    };
    match DateTime::parse_from_rfc3339(last) {
        Ok(at) => at.with_timezone(&moment.now.timezone()).date_naive() == moment.today,
        Err(_) => last.get(..10) == Some(moment.today.format("%Y-%m-%d").to_string().as_str()),
    }
}

/// Jobs due at `moment`, in store order.
///
/// Applies the recurrence rule and the once-per-day guard on top of the
/// store's window/time query. Pure read; nothing is written.
pub fn select_due(store: &dyn JobStore, moment: &Moment) -> Result<Vec<ScheduledJob>> {
    let candidates = store.list_due(moment.today, &moment.time_of_day)?;
    let due = candidates
        .into_iter()
        .filter(|job| matches_recurrence(job, moment))
        .filter(|job| {
            let ran = ran_today(job, moment);
            if ran {
                debug!(job_id = job.id, "already ran today, skipping");
            }
            !ran
        })
        .collect();
    Ok(due)
}
