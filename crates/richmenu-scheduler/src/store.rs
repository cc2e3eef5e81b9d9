use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveTime, Utc};
use richmenu_line::{LocalArea, MenuLayout, Size};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{
    Account, JobPatch, MenuDefinition, NewJob, NewMenuDefinition, Project, ScheduledJob,
};

/// Data access the scheduler needs from the editor database.
///
/// Lookups return `Ok(None)` for missing rows; callers decide whether that is
/// an error. Every write is independent; nothing here spans a transaction.
pub trait JobStore: Send + Sync {
    /// Enabled jobs whose window contains `today` and whose `run_time` equals
    /// `time_of_day` (`HH:MM`). Recurrence rules are not applied here.
    fn list_due(&self, today: NaiveDate, time_of_day: &str) -> Result<Vec<ScheduledJob>>;

    fn get(&self, job_id: i64) -> Result<Option<ScheduledJob>>;

    /// Apply the `Some` fields of `patch`. Fails with `NotFound` for an unknown id.
    fn update(&self, job_id: i64, patch: &JobPatch) -> Result<()>;

    /// Project with its menus in editor order.
    fn get_project(&self, project_id: i64) -> Result<Option<Project>>;

    fn get_account(&self, account_id: i64) -> Result<Option<Account>>;

    /// Record the id LINE assigned to a published menu.
    fn update_menu_definition(&self, menu_id: i64, rich_menu_id: &str) -> Result<()>;
}

const JOB_COLUMNS: &str = "id, project_id, scope, current_tab_index, publish_target, user_ids,
     default_menu_index, start_date, end_date, run_time, repeat_type, repeat_weekday,
     repeat_day, enabled, last_run_at, last_run_status, last_run_message, created_at, updated_at";

const MENU_COLUMNS: &str = "id, project_id, rich_menu_id, name, alias, chat_bar_text,
     size_width, size_height, selected, areas, image_path";

/// Format used for `run_time` columns and the selector's time-of-day key.
pub const RUN_TIME_FORMAT: &str = "%H:%M";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed [`JobStore`].
///
/// Uses its own `Connection` so the engine loop and HTTP handlers can share
/// one store through an `Arc` without conflicting statements.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::Unexpected("job store lock poisoned".to_string()))
    }

    pub fn create_account(&self, name: &str, channel_access_token: &str) -> Result<Account> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (name, channel_access_token, created_at) VALUES (?1, ?2, ?3)",
            params![name, channel_access_token, Utc::now().to_rfc3339()],
        )?;
        Ok(Account {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            channel_access_token: channel_access_token.to_string(),
        })
    }

    pub fn create_project(&self, account_id: i64, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO projects (account_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, '', ?3, ?3)",
            params![account_id, name, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_menu_definition(&self, project_id: i64, menu: &NewMenuDefinition) -> Result<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let areas = serde_json::to_string(&menu.layout.areas)
            .map_err(|e| SchedulerError::Unexpected(e.to_string()))?;
        conn.execute(
            "INSERT INTO rich_menus
             (project_id, name, alias, chat_bar_text, size_width, size_height, selected,
              areas, image_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                project_id,
                menu.name,
                menu.alias,
                menu.layout.chat_bar_text,
                menu.layout.size.width,
                menu.layout.size.height,
                menu.layout.selected,
                areas,
                menu.image_path,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Validate and insert a job. New jobs start enabled with no run history.
    pub fn create_job(&self, job: &NewJob) -> Result<ScheduledJob> {
        job.validate()?;
        let id = {
            let conn = self.conn()?;
            let now = Utc::now().to_rfc3339();
            let user_ids = if job.user_ids.is_empty() {
                None
            } else {
                Some(
                    serde_json::to_string(&job.user_ids)
                        .map_err(|e| SchedulerError::Unexpected(e.to_string()))?,
                )
            };
            conn.execute(
                "INSERT INTO scheduled_jobs
                 (project_id, scope, current_tab_index, publish_target, user_ids,
                  default_menu_index, start_date, end_date, run_time, repeat_type,
                  repeat_weekday, repeat_day, enabled, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,1,?13,?13)",
                params![
                    job.project_id,
                    job.scope.as_str(),
                    job.current_tab_index,
                    job.publish_target.as_str(),
                    user_ids,
                    job.default_menu_index,
                    job.start_date.format(DATE_FORMAT).to_string(),
                    job.end_date.format(DATE_FORMAT).to_string(),
                    job.run_time.format(RUN_TIME_FORMAT).to_string(),
                    job.repeat_type.as_str(),
                    job.repeat_weekday,
                    job.repeat_day,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };
        info!(job_id = id, project_id = job.project_id, repeat = %job.repeat_type, "job created");
        self.get(id)?
            .ok_or(SchedulerError::NotFound { what: "job", id })
    }
}

impl JobStore for SqliteJobStore {
    fn list_due(&self, today: NaiveDate, time_of_day: &str) -> Result<Vec<ScheduledJob>> {
        let conn = self.conn()?;
        let today = today.format(DATE_FORMAT).to_string();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs
             WHERE enabled = 1 AND start_date <= ?1 AND end_date >= ?1 AND run_time = ?2
             ORDER BY id"
        ))?;
        let jobs = stmt
            .query_map(params![today, time_of_day], job_from_row)?
            .filter_map(|r| match r {
                Ok(job) => Some(job),
                Err(e) => {
                    // A single malformed row must not hide every other due job.
                    warn!("skipping unreadable scheduled job: {e}");
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    fn get(&self, job_id: i64) -> Result<Option<ScheduledJob>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = ?1"),
                [job_id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn update(&self, job_id: i64, patch: &JobPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(enabled) = patch.enabled {
            sets.push("enabled = ?");
            values.push(Value::Integer(enabled as i64));
        }
        if let Some(ref at) = patch.last_run_at {
            sets.push("last_run_at = ?");
            values.push(Value::Text(at.clone()));
        }
        if let Some(status) = patch.last_run_status {
            sets.push("last_run_status = ?");
            values.push(Value::Text(status.to_string()));
        }
        if let Some(ref message) = patch.last_run_message {
            sets.push("last_run_message = ?");
            values.push(Value::Text(message.clone()));
        }
        sets.push("updated_at = ?");
        values.push(Value::Text(Utc::now().to_rfc3339()));
        values.push(Value::Integer(job_id));

        let sql = format!("UPDATE scheduled_jobs SET {} WHERE id = ?", sets.join(", "));
        let conn = self.conn()?;
        let n = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        if n == 0 {
            return Err(SchedulerError::NotFound {
                what: "job",
                id: job_id,
            });
        }
        Ok(())
    }

    fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        let conn = self.conn()?;
        let header = conn
            .query_row(
                "SELECT id, account_id, name FROM projects WHERE id = ?1",
                [project_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, account_id, name)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MENU_COLUMNS} FROM rich_menus
             WHERE project_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([id], menu_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let menus = rows
            .into_iter()
            .map(|(mut menu, raw_areas)| {
                menu.layout.areas = decode_areas(&menu.name, raw_areas.as_deref())?;
                Ok(menu)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Project {
            id,
            account_id,
            name,
            menus,
        }))
    }

    fn get_account(&self, account_id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT id, name, channel_access_token FROM accounts WHERE id = ?1",
                [account_id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        channel_access_token: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    fn update_menu_definition(&self, menu_id: i64, rich_menu_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE rich_menus SET rich_menu_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![rich_menu_id, Utc::now().to_rfc3339(), menu_id],
        )?;
        if n == 0 {
            return Err(SchedulerError::NotFound {
                what: "rich menu",
                id: menu_id,
            });
        }
        Ok(())
    }
}

// --- row mapping -----------------------------------------------------------

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => text
            .parse::<T>()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn parse_run_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let text: String = row.get(idx)?;
    NaiveTime::parse_from_str(&text, RUN_TIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledJob> {
    let user_ids = row
        .get::<_, Option<String>>(5)?
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    Ok(ScheduledJob {
        id: row.get(0)?,
        project_id: row.get(1)?,
        scope: parse_text(row, 2)?,
        current_tab_index: row.get(3)?,
        publish_target: parse_text(row, 4)?,
        user_ids,
        default_menu_index: row.get(6)?,
        start_date: parse_text(row, 7)?,
        end_date: parse_text(row, 8)?,
        run_time: parse_run_time(row, 9)?,
        repeat_type: parse_text(row, 10)?,
        repeat_weekday: row.get(11)?,
        repeat_day: row.get(12)?,
        enabled: row.get::<_, i64>(13)? != 0,
        last_run_at: row.get(14)?,
        last_run_status: parse_opt_text(row, 15)?,
        last_run_message: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

/// Map a menu row. Areas come back undecoded so a bad area can be reported
/// against the menu it belongs to.
fn menu_from_row(row: &Row<'_>) -> rusqlite::Result<(MenuDefinition, Option<String>)> {
    let menu = MenuDefinition {
        id: row.get(0)?,
        project_id: row.get(1)?,
        rich_menu_id: row.get(2)?,
        name: row.get(3)?,
        alias: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        layout: MenuLayout {
            size: Size {
                width: row.get(6)?,
                height: row.get(7)?,
            },
            selected: row.get::<_, i64>(8)? != 0,
            chat_bar_text: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            areas: Vec::new(),
        },
        image_path: row.get(10)?,
    };
    Ok((menu, row.get(9)?))
}

/// Decode the stored areas of menu `name` one by one.
///
/// `NULL` or blank means no areas. Anything unreadable fails the whole menu
/// rather than publishing it with placeholder actions.
fn decode_areas(name: &str, raw: Option<&str>) -> Result<Vec<LocalArea>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Vec::new()),
        Some(raw) => raw,
    };
    let items: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|e| {
        SchedulerError::PreconditionFailed(format!(
            "rich menu \"{name}\" has unreadable areas: {e}"
        ))
    })?;
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<LocalArea>(item).map_err(|e| {
                SchedulerError::PreconditionFailed(format!(
                    "rich menu \"{name}\" has a malformed area {i}: {e}"
                ))
            })
        })
        .collect()
}
