use rusqlite::Connection;

use crate::error::Result;

/// Initialise the publishing schema in `conn`. Safe to call on every startup.
///
/// The editor owns accounts, projects and menus; the scheduler only reads them
/// (and writes back `rich_menus.rich_menu_id`), but creates the tables so a
/// fresh database is usable on its own.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            name                 TEXT    NOT NULL UNIQUE,
            channel_access_token TEXT    NOT NULL,
            created_at           TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id  INTEGER NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
            name        TEXT    NOT NULL,
            description TEXT,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL,
            UNIQUE (account_id, name)
        );

        CREATE TABLE IF NOT EXISTS rich_menus (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id    INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
            rich_menu_id  TEXT,               -- assigned by LINE on publish
            name          TEXT    NOT NULL,
            alias         TEXT,
            chat_bar_text TEXT,
            size_width    INTEGER NOT NULL DEFAULT 2500,
            size_height   INTEGER NOT NULL DEFAULT 1686,
            selected      INTEGER NOT NULL DEFAULT 1,
            areas         TEXT,               -- JSON array of {bounds, action}
            image_path    TEXT,               -- relative to the upload dir
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id         INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
            scope              TEXT    NOT NULL DEFAULT 'all',
            current_tab_index  INTEGER NOT NULL DEFAULT 0,
            publish_target     TEXT    NOT NULL DEFAULT 'all',
            user_ids           TEXT,               -- JSON array or NULL
            default_menu_index INTEGER NOT NULL DEFAULT -1,
            start_date         TEXT    NOT NULL,   -- YYYY-MM-DD
            end_date           TEXT    NOT NULL,   -- YYYY-MM-DD
            run_time           TEXT    NOT NULL DEFAULT '00:00',
            repeat_type        TEXT    NOT NULL DEFAULT 'daily',
            repeat_weekday     INTEGER,
            repeat_day         INTEGER,
            enabled            INTEGER NOT NULL DEFAULT 1,
            last_run_at        TEXT,
            last_run_status    TEXT,
            last_run_message   TEXT,
            created_at         TEXT    NOT NULL,
            updated_at         TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rich_menus_project ON rich_menus (project_id);

        -- Polling: WHERE enabled = 1 AND run_time = ?
        CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_due ON scheduled_jobs (enabled, run_time);
        ",
    )?;
    Ok(())
}
