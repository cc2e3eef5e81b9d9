//! Shared fixtures for the scheduler's unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use richmenu_line::{LineError, PublishClient, RemoteMenu, RichMenuDescriptor};
use rusqlite::Connection;

use crate::store::SqliteJobStore;
use crate::types::{NewJob, NewMenuDefinition, PublishTarget, RepeatType, Scope};

pub struct Fixture {
    pub account_id: i64,
    pub project_id: i64,
    pub menu_ids: Vec<i64>,
}

/// In-memory store with one account, one project and a menu per name.
/// Each menu points at `<name>.png` in the upload dir.
pub fn store_with_project(menu_names: &[&str]) -> (SqliteJobStore, Fixture) {
    let store = SqliteJobStore::new(Connection::open_in_memory().unwrap()).unwrap();
    let account = store.create_account("shop", "token-123").unwrap();
    let project_id = store.create_project(account.id, "Autumn").unwrap();
    let menu_ids = menu_names
        .iter()
        .map(|name| {
            store
                .create_menu_definition(
                    project_id,
                    &NewMenuDefinition {
                        name: name.to_string(),
                        image_path: Some(format!("{name}.png")),
                        ..Default::default()
                    },
                )
                .unwrap()
        })
        .collect();
    (
        store,
        Fixture {
            account_id: account.id,
            project_id,
            menu_ids,
        },
    )
}

pub fn daily_job(project_id: i64, start: &str, end: &str, run_time: &str) -> NewJob {
    NewJob {
        project_id,
        scope: Scope::All,
        current_tab_index: 0,
        publish_target: PublishTarget::All,
        user_ids: Vec::new(),
        default_menu_index: -1,
        start_date: start.parse().unwrap(),
        end_date: end.parse().unwrap(),
        run_time: chrono::NaiveTime::parse_from_str(run_time, "%H:%M").unwrap(),
        repeat_type: RepeatType::Daily,
        repeat_weekday: None,
        repeat_day: None,
    }
}

/// Write a small opaque PNG named `name` into `dir`.
pub fn write_png(dir: &Path, name: &str) {
    let img = image::RgbImage::from_fn(64, 43, |x, y| image::Rgb([x as u8 * 4, y as u8 * 5, 128]));
    img.save(dir.join(name)).unwrap();
}

/// [`PublishClient`] fake that records every call as a short string.
///
/// Every field is public so tests can use struct-update syntax.
#[derive(Default)]
pub struct RecordingClient {
    pub calls: Mutex<Vec<String>>,
    /// Last id handed out by `create_menu`; ids are `rm-1`, `rm-2`, ...
    pub next_id: Mutex<u32>,
    pub existing: Vec<RemoteMenu>,
    pub fail_list: bool,
    pub fail_delete: bool,
    pub fail_create: bool,
    pub fail_upload: bool,
    pub fail_default: bool,
    /// Update-alias answers 404, which triggers the create fallback.
    pub missing_alias: bool,
    /// Update-alias answers with this status instead.
    pub alias_status: Option<u16>,
    pub fail_create_alias: bool,
    pub fail_link: HashSet<String>,
}

impl RecordingClient {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn rejected(status: u16) -> LineError {
    LineError::Rejected {
        status,
        body: "rejected by fake".to_string(),
    }
}

#[async_trait]
impl PublishClient for RecordingClient {
    async fn list_menus(&self, _token: &str) -> richmenu_line::Result<Vec<RemoteMenu>> {
        self.record("list".to_string());
        if self.fail_list {
            return Err(LineError::Unavailable("connection reset".to_string()));
        }
        Ok(self.existing.clone())
    }

    async fn delete_menu(&self, _token: &str, rich_menu_id: &str) -> richmenu_line::Result<()> {
        self.record(format!("delete {rich_menu_id}"));
        if self.fail_delete {
            return Err(rejected(404));
        }
        Ok(())
    }

    async fn create_menu(
        &self,
        _token: &str,
        descriptor: &RichMenuDescriptor,
    ) -> richmenu_line::Result<String> {
        self.record(format!("create {}", descriptor.name));
        if self.fail_create {
            return Err(rejected(400));
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(format!("rm-{}", *next))
    }

    async fn upload_content(
        &self,
        _token: &str,
        rich_menu_id: &str,
        content_type: &str,
        _bytes: Vec<u8>,
    ) -> richmenu_line::Result<()> {
        self.record(format!("upload {rich_menu_id} {content_type}"));
        if self.fail_upload {
            return Err(LineError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }

    async fn update_alias(
        &self,
        _token: &str,
        alias_id: &str,
        rich_menu_id: &str,
    ) -> richmenu_line::Result<()> {
        self.record(format!("update-alias {alias_id} {rich_menu_id}"));
        if self.missing_alias {
            return Err(rejected(404));
        }
        if let Some(status) = self.alias_status {
            return Err(rejected(status));
        }
        Ok(())
    }

    async fn create_alias(
        &self,
        _token: &str,
        alias_id: &str,
        rich_menu_id: &str,
    ) -> richmenu_line::Result<()> {
        self.record(format!("create-alias {alias_id} {rich_menu_id}"));
        if self.fail_create_alias {
            return Err(rejected(400));
        }
        Ok(())
    }

    async fn set_default(&self, _token: &str, rich_menu_id: &str) -> richmenu_line::Result<()> {
        self.record(format!("default {rich_menu_id}"));
        if self.fail_default {
            return Err(rejected(500));
        }
        Ok(())
    }

    async fn link_user(
        &self,
        _token: &str,
        user_id: &str,
        rich_menu_id: &str,
    ) -> richmenu_line::Result<()> {
        self.record(format!("link {user_id} {rich_menu_id}"));
        if self.fail_link.contains(user_id) {
            return Err(rejected(400));
        }
        Ok(())
    }
}
