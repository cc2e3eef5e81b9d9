//! Publishing one scheduled job end to end.
//!
//! For every selected menu, strictly in order: delete LINE menus with the
//! same name, create the menu object, upload its image, reconcile its alias
//! and write the LINE id back to the local definition. Any failure there
//! aborts the whole job. A menu object created before a failed upload is
//! left on LINE; the recorded error message is the operator's cue to clean
//! it up.
//!
//! After every menu is uploaded, the job either sets a default menu for all
//! users or links the first menu to each listed user. A failed per-user link
//! is logged and skipped.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use richmenu_core::config::MAX_RUN_MESSAGE_CHARS;
use richmenu_core::truncate::truncate_chars;
use richmenu_line::{build_descriptor, PublishClient};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::encoder::ImageEncoder;
use crate::error::{Result, SchedulerError};
use crate::store::JobStore;
use crate::types::{
    Account, JobPatch, MenuDefinition, PublishTarget, RepeatType, RunStatus, ScheduledJob, Scope,
};

/// Message recorded after a successful polled run.
pub const SCHEDULED_SUCCESS_MESSAGE: &str = "upload complete";
/// Message recorded after a successful manual run.
pub const MANUAL_SUCCESS_MESSAGE: &str = "manual trigger succeeded";

/// Who started a run. Only changes the recorded success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    fn success_message(self) -> &'static str {
        match self {
            Trigger::Scheduled => SCHEDULED_SUCCESS_MESSAGE,
            Trigger::Manual => MANUAL_SUCCESS_MESSAGE,
        }
    }
}

/// A menu that made it to LINE during this run.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedMenu {
    pub menu_id: i64,
    pub name: String,
    pub rich_menu_id: String,
}

/// What a successful run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub uploaded: Vec<UploadedMenu>,
    /// LINE id set as the default for all users, if any.
    pub default_rich_menu_id: Option<String>,
    pub linked_users: Vec<String>,
    pub failed_users: Vec<String>,
}

/// Runs the publishing steps for one job and records the outcome.
pub struct Publisher {
    store: Arc<dyn JobStore>,
    client: Arc<dyn PublishClient>,
    encoder: ImageEncoder,
    upload_dir: PathBuf,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn PublishClient>,
        encoder: ImageEncoder,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            client,
            encoder,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Publish `job`, then record the outcome on it.
    ///
    /// The outcome is written whether publishing succeeded or not, and a
    /// `once` job is disabled afterwards either way. The publishing result is
    /// returned unchanged so the caller can decide whether to surface it.
    pub async fn run(
        &self,
        job: &ScheduledJob,
        trigger: Trigger,
        now: DateTime<Tz>,
    ) -> Result<PublishReport> {
        info!(
            job_id = job.id,
            project_id = job.project_id,
            scope = %job.scope,
            repeat = %job.repeat_type,
            "publishing job"
        );
        let result = self.publish(job).await;

        if let Err(e) = self.record(job, &result, trigger, now) {
            error!(job_id = job.id, "failed to record run outcome: {e}");
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }

    /// Write `last_run_*`, then disable a `once` job. Two separate writes.
    fn record(
        &self,
        job: &ScheduledJob,
        result: &Result<PublishReport>,
        trigger: Trigger,
        now: DateTime<Tz>,
    ) -> Result<()> {
        let (status, message) = match result {
            Ok(_) => (RunStatus::Success, trigger.success_message().to_string()),
            Err(e) => (
                RunStatus::Error,
                truncate_chars(&e.to_string(), MAX_RUN_MESSAGE_CHARS),
            ),
        };
        self.store.update(
            job.id,
            &JobPatch {
                last_run_at: Some(now.to_rfc3339()),
                last_run_status: Some(status),
                last_run_message: Some(message),
                ..Default::default()
            },
        )?;

        if job.repeat_type == RepeatType::Once {
            self.store.update(
                job.id,
                &JobPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )?;
            info!(job_id = job.id, "one-shot job disabled");
        }
        Ok(())
    }

    async fn publish(&self, job: &ScheduledJob) -> Result<PublishReport> {
        let project = self
            .store
            .get_project(job.project_id)?
            .ok_or(SchedulerError::NotFound {
                what: "project",
                id: job.project_id,
            })?;
        let account = self
            .store
            .get_account(project.account_id)?
            .ok_or(SchedulerError::NotFound {
                what: "account",
                id: project.account_id,
            })?;
        if project.menus.is_empty() {
            return Err(SchedulerError::PreconditionFailed(format!(
                "project \"{}\" has no rich menus",
                project.name
            )));
        }

        let selected = select_menus(job, &project.menus)?;
        info!(
            job_id = job.id,
            project = %project.name,
            account_id = account.id,
            menus = selected.len(),
            "uploading rich menus"
        );

        let mut report = PublishReport::default();
        for (i, menu) in selected.iter().enumerate() {
            let uploaded = self.publish_menu(&account, menu, i, selected.len()).await?;
            report.uploaded.push(uploaded);
        }

        self.assign(job, &account, &mut report).await?;
        Ok(report)
    }

    async fn publish_menu(
        &self,
        account: &Account,
        menu: &MenuDefinition,
        index: usize,
        total: usize,
    ) -> Result<UploadedMenu> {
        let token = account.channel_access_token.as_str();
        let name = display_name(menu, index);
        let step = format!("{}/{}", index + 1, total);

        let image_path = menu
            .image_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                SchedulerError::PreconditionFailed(format!("\"{name}\" has no image"))
            })?;
        let full_path = self.upload_dir.join(image_path);
        if !full_path.is_file() {
            return Err(SchedulerError::PreconditionFailed(format!(
                "image file for \"{name}\" does not exist: {image_path}"
            )));
        }

        let descriptor = build_descriptor(&name, &menu.layout);

        info!(step = %step, menu = %name, "removing same-name menus");
        self.delete_same_name(token, &name).await;

        info!(step = %step, menu = %name, "creating rich menu");
        let rich_menu_id = self
            .client
            .create_menu(token, &descriptor)
            .await
            .map_err(|e| SchedulerError::upstream("create rich menu", e))?;

        info!(step = %step, menu = %name, image = %image_path, "uploading image");
        let encoder = self.encoder;
        let encoded = tokio::task::spawn_blocking(move || encoder.encode_file(&full_path))
            .await
            .map_err(|e| SchedulerError::Unexpected(format!("image encoder task failed: {e}")))??;
        let content_type = encoded.content_type();
        self.client
            .upload_content(token, &rich_menu_id, content_type, encoded.bytes)
            .await
            .map_err(|e| SchedulerError::upstream("upload image", e))?;

        let alias = menu.alias.trim();
        if !alias.is_empty() {
            self.sync_alias(token, alias, &rich_menu_id).await;
        }

        self.store.update_menu_definition(menu.id, &rich_menu_id)?;
        info!(menu = %name, remote_id = %rich_menu_id, "rich menu uploaded");

        Ok(UploadedMenu {
            menu_id: menu.id,
            name,
            rich_menu_id,
        })
    }

    /// Best effort: a failed list or delete only leaves a duplicate behind.
    async fn delete_same_name(&self, token: &str, name: &str) {
        let existing = match self.client.list_menus(token).await {
            Ok(menus) => menus,
            Err(e) => {
                warn!(menu = %name, "could not list rich menus, skipping cleanup: {e}");
                return;
            }
        };
        for remote in existing.iter().filter(|m| m.name == name) {
            if let Err(e) = self.client.delete_menu(token, &remote.rich_menu_id).await {
                warn!(remote_id = %remote.rich_menu_id, "could not delete same-name menu: {e}");
            }
        }
    }

    /// Point `alias` at `rich_menu_id`: update first, create only if LINE
    /// says the alias does not exist. Failures are logged, not fatal.
    async fn sync_alias(&self, token: &str, alias: &str, rich_menu_id: &str) {
        match self.client.update_alias(token, alias, rich_menu_id).await {
            Ok(()) => {}
            Err(e) if e.is_missing_alias() => {
                if let Err(e) = self.client.create_alias(token, alias, rich_menu_id).await {
                    warn!(alias, remote_id = %rich_menu_id, "alias create failed: {e}");
                }
            }
            Err(e) => warn!(alias, remote_id = %rich_menu_id, "alias update failed: {e}"),
        }
    }

    async fn assign(
        &self,
        job: &ScheduledJob,
        account: &Account,
        report: &mut PublishReport,
    ) -> Result<()> {
        let token = account.channel_access_token.as_str();
        let Some(first) = report.uploaded.first().map(|m| m.rich_menu_id.clone()) else {
            return Ok(());
        };

        let explicit = usize::try_from(job.default_menu_index)
            .ok()
            .and_then(|i| report.uploaded.get(i))
            .map(|m| m.rich_menu_id.clone());

        let default = match (explicit, job.publish_target) {
            (Some(id), _) => Some(id),
            (None, PublishTarget::All) if job.default_menu_index < 0 => Some(first.clone()),
            _ => None,
        };
        if let Some(id) = default {
            self.client
                .set_default(token, &id)
                .await
                .map_err(|e| SchedulerError::upstream("set default rich menu", e))?;
            info!(job_id = job.id, remote_id = %id, "default rich menu set");
            report.default_rich_menu_id = Some(id);
        }

        if job.publish_target == PublishTarget::Users {
            for user_id in &job.user_ids {
                match self.client.link_user(token, user_id, &first).await {
                    Ok(()) => report.linked_users.push(user_id.clone()),
                    Err(e) => {
                        warn!(job_id = job.id, user_id = %user_id, "linking user failed: {e}");
                        report.failed_users.push(user_id.clone());
                    }
                }
            }
            info!(
                job_id = job.id,
                linked = report.linked_users.len(),
                failed = report.failed_users.len(),
                "rich menu linked to users"
            );
        }
        Ok(())
    }
}

fn select_menus<'a>(
    job: &ScheduledJob,
    menus: &'a [MenuDefinition],
) -> Result<Vec<&'a MenuDefinition>> {
    match job.scope {
        Scope::All => Ok(menus.iter().collect()),
        Scope::Single => usize::try_from(job.current_tab_index)
            .ok()
            .and_then(|i| menus.get(i))
            .map(|m| vec![m])
            .ok_or_else(|| {
                SchedulerError::PreconditionFailed(format!(
                    "tab index {} is out of range ({} menus)",
                    job.current_tab_index,
                    menus.len()
                ))
            }),
    }
}

fn display_name(menu: &MenuDefinition, index: usize) -> String {
    if menu.name.trim().is_empty() {
        format!("Rich Menu {}", index + 1)
    } else {
        menu.name.clone()
    }
}
