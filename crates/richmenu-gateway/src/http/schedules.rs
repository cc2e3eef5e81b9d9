//! Manual trigger endpoint — POST /schedules/{id}/run-now.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{api_error, ApiError};
use crate::app::AppState;
use richmenu_scheduler::pipeline::MANUAL_SUCCESS_MESSAGE;

/// POST /schedules/{id}/run-now
///
/// Publishes the job immediately, regardless of its window, time or enabled
/// flag. The outcome is recorded on the job either way.
pub async fn run_now_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    match state.scheduler.run_now(id).await {
        Ok(report) => {
            info!(job_id = id, menus = report.uploaded.len(), "manual run succeeded");
            Ok(Json(json!({
                "ok": true,
                "data": {
                    "status": "success",
                    "message": MANUAL_SUCCESS_MESSAGE,
                },
            })))
        }
        Err(e) => {
            warn!(job_id = id, code = e.code(), "manual run failed: {e}");
            Err(api_error(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use richmenu_core::config::{LineConfig, RichMenuConfig};
    use richmenu_line::LineClient;
    use richmenu_scheduler::{
        ImageEncoder, JobStore, NewJob, Publisher, PublishTarget, RepeatType, RunStatus,
        SchedulerEngine, Scope, SqliteJobStore,
    };
    use std::time::Duration;

    // LINE is never reached: every case fails before the first call.
    fn state() -> (Arc<AppState>, Arc<SqliteJobStore>) {
        let store =
            Arc::new(SqliteJobStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let client = Arc::new(LineClient::new(&LineConfig::default()).unwrap());
        let publisher =
            Publisher::new(store.clone(), client, ImageEncoder::default(), "/nonexistent");
        let engine =
            SchedulerEngine::new(publisher, chrono_tz::Asia::Taipei, Duration::from_secs(60));
        let state = Arc::new(AppState::new(RichMenuConfig::default(), engine.handle()));
        (state, store)
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let (state, _) = state();
        let (status, Json(body)) = run_now_handler(State(state), Path(99)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn project_without_menus_is_422_and_recorded() {
        let (state, store) = state();
        let account = store.create_account("shop", "token").unwrap();
        let project_id = store.create_project(account.id, "Empty").unwrap();
        let job = store
            .create_job(&NewJob {
                project_id,
                scope: Scope::All,
                current_tab_index: 0,
                publish_target: PublishTarget::All,
                user_ids: Vec::new(),
                default_menu_index: -1,
                start_date: "2026-10-01".parse().unwrap(),
                end_date: "2026-10-31".parse().unwrap(),
                run_time: "09:30:00".parse().unwrap(),
                repeat_type: RepeatType::Daily,
                repeat_weekday: None,
                repeat_day: None,
            })
            .unwrap();

        let (status, Json(body)) = run_now_handler(State(state), Path(job.id))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "PRECONDITION_FAILED");

        let stored = store.get(job.id).unwrap().unwrap();
        assert_eq!(stored.last_run_status, Some(RunStatus::Error));
    }
}
