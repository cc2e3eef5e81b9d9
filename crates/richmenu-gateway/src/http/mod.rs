use axum::{http::StatusCode, Json};
use richmenu_scheduler::SchedulerError;
use serde_json::{json, Value};

pub mod health;
pub mod schedules;

/// Error half of every handler's return type.
pub type ApiError = (StatusCode, Json<Value>);

pub fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::PreconditionFailed(_) | SchedulerError::InvalidSchedule(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SchedulerError::UpstreamRejected { .. } | SchedulerError::UpstreamUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        SchedulerError::Database(_) | SchedulerError::Image(_) | SchedulerError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn api_error(err: &SchedulerError) -> ApiError {
    (
        status_for(err),
        Json(json!({
            "ok": false,
            "code": err.code(),
            "message": err.to_string(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (
                SchedulerError::NotFound { what: "job", id: 1 },
                StatusCode::NOT_FOUND,
            ),
            (
                SchedulerError::PreconditionFailed("no menus".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SchedulerError::UpstreamRejected {
                    call: "create rich menu",
                    status: 400,
                    body: "bad".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                SchedulerError::UpstreamUnavailable {
                    call: "upload image",
                    reason: "timeout".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                SchedulerError::Unexpected("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err}");
        }
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let (status, Json(body)) = api_error(&SchedulerError::NotFound { what: "job", id: 7 });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "job #7 not found");
    }
}
