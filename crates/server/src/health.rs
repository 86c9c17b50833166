use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use leadline_db::DbPool;
use serde::Serialize;
use tracing::error;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let service = HealthCheck { status: "ok", detail: "accepting requests".to_string() };

    let healthy = database.status == "ok";
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        service,
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code =
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(response))
}

async fn database_check(db_pool: &DbPool) -> HealthCheck {
    match sqlx::query("SELECT 1").execute(db_pool).await {
        Ok(_) => HealthCheck { status: "ok", detail: "reachable".to_string() },
        Err(db_error) => {
            error!(error = %db_error, "health check database ping failed");
            HealthCheck { status: "error", detail: db_error.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use super::router;

    #[tokio::test]
    async fn health_reports_ok_with_a_reachable_database() {
        let pool =
            leadline_db::connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        leadline_db::migrations::run_pending(&pool).await.expect("migrations");

        let response = router(pool)
            .oneshot(Request::get("/health").body(axum::body::Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"]["status"], "ok");
    }
}
