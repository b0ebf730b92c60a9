use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskpool_core::{PoolError, Task, TaskState};
use taskpool_worker::{PoolStats, WorkerPool};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// HTTP routes over a worker pool
pub fn create_router(pool: Arc<WorkerPool>) -> Router {
    Router::new()
        .route("/enqueue", post(enqueue_task))
        .route("/healthz", get(health_check))
        .route("/tasks/:task_id", get(get_task))
        .route("/stats", get(get_stats))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

/// Enqueue body. Missing and `null` fields take their zero values.
#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    max_retries: Option<i64>,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    id: String,
    state: TaskState,
}

/// Submit a task to the pool
async fn enqueue_task(
    State(pool): State<Arc<WorkerPool>>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    // decoded regardless of Content-Type
    let req: EnqueueRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "rejected enqueue body");
        ApiError::BadRequest("bad request".to_string())
    })?;

    let id = req.id.unwrap_or_default();
    let max_retries = u32::try_from(req.max_retries.unwrap_or(0)).ok();
    let max_retries = match max_retries {
        Some(max_retries) if !id.is_empty() => max_retries,
        _ => {
            return Err(ApiError::BadRequest(
                "invalid task: id required, max_retries >=0".to_string(),
            ))
        }
    };

    let task = Task::new(id.clone(), req.payload.unwrap_or_default())
        .with_max_retries(max_retries);
    pool.enqueue(task)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            id,
            state: TaskState::Queued,
        }),
    ))
}

/// Get the latest snapshot of a task
async fn get_task(
    State(pool): State<Arc<WorkerPool>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    pool.state(&task_id).map(Json).ok_or(ApiError::NotFound)
}

async fn get_stats(State(pool): State<Arc<WorkerPool>>) -> Json<PoolStats> {
    Json(pool.stats())
}

async fn get_metrics(State(pool): State<Arc<WorkerPool>>) -> Result<Response, ApiError> {
    let body = pool
        .render_metrics()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// API error type
#[derive(Debug)]
enum ApiError {
    NotFound,
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::QueueFull { .. } | PoolError::Closed => {
                ApiError::Unavailable(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use taskpool_core::WorkError;
    use taskpool_worker::PoolConfig;
    use tower::ServiceExt;

    fn test_pool(workers: usize, queue_size: usize) -> Arc<WorkerPool> {
        let handler = |_task: Task| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<(), WorkError>(())
        };
        let config = PoolConfig {
            workers,
            queue_size,
            ..Default::default()
        };
        Arc::new(WorkerPool::new(config, Arc::new(handler)).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(test_pool(1, 1));
        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_enqueue_accepted() {
        let pool = test_pool(1, 4);
        let app = create_router(Arc::clone(&pool));

        let response = app
            .oneshot(post_json("/enqueue", r#"{"id":"t1","payload":"x","max_retries":2}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["id"], "t1");
        assert_eq!(json["state"], "queued");

        let task = pool.state("t1").unwrap();
        assert_eq!(task.max_retries, 2);
        assert_eq!(task.payload, "x");
    }

    #[tokio::test]
    async fn test_enqueue_without_content_type() {
        let pool = test_pool(1, 4);
        let request = Request::builder()
            .method("POST")
            .uri("/enqueue")
            .body(Body::from(r#"{"id":"test","max_retries":3}"#))
            .unwrap();

        let response = create_router(Arc::clone(&pool)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(pool.state("test").unwrap().max_retries, 3);
    }

    #[tokio::test]
    async fn test_enqueue_null_fields_take_defaults() {
        let pool = test_pool(1, 4);
        let body = r#"{"id":"n","payload":null,"max_retries":null}"#;

        let response = create_router(Arc::clone(&pool))
            .oneshot(post_json("/enqueue", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let task = pool.state("n").unwrap();
        assert_eq!(task.payload, "");
        assert_eq!(task.max_retries, 0);
    }

    #[tokio::test]
    async fn test_enqueue_malformed_body() {
        let app = create_router(test_pool(1, 1));
        let response = app.oneshot(post_json("/enqueue", "{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "bad request");
    }

    #[tokio::test]
    async fn test_enqueue_invalid_task() {
        let pool = test_pool(1, 1);

        let bodies = [
            r#"{"id":""}"#,
            r#"{"id":null}"#,
            r#"{"payload":"x"}"#,
            r#"{"id":"a","max_retries":-1}"#,
        ];
        for body in bodies {
            let app = create_router(Arc::clone(&pool));
            let response = app.oneshot(post_json("/enqueue", body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["error"], "invalid task: id required, max_retries >=0");
        }
        assert!(pool.state("a").is_none());
    }

    #[tokio::test]
    async fn test_enqueue_queue_full() {
        let pool = test_pool(1, 1);
        pool.enqueue(Task::new("running", "")).unwrap();
        let started = async {
            while pool.state("running").map(|t| t.state) != Some(TaskState::Running) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), started).await.unwrap();
        pool.enqueue(Task::new("waiting", "")).unwrap();

        let app = create_router(Arc::clone(&pool));
        let response = app
            .oneshot(post_json("/enqueue", r#"{"id":"overflow"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], "queue overflow: task overflow rejected");
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let pool = test_pool(1, 1);
        pool.shutdown().await;

        let app = create_router(pool);
        let response = app.oneshot(post_json("/enqueue", r#"{"id":"late"}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], "worker pool is shut down");
    }

    #[tokio::test]
    async fn test_enqueue_wrong_method() {
        let app = create_router(test_pool(1, 1));
        let response = app.oneshot(get("/enqueue")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_get_task() {
        let pool = test_pool(1, 1);
        pool.enqueue(Task::new("known", "")).unwrap();

        let response = create_router(Arc::clone(&pool))
            .oneshot(get("/tasks/known"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], "known");
        assert_eq!(json["retries"], 0);

        let response = create_router(pool).oneshot(get("/tasks/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_metrics() {
        let pool = test_pool(2, 8);
        pool.enqueue(Task::new("a", "")).unwrap();

        let response = create_router(Arc::clone(&pool)).oneshot(get("/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["workers"], 2);
        assert_eq!(json["queue_capacity"], 8);
        assert_eq!(json["tracked"], 1);

        let response = create_router(pool).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("taskpool_tasks_enqueued_total 1"));
    }
}
