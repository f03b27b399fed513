use axum::{Json, Router, http::StatusCode, routing::post};
use log::{error, info, warn};

use crate::data::{GenerationRequest, GenerationResult};
use crate::error::EngineError;
use crate::solver;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

async fn generate_handler(
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>, (StatusCode, String)> {
    // the run is CPU-bound, keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || solver::solve(&request))
        .await
        .map_err(|e| {
            error!("Generation task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "timetable generation failed".to_string(),
            )
        })?;

    match outcome {
        Ok(result) => Ok(Json(result)),
        Err(e @ EngineError::Configuration(_)) => {
            warn!("Rejected request: {e}");
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/v1/timetable/generate", post(generate_handler))
}

pub async fn run_server() -> std::io::Result<()> {
    let addr = std::env::var("TIMETABLE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, router()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post_json(body: String) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/timetable/generate")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn sample_request() -> Value {
        json!({
            "config": {
                "startDate": "2024-09-02",
                "endDate": "2024-09-06",
                "workingHours": { "start": "09:00", "end": "13:00" },
                "maxIterations": 50,
                "seed": 11
            },
            "demands": [
                { "studyPlanId": 1, "teacherId": 1, "groupId": 1, "groupSize": 20,
                  "subject": "Math", "weeklyLessonCount": 2 }
            ],
            "rooms": [ { "id": 1, "capacity": 30, "type": "classroom", "building": "A" } ]
        })
    }

    #[tokio::test]
    async fn test_generate_returns_plan() {
        let (status, body) = post_json(sample_request().to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let result: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(result["lessons"].as_array().unwrap().len(), 2);
        assert_eq!(result["lessons"][0]["roomId"], 1);
        assert_eq!(result["diagnostics"]["seed"], 11);
        assert!(result["diagnostics"]["violations"].as_array().unwrap().is_empty());
        assert_eq!(result["singles"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bad_configuration_is_a_client_error() {
        let mut request = sample_request();
        request["config"]["workingHours"] = json!({ "start": "13:00", "end": "09:00" });
        let (status, body) = post_json(request.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("working hours"));
    }

    #[tokio::test]
    async fn test_malformed_time_is_rejected() {
        let mut request = sample_request();
        request["config"]["workingHours"]["start"] = json!("9 o'clock");
        let (status, _) = post_json(request.to_string()).await;
        assert!(status.is_client_error());
    }
}
