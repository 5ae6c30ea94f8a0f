use crate::{
    model_service::{ModelError, ModelService},
    record::{RecordError, ScreeningRecord},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";
const GENERIC_FAILURE: &str = "Prediction failed. Please check the uploaded file.";
const THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("multipart form has no `file` field")]
    MissingFile,
    #[error("failed to read uploaded file: {0}")]
    FileRead(#[from] MultipartError),
    #[error("failed to decode uploaded file: {0}")]
    Record(#[from] RecordError),
    #[error("model evaluation failed: {0}")]
    Model(#[from] ModelError),
}

// Every failure collapses to one generic message; the variant detail stays in
// the server logs only.
impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "prediction failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": GENERIC_FAILURE })),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Prediction {
    Parkinson,
    #[serde(rename = "No Parkinson")]
    NoParkinson,
}

impl Prediction {
    // Strict threshold: a likelihood of exactly 0.5 is the negative class.
    pub fn from_likelihood(likelihood: f32) -> Self {
        if likelihood > THRESHOLD {
            Prediction::Parkinson
        } else {
            Prediction::NoParkinson
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScreeningReport {
    #[serde(rename = "Age")]
    age: f32,
    #[serde(rename = "REM Sleep Percentage")]
    rem_sleep_pct: f32,
    #[serde(rename = "Deep Sleep Percentage")]
    deep_sleep_pct: f32,
    #[serde(rename = "Exercise Frequency")]
    exercise_frequency: f32,
    #[serde(rename = "Movement Time Series")]
    movement: Vec<f32>,
    #[serde(rename = "Parkinsons_Likelihood")]
    likelihood: f32,
    #[serde(rename = "Prediction")]
    prediction: Prediction,
}

impl ScreeningReport {
    pub fn new(record: &ScreeningRecord, likelihood: f32) -> Self {
        Self {
            age: record.profile.age,
            rem_sleep_pct: record.profile.rem_sleep_pct,
            deep_sleep_pct: record.profile.deep_sleep_pct,
            exercise_frequency: record.profile.exercise_frequency,
            movement: record.movement.to_vec(),
            likelihood,
            prediction: Prediction::from_likelihood(likelihood),
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Multipart,
) -> Result<Json<ScreeningReport>, PredictError> {
    let started = std::time::Instant::now();
    state.metrics.record_request("/predict");

    let data = read_file_field(multipart).await?;
    let record = ScreeningRecord::from_csv(&data)?;
    let likelihood = state.model_service.predict_likelihood(&record)?;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "/predict");

    Ok(Json(ScreeningReport::new(&record, likelihood)))
}

async fn read_file_field(mut multipart: Multipart) -> Result<Bytes, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }

    Err(PredictError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::MOVEMENT_FIELDS, routes::api_routes, telemetry::Metrics};
    use axum::{
        body::Body,
        http::{header, Method, Request},
        Router,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "screening-test-boundary";

    #[derive(Clone)]
    struct FixedLikelihoodModel(f32);

    impl ModelService for FixedLikelihoodModel {
        fn predict_likelihood(&self, _record: &ScreeningRecord) -> Result<f32, ModelError> {
            Ok(self.0)
        }
    }

    fn test_router(likelihood: f32) -> Router {
        let state = SharedState {
            model_service: Arc::new(FixedLikelihoodModel(likelihood)),
            metrics: Arc::new(Metrics::new()),
        };

        Router::new().merge(api_routes()).with_state(state)
    }

    fn multipart_body(field_name: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"sample.csv\"\r\n",
                field_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn predict_request(field_name: &str, payload: &[u8]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field_name, payload)))
            .unwrap()
    }

    fn valid_csv() -> Vec<u8> {
        let movement: Vec<String> = (0..MOVEMENT_FIELDS).map(|_| "50".to_string()).collect();
        format!("60,1,0,5,{}", movement.join(",")).into_bytes()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(Prediction::from_likelihood(0.51), Prediction::Parkinson);
        assert_eq!(Prediction::from_likelihood(0.5), Prediction::NoParkinson);
        assert_eq!(Prediction::from_likelihood(0.0), Prediction::NoParkinson);
    }

    #[test]
    fn test_report_wire_keys() {
        let record = ScreeningRecord::from_csv(&valid_csv()).unwrap();
        let value = serde_json::to_value(ScreeningReport::new(&record, 0.87)).unwrap();

        assert_eq!(value["Age"], 60.0);
        assert_eq!(value["REM Sleep Percentage"], 1.0);
        assert_eq!(value["Deep Sleep Percentage"], 0.0);
        assert_eq!(value["Exercise Frequency"], 5.0);
        assert_eq!(value["Movement Time Series"].as_array().unwrap().len(), 24);
        assert_eq!(value["Prediction"], "Parkinson");
        assert!((value["Parkinsons_Likelihood"].as_f64().unwrap() - 0.87).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_valid_upload_returns_report() {
        let response = test_router(0.87)
            .oneshot(predict_request(FILE_FIELD, &valid_csv()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let value = body_json(response).await;
        assert_eq!(value["Prediction"], "Parkinson");
        assert!((value["Parkinsons_Likelihood"].as_f64().unwrap() - 0.87).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_identical_uploads_yield_identical_likelihood() {
        let router = test_router(0.42);

        let first = router
            .clone()
            .oneshot(predict_request(FILE_FIELD, &valid_csv()))
            .await
            .unwrap();
        let second = router
            .oneshot(predict_request(FILE_FIELD, &valid_csv()))
            .await
            .unwrap();

        assert_eq!(body_json(first).await, body_json(second).await);
    }

    #[tokio::test]
    async fn test_short_row_yields_generic_error() {
        let response = test_router(0.87)
            .oneshot(predict_request(FILE_FIELD, b"1,2,3,4,5,6,7,8,9,10"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_binary_upload_yields_generic_error() {
        let response = test_router(0.87)
            .oneshot(predict_request(FILE_FIELD, &[0x00, 0x9f, 0x92, 0x96, 0xff]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_misnamed_field_yields_generic_error() {
        let response = test_router(0.87)
            .oneshot(predict_request("upload", &valid_csv()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], GENERIC_FAILURE);
    }
}
