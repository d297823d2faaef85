//! HTTP handler functions for the heat priority API.

use std::sync::Arc;

use actix_web::{HttpResponse, web};
use geojson::FeatureCollection;
use heat_priority_index::score_wards;
use heat_priority_index_models::ScoredWard;
use heat_priority_report::{REPORT_SIZE, ReportDocument, report_title, top_n, write_document};
use heat_priority_server_models::{
    ApiHealth, ExplainRequest, ExplainResponse, ReportResponse, WardRequest,
};
use heat_priority_ward::collection::{from_geojson, ward_feature};
use heat_priority_ward_models::{UNKNOWN_WARD, WardSet};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{AppState, ServerError};

/// Parses an optional JSON body; an empty body yields the default.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ServerError::BadRequest {
        message: e.to_string(),
    })
}

/// The wards a request asks to score: its `geojson`, or the reference
/// wards when it has none.
fn request_wards(state: &AppState, body: &[u8]) -> Result<Arc<WardSet>, ServerError> {
    let request: WardRequest = parse_body(body)?;

    match request.geojson {
        Some(geojson) => Ok(Arc::new(from_geojson(&geojson)?)),
        None => state.reference_wards.clone().ok_or(ServerError::NoWards),
    }
}

async fn score(state: &AppState, body: &[u8]) -> Result<Vec<ScoredWard>, ServerError> {
    let wards = request_wards(state, body)?;
    Ok(score_wards(state.engine.as_ref(), &state.scheme, &wards).await?)
}

/// Statistics added to each ward's properties.
fn score_properties(scored: &ScoredWard) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("p75".to_string(), scored.p75.map_or(Value::Null, Value::from));
    if let Some(mean) = scored.mean {
        props.insert("mean".to_string(), Value::from(mean));
    }
    if let Some(population) = scored.population {
        props.insert("population".to_string(), Value::from(population));
    }
    props
}

/// `GET /health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        scheme: state.scheme.id.clone(),
        reference_wards: state.reference_wards.as_ref().map(|w| w.len()),
    })
}

/// `POST /ward-priority`
///
/// Scores the wards and returns them as a `GeoJSON` feature collection.
/// `p75` and `mean` are priorities in `[0, 1]`; `population` is the raw
/// exposure mean (people per pixel for the bundled schemes).
pub async fn ward_priority(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError> {
    let scored = score(&state, &body)
        .await
        .inspect_err(|e| log::error!("Failed to score wards: {e}"))?;

    let collection = FeatureCollection {
        bbox: None,
        features: scored
            .iter()
            .map(|s| ward_feature(&s.ward, score_properties(s)))
            .collect(),
        foreign_members: None,
    };

    Ok(HttpResponse::Ok().json(collection))
}

/// `POST /top10-pdf`
///
/// Scores the wards, renders the ten highest as a PDF into the report
/// directory and returns its file name.
pub async fn top10_pdf(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError> {
    let scored = score(&state, &body)
        .await
        .inspect_err(|e| log::error!("Failed to score wards for report: {e}"))?;

    let document = ReportDocument::new(
        report_title(state.city.as_deref()),
        top_n(&scored, REPORT_SIZE),
    )
    .with_font(state.report_font.clone());
    let dir = state.report_dir.clone();

    let path = web::block(move || write_document(&dir, &document))
        .await
        .map_err(|e| ServerError::Blocking {
            message: e.to_string(),
        })?
        .inspect_err(|e| log::error!("Failed to write report: {e}"))?;

    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(ReportResponse { file }))
}

/// `POST /explain-ward`
///
/// Explains a ward's score. Always succeeds; `source` tells whether the
/// text was generated or is the fallback.
pub async fn explain_ward(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError> {
    let request: ExplainRequest = parse_body(&body)?;

    let ward_name = request
        .ward_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_WARD.to_string());
    let score = request.p75.filter(|v| v.is_finite()).unwrap_or(0.0);

    let narrative = heat_priority_ai::explain_ward(state.provider.as_deref(), &ward_name, score).await;

    Ok(HttpResponse::Ok().json(ExplainResponse {
        analysis: narrative.text().to_string(),
        source: narrative.source().to_string(),
        ward_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use heat_priority_ai::{ChatRequest, LlmProvider};
    use heat_priority_index::fixture::{FixtureEngine, FixtureImage, Grid};
    use heat_priority_index_models::CompositeScheme;
    use serde_json::json;
    use std::path::Path;

    const SCHEME: &str = r#"
id = "fixture_heat"
name = "Fixture heat"

[normalization]
type = "none"

[reduction]
percentile = 75.0
scale_m = 1000.0

[[layers]]
id = "heat"
bands = ["lst"]
weight = 1.0

[layers.source]
type = "image"
dataset = "TEST/LST"

[layers.rescale]
low = 0.0
high = 10.0
"#;

    struct Echo;

    #[async_trait::async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<String, heat_priority_ai::AiError> {
            Ok(format!("echo: {}", request.user.lines().nth(2).unwrap_or_default()))
        }
    }

    fn engine(dataset: &str) -> FixtureEngine {
        FixtureEngine::new(Grid::new(0.0, 0.0, 1.0, 4, 1)).with_image(
            dataset,
            FixtureImage::undated().band("lst", vec![1.0, 2.0, 8.0, 9.0]),
        )
    }

    fn state(engine: FixtureEngine, report_dir: &Path) -> AppState {
        AppState {
            engine: Arc::new(engine),
            scheme: toml::from_str::<CompositeScheme>(SCHEME).unwrap(),
            reference_wards: None,
            provider: None,
            report_dir: report_dir.to_path_buf(),
            city: Some("Ahmedabad".to_string()),
            report_font: None,
        }
    }

    fn square(name: &str, x: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": {"ward_name": name, "zone": "west"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, 0.0], [x + 2.0, 0.0], [x + 2.0, 1.0], [x, 1.0], [x, 0.0]]],
            },
        })
    }

    fn wards_body() -> Value {
        json!({
            "geojson": {
                "type": "FeatureCollection",
                "features": [square("Bopal", 0.0), square("Maninagar", 2.0)],
            }
        })
    }

    macro_rules! app {
        ($state:expr, $dir:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(|cfg| crate::configure(cfg, $dir)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn scores_request_wards() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        let req = test::TestRequest::post()
            .uri("/ward-priority")
            .set_json(wards_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["type"], "FeatureCollection");

        let features = body["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);

        let bopal = &features[0]["properties"];
        assert_eq!(bopal["ward_name"], "Bopal");
        assert_eq!(bopal["zone"], "west");
        assert!((bopal["p75"].as_f64().unwrap() - 0.175).abs() < 1e-9);
        assert!((bopal["mean"].as_f64().unwrap() - 0.15).abs() < 1e-9);
        assert!(bopal.get("population").is_none());

        let maninagar = &features[1]["properties"];
        assert!((maninagar["p75"].as_f64().unwrap() - 0.875).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn empty_body_without_reference_wards_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        let req = test::TestRequest::post().uri("/ward-priority").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("No wards"));
    }

    #[actix_web::test]
    async fn empty_body_scores_reference_wards() {
        let dir = tempfile::tempdir().unwrap();
        let reference = from_geojson(&wards_body()["geojson"]).unwrap();
        let app = app!(
            AppState {
                reference_wards: Some(Arc::new(reference)),
                ..state(engine("TEST/LST"), dir.path())
            },
            dir.path()
        );

        let req = test::TestRequest::post().uri("/ward-priority").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["features"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn malformed_geojson_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        for body in [
            json!({"geojson": {"type": "FeatureCollection", "features": []}}),
            json!({"geojson": {"type": "Point", "coordinates": [72.5, 23.0]}}),
        ] {
            let req = test::TestRequest::post()
                .uri("/ward-priority")
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let req = test::TestRequest::post()
            .uri("/ward-priority")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unavailable_layer_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("OTHER/DATASET"), dir.path()), dir.path());

        let req = test::TestRequest::post()
            .uri("/ward-priority")
            .set_json(wards_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("heat"));
    }

    #[actix_web::test]
    async fn writes_and_serves_report() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        let req = test::TestRequest::post()
            .uri("/top10-pdf")
            .set_json(wards_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: ReportResponse = test::read_body_json(resp).await;
        assert!(body.file.starts_with("top10_wards_"));
        assert!(body.file.ends_with(".pdf"));
        assert!(dir.path().join(&body.file).exists());

        let req = test::TestRequest::get()
            .uri(&format!("/reports/{}", body.file))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let pdf = test::read_body(resp).await;
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[actix_web::test]
    async fn explain_without_provider_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        let req = test::TestRequest::post().uri("/explain-ward").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: ExplainResponse = test::read_body_json(resp).await;
        assert_eq!(body.ward_name, "Unknown Ward");
        assert_eq!(body.source, "fallback");
        assert!(body.analysis.starts_with("Unknown Ward shows elevated heat vulnerability"));
    }

    #[actix_web::test]
    async fn explain_uses_provider() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(
            AppState {
                provider: Some(Arc::new(Echo)),
                ..state(engine("TEST/LST"), dir.path())
            },
            dir.path()
        );

        let req = test::TestRequest::post()
            .uri("/explain-ward")
            .set_json(json!({"ward_name": "Vatva", "p75": 0.8123}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        let body: ExplainResponse = test::read_body_json(resp).await;
        assert_eq!(body.ward_name, "Vatva");
        assert_eq!(body.source, "generated");
        assert_eq!(body.analysis, "echo: Ward: Vatva");
    }

    #[actix_web::test]
    async fn health_reports_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(state(engine("TEST/LST"), dir.path()), dir.path());

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["healthy"], true);
        assert_eq!(body["scheme"], "fixture_heat");
        assert_eq!(body["referenceWards"], Value::Null);
    }
}
