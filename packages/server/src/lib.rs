#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for ward heat priority scoring.
//!
//! Scores wards against the active composite scheme with Earth Engine,
//! renders top-10 PDF reports into the report directory (served under
//! `/reports`), and explains individual ward scores through an optional
//! LLM provider.

pub mod config;
pub mod error;
mod handlers;

use std::path::Path;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use heat_priority_ai::{LlmProvider, create_provider_from_env};
use heat_priority_earthengine::{EarthEngine, EarthEngineConfig, EarthEngineSession};
use heat_priority_index::{IndexError, RasterEngine, registry};
use heat_priority_index_models::CompositeScheme;
use heat_priority_report::load_font;
use heat_priority_ward::archive::load_zipped_shapefile;
use heat_priority_ward_models::WardSet;

pub use config::{Args, ServerConfig};
pub use error::ServerError;

/// Largest accepted request body. Ward collections for a whole city run
/// to several megabytes.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    /// Raster engine the wards are scored with.
    pub engine: Arc<dyn RasterEngine>,
    /// Active composite scheme.
    pub scheme: CompositeScheme,
    /// Wards scored when a request carries none.
    pub reference_wards: Option<Arc<WardSet>>,
    /// LLM provider for ward explanations.
    pub provider: Option<Arc<dyn LlmProvider>>,
    /// Directory reports are written to.
    pub report_dir: std::path::PathBuf,
    /// City named in report titles.
    pub city: Option<String>,
    /// TrueType font embedded in reports.
    pub report_font: Option<Arc<[u8]>>,
}

/// Registers the API routes and the `/reports` file service.
pub fn configure(cfg: &mut web::ServiceConfig, report_dir: &Path) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .route("/health", web::get().to(handlers::health))
        .route("/ward-priority", web::post().to(handlers::ward_priority))
        .route("/top10-pdf", web::post().to(handlers::top10_pdf))
        .route("/explain-ward", web::post().to(handlers::explain_ward))
        .service(Files::new("/reports", report_dir));
}

/// Loads the reference ward archive.
///
/// An archive at the default location that does not exist is skipped
/// with a warning; requests must then carry their own wards.
///
/// # Errors
///
/// Returns [`ServerError::Ward`] if an explicitly configured archive is
/// missing, or any archive fails to load.
pub fn load_reference_wards(config: &ServerConfig) -> Result<Option<Arc<WardSet>>, ServerError> {
    if !config.ward_archive_explicit && !config.ward_archive.exists() {
        log::warn!(
            "Reference ward archive {} not found; requests must supply GeoJSON wards",
            config.ward_archive.display()
        );
        return Ok(None);
    }

    let wards = load_zipped_shapefile(&config.ward_archive)?;
    log::info!(
        "Loaded {} reference wards from {}",
        wards.len(),
        config.ward_archive.display()
    );
    Ok(Some(Arc::new(wards)))
}

/// Loads the configured report font, if any.
///
/// # Errors
///
/// Returns [`ServerError::Report`] if the font is missing or cannot be
/// embedded.
pub fn load_report_font(config: &ServerConfig) -> Result<Option<Arc<[u8]>>, ServerError> {
    Ok(config.report_font.as_deref().map(load_font).transpose()?)
}

/// Resolves the active scheme from a scheme file or the registry.
///
/// # Errors
///
/// Returns [`ServerError::Index`] if the scheme is unknown, unreadable or
/// invalid.
pub fn load_scheme(config: &ServerConfig) -> Result<CompositeScheme, ServerError> {
    let scheme = match &config.scheme_file {
        Some(path) => {
            log::info!("Loading composite scheme from {}", path.display());
            registry::load_scheme_file(path)?
        }
        None => registry::scheme(&config.scheme_id)?,
    };
    scheme.validate().map_err(IndexError::from)?;

    log::info!(
        "Using composite scheme '{}' ({} layers)",
        scheme.id,
        scheme.layers.len()
    );
    Ok(scheme)
}

/// Builds the application state: scheme, reference wards, report font, an
/// authenticated Earth Engine session and the optional LLM provider.
///
/// # Errors
///
/// Returns [`ServerError`] if any of them fails to initialize.
pub async fn build_state(config: &ServerConfig) -> Result<AppState, ServerError> {
    let scheme = load_scheme(config)?;
    let reference_wards = load_reference_wards(config)?;
    let report_font = load_report_font(config)?;

    let session = EarthEngineSession::connect(EarthEngineConfig::from_env()?).await?;
    let engine: Arc<dyn RasterEngine> = Arc::new(EarthEngine::new(session));

    let provider: Option<Arc<dyn LlmProvider>> = create_provider_from_env()?.map(Arc::from);

    Ok(AppState {
        engine,
        scheme,
        reference_wards,
        provider,
        report_dir: config.report_dir.clone(),
        city: config.city.clone(),
        report_font,
    })
}

/// Starts the heat priority API server.
///
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if startup fails, or the HTTP server fails to
/// bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let state = web::Data::new(build_state(&config).await?);

    std::fs::create_dir_all(&config.report_dir)?;
    let report_dir = config.report_dir.clone();

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| configure(cfg, &report_dir))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heat_priority_report::ReportError;
    use std::path::PathBuf;

    fn config(archive: PathBuf, explicit: bool) -> ServerConfig {
        ServerConfig {
            ward_archive: archive,
            ward_archive_explicit: explicit,
            ..ServerConfig::from_lookup(|_| None)
        }
    }

    #[test]
    fn missing_default_archive_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let wards = load_reference_wards(&config(dir.path().join("wards.zip"), false)).unwrap();
        assert!(wards.is_none());
    }

    #[test]
    fn missing_configured_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_reference_wards(&config(dir.path().join("wards.zip"), true)).unwrap_err();
        assert!(matches!(err, ServerError::Ward(_)));
    }

    #[test]
    fn report_font_is_optional() {
        assert!(load_report_font(&ServerConfig::from_lookup(|_| None)).unwrap().is_none());
    }

    #[test]
    fn missing_report_font_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            report_font: Some(dir.path().join("gujarati.ttf")),
            ..ServerConfig::from_lookup(|_| None)
        };
        assert!(matches!(
            load_report_font(&config),
            Err(ServerError::Report(ReportError::Io(_)))
        ));
    }

    #[test]
    fn scheme_comes_from_registry_by_default() {
        let scheme = load_scheme(&ServerConfig::from_lookup(|_| None)).unwrap();
        assert_eq!(scheme.id, registry::DEFAULT_SCHEME_ID);
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let config = ServerConfig {
            scheme_id: "nope".to_string(),
            ..ServerConfig::from_lookup(|_| None)
        };
        assert!(matches!(
            load_scheme(&config),
            Err(ServerError::Index(IndexError::UnknownScheme { .. }))
        ));
    }
}
