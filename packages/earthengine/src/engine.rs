//! [`RasterEngine`] implementation backed by an Earth Engine session.

use async_trait::async_trait;
use heat_priority_index::{CompositeExpression, IndexError, RasterEngine};
use heat_priority_index_models::{LayerSpec, NormalizationSpec, RegionStats};
use heat_priority_ward_models::WardSet;
use serde_json::{Map, Value};

use crate::compile::{self, EXPOSURE_BAND, PERCENTILE_OUTPUT, PRIORITY_BAND, WARD_INDEX_PROPERTY};
use crate::session::EarthEngineSession;

/// Evaluates composite schemes with Earth Engine.
pub struct EarthEngine {
    session: EarthEngineSession,
}

impl EarthEngine {
    /// Wraps a connected session.
    #[must_use]
    pub const fn new(session: EarthEngineSession) -> Self {
        Self { session }
    }
}

fn unavailable(layer: &LayerSpec, message: impl Into<String>) -> IndexError {
    IndexError::UpstreamUnavailable {
        layer: layer.id.clone(),
        message: message.into(),
    }
}

fn reduction(message: impl std::fmt::Display) -> IndexError {
    IndexError::Reduction {
        message: message.to_string(),
    }
}

/// Reads a numeric property, treating `null` and non-numbers as missing.
fn number(properties: &Map<String, Value>, key: &str) -> Option<f64> {
    properties.get(key).and_then(Value::as_f64)
}

fn region_stats(
    properties: &Map<String, Value>,
    has_exposure: bool,
    include_mean: bool,
) -> Result<RegionStats, IndexError> {
    let ward_index = properties
        .get(WARD_INDEX_PROPERTY)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .ok_or_else(|| reduction(format!("feature without a valid {WARD_INDEX_PROPERTY}")))?;

    // Multi-band reductions prefix outputs with the band name.
    let (p75_key, mean_key) = if has_exposure {
        (
            format!("{PRIORITY_BAND}_{PERCENTILE_OUTPUT}"),
            format!("{PRIORITY_BAND}_mean"),
        )
    } else {
        (PERCENTILE_OUTPUT.to_string(), "mean".to_string())
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ward_index = ward_index as usize;

    Ok(RegionStats {
        ward_index,
        p75: number(properties, &p75_key),
        mean: if include_mean {
            number(properties, &mean_key)
        } else {
            None
        },
        population: if has_exposure {
            number(properties, &format!("{EXPOSURE_BAND}_mean"))
        } else {
            None
        },
    })
}

#[async_trait]
impl RasterEngine for EarthEngine {
    fn name(&self) -> &'static str {
        "earthengine"
    }

    async fn resolve_layer(&self, layer: &LayerSpec) -> Result<(), IndexError> {
        if let Some(size) = compile::collection_size(layer) {
            let count = self
                .session
                .compute_value(&size)
                .await
                .map_err(|e| unavailable(layer, e.to_string()))?;

            if count.as_u64().is_none_or(|n| n == 0) {
                return Err(unavailable(
                    layer,
                    format!("no images in {} match the filter", layer.source.dataset()),
                ));
            }
        }

        let names = self
            .session
            .compute_value(&compile::band_names(layer))
            .await
            .map_err(|e| unavailable(layer, e.to_string()))?;

        let available: Vec<&str> = names
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if let Some(missing) = layer
            .bands
            .iter()
            .find(|band| !available.contains(&band.as_str()))
        {
            return Err(unavailable(
                layer,
                format!(
                    "band '{missing}' not found in {} (available: {})",
                    layer.source.dataset(),
                    available.join(", ")
                ),
            ));
        }

        log::debug!("Layer '{}' resolved", layer.id);
        Ok(())
    }

    async fn region_max(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
        normalization: &NormalizationSpec,
    ) -> Result<Option<f64>, IndexError> {
        let NormalizationSpec::RegionMax {
            scale_m,
            max_pixels,
        } = *normalization
        else {
            return Ok(None);
        };

        let node = compile::region_max(expression, wards, scale_m, max_pixels);
        let result = self.session.compute_value(&node).await.map_err(reduction)?;

        Ok(result.get(PRIORITY_BAND).and_then(Value::as_f64))
    }

    async fn reduce_regions(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
    ) -> Result<Vec<RegionStats>, IndexError> {
        let (node, has_exposure) = compile::reduce_regions(expression, wards);
        let include_mean = expression.scheme.reduction.include_mean;

        let features = self
            .session
            .compute_features(&node)
            .await
            .map_err(reduction)?;

        log::info!(
            "Reduced {} wards to {} features",
            wards.len(),
            features.len()
        );

        features
            .iter()
            .map(|feature| region_stats(&feature.properties, has_exposure, include_mean))
            .collect()
    }
}
