//! Builds a [`CompositeExpression`] ready for reduction.

use heat_priority_index_models::{CompositeScheme, NormalizationSpec};
use heat_priority_ward_models::WardSet;

use crate::{CompositeExpression, IndexError, RasterEngine};

/// Validates `scheme`, resolves each of its layers against `engine` and,
/// for region-max normalized schemes, fetches the divisor.
///
/// # Errors
///
/// * [`IndexError::InvalidScheme`] if the scheme fails validation
/// * [`IndexError::UpstreamUnavailable`] if a layer cannot be resolved
/// * [`IndexError::EmptyStatistic`] if the region maximum is missing,
///   non-finite or not positive
pub async fn evaluate(
    engine: &dyn RasterEngine,
    scheme: &CompositeScheme,
    wards: &WardSet,
) -> Result<CompositeExpression, IndexError> {
    scheme.validate()?;

    for layer in &scheme.layers {
        log::debug!(
            "Resolving layer '{}' ({}) on {}",
            layer.id,
            layer.source.dataset(),
            engine.name()
        );
        engine.resolve_layer(layer).await?;
    }

    let expression = CompositeExpression::new(scheme.clone());

    match scheme.normalization {
        NormalizationSpec::None => Ok(expression),
        NormalizationSpec::RegionMax { .. } => {
            let max = engine
                .region_max(&expression, wards, &scheme.normalization)
                .await?;

            match max {
                Some(max) if max.is_finite() && max > 0.0 => {
                    log::debug!("Region max for '{}' is {max}", scheme.id);
                    Ok(expression.divided_by(max))
                }
                other => Err(IndexError::EmptyStatistic {
                    statistic: format!(
                        "region max of '{}' over {} wards was {other:?}",
                        scheme.id,
                        wards.len()
                    ),
                }),
            }
        }
    }
}
