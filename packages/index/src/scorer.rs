//! Per-ward scoring.

use heat_priority_index_models::{CompositeScheme, RegionStats, ScoredWard};
use heat_priority_ward_models::WardSet;

use crate::{IndexError, RasterEngine, evaluate};

/// Evaluates `scheme` and reduces it over `wards`.
///
/// Returns exactly one [`ScoredWard`] per input ward, in input order.
/// Wards the engine returned no statistics for are kept with empty
/// statistics.
///
/// # Errors
///
/// Returns any [`IndexError`] from [`evaluate`], or
/// [`IndexError::Reduction`] if the engine refers to a ward that does not
/// exist.
pub async fn score_wards(
    engine: &dyn RasterEngine,
    scheme: &CompositeScheme,
    wards: &WardSet,
) -> Result<Vec<ScoredWard>, IndexError> {
    let expression = evaluate(engine, scheme, wards).await?;

    log::info!(
        "Reducing '{}' over {} wards on {}",
        scheme.id,
        wards.len(),
        engine.name()
    );
    let reduced = engine.reduce_regions(&expression, wards).await?;

    let mut stats: Vec<Option<RegionStats>> = vec![None; wards.len()];
    for entry in reduced {
        let slot = stats
            .get_mut(entry.ward_index)
            .ok_or_else(|| IndexError::Reduction {
                message: format!(
                    "engine returned statistics for ward {} of {}",
                    entry.ward_index,
                    wards.len()
                ),
            })?;
        *slot = Some(entry);
    }

    Ok(wards
        .iter()
        .zip(stats)
        .map(|(ward, stats)| {
            let stats = stats.unwrap_or_else(|| {
                log::warn!("No statistics returned for ward '{}'", ward.name);
                RegionStats::empty(ward.index)
            });
            ScoredWard::new(ward.clone(), stats)
        })
        .collect())
}
