//! The raster engine abstraction.

use async_trait::async_trait;
use heat_priority_index_models::{CompositeScheme, LayerSpec, NormalizationSpec, RegionStats};
use heat_priority_ward_models::WardSet;

use crate::IndexError;

/// An unmaterialized composite surface: the scheme to evaluate plus the
/// region maximum it is divided by, once known.
///
/// Only exists as an argument to [`RasterEngine`] calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeExpression {
    /// The scheme describing the weighted layers.
    pub scheme: CompositeScheme,
    /// Region maximum the weighted sum is divided by.
    pub divisor: Option<f64>,
}

impl CompositeExpression {
    /// Wraps a scheme without a divisor.
    #[must_use]
    pub const fn new(scheme: CompositeScheme) -> Self {
        Self {
            scheme,
            divisor: None,
        }
    }

    /// Returns the expression divided by `divisor`.
    #[must_use]
    pub const fn divided_by(mut self, divisor: f64) -> Self {
        self.divisor = Some(divisor);
        self
    }
}

/// A service able to evaluate composite raster expressions and reduce them
/// over ward polygons.
///
/// Calls within one scoring request are made sequentially:
/// [`resolve_layer`](Self::resolve_layer) for every layer, then
/// [`region_max`](Self::region_max) when the scheme is normalized, then
/// [`reduce_regions`](Self::reduce_regions).
#[async_trait]
pub trait RasterEngine: Send + Sync {
    /// Returns the engine's display name (e.g., `"earthengine"`).
    fn name(&self) -> &str;

    /// Checks that a layer's source exists, yields at least one image after
    /// filtering, and has the selected bands.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UpstreamUnavailable`] when it does not.
    async fn resolve_layer(&self, layer: &LayerSpec) -> Result<(), IndexError>;

    /// Maximum of the (undivided) composite over the union of `wards`.
    ///
    /// Returns `Ok(None)` when the region has no unmasked pixels.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the engine call fails.
    async fn region_max(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
        normalization: &NormalizationSpec,
    ) -> Result<Option<f64>, IndexError>;

    /// Reduces the composite to per-ward statistics.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Reduction`] if the engine call fails.
    async fn reduce_regions(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
    ) -> Result<Vec<RegionStats>, IndexError>;
}
