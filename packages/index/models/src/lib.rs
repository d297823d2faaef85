#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Declarative composite heat-index schemes.
//!
//! A [`CompositeScheme`] describes how a per-pixel priority surface is built
//! from remote raster datasets: each [`LayerSpec`] runs the stages
//! `source -> filter -> select/aggregate -> derive -> rescale -> weight`,
//! the weighted layers are summed, clipped to the wards, optionally divided
//! by the region maximum ([`NormalizationSpec`]) and finally reduced to
//! per-ward statistics ([`ReductionSpec`]).
//!
//! Schemes are authored as TOML; see the `heat_priority_index` registry.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use heat_priority_ward_models::Ward;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Tolerance used when checking that unnormalized weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A named composite-index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScheme {
    /// Unique scheme identifier (e.g., `heat_vulnerability`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Post-combination normalization policy.
    pub normalization: NormalizationSpec,
    /// Per-ward reduction policy.
    pub reduction: ReductionSpec,
    /// Weighted input layers, in evaluation order.
    pub layers: Vec<LayerSpec>,
}

/// One weighted input of a composite scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer identifier, unique within the scheme. Also the band name of the
    /// layer's contribution in the combined image.
    pub id: String,
    /// Where the raster data comes from.
    pub source: SourceSpec,
    /// Temporal and metadata filter for collection sources.
    #[serde(default)]
    pub filter: Option<LayerFilter>,
    /// Bands selected from the source. One band, or two when the first
    /// derive step is [`DeriveOp::NormalizedDifference`].
    pub bands: Vec<String>,
    /// Per-pixel aggregate over the filtered collection.
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    /// Derivation steps applied after selection, in order.
    #[serde(default)]
    pub derive: Vec<DeriveOp>,
    /// Raw value range mapped onto `[0, 1]`.
    pub rescale: Rescale,
    /// Weight of the rescaled layer in the composite.
    pub weight: f64,
}

/// Raster source of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    /// A time series of images that must be filtered and aggregated.
    Collection {
        /// Catalog identifier, e.g. `MODIS/061/MOD11A1`.
        dataset: String,
    },
    /// A single image.
    Image {
        /// Catalog identifier, e.g. `ESA/WorldCover/v100/2020`.
        dataset: String,
    },
}

impl SourceSpec {
    /// Catalog identifier of the source.
    #[must_use]
    pub fn dataset(&self) -> &str {
        match self {
            Self::Collection { dataset } | Self::Image { dataset } => dataset,
        }
    }

    /// Whether the source is an image collection.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Collection { .. })
    }
}

/// Filter applied to a collection before aggregation.
///
/// The date range is half-open: an image dated `end` is excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerFilter {
    /// First included acquisition date.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// First excluded acquisition date.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// Image metadata predicates, all of which must hold.
    #[serde(default)]
    pub properties: Vec<PropertyFilter>,
}

impl LayerFilter {
    /// Whether `date` falls inside the `[start, end)` range. Open bounds
    /// always match.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date < end)
    }
}

/// A predicate on an image metadata property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    /// Metadata property name, e.g. `CLOUDY_PIXEL_PERCENTAGE`.
    pub property: String,
    /// Comparison applied as `property <comparison> value`.
    pub comparison: Comparison,
    /// Right-hand operand.
    pub value: f64,
}

impl PropertyFilter {
    /// Evaluates the predicate against a property value.
    #[must_use]
    pub fn matches(&self, actual: f64) -> bool {
        match self.comparison {
            Comparison::LessThan => actual < self.value,
            Comparison::GreaterThan => actual > self.value,
        }
    }
}

/// Metadata comparison operator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Comparison {
    /// Strictly less than.
    LessThan,
    /// Strictly greater than.
    GreaterThan,
}

/// Per-pixel aggregate over a filtered collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Aggregate {
    /// Arithmetic mean of unmasked values.
    Mean,
    /// Median of unmasked values.
    Median,
}

/// A derivation step applied to a layer's selected band(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeriveOp {
    /// `v * scale + offset`.
    Affine {
        /// Multiplier.
        #[serde(default = "one")]
        scale: f64,
        /// Additive offset applied after scaling.
        #[serde(default)]
        offset: f64,
    },
    /// `(a - b) / (a + b)` over the two selected bands.
    NormalizedDifference,
    /// `1 - v`.
    Complement,
    /// `1` where the value equals `value`, otherwise `0`.
    Equals {
        /// Class value to match.
        value: f64,
    },
    /// Mean of the values within a circular neighborhood.
    FocalMean {
        /// Kernel radius in meters.
        radius_m: f64,
    },
}

const fn one() -> f64 {
    1.0
}

/// Linear mapping of `[low, high]` onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rescale {
    /// Raw value mapped to 0.
    pub low: f64,
    /// Raw value mapped to 1.
    pub high: f64,
}

impl Rescale {
    /// Maps `value` onto `[0, 1]`, clamping values outside the range.
    #[must_use]
    pub fn unit_scale(&self, value: f64) -> f64 {
        ((value - self.low) / (self.high - self.low)).clamp(0.0, 1.0)
    }
}

/// Post-combination normalization policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizationSpec {
    /// The weighted sum is the final surface.
    None,
    /// Divide by the maximum of the weighted sum over the ward union.
    RegionMax {
        /// Reduction scale in meters.
        scale_m: f64,
        /// Upper bound on pixels considered by the reduction.
        max_pixels: f64,
    },
}

/// How the final surface is reduced to per-ward statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionSpec {
    /// Percentile reported as `p75` (the name is kept whatever the value).
    pub percentile: f64,
    /// Also report the mean of the surface.
    #[serde(default = "yes")]
    pub include_mean: bool,
    /// Reduction scale in meters.
    pub scale_m: f64,
    /// Layer whose raw (pre-rescale) mean is reported as `population`.
    #[serde(default)]
    pub exposure_layer: Option<String>,
}

const fn yes() -> bool {
    true
}

/// Per-ward statistics returned by a raster engine's spatial reduction.
///
/// A statistic is `None` when the ward covers no unmasked pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    /// Index of the ward in the reduced ward set.
    pub ward_index: usize,
    /// Configured percentile of the final surface.
    pub p75: Option<f64>,
    /// Mean of the final surface.
    pub mean: Option<f64>,
    /// Mean of the exposure layer in its source units, before rescaling.
    pub population: Option<f64>,
}

impl RegionStats {
    /// Statistics for a ward the engine returned nothing for.
    #[must_use]
    pub const fn empty(ward_index: usize) -> Self {
        Self {
            ward_index,
            p75: None,
            mean: None,
            population: None,
        }
    }
}

/// A ward together with its reduced priority statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredWard {
    /// The scored ward.
    pub ward: Ward,
    /// Configured percentile of the priority surface within the ward.
    pub p75: Option<f64>,
    /// Mean priority within the ward.
    pub mean: Option<f64>,
    /// Mean exposure within the ward in the exposure dataset's own units
    /// (people per pixel for `WorldPop`), not unit-scaled like `p75`.
    pub population: Option<f64>,
}

impl ScoredWard {
    /// Pairs a ward with its statistics.
    #[must_use]
    pub fn new(ward: Ward, stats: RegionStats) -> Self {
        Self {
            ward,
            p75: stats.p75,
            mean: stats.mean,
            population: stats.population,
        }
    }

    /// The score used for ranking: `p75`, with missing or `NaN` values
    /// counting as zero.
    #[must_use]
    pub fn rank_score(&self) -> f64 {
        self.p75.filter(|v| !v.is_nan()).unwrap_or(0.0)
    }
}

/// A scheme failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSchemeError {
    /// Identifier of the offending scheme.
    pub scheme: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for InvalidSchemeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid scheme '{}': {}", self.scheme, self.message)
    }
}

impl std::error::Error for InvalidSchemeError {}

impl CompositeScheme {
    /// Looks up a layer by id.
    #[must_use]
    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Sum of all layer weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.layers.iter().map(|l| l.weight).sum()
    }

    /// Checks the structural rules every scheme must satisfy before it is
    /// sent to an engine.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSchemeError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), InvalidSchemeError> {
        let fail = |message: String| {
            Err(InvalidSchemeError {
                scheme: self.id.clone(),
                message,
            })
        };

        if self.layers.is_empty() {
            return fail("scheme has no layers".to_string());
        }

        let mut seen = BTreeSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.id.as_str()) {
                return fail(format!("duplicate layer id '{}'", layer.id));
            }
            if let Err(message) = layer.validate() {
                return fail(format!("layer '{}': {message}", layer.id));
            }
        }

        if let NormalizationSpec::RegionMax {
            scale_m,
            max_pixels,
        } = self.normalization
        {
            if !(scale_m.is_finite() && scale_m > 0.0) {
                return fail(format!("normalization scale must be positive, got {scale_m}"));
            }
            if !(max_pixels.is_finite() && max_pixels > 0.0) {
                return fail(format!(
                    "normalization max_pixels must be positive, got {max_pixels}"
                ));
            }
        }

        let reduction = &self.reduction;
        if !(0.0..=100.0).contains(&reduction.percentile) {
            return fail(format!(
                "percentile must be within 0..=100, got {}",
                reduction.percentile
            ));
        }
        if !(reduction.scale_m.is_finite() && reduction.scale_m > 0.0) {
            return fail(format!(
                "reduction scale must be positive, got {}",
                reduction.scale_m
            ));
        }
        if let Some(exposure) = &reduction.exposure_layer
            && self.layer(exposure).is_none()
        {
            return fail(format!("exposure layer '{exposure}' is not a layer"));
        }
        // A coarser maximum is taken over averaged pixels and can undershoot
        // the reduced values, pushing normalized scores above 1.
        if let NormalizationSpec::RegionMax { scale_m, .. } = self.normalization
            && scale_m > reduction.scale_m
        {
            return fail(format!(
                "normalization scale {scale_m} m is coarser than the reduction scale {} m",
                reduction.scale_m
            ));
        }

        if self.normalization == NormalizationSpec::None {
            let total = self.total_weight();
            if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return fail(format!(
                    "unnormalized weights must sum to 1, got {total}"
                ));
            }
        }

        Ok(())
    }
}

impl LayerSpec {
    fn validate(&self) -> Result<(), String> {
        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(format!("weight must be positive, got {}", self.weight));
        }

        let Rescale { low, high } = self.rescale;
        if !(low.is_finite() && high.is_finite() && high > low) {
            return Err(format!("rescale range {low}..{high} is empty"));
        }

        let differences = self
            .derive
            .iter()
            .filter(|op| **op == DeriveOp::NormalizedDifference)
            .count();
        match (self.bands.len(), differences) {
            (1, 0) => {}
            (2, 1) if self.derive.first() == Some(&DeriveOp::NormalizedDifference) => {}
            (2, _) => {
                return Err(
                    "two bands require normalized_difference as the first derive step"
                        .to_string(),
                );
            }
            (n, _) => return Err(format!("expected one band, got {n}")),
        }

        for op in &self.derive {
            match op {
                DeriveOp::FocalMean { radius_m } if !(radius_m.is_finite() && *radius_m > 0.0) => {
                    return Err(format!("focal radius must be positive, got {radius_m}"));
                }
                DeriveOp::Affine { scale, offset } if !(scale.is_finite() && offset.is_finite()) => {
                    return Err("affine coefficients must be finite".to_string());
                }
                _ => {}
            }
        }

        match (&self.source, self.aggregate) {
            (SourceSpec::Collection { .. }, None) => {
                return Err("collection sources need an aggregate".to_string());
            }
            (SourceSpec::Image { .. }, Some(_)) => {
                return Err("image sources cannot be aggregated".to_string());
            }
            (SourceSpec::Image { .. }, None) if self.filter.is_some() => {
                return Err("image sources cannot be filtered".to_string());
            }
            _ => {}
        }

        if let Some(LayerFilter {
            start: Some(start),
            end: Some(end),
            ..
        }) = &self.filter
            && start >= end
        {
            return Err(format!("date range {start}..{end} is empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        id = "t"
        name = "Test"

        [normalization]
        type = "none"

        [reduction]
        percentile = 75.0
        scale_m = 250.0

        [[layers]]
        id = "heat"
        bands = ["LST_Day_1km"]
        aggregate = "mean"
        weight = 1.0

        [layers.source]
        type = "collection"
        dataset = "MODIS/061/MOD11A1"

        [layers.filter]
        start = "2025-04-01"
        end = "2025-10-01"

        [[layers.filter.properties]]
        property = "CLOUDY_PIXEL_PERCENTAGE"
        comparison = "less_than"
        value = 50.0

        [[layers.derive]]
        op = "affine"
        scale = 0.02
        offset = -273.15

        [layers.rescale]
        low = 32.0
        high = 48.0
    "#;

    fn minimal() -> CompositeScheme {
        toml::de::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn parses_toml_scheme() {
        let scheme = minimal();
        assert!(scheme.reduction.include_mean);
        let layer = &scheme.layers[0];
        assert_eq!(layer.source.dataset(), "MODIS/061/MOD11A1");
        assert_eq!(layer.aggregate, Some(Aggregate::Mean));
        assert_eq!(
            layer.derive,
            vec![DeriveOp::Affine {
                scale: 0.02,
                offset: -273.15
            }]
        );
        let filter = layer.filter.as_ref().unwrap();
        assert_eq!(filter.properties[0].comparison, Comparison::LessThan);
        scheme.validate().unwrap();
    }

    #[test]
    fn date_range_is_half_open() {
        let filter = minimal().layers[0].filter.clone().unwrap();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(filter.contains_date(d("2025-04-01")));
        assert!(filter.contains_date(d("2025-09-30")));
        assert!(!filter.contains_date(d("2025-10-01")));
        assert!(!filter.contains_date(d("2025-03-31")));
    }

    #[test]
    fn unit_scale_clamps() {
        let r = Rescale {
            low: 32.0,
            high: 48.0,
        };
        assert!((r.unit_scale(40.0) - 0.5).abs() < 1e-12);
        assert!((r.unit_scale(10.0)).abs() < f64::EPSILON);
        assert!((r.unit_scale(60.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_unnormalized_weights_not_summing_to_one() {
        let mut scheme = minimal();
        scheme.layers[0].weight = 0.8;
        let err = scheme.validate().unwrap_err();
        assert!(err.message.contains("sum to 1"), "{err}");

        scheme.normalization = NormalizationSpec::RegionMax {
            scale_m: 250.0,
            max_pixels: 1e9,
        };
        scheme.validate().unwrap();
    }

    #[test]
    fn rejects_normalization_coarser_than_reduction() {
        let mut scheme = minimal();
        scheme.normalization = NormalizationSpec::RegionMax {
            scale_m: 500.0,
            max_pixels: 1e9,
        };
        let err = scheme.validate().unwrap_err();
        assert!(err.message.contains("coarser"), "{err}");

        scheme.normalization = NormalizationSpec::RegionMax {
            scale_m: 100.0,
            max_pixels: 1e9,
        };
        scheme.validate().unwrap();
    }

    #[test]
    fn rejects_layer_rule_violations() {
        let mut scheme = minimal();
        scheme.layers[0].rescale = Rescale {
            low: 5.0,
            high: 5.0,
        };
        assert!(scheme.validate().is_err());

        let mut scheme = minimal();
        scheme.layers[0].aggregate = None;
        assert!(scheme.validate().is_err());

        let mut scheme = minimal();
        scheme.layers[0].bands.push("B4".to_string());
        assert!(scheme.validate().is_err());
        scheme.layers[0].derive.insert(0, DeriveOp::NormalizedDifference);
        scheme.validate().unwrap();

        let mut scheme = minimal();
        let dup = scheme.layers[0].clone();
        scheme.layers.push(dup);
        assert!(scheme.validate().unwrap_err().message.contains("duplicate"));
    }

    #[test]
    fn rejects_unknown_exposure_layer_and_bad_percentile() {
        let mut scheme = minimal();
        scheme.reduction.exposure_layer = Some("population".to_string());
        assert!(scheme.validate().is_err());

        let mut scheme = minimal();
        scheme.reduction.percentile = 120.0;
        assert!(scheme.validate().is_err());
    }

    #[test]
    fn property_filter_comparisons() {
        let f = PropertyFilter {
            property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            comparison: Comparison::LessThan,
            value: 50.0,
        };
        assert!(f.matches(10.0));
        assert!(!f.matches(50.0));
    }
}
