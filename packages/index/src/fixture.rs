//! In-memory [`RasterEngine`] over synthetic grids.
//!
//! Every dataset lives on one shared [`Grid`]. The engine runs the same
//! pipeline stages a remote engine would: date/property filtering,
//! per-pixel aggregation, derive steps, unit-scale rescaling, weighting,
//! clipping to the ward union, division by the region maximum and
//! per-ward reduction. Ward membership is decided on cell centers using an
//! R-tree of ward envelopes followed by an exact `geo::Contains` test.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use geo::{Contains, MultiPolygon, Point};
use heat_priority_index_models::{
    CompositeScheme, DeriveOp, LayerSpec, NormalizationSpec, RegionStats, SourceSpec,
};
use heat_priority_ward_models::WardSet;
use rstar::{AABB, RTree, RTreeObject};

pub use crate::raster::Grid;
use crate::raster::{self, Raster};
use crate::{CompositeExpression, IndexError, RasterEngine};

/// A synthetic image: an optional acquisition date, metadata properties,
/// and named bands.
#[derive(Debug, Clone, Default)]
pub struct FixtureImage {
    date: Option<NaiveDate>,
    properties: BTreeMap<String, f64>,
    bands: BTreeMap<String, BandData>,
}

#[derive(Debug, Clone)]
enum BandData {
    Uniform(f64),
    Cells(Vec<Option<f64>>),
}

impl FixtureImage {
    /// An image acquired on `date`.
    #[must_use]
    pub fn dated(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// An image without an acquisition date. Date filters never match it.
    #[must_use]
    pub fn undated() -> Self {
        Self::default()
    }

    /// Adds a band with the same value in every cell.
    #[must_use]
    pub fn uniform_band(mut self, name: &str, value: f64) -> Self {
        self.bands.insert(name.to_string(), BandData::Uniform(value));
        self
    }

    /// Adds a band with per-cell values in grid order.
    #[must_use]
    pub fn band(mut self, name: &str, values: Vec<f64>) -> Self {
        self.bands.insert(
            name.to_string(),
            BandData::Cells(values.into_iter().map(Some).collect()),
        );
        self
    }

    /// Adds a band with per-cell values where `None` is masked.
    #[must_use]
    pub fn masked_band(mut self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.bands.insert(name.to_string(), BandData::Cells(values));
        self
    }

    /// Sets a metadata property.
    #[must_use]
    pub fn property(mut self, name: &str, value: f64) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    fn band_raster(&self, grid: Grid, name: &str) -> Option<Raster> {
        match self.bands.get(name)? {
            BandData::Uniform(v) => Some(Raster::filled(grid, *v)),
            BandData::Cells(values) => Raster::new(grid, values.clone()),
        }
    }
}

#[derive(Debug, Clone)]
enum FixtureDataset {
    Image(FixtureImage),
    Collection(Vec<FixtureImage>),
}

/// An in-memory raster engine.
#[derive(Debug, Clone)]
pub struct FixtureEngine {
    grid: Grid,
    datasets: BTreeMap<String, FixtureDataset>,
}

struct WardEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for WardEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The evaluated surface plus the raw exposure layer, both clipped to the
/// ward union.
struct Surface {
    composite: Raster,
    exposure: Option<Raster>,
    /// For each cell, the indices of the wards whose polygon contains the
    /// cell center.
    membership: Vec<Vec<usize>>,
}

impl FixtureEngine {
    /// Creates an engine with no datasets.
    #[must_use]
    pub const fn new(grid: Grid) -> Self {
        Self {
            grid,
            datasets: BTreeMap::new(),
        }
    }

    /// Registers a single-image dataset.
    #[must_use]
    pub fn with_image(mut self, dataset: &str, image: FixtureImage) -> Self {
        self.datasets
            .insert(dataset.to_string(), FixtureDataset::Image(image));
        self
    }

    /// Registers an image collection.
    #[must_use]
    pub fn with_collection(mut self, dataset: &str, images: Vec<FixtureImage>) -> Self {
        self.datasets
            .insert(dataset.to_string(), FixtureDataset::Collection(images));
        self
    }

    /// The images a layer reads after filtering.
    fn layer_images<'a>(&'a self, layer: &LayerSpec) -> Result<Vec<&'a FixtureImage>, IndexError> {
        let unavailable = |message: String| IndexError::UpstreamUnavailable {
            layer: layer.id.clone(),
            message,
        };

        let dataset = self
            .datasets
            .get(layer.source.dataset())
            .ok_or_else(|| unavailable(format!("dataset {} not found", layer.source.dataset())))?;

        let images: Vec<&FixtureImage> = match (&layer.source, dataset) {
            (SourceSpec::Image { .. }, FixtureDataset::Image(image)) => vec![image],
            (SourceSpec::Collection { .. }, FixtureDataset::Collection(images)) => images
                .iter()
                .filter(|image| {
                    layer.filter.as_ref().is_none_or(|filter| {
                        let dated = (filter.start.is_none() && filter.end.is_none())
                            || image.date.is_some_and(|d| filter.contains_date(d));
                        dated
                            && filter.properties.iter().all(|p| {
                                image
                                    .properties
                                    .get(&p.property)
                                    .is_some_and(|v| p.matches(*v))
                            })
                    })
                })
                .collect(),
            (SourceSpec::Image { dataset }, FixtureDataset::Collection(_)) => {
                return Err(unavailable(format!("{dataset} is a collection, not an image")));
            }
            (SourceSpec::Collection { dataset }, FixtureDataset::Image(_)) => {
                return Err(unavailable(format!("{dataset} is an image, not a collection")));
            }
        };

        if images.is_empty() {
            return Err(unavailable(format!(
                "no images in {} match the filter",
                layer.source.dataset()
            )));
        }

        for band in &layer.bands {
            if images.iter().any(|image| !image.bands.contains_key(band)) {
                return Err(unavailable(format!(
                    "band {band} missing from {}",
                    layer.source.dataset()
                )));
            }
        }

        Ok(images)
    }

    /// Evaluates one layer up to (not including) rescaling.
    fn raw_layer(&self, layer: &LayerSpec) -> Result<Raster, IndexError> {
        let images = self.layer_images(layer)?;

        let mut bands = Vec::with_capacity(layer.bands.len());
        for band in &layer.bands {
            let stack: Vec<Raster> = images
                .iter()
                .filter_map(|image| image.band_raster(self.grid, band))
                .collect();

            let selected = match layer.aggregate {
                Some(aggregate) => raster::aggregate(&stack, aggregate),
                None => stack.into_iter().next(),
            };

            bands.push(selected.ok_or_else(|| IndexError::UpstreamUnavailable {
                layer: layer.id.clone(),
                message: format!("band {band} does not match the grid"),
            })?);
        }

        let mut steps = layer.derive.iter().peekable();
        let mut current = match (steps.peek(), bands.as_slice()) {
            (Some(DeriveOp::NormalizedDifference), [a, b]) => {
                steps.next();
                raster::normalized_difference(a, b)
            }
            (_, [first, ..]) => first.clone(),
            (_, []) => {
                return Err(IndexError::UpstreamUnavailable {
                    layer: layer.id.clone(),
                    message: "no bands selected".to_string(),
                });
            }
        };

        for op in steps {
            current = current.derive(op);
        }

        Ok(current)
    }

    fn membership(&self, wards: &WardSet) -> Vec<Vec<usize>> {
        let tree = RTree::bulk_load(
            wards
                .iter()
                .filter_map(|ward| {
                    let bounds = ward.bounds()?;
                    Some(WardEntry {
                        index: ward.index,
                        envelope: AABB::from_corners(
                            [bounds.min().x, bounds.min().y],
                            [bounds.max().x, bounds.max().y],
                        ),
                        polygon: ward.geometry.clone(),
                    })
                })
                .collect(),
        );

        (0..self.grid.len())
            .map(|i| {
                let (lon, lat) = self.grid.cell_center(i);
                let point = Point::new(lon, lat);
                let mut inside: Vec<usize> = tree
                    .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
                    .filter(|entry| entry.polygon.contains(&point))
                    .map(|entry| entry.index)
                    .collect();
                inside.sort_unstable();
                inside
            })
            .collect()
    }

    fn surface(
        &self,
        scheme: &CompositeScheme,
        divisor: Option<f64>,
        wards: &WardSet,
    ) -> Result<Surface, IndexError> {
        let mut composite = Raster::filled(self.grid, 0.0);
        let mut exposure = None;

        for layer in &scheme.layers {
            let raw = self.raw_layer(layer)?;
            let rescale = layer.rescale;
            let weight = layer.weight;
            composite = composite.zip_with(&raw.map(|v| rescale.unit_scale(v)), |acc, v| {
                v.mul_add(weight, acc)
            });
            if scheme.reduction.exposure_layer.as_deref() == Some(layer.id.as_str()) {
                exposure = Some(raw);
            }
        }

        if let Some(divisor) = divisor {
            composite = composite.map(|v| v / divisor);
        }

        let membership = self.membership(wards);
        let inside: Vec<bool> = membership.iter().map(|m| !m.is_empty()).collect();

        Ok(Surface {
            composite: composite.mask(&inside),
            exposure: exposure.map(|r| r.mask(&inside)),
            membership,
        })
    }
}

#[async_trait]
impl RasterEngine for FixtureEngine {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn resolve_layer(&self, layer: &LayerSpec) -> Result<(), IndexError> {
        self.layer_images(layer).map(|_| ())
    }

    async fn region_max(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
        normalization: &NormalizationSpec,
    ) -> Result<Option<f64>, IndexError> {
        log::debug!("Fixture region max ({normalization:?}) over {} wards", wards.len());
        let surface = self.surface(&expression.scheme, expression.divisor, wards)?;
        Ok(surface.composite.max())
    }

    async fn reduce_regions(
        &self,
        expression: &CompositeExpression,
        wards: &WardSet,
    ) -> Result<Vec<RegionStats>, IndexError> {
        let surface = self.surface(&expression.scheme, expression.divisor, wards)?;
        let reduction = &expression.scheme.reduction;

        let mut composite_values: Vec<Vec<f64>> = vec![Vec::new(); wards.len()];
        let mut exposure_values: Vec<Vec<f64>> = vec![Vec::new(); wards.len()];

        for (cell, members) in surface.membership.iter().enumerate() {
            for &ward in members {
                if let Some(v) = surface.composite.values()[cell] {
                    composite_values[ward].push(v);
                }
                if let Some(v) = surface.exposure.as_ref().and_then(|e| e.values()[cell]) {
                    exposure_values[ward].push(v);
                }
            }
        }

        Ok(composite_values
            .into_iter()
            .zip(exposure_values)
            .enumerate()
            .map(|(ward_index, (mut values, exposure))| RegionStats {
                ward_index,
                p75: raster::percentile(&mut values, reduction.percentile),
                mean: if reduction.include_mean {
                    raster::mean(&values)
                } else {
                    None
                },
                population: raster::mean(&exposure),
            })
            .collect())
    }
}
