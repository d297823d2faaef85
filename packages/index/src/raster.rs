//! Local raster math on regular lon/lat grids.
//!
//! Masked cells are `None` and propagate through every operation: a
//! per-pixel result is masked when any of its inputs is.

use heat_priority_index_models::{Aggregate, DeriveOp};

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Latitude bound used for cell widths; cells at the poles have no width.
pub const MAX_LATITUDE: f64 = 89.9;

/// A regular lon/lat grid. Cell `(col, row)` is stored at
/// `row * width + col`; row 0 is the southernmost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    /// Western edge in degrees.
    pub min_lon: f64,
    /// Southern edge in degrees.
    pub min_lat: f64,
    /// Cell size in degrees (square cells).
    pub cell_deg: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl Grid {
    /// Creates a grid.
    #[must_use]
    pub const fn new(min_lon: f64, min_lat: f64, cell_deg: f64, width: usize, height: usize) -> Self {
        Self {
            min_lon,
            min_lat,
            cell_deg,
            width,
            height,
        }
    }

    /// Total number of cells.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lon/lat of the center of cell `index`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, index: usize) -> (f64, f64) {
        let col = index % self.width;
        let row = index / self.width;
        (
            (col as f64 + 0.5).mul_add(self.cell_deg, self.min_lon),
            (row as f64 + 0.5).mul_add(self.cell_deg, self.min_lat),
        )
    }

    /// Cell size in meters `(x, y)` at the grid's central latitude, which
    /// is clamped to [`MAX_LATITUDE`] so the width stays positive.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_size_m(&self) -> (f64, f64) {
        let center_lat = (self.height as f64 / 2.0)
            .mul_add(self.cell_deg, self.min_lat)
            .clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let y = self.cell_deg * METERS_PER_DEGREE;
        (y * center_lat.to_radians().cos(), y)
    }
}

/// A single-band raster on a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: Grid,
    values: Vec<Option<f64>>,
}

impl Raster {
    /// Wraps per-cell values. Returns `None` if the value count does not
    /// match the grid.
    #[must_use]
    pub fn new(grid: Grid, values: Vec<Option<f64>>) -> Option<Self> {
        (values.len() == grid.len()).then_some(Self { grid, values })
    }

    /// A raster with the same value in every cell.
    #[must_use]
    pub fn filled(grid: Grid, value: f64) -> Self {
        Self {
            grid,
            values: vec![Some(value); grid.len()],
        }
    }

    /// The raster's grid.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Per-cell values; `None` is masked.
    #[must_use]
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Applies `f` to every unmasked cell.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            grid: self.grid,
            values: self.values.iter().map(|v| v.map(&f)).collect(),
        }
    }

    /// Combines two rasters cell by cell.
    #[must_use]
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            grid: self.grid,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| Some(f((*a)?, (*b)?)))
                .collect(),
        }
    }

    /// Masks every cell where `keep` is `false`.
    #[must_use]
    pub fn mask(&self, keep: &[bool]) -> Self {
        Self {
            grid: self.grid,
            values: self
                .values
                .iter()
                .zip(keep)
                .map(|(v, keep)| v.filter(|_| *keep))
                .collect(),
        }
    }

    /// Largest unmasked value.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.values.iter().flatten().copied().reduce(f64::max)
    }

    /// Mean of the unmasked values within a circular neighborhood of
    /// `radius_m` meters around each cell. Masked cells stay masked.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn focal_mean(&self, radius_m: f64) -> Self {
        let (mx, my) = self.grid.cell_size_m();
        let rx = radius_m / mx;
        let ry = radius_m / my;

        // Offsets past the grid edge never find a neighbor.
        let max_dx = rx.floor().min(self.grid.width.saturating_sub(1) as f64) as isize;
        let max_dy = ry.floor().min(self.grid.height.saturating_sub(1) as f64) as isize;

        let mut offsets = Vec::new();
        for dy in -max_dy..=max_dy {
            for dx in -max_dx..=max_dx {
                let (fx, fy) = (dx as f64 / rx, dy as f64 / ry);
                if fx.mul_add(fx, fy * fy) <= 1.0 {
                    offsets.push((dx, dy));
                }
            }
        }

        let width = self.grid.width as isize;
        let height = self.grid.height as isize;

        let values = (0..self.values.len())
            .map(|i| {
                self.values[i]?;
                let col = (i % self.grid.width) as isize;
                let row = (i / self.grid.width) as isize;

                let neighbors: Vec<f64> = offsets
                    .iter()
                    .filter_map(|(dx, dy)| {
                        let (c, r) = (col + dx, row + dy);
                        if c < 0 || r < 0 || c >= width || r >= height {
                            return None;
                        }
                        self.values[(r * width + c) as usize]
                    })
                    .collect();

                mean(&neighbors)
            })
            .collect();

        Self {
            grid: self.grid,
            values,
        }
    }

    /// Applies a single-band derive step. [`DeriveOp::NormalizedDifference`]
    /// needs two bands and is handled by [`normalized_difference`]; here it
    /// returns the raster unchanged.
    #[must_use]
    pub fn derive(&self, op: &DeriveOp) -> Self {
        match *op {
            DeriveOp::Affine { scale, offset } => self.map(|v| v.mul_add(scale, offset)),
            DeriveOp::Complement => self.map(|v| 1.0 - v),
            DeriveOp::Equals { value } => {
                self.map(|v| if (v - value).abs() < f64::EPSILON { 1.0 } else { 0.0 })
            }
            DeriveOp::FocalMean { radius_m } => self.focal_mean(radius_m),
            DeriveOp::NormalizedDifference => self.clone(),
        }
    }
}

/// `(a - b) / (a + b)` per cell; masked where `a + b` is zero.
#[must_use]
pub fn normalized_difference(a: &Raster, b: &Raster) -> Raster {
    let combined = a.zip_with(b, |a, b| (a - b) / (a + b));
    Raster {
        grid: combined.grid,
        values: combined
            .values
            .into_iter()
            .map(|v| v.filter(|v| v.is_finite()))
            .collect(),
    }
}

/// Per-pixel aggregate over a stack of rasters, ignoring masked cells.
/// Returns `None` for an empty stack.
#[must_use]
pub fn aggregate(rasters: &[Raster], aggregate: Aggregate) -> Option<Raster> {
    let first = rasters.first()?;
    let values = (0..first.values.len())
        .map(|i| {
            let mut stack: Vec<f64> = rasters.iter().filter_map(|r| r.values[i]).collect();
            match aggregate {
                Aggregate::Mean => mean(&stack),
                Aggregate::Median => percentile(&mut stack, 50.0),
            }
        })
        .collect();

    Some(Raster {
        grid: first.grid,
        values,
    })
}

/// Arithmetic mean, `None` for no values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The `p`th percentile (0-100) with linear interpolation between the
/// closest ranks. Sorts `values` in place. `None` for no values.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let rank = (p / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - rank.floor();

    Some((values[upper] - values[lower]).mul_add(fraction, values[lower]))
}
