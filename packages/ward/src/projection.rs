//! Reprojection of shapefile coordinates to WGS84 longitude/latitude.
//!
//! The `.prj` entry of a ward archive is handed to GDAL as-is. Both the
//! OGC and the ESRI WKT dialects are accepted, and PROJ picks the datum
//! transformation, so archives in any CRS PROJ knows can be loaded.

use gdal::errors::GdalError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::Coord;

use crate::WardError;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_EPSG: u32 = 4326;

/// Converts native archive coordinates to WGS84 longitude/latitude.
pub struct Reprojection {
    transform: Option<CoordTransform>,
}

impl Reprojection {
    /// Coordinates that are already WGS84 longitude/latitude.
    #[must_use]
    pub const fn identity() -> Self {
        Self { transform: None }
    }

    /// Builds the transformation from a `.prj` WKT definition.
    ///
    /// # Errors
    ///
    /// Returns [`WardError::Projection`] if GDAL cannot parse the WKT or
    /// finds no transformation to WGS84.
    pub fn from_prj(wkt: &str) -> Result<Self, WardError> {
        let wkt = wkt.trim();
        let mut source = SpatialRef::from_wkt(wkt)
            .or_else(|_| SpatialRef::from_esri(wkt))
            .map_err(|e| projection_error("unreadable .prj definition", &e))?;
        source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let mut target = SpatialRef::from_epsg(WGS84_EPSG)
            .map_err(|e| projection_error("WGS84 is not available", &e))?;
        target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let transform = CoordTransform::new(&source, &target)
            .map_err(|e| projection_error("no transformation to WGS84", &e))?;

        Ok(Self {
            transform: Some(transform),
        })
    }

    /// Reprojects `coords` in place.
    ///
    /// # Errors
    ///
    /// Returns [`WardError::Projection`] if any coordinate falls outside
    /// the source CRS's domain.
    pub fn to_wgs84(&self, coords: &mut [Coord<f64>]) -> Result<(), WardError> {
        let Some(transform) = &self.transform else {
            return Ok(());
        };

        let mut xs: Vec<f64> = coords.iter().map(|c| c.x).collect();
        let mut ys: Vec<f64> = coords.iter().map(|c| c.y).collect();
        let mut zs = vec![0.0; coords.len()];

        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| projection_error("coordinate transformation failed", &e))?;

        for ((coord, x), y) in coords.iter_mut().zip(xs).zip(ys) {
            if !x.is_finite() || !y.is_finite() {
                return Err(WardError::Projection {
                    message: format!("({}, {}) has no WGS84 equivalent", coord.x, coord.y),
                });
            }
            *coord = Coord { x, y };
        }

        Ok(())
    }
}

fn projection_error(context: &str, error: &GdalError) -> WardError {
    WardError::Projection {
        message: format!("{context}: {error}"),
    }
}
