//! Zipped ESRI shapefile ward archives.
//!
//! The deployment bundles the city's ward boundaries as a zip containing
//! `<name>.shp`, `<name>.dbf`, and usually `<name>.prj`. The archive is read
//! once at startup; shapes are reprojected to WGS84 and each record's
//! attributes become the ward's properties.

use std::io::{Cursor, Read};
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use heat_priority_ward_models::{Ward, WardSet};
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};

use crate::WardError;
use crate::projection::Reprojection;

/// Loads and reprojects all wards from a zipped shapefile archive.
///
/// Uses the first `.shp` entry in the archive. The matching `.dbf` is
/// required; a missing `.prj` means the coordinates are already
/// geographic.
///
/// # Errors
///
/// Returns [`WardError`] if the archive cannot be opened, does not contain
/// a shapefile with an attribute table, has a `.prj` GDAL cannot use,
/// contains non-polygon shapes, or contains no usable wards.
pub fn load_zipped_shapefile(path: &Path) -> Result<WardSet, WardError> {
    if !path.exists() {
        return Err(WardError::Archive {
            message: format!("ward archive not found: {}", path.display()),
        });
    }

    log::info!("Loading ward archive {}", path.display());

    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let names: Vec<String> = archive.file_names().map(String::from).collect();

    let shp_name = names
        .iter()
        .find(|n| has_extension(n, "shp") && !n.starts_with("__MACOSX"))
        .cloned()
        .ok_or_else(|| WardError::Archive {
            message: format!("no .shp entry in {}", path.display()),
        })?;
    let stem = &shp_name[..shp_name.len() - 4];

    let sibling = |ext: &str| {
        names
            .iter()
            .find(|n| {
                n.len() == shp_name.len()
                    && has_extension(n, ext)
                    && n[..n.len() - 4].eq_ignore_ascii_case(stem)
            })
            .cloned()
    };

    let dbf_name = sibling("dbf").ok_or_else(|| WardError::Archive {
        message: format!("no .dbf attribute table next to {shp_name}"),
    })?;
    let prj_name = sibling("prj");

    let shp = read_entry(&mut archive, &shp_name)?;
    let dbf = read_entry(&mut archive, &dbf_name)?;

    let reprojection = match prj_name {
        Some(name) => {
            let bytes = read_entry(&mut archive, &name)?;
            log::debug!("Reprojecting {shp_name} to WGS84 using {name}");
            Reprojection::from_prj(&String::from_utf8_lossy(&bytes))?
        }
        None => {
            log::warn!("No .prj in {}; assuming WGS84 coordinates", path.display());
            Reprojection::identity()
        }
    };

    let wards = parse_shapefile(shp, dbf, &reprojection)?;
    log::info!("Loaded {} wards from {}", wards.len(), path.display());
    Ok(wards)
}

/// Parses in-memory `.shp` and `.dbf` contents into wards, reprojecting
/// coordinates with `reprojection`.
///
/// Null shapes are skipped.
///
/// # Errors
///
/// Returns [`WardError`] if the shapefile cannot be decoded, contains a
/// non-polygon shape or unprojectable coordinates, or yields no wards.
pub fn parse_shapefile(
    shp: Vec<u8>,
    dbf: Vec<u8>,
    reprojection: &Reprojection,
) -> Result<WardSet, WardError> {
    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp))?;
    let dbase_reader =
        shapefile::dbase::Reader::new(Cursor::new(dbf)).map_err(|e| WardError::Archive {
            message: format!("failed to read attribute table: {e}"),
        })?;
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);

    let mut wards = Vec::new();

    for (i, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item?;

        let geometry = match shape {
            Shape::Polygon(p) => {
                rings_to_multi_polygon(p.rings(), |pt| (pt.x, pt.y), reprojection)?
            }
            Shape::PolygonM(p) => {
                rings_to_multi_polygon(p.rings(), |pt| (pt.x, pt.y), reprojection)?
            }
            Shape::PolygonZ(p) => {
                rings_to_multi_polygon(p.rings(), |pt| (pt.x, pt.y), reprojection)?
            }
            Shape::NullShape => {
                log::warn!("Skipping null shape at record {i}");
                continue;
            }
            other => {
                return Err(WardError::malformed(format!(
                    "record {i} is a {:?} shape, expected a polygon",
                    other.shapetype()
                )));
            }
        };

        let properties: Map<String, Value> = record
            .into_iter()
            .map(|(name, value)| (name, field_to_json(value)))
            .collect();

        wards.push(Ward::new(wards.len(), geometry, properties));
    }

    WardSet::new(wards).ok_or_else(|| WardError::malformed("shapefile contains no polygons"))
}

/// Groups shapefile rings into polygons: every outer ring starts a new
/// polygon and the inner rings that follow become its holes.
fn rings_to_multi_polygon<P>(
    rings: &[PolygonRing<P>],
    xy: impl Fn(&P) -> (f64, f64),
    reprojection: &Reprojection,
) -> Result<MultiPolygon<f64>, WardError> {
    let to_line = |points: &[P]| -> Result<LineString<f64>, WardError> {
        let mut coords: Vec<Coord<f64>> = points
            .iter()
            .map(|p| {
                let (x, y) = xy(p);
                Coord { x, y }
            })
            .collect();
        reprojection.to_wgs84(&mut coords)?;
        Ok(LineString::new(coords))
    };

    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push((to_line(points)?, Vec::new())),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(to_line(points)?),
                None => polygons.push((to_line(points)?, Vec::new())),
            },
        }
    }

    Ok(MultiPolygon(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    ))
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => Value::String(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number_value(n)
        }
        FieldValue::Float(Some(f)) => number_value(f64::from(f)),
        FieldValue::Integer(i) => Value::from(i),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        _ => Value::Null,
    }
}

/// Whole numbers are stored as integers so numeric ward identifiers render
/// as `12` rather than `12.0`.
#[allow(clippy::cast_possible_truncation)]
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, WardError> {
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}
