//! Conversion between `GeoJSON` feature collections and [`WardSet`]s.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, PolygonType, Position};
use heat_priority_ward_models::{Ward, WardSet};
use serde_json::{Map, Value};

use crate::WardError;

/// Builds a [`WardSet`] from a `GeoJSON` value.
///
/// Accepts a `FeatureCollection` or a single `Feature`. Every feature must
/// carry a valid `Polygon` or `MultiPolygon` geometry; properties are kept
/// as-is and the display name is resolved from them.
///
/// # Errors
///
/// Returns [`WardError::MalformedInput`] if the value is not a feature
/// collection, has no features, or any feature geometry is missing or
/// invalid.
pub fn from_geojson(value: &Value) -> Result<WardSet, WardError> {
    let geojson = GeoJson::from_json_value(value.clone())
        .map_err(|e| WardError::malformed(format!("not valid GeoJSON: {e}")))?;

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(WardError::malformed(
                "expected a FeatureCollection, got a bare geometry",
            ));
        }
    };

    wards_from_features(features)
}

/// Builds a [`WardSet`] from an already parsed `FeatureCollection`.
///
/// # Errors
///
/// Returns [`WardError::MalformedInput`] under the same conditions as
/// [`from_geojson`].
pub fn from_feature_collection(collection: FeatureCollection) -> Result<WardSet, WardError> {
    wards_from_features(collection.features)
}

fn wards_from_features(features: Vec<Feature>) -> Result<WardSet, WardError> {
    if features.is_empty() {
        return Err(WardError::malformed("feature collection has no features"));
    }

    let wards = features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| feature_to_ward(i, feature))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!("Parsed {} wards from GeoJSON payload", wards.len());

    WardSet::new(wards).ok_or_else(|| WardError::malformed("feature collection has no features"))
}

/// Converts a [`WardSet`] back to a `GeoJSON` `FeatureCollection`.
///
/// Each feature carries the ward's original properties plus the resolved
/// `ward_name`.
#[must_use]
pub fn to_feature_collection(wards: &WardSet) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: wards
            .iter()
            .map(|ward| ward_feature(ward, Map::new()))
            .collect(),
        foreign_members: None,
    }
}

/// Builds the `GeoJSON` feature for a single ward, merging `extra`
/// properties over the tagged ward properties.
#[must_use]
pub fn ward_feature(ward: &Ward, extra: Map<String, Value>) -> Feature {
    let mut properties = ward.tagged_properties();
    properties.extend(extra);

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&ward.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn feature_to_ward(index: usize, feature: Feature) -> Result<Ward, WardError> {
    let geometry = feature
        .geometry
        .ok_or_else(|| WardError::malformed(format!("feature {index} has no geometry")))?;

    let multi_polygon = match geometry.value {
        geojson::Value::Polygon(rings) => MultiPolygon(vec![polygon_from_rings(index, &rings)?]),
        geojson::Value::MultiPolygon(polygons) => MultiPolygon(
            polygons
                .iter()
                .map(|rings| polygon_from_rings(index, rings))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => {
            return Err(WardError::malformed(format!(
                "feature {index} has unsupported geometry type {}",
                geometry_type(&other)
            )));
        }
    };

    Ok(Ward::new(
        index,
        multi_polygon,
        feature.properties.unwrap_or_default(),
    ))
}

const fn geometry_type(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn polygon_from_rings(index: usize, rings: &PolygonType) -> Result<Polygon<f64>, WardError> {
    let mut converted = rings
        .iter()
        .map(|ring| ring_to_line_string(index, ring))
        .collect::<Result<Vec<_>, _>>()?;

    if converted.is_empty() {
        return Err(WardError::malformed(format!(
            "feature {index} has a polygon without rings"
        )));
    }

    let exterior = converted.remove(0);
    Ok(Polygon::new(exterior, converted))
}

fn ring_to_line_string(index: usize, ring: &[Position]) -> Result<LineString<f64>, WardError> {
    if ring.len() < 4 {
        return Err(WardError::malformed(format!(
            "feature {index} has a ring with {} positions (minimum 4)",
            ring.len()
        )));
    }

    let coords = ring
        .iter()
        .map(|pos| position_to_coord(index, pos))
        .collect::<Result<Vec<_>, _>>()?;

    if coords.first() != coords.last() {
        return Err(WardError::malformed(format!(
            "feature {index} has an unclosed ring"
        )));
    }

    Ok(LineString::new(coords))
}

fn position_to_coord(index: usize, pos: &[f64]) -> Result<Coord<f64>, WardError> {
    match pos {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(WardError::malformed(format!(
            "feature {index} has an invalid coordinate {pos:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heat_priority_ward_models::{UNKNOWN_WARD, WARD_NAME_KEY};
    use serde_json::json;

    fn square(x: f64, y: f64) -> Value {
        json!([[[x, y], [x + 1.0, y], [x + 1.0, y + 1.0], [x, y + 1.0], [x, y]]])
    }

    fn collection(features: Vec<Value>) -> Value {
        json!({"type": "FeatureCollection", "features": features})
    }

    fn feature(properties: Value, coordinates: Value) -> Value {
        json!({
            "type": "Feature",
            "properties": properties,
            "geometry": {"type": "Polygon", "coordinates": coordinates},
        })
    }

    #[test]
    fn parses_polygons_and_multipolygons() {
        let value = collection(vec![
            feature(json!({"sourceward": "Bodakdev"}), square(72.5, 23.0)),
            json!({
                "type": "Feature",
                "properties": {"sourcewa_1": "Thaltej"},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [square(72.4, 23.0), square(72.6, 23.1)],
                },
            }),
        ]);

        let wards = from_geojson(&value).unwrap();
        assert_eq!(wards.len(), 2);
        assert_eq!(wards.get(0).unwrap().name, "Bodakdev");
        assert_eq!(wards.get(1).unwrap().name, "Thaltej");
        assert_eq!(wards.get(1).unwrap().geometry.0.len(), 2);
    }

    #[test]
    fn every_ward_gets_a_name() {
        let value = collection(vec![
            feature(json!({}), square(0.0, 0.0)),
            feature(json!(null), square(1.0, 0.0)),
        ]);
        let wards = from_geojson(&value).unwrap();
        assert!(wards.iter().all(|w| w.name == UNKNOWN_WARD));
    }

    #[test]
    fn rejects_empty_collection() {
        let err = from_geojson(&collection(Vec::new())).unwrap_err();
        assert!(matches!(err, WardError::MalformedInput { .. }));
    }

    #[test]
    fn rejects_missing_geometry() {
        let value = collection(vec![json!({
            "type": "Feature",
            "properties": {"sourceward": "A"},
            "geometry": null,
        })]);
        assert!(matches!(
            from_geojson(&value).unwrap_err(),
            WardError::MalformedInput { .. }
        ));
    }

    #[test]
    fn rejects_point_geometry() {
        let value = collection(vec![json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Point", "coordinates": [72.5, 23.0]},
        })]);
        let err = from_geojson(&value).unwrap_err();
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn rejects_short_and_unclosed_rings() {
        let short = collection(vec![feature(
            json!({}),
            json!([[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]]),
        )]);
        assert!(from_geojson(&short).is_err());

        let unclosed = collection(vec![feature(
            json!({}),
            json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]),
        )]);
        assert!(from_geojson(&unclosed).is_err());
    }

    #[test]
    fn rejects_non_collection_payloads() {
        assert!(from_geojson(&json!({"type": "Point", "coordinates": [0.0, 0.0]})).is_err());
        assert!(from_geojson(&json!({"foo": "bar"})).is_err());
    }

    #[test]
    fn round_trip_preserves_names() {
        let value = collection(vec![
            feature(json!({"sourceward": "Paldi"}), square(0.0, 0.0)),
            feature(json!({"sourcewa_1": 14}), square(1.0, 0.0)),
            feature(json!({"other": "x"}), square(2.0, 0.0)),
        ]);

        let wards = from_geojson(&value).unwrap();
        let back = to_feature_collection(&wards);
        let reparsed = from_geojson(&serde_json::to_value(&back).unwrap()).unwrap();

        let original: Vec<&str> = wards.iter().map(|w| w.name.as_str()).collect();
        let round_tripped: Vec<&str> = reparsed.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(original, vec!["Paldi", "14", UNKNOWN_WARD]);
        assert_eq!(original, round_tripped);

        let typed = from_feature_collection(back.clone()).unwrap();
        assert!(typed.iter().map(|w| w.name.as_str()).eq(original.iter().copied()));

        for feature in &back.features {
            let props = feature.properties.as_ref().unwrap();
            assert!(props.contains_key(WARD_NAME_KEY));
        }
    }

    #[test]
    fn ward_feature_merges_extra_properties() {
        let wards = from_geojson(&collection(vec![feature(
            json!({"sourceward": "Vejalpur"}),
            square(0.0, 0.0),
        )]))
        .unwrap();

        let mut extra = Map::new();
        extra.insert("p75".to_string(), json!(0.42));
        let feature = ward_feature(wards.get(0).unwrap(), extra);
        let props = feature.properties.unwrap();
        assert_eq!(props["p75"], json!(0.42));
        assert_eq!(props[WARD_NAME_KEY], "Vejalpur");
    }
}
