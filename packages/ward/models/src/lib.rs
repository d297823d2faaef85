#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ward boundary types shared across the heat priority workspace.
//!
//! A [`Ward`] is an administrative sub-city polygon in WGS84 lon/lat
//! together with its original attribute properties and a resolved display
//! name. A [`WardSet`] is the ordered, non-empty collection of wards that a
//! single scoring request works on.

use geo::{BoundingRect, MultiPolygon, Rect};
use serde_json::{Map, Value};

/// Display name used when none of the [`NAME_KEYS`] carry a usable value.
pub const UNKNOWN_WARD: &str = "Unknown Ward";

/// Property key the resolved display name is written back under.
pub const WARD_NAME_KEY: &str = "ward_name";

/// Property keys consulted (in order) when resolving a ward's display name.
///
/// The source dataset's own columns win over a `ward_name` left by an
/// earlier pass, which is only used when they are absent.
pub const NAME_KEYS: &[&str] = &["sourceward", "sourcewa_1", WARD_NAME_KEY, "ward", "name"];

/// Resolves the display name of a ward from its properties.
///
/// A value counts when it is a string that is non-empty after trimming, or
/// a finite non-zero number. Falls back to [`UNKNOWN_WARD`].
#[must_use]
pub fn resolve_ward_name(properties: &Map<String, Value>) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| properties.get(*key).and_then(name_from_value))
        .unwrap_or_else(|| UNKNOWN_WARD.to_string())
}

fn name_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return (i != 0).then(|| i.to_string());
            }
            if let Some(u) = n.as_u64() {
                return (u != 0).then(|| u.to_string());
            }
            n.as_f64()
                .filter(|f| f.is_finite() && *f != 0.0)
                .map(|f| f.to_string())
        }
        _ => None,
    }
}

/// A single ward polygon with its display name.
#[derive(Debug, Clone, PartialEq)]
pub struct Ward {
    /// Position of the ward in its source collection (0-based).
    pub index: usize,
    /// Resolved, non-empty display name.
    pub name: String,
    /// Boundary in WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
    /// Original attribute properties, without the resolved name.
    pub properties: Map<String, Value>,
}

impl Ward {
    /// Builds a ward and resolves its display name from `properties`.
    #[must_use]
    pub fn new(index: usize, geometry: MultiPolygon<f64>, properties: Map<String, Value>) -> Self {
        let name = resolve_ward_name(&properties);
        Self {
            index,
            name,
            geometry,
            properties,
        }
    }

    /// Returns the original properties with the resolved name written under
    /// [`WARD_NAME_KEY`].
    #[must_use]
    pub fn tagged_properties(&self) -> Map<String, Value> {
        let mut props = self.properties.clone();
        props.insert(WARD_NAME_KEY.to_string(), Value::String(self.name.clone()));
        props
    }

    /// Bounding box of the ward geometry.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Ordered, non-empty collection of wards.
#[derive(Debug, Clone, PartialEq)]
pub struct WardSet {
    wards: Vec<Ward>,
}

impl WardSet {
    /// Wraps a list of wards, re-numbering their indices to match their
    /// position. Returns `None` for an empty list.
    #[must_use]
    pub fn new(mut wards: Vec<Ward>) -> Option<Self> {
        if wards.is_empty() {
            return None;
        }
        for (i, ward) in wards.iter_mut().enumerate() {
            ward.index = i;
        }
        Some(Self { wards })
    }

    /// Number of wards (always at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.wards.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates wards in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, Ward> {
        self.wards.iter()
    }

    /// Returns the ward at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Ward> {
        self.wards.get(index)
    }

    /// All wards as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Ward] {
        &self.wards
    }

    /// Union of all ward bounding boxes.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.wards
            .iter()
            .filter_map(Ward::bounds)
            .reduce(|a, b| {
                Rect::new(
                    geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }
}

impl<'a> IntoIterator for &'a WardSet {
    type Item = &'a Ward;
    type IntoIter = std::slice::Iter<'a, Ward>;

    fn into_iter(self) -> Self::IntoIter {
        self.wards.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn resolves_first_priority_key() {
        let p = props(json!({"sourcewa_1": "B", "sourceward": "A"}));
        assert_eq!(resolve_ward_name(&p), "A");
    }

    #[test]
    fn source_columns_override_stale_ward_name() {
        let p = props(json!({"ward_name": "Stale", "sourceward": "Maninagar"}));
        assert_eq!(resolve_ward_name(&p), "Maninagar");

        let p = props(json!({"ward_name": "Tagged", "name": "Raw"}));
        assert_eq!(resolve_ward_name(&p), "Tagged");
    }

    #[test]
    fn skips_empty_and_zero_values() {
        let p = props(json!({"sourceward": "  ", "sourcewa_1": 0, "name": "Navrangpura"}));
        assert_eq!(resolve_ward_name(&p), "Navrangpura");
    }

    #[test]
    fn stringifies_numeric_names() {
        let p = props(json!({"sourceward": 12}));
        assert_eq!(resolve_ward_name(&p), "12");
    }

    #[test]
    fn falls_back_to_sentinel() {
        let p = props(json!({"area": 3.2, "sourceward": null}));
        assert_eq!(resolve_ward_name(&p), UNKNOWN_WARD);
    }

    #[test]
    fn ward_set_renumbers_and_rejects_empty() {
        assert!(WardSet::new(Vec::new()).is_none());

        let a = Ward::new(7, square(0.0, 0.0), Map::new());
        let b = Ward::new(3, square(2.0, 1.0), Map::new());
        let set = WardSet::new(vec![a, b]).unwrap();
        let indices: Vec<usize> = set.iter().map(|w| w.index).collect();
        assert_eq!(indices, vec![0, 1]);

        let bounds = set.bounds().unwrap();
        assert!((bounds.min().x - 0.0).abs() < f64::EPSILON);
        assert!((bounds.max().x - 3.0).abs() < f64::EPSILON);
        assert!((bounds.max().y - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tagged_properties_carry_name() {
        let ward = Ward::new(0, square(0.0, 0.0), props(json!({"sourceward": "Maninagar"})));
        let tagged = ward.tagged_properties();
        assert_eq!(tagged[WARD_NAME_KEY], "Maninagar");
        assert_eq!(tagged["sourceward"], "Maninagar");
    }
}
