//! Compiles composite schemes into Earth Engine expression graphs.

use chrono::NaiveDate;
use geo::{LineString, MultiPolygon};
use heat_priority_index::CompositeExpression;
use heat_priority_index_models::{
    Aggregate, Comparison, CompositeScheme, DeriveOp, LayerFilter, LayerSpec, SourceSpec,
};
use heat_priority_ward_models::WardSet;
use serde_json::Value;

use crate::expression::ValueNode;

/// Band name of the composite surface.
pub const PRIORITY_BAND: &str = "priority";

/// Band name of the raw exposure layer in reductions.
pub const EXPOSURE_BAND: &str = "population";

/// Feature property carrying the ward's index in the request.
pub const WARD_INDEX_PROPERTY: &str = "ward_index";

/// Output name of the percentile reducer.
pub const PERCENTILE_OUTPUT: &str = "p75";

/// Image property holding the acquisition time.
const TIME_START: &str = "system:time_start";

fn image_constant(value: f64) -> ValueNode {
    ValueNode::call("Image.constant", [("value", ValueNode::constant(value))])
}

fn date(value: NaiveDate) -> ValueNode {
    ValueNode::call(
        "Date",
        [("value", ValueNode::constant(value.format("%Y-%m-%d").to_string()))],
    )
}

fn binary(function: &str, image1: ValueNode, image2: ValueNode) -> ValueNode {
    ValueNode::call(function, [("image1", image1), ("image2", image2)])
}

fn filter_collection(collection: ValueNode, filter: ValueNode) -> ValueNode {
    ValueNode::call(
        "Collection.filter",
        [("collection", collection), ("filter", filter)],
    )
}

/// The filters a layer's collection goes through, in order.
fn filters(filter: &LayerFilter) -> Vec<ValueNode> {
    let time = || ValueNode::constant(TIME_START);

    let mut nodes = Vec::new();

    match (filter.start, filter.end) {
        (Some(start), Some(end)) => nodes.push(ValueNode::call(
            "Filter.dateRangeContains",
            [
                (
                    "leftValue",
                    ValueNode::call("DateRange", [("start", date(start)), ("end", date(end))]),
                ),
                ("rightField", time()),
            ],
        )),
        (Some(start), None) => nodes.push(ValueNode::call(
            "Filter.greaterThanOrEquals",
            [("leftField", time()), ("rightValue", date(start))],
        )),
        (None, Some(end)) => nodes.push(ValueNode::call(
            "Filter.lessThan",
            [("leftField", time()), ("rightValue", date(end))],
        )),
        (None, None) => {}
    }

    for property in &filter.properties {
        let function = match property.comparison {
            Comparison::LessThan => "Filter.lessThan",
            Comparison::GreaterThan => "Filter.greaterThan",
        };
        nodes.push(ValueNode::call(
            function,
            [
                ("leftField", ValueNode::constant(property.property.as_str())),
                ("rightValue", ValueNode::constant(property.value)),
            ],
        ));
    }

    nodes
}

/// The layer's collection after filtering, or `None` for image sources.
#[must_use]
pub fn filtered_collection(layer: &LayerSpec) -> Option<ValueNode> {
    let SourceSpec::Collection { dataset } = &layer.source else {
        return None;
    };

    let loaded = ValueNode::call(
        "ImageCollection.load",
        [("id", ValueNode::constant(dataset.as_str()))],
    );

    Some(
        layer
            .filter
            .iter()
            .flat_map(filters)
            .fold(loaded, filter_collection),
    )
}

/// Number of images in the layer's filtered collection.
#[must_use]
pub fn collection_size(layer: &LayerSpec) -> Option<ValueNode> {
    filtered_collection(layer)
        .map(|collection| ValueNode::call("Collection.size", [("collection", collection)]))
}

/// Band names of the layer's image, or of the first image of its filtered
/// collection.
#[must_use]
pub fn band_names(layer: &LayerSpec) -> ValueNode {
    let image = filtered_collection(layer).map_or_else(
        || load_image(layer.source.dataset()),
        |collection| ValueNode::call("Collection.first", [("collection", collection)]),
    );
    ValueNode::call("Image.bandNames", [("image", image)])
}

fn load_image(dataset: &str) -> ValueNode {
    ValueNode::call("Image.load", [("id", ValueNode::constant(dataset))])
}

/// The layer after selection, aggregation and derive steps, before
/// rescaling.
#[must_use]
pub fn raw_layer(layer: &LayerSpec) -> ValueNode {
    let image = match (filtered_collection(layer), layer.aggregate) {
        (Some(collection), Some(aggregate)) => {
            let function = match aggregate {
                Aggregate::Mean => "reduce.mean",
                Aggregate::Median => "reduce.median",
            };
            ValueNode::call(function, [("collection", collection)])
        }
        (Some(collection), None) => {
            ValueNode::call("Collection.first", [("collection", collection)])
        }
        (None, _) => load_image(layer.source.dataset()),
    };

    let mut steps = layer.derive.iter().peekable();

    let mut image = if steps.peek() == Some(&&DeriveOp::NormalizedDifference) {
        steps.next();
        ValueNode::call(
            "Image.normalizedDifference",
            [
                ("input", image),
                ("bandNames", ValueNode::strings(layer.bands.as_slice())),
            ],
        )
    } else {
        ValueNode::call(
            "Image.select",
            [
                ("input", image),
                ("bandSelectors", ValueNode::strings(layer.bands.as_slice())),
            ],
        )
    };

    for op in steps {
        image = derive(image, op);
    }

    image
}

fn derive(image: ValueNode, op: &DeriveOp) -> ValueNode {
    match *op {
        DeriveOp::Affine { scale, offset } => {
            let mut image = image;
            if (scale - 1.0).abs() > f64::EPSILON {
                image = binary("Image.multiply", image, image_constant(scale));
            }
            if offset.abs() > f64::EPSILON {
                image = binary("Image.add", image, image_constant(offset));
            }
            image
        }
        DeriveOp::Complement => binary("Image.subtract", image_constant(1.0), image),
        DeriveOp::Equals { value } => binary("Image.eq", image, image_constant(value)),
        DeriveOp::FocalMean { radius_m } => ValueNode::call(
            "Image.reduceNeighborhood",
            [
                ("image", image),
                ("reducer", ValueNode::nullary("Reducer.mean")),
                (
                    "kernel",
                    ValueNode::call(
                        "Kernel.circle",
                        [
                            ("radius", ValueNode::constant(radius_m)),
                            ("units", ValueNode::constant("meters")),
                        ],
                    ),
                ),
            ],
        ),
        // Only valid as the first step, where `raw_layer` consumes it.
        DeriveOp::NormalizedDifference => image,
    }
}

fn rename(image: ValueNode, name: &str) -> ValueNode {
    ValueNode::call(
        "Image.rename",
        [("input", image), ("names", ValueNode::strings(&[name]))],
    )
}

/// The layer rescaled to `[0, 1]` and weighted, named after the layer.
#[must_use]
pub fn weighted_layer(layer: &LayerSpec) -> ValueNode {
    let scaled = ValueNode::call(
        "Image.unitScale",
        [
            ("input", raw_layer(layer)),
            ("low", ValueNode::constant(layer.rescale.low)),
            ("high", ValueNode::constant(layer.rescale.high)),
        ],
    );
    let clamped = ValueNode::call(
        "Image.clamp",
        [
            ("input", scaled),
            ("low", ValueNode::constant(0.0)),
            ("high", ValueNode::constant(1.0)),
        ],
    );
    rename(
        binary("Image.multiply", clamped, image_constant(layer.weight)),
        &layer.id,
    )
}

fn ring(line: &LineString<f64>) -> Value {
    Value::Array(
        line.coords()
            .map(|c| Value::from(vec![c.x, c.y]))
            .collect(),
    )
}

fn multi_polygon_coordinates(geometry: &MultiPolygon<f64>) -> Value {
    Value::Array(
        geometry
            .iter()
            .map(|polygon| {
                Value::Array(
                    std::iter::once(polygon.exterior())
                        .chain(polygon.interiors())
                        .map(ring)
                        .collect(),
                )
            })
            .collect(),
    )
}

/// The wards as a feature collection, each feature tagged with its
/// [`WARD_INDEX_PROPERTY`].
#[must_use]
pub fn wards_collection(wards: &WardSet) -> ValueNode {
    let features = wards
        .iter()
        .map(|ward| {
            ValueNode::call(
                "Feature",
                [
                    (
                        "geometry",
                        ValueNode::call(
                            "GeometryConstructors.MultiPolygon",
                            [(
                                "coordinates",
                                ValueNode::ConstantValue(multi_polygon_coordinates(
                                    &ward.geometry,
                                )),
                            )],
                        ),
                    ),
                    (
                        "metadata",
                        ValueNode::constant(Value::Object(
                            [(WARD_INDEX_PROPERTY.to_string(), Value::from(ward.index))]
                                .into_iter()
                                .collect(),
                        )),
                    ),
                ],
            )
        })
        .collect();

    ValueNode::call("Collection", [("features", ValueNode::array(features))])
}

/// The weighted sum of all layers, clipped to the wards and divided by the
/// expression's divisor, as a single [`PRIORITY_BAND`].
#[must_use]
pub fn composite(expression: &CompositeExpression, wards: &ValueNode) -> ValueNode {
    let scheme: &CompositeScheme = &expression.scheme;

    let summed = scheme
        .layers
        .iter()
        .map(weighted_layer)
        .reduce(|acc, layer| binary("Image.add", acc, layer))
        .unwrap_or_else(|| image_constant(0.0));

    let mut image = ValueNode::call(
        "Image.clipToCollection",
        [
            ("input", rename(summed, PRIORITY_BAND)),
            ("collection", wards.clone()),
        ],
    );

    if let Some(divisor) = expression.divisor {
        image = binary("Image.divide", image, image_constant(divisor));
    }

    image
}

/// Maximum of the composite over the union of all wards.
#[must_use]
pub fn region_max(
    expression: &CompositeExpression,
    wards: &WardSet,
    scale_m: f64,
    max_pixels: f64,
) -> ValueNode {
    let collection = wards_collection(wards);
    ValueNode::call(
        "Image.reduceRegion",
        [
            ("image", composite(expression, &collection)),
            ("reducer", ValueNode::nullary("Reducer.max")),
            (
                "geometry",
                ValueNode::call("Collection.geometry", [("collection", collection)]),
            ),
            ("scale", ValueNode::constant(scale_m)),
            ("maxPixels", ValueNode::constant(max_pixels)),
        ],
    )
}

/// Per-ward percentile and mean of the composite, plus the mean of the
/// raw exposure layer when the scheme names one.
///
/// Returns the expression and whether it carries the exposure band, which
/// decides how output properties are named.
#[must_use]
pub fn reduce_regions(expression: &CompositeExpression, wards: &WardSet) -> (ValueNode, bool) {
    let collection = wards_collection(wards);
    let reduction = &expression.scheme.reduction;

    let mut image = composite(expression, &collection);

    let exposure = reduction
        .exposure_layer
        .as_deref()
        .and_then(|id| expression.scheme.layer(id));
    if let Some(layer) = exposure {
        image = ValueNode::call(
            "Image.addBands",
            [
                ("dstImg", image),
                ("srcImg", rename(raw_layer(layer), EXPOSURE_BAND)),
            ],
        );
    }

    let reducer = ValueNode::call(
        "Reducer.combine",
        [
            (
                "reducer1",
                ValueNode::call(
                    "Reducer.percentile",
                    [
                        ("percentiles", ValueNode::constant(vec![reduction.percentile])),
                        ("outputNames", ValueNode::strings(&[PERCENTILE_OUTPUT])),
                    ],
                ),
            ),
            ("reducer2", ValueNode::nullary("Reducer.mean")),
            ("sharedInputs", ValueNode::constant(true)),
        ],
    );

    let node = ValueNode::call(
        "Image.reduceRegions",
        [
            ("image", image),
            ("collection", collection),
            ("reducer", reducer),
            ("scale", ValueNode::constant(reduction.scale_m)),
        ],
    );

    (node, exposure.is_some())
}
