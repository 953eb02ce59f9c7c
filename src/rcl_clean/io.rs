use anyhow::{Context, Result, bail};
use geo::Coord;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use rcl_cleaner::{FeatureGeometry, InputFeature, Marker, OutputFeature};
use std::fs::File;
use std::path::Path;

pub fn read_features(path: &Path) -> Result<Vec<InputFeature>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let geojson: GeoJson = text
        .parse()
        .with_context(|| format!("parsing {} as GeoJSON", path.display()))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => bail!("{} holds a bare geometry, expected features", path.display()),
    };

    Ok(features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let id = match &feature.id {
                Some(geojson::feature::Id::String(s)) => s.clone(),
                Some(geojson::feature::Id::Number(n)) => n.to_string(),
                None => i.to_string(),
            };
            let geometry = feature
                .geometry
                .map_or(FeatureGeometry::Empty, |g| to_feature_geometry(g.value));
            InputFeature::new(id, geometry, feature.properties.unwrap_or_default())
        })
        .collect())
}

fn position(p: &[f64]) -> Coord {
    // a position missing an ordinate is caught later as non-finite
    Coord {
        x: p.first().copied().unwrap_or(f64::NAN),
        y: p.get(1).copied().unwrap_or(f64::NAN),
    }
}

fn positions(ps: &[Vec<f64>]) -> Vec<Coord> {
    ps.iter().map(|p| position(p)).collect()
}

fn to_feature_geometry(value: Value) -> FeatureGeometry {
    match value {
        Value::Point(p) => FeatureGeometry::Point(position(&p)),
        Value::MultiPoint(ps) => FeatureGeometry::MultiPoint(positions(&ps)),
        Value::LineString(ls) => FeatureGeometry::LineString(positions(&ls)),
        Value::MultiLineString(parts) => {
            FeatureGeometry::MultiLineString(parts.iter().map(|ls| positions(ls)).collect())
        }
        Value::Polygon(rings) => FeatureGeometry::Polygon(rings.iter().map(|r| positions(r)).collect()),
        Value::MultiPolygon(polygons) => FeatureGeometry::Polygon(
            polygons.iter().flatten().map(|r| positions(r)).collect(),
        ),
        Value::GeometryCollection(_) => FeatureGeometry::Empty,
    }
}

fn feature(value: Value, id: String, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(geojson::feature::Id::String(id)),
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn edges_to_geojson(edges: &[OutputFeature]) -> GeoJson {
    let features = edges
        .iter()
        .map(|edge| {
            let mut properties = edge.attributes.clone();
            properties.insert("rcl_source".to_string(), edge.source.0.clone().into());
            let line = edge.geometry.iter().map(|c| vec![c.x, c.y]).collect();
            feature(Value::LineString(line), edge.id.to_string(), properties)
        })
        .collect();
    collection(features)
}

pub fn markers_to_geojson(markers: &[Marker]) -> GeoJson {
    let features = markers
        .iter()
        .map(|marker| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), marker.id.into());
            properties.insert("cause".to_string(), marker.kind.cause().into());
            let point = vec![marker.point.x, marker.point.y];
            feature(Value::Point(point), marker.id.to_string(), properties)
        })
        .collect();
    collection(features)
}

fn collection(features: Vec<Feature>) -> GeoJson {
    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_geojson(path: &Path, geojson: &GeoJson) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(file, geojson).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
