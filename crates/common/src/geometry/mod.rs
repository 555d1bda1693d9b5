//! Footprint geometry normalization
//!
//! Converts raw GeoJSON coordinate lists into validated single polygons and derives
//! the equal-area centroid and area stored with every image. Everything here is a
//! pure function over in-memory geometry; nothing is recomputed per read.

mod projection;

pub use projection::LambertAzimuthalEqualArea;

use crate::errors::{AppError, Result};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BoundingRect, Centroid, Coord, LineString, MultiPolygon, Point, Polygon};

/// Geographic CRS used for every geometry at rest
pub const STORAGE_SRID: i32 = 4326;

/// Vertex count used when buffering a point into a circle
pub const BUFFER_SEGMENTS: usize = 64;

/// A validated image footprint with its derived values
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub polygon: Polygon<f64>,
    pub centroid: Point<f64>,
    pub area_km2: f64,
}

/// Validate and derive everything stored for a footprint
pub fn normalize(geometry: &geojson::Geometry) -> Result<Footprint> {
    let polygon = polygon_from_geojson(geometry)?;
    let (centroid, area_km2) = centroid_and_area(&polygon)?;
    Ok(Footprint {
        polygon,
        centroid,
        area_km2,
    })
}

/// Accept only a GeoJSON `Polygon` made of exactly one ring
pub fn polygon_from_geojson(geometry: &geojson::Geometry) -> Result<Polygon<f64>> {
    match &geometry.value {
        geojson::Value::Polygon(rings) => to_polygon(rings),
        geojson::Value::MultiPolygon(parts) => Err(AppError::rejected(format!(
            "multi-part geometry with {} parts",
            parts.len()
        ))),
        other => Err(AppError::rejected(format!(
            "unsupported geometry type {}",
            geometry_type(other)
        ))),
    }
}

fn geometry_type(value: &geojson::Value) -> &'static str {
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

/// Convert a nested coordinate list (`[[[lon, lat], ...]]`) into a polygon.
///
/// Multi-ring input (holes included) is rejected rather than coerced. An unclosed
/// ring is closed, repeated consecutive positions are collapsed, and rings that
/// cross or touch themselves are rejected.
pub fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let ring = match rings {
        [] => return Err(AppError::rejected("empty coordinate list")),
        [ring] => ring,
        _ => {
            return Err(AppError::rejected(format!(
                "expected a single ring, found {}",
                rings.len()
            )))
        }
    };

    let mut coords = Vec::with_capacity(ring.len() + 1);
    for position in ring {
        coords.push(position_to_coord(position)?);
    }
    coords.dedup();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    if coords.len() < 4 {
        return Err(AppError::rejected(format!(
            "ring has {} positions, at least 4 required",
            coords.len()
        )));
    }

    let polygon = Polygon::new(LineString::from(coords), vec![]);
    if polygon.unsigned_area() == 0.0 {
        return Err(AppError::rejected("ring encloses no area"));
    }
    if !is_simple(polygon.exterior()) {
        return Err(AppError::rejected("ring is self-intersecting"));
    }
    Ok(polygon)
}

/// A closed ring is simple when neighbouring edges meet only at their shared
/// vertex and no other pair of edges meets at all
fn is_simple(ring: &LineString<f64>) -> bool {
    let edges: Vec<_> = ring.lines().collect();
    let last = edges.len().saturating_sub(1);

    for i in 0..edges.len() {
        for j in (i + 1)..edges.len() {
            let adjacent = j == i + 1 || (i == 0 && j == last);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

fn position_to_coord(position: &[f64]) -> Result<Coord<f64>> {
    let (x, y) = match position {
        [x, y, ..] => (*x, *y),
        _ => {
            return Err(AppError::rejected(format!(
                "position has {} ordinates",
                position.len()
            )))
        }
    };
    if !x.is_finite() || !y.is_finite() {
        return Err(AppError::rejected("non-finite coordinate"));
    }
    if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
        return Err(AppError::rejected(format!("coordinate ({x}, {y}) out of range")));
    }
    Ok(Coord { x, y })
}

/// Equal-area centroid (WGS84) and area in km² rounded to 3 decimals.
///
/// The polygon is projected into a Lambert azimuthal equal-area plane centred on
/// its bounding box, measured there, and the centroid is projected back.
pub fn centroid_and_area(polygon: &Polygon<f64>) -> Result<(Point<f64>, f64)> {
    let bounds = polygon
        .bounding_rect()
        .ok_or_else(|| AppError::rejected("empty polygon"))?;
    let center = bounds.center();
    let proj = LambertAzimuthalEqualArea::centered_on(center.x, center.y);

    let projected = project_polygon(&proj, polygon)?;
    let area_m2 = projected.unsigned_area();
    let centroid = projected
        .centroid()
        .ok_or_else(|| AppError::rejected("degenerate polygon has no centroid"))?;

    let geographic = proj.inverse(centroid.x(), centroid.y());
    Ok((Point::from(geographic), round3(area_m2 / 1_000_000.0)))
}

fn project_polygon(proj: &LambertAzimuthalEqualArea, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
    let exterior = polygon
        .exterior()
        .coords()
        .map(|c| proj.forward(c.x, c.y))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| AppError::rejected("polygon spans the projection antipode"))?;
    Ok(Polygon::new(LineString::from(exterior), vec![]))
}

/// Circle of `radius_m` meters around `point`, built in an equal-area plane centred
/// on the point and returned in geographic coordinates.
pub fn buffer_point(point: Point<f64>, radius_m: f64, segments: usize) -> Result<Polygon<f64>> {
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return Err(AppError::rejected(format!("invalid buffer radius {radius_m}")));
    }
    position_to_coord(&[point.x(), point.y()])?;

    let segments = segments.max(8);
    let proj = LambertAzimuthalEqualArea::centered_on(point.x(), point.y());
    let ring: Vec<Coord<f64>> = (0..=segments)
        .map(|i| {
            let theta = std::f64::consts::TAU * (i % segments) as f64 / segments as f64;
            proj.inverse(radius_m * theta.cos(), radius_m * theta.sin())
        })
        .collect();
    Ok(Polygon::new(LineString::from(ring), vec![]))
}

/// Promote a polygon to a one-part multi-polygon
pub fn promote(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon])
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
