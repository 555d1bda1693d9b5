//! Raw catalog record to typed entities
//!
//! Each field is extracted explicitly and coerced to its target type. Required
//! fields fail fast with `MalformedFeature`; optional ones fall back to defaults.

use crate::domain::{AssetType, FeatureBundle, ImageFeature, ItemType, Satellite};
use crate::errors::{AppError, Result};
use crate::geometry;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One feature exactly as returned by the catalog search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFeature(pub Value);

impl RawFeature {
    /// External id if present, for logging features that fail to parse
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }
}

impl From<Value> for RawFeature {
    fn from(value: Value) -> Self {
        RawFeature(value)
    }
}

/// Build all entities for one raw feature. Pure; performs no I/O.
pub fn from_raw(raw: &RawFeature) -> Result<FeatureBundle> {
    let object = raw
        .0
        .as_object()
        .ok_or_else(|| AppError::malformed("<unknown>", "feature is not a JSON object"))?;

    let id = required_str(object, "id", "<unknown>")?.to_string();
    let properties = match object.get("properties") {
        Some(Value::Object(map)) => map,
        _ => return Err(AppError::malformed(&id, "missing properties")),
    };

    let sat_id = required_str(properties, "satellite_id", &id)?.to_string();
    let time_acquired = parse_timestamp(required_str(properties, "acquired", &id)?)
        .ok_or_else(|| AppError::malformed(&id, "acquired is not a valid timestamp"))?;
    let item_type_id = required_str(properties, "item_type", &id)?.to_string();

    let geometry_value = object
        .get("geometry")
        .filter(|value| !value.is_null())
        .ok_or_else(|| AppError::malformed(&id, "missing geometry"))?;
    let geometry = geojson::Geometry::from_json_value(geometry_value.clone())
        .map_err(|e| AppError::malformed(&id, format!("geometry is not GeoJSON: {e}")))?;

    let name = match properties.get("provider").and_then(Value::as_str) {
        Some(provider) if !provider.trim().is_empty() => title_case(provider),
        _ => sat_id.clone(),
    };
    let pixel_res = optional_f64(properties, "pixel_resolution", &id)?;

    let cloud_cover = optional_f64(properties, "cloud_cover", &id)?.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&cloud_cover) {
        return Err(AppError::malformed(
            &id,
            format!("cloud_cover {cloud_cover} outside [0, 1]"),
        ));
    }

    let clear_confidence_percent = optional_f64(properties, "clear_confidence_percent", &id)?
        .map(|value| value.round() as i32)
        .unwrap_or(0);
    if !(0..=100).contains(&clear_confidence_percent) {
        return Err(AppError::malformed(
            &id,
            format!("clear_confidence_percent {clear_confidence_percent} outside [0, 100]"),
        ));
    }

    let asset_types = asset_type_ids(object, &id)?
        .into_iter()
        .map(|id| AssetType { id })
        .collect();

    let footprint = geometry::normalize(&geometry)?;

    Ok(FeatureBundle {
        satellite: Satellite {
            id: sat_id.clone(),
            name,
            pixel_res,
        },
        item_type: ItemType {
            id: item_type_id.clone(),
            sat_id: sat_id.clone(),
        },
        asset_types,
        image: ImageFeature {
            id,
            footprint,
            cloud_cover,
            clear_confidence_percent,
            time_acquired,
            sat_id,
            item_type_id,
        },
    })
}

fn required_str<'a>(map: &'a Map<String, Value>, field: &str, feature_id: &str) -> Result<&'a str> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::Null) | None => Err(AppError::malformed(feature_id, format!("missing {field}"))),
        Some(_) => Err(AppError::malformed(feature_id, format!("{field} is not a non-empty string"))),
    }
}

fn optional_f64(map: &Map<String, Value>, field: &str, feature_id: &str) -> Result<Option<f64>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(_) => Err(AppError::malformed(feature_id, format!("{field} is not a number"))),
    }
}

fn asset_type_ids(object: &Map<String, Value>, feature_id: &str) -> Result<Vec<String>> {
    match object.get("assets") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::malformed(feature_id, "assets contains a non-string entry"))
            })
            .collect(),
        Some(_) => Err(AppError::malformed(feature_id, "assets is not a list")),
    }
}

/// RFC 3339 timestamps are converted to UTC; naive timestamps are taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// "planetscope" -> "Planetscope", "sky sat" -> "Sky Sat"
fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn raw_feature() -> Value {
        json!({
            "id": "20220901_101233_23_2424",
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[13.30, 52.45], [13.45, 52.45], [13.45, 52.55], [13.30, 52.55], [13.30, 52.45]]]
            },
            "properties": {
                "satellite_id": "2424",
                "provider": "planetscope",
                "acquired": "2022-09-01T12:12:33.123456+02:00",
                "published": "2022-09-02T01:00:00Z",
                "pixel_resolution": 3,
                "item_type": "PSScene",
                "cloud_cover": 0.04,
                "clear_confidence_percent": 93
            },
            "assets": ["basic_analytic_4b", "ortho_visual"]
        })
    }

    #[test]
    fn test_from_raw_extracts_all_fields() {
        let bundle = from_raw(&RawFeature(raw_feature())).unwrap();

        assert_eq!(bundle.satellite.id, "2424");
        assert_eq!(bundle.satellite.name, "Planetscope");
        assert_eq!(bundle.satellite.pixel_res, Some(3.0));
        assert_eq!(bundle.item_type.id, "PSScene");
        assert_eq!(bundle.item_type.sat_id, "2424");
        assert_eq!(bundle.asset_types.len(), 2);
        assert_eq!(bundle.asset_types[1].id, "ortho_visual");

        let image = &bundle.image;
        assert_eq!(image.id, "20220901_101233_23_2424");
        assert_eq!(image.cloud_cover, 0.04);
        assert_eq!(image.clear_confidence_percent, 93);
        // +02:00 offset is normalized to UTC
        assert_eq!(image.time_acquired.hour(), 10);
        assert_eq!(image.time_acquired.day(), 1);
        assert!(image.footprint.area_km2 > 0.0);
    }

    #[test]
    fn test_optional_fields_default() {
        let mut value = raw_feature();
        let props = value["properties"].as_object_mut().unwrap();
        props.remove("cloud_cover");
        props.remove("clear_confidence_percent");
        props.remove("pixel_resolution");
        props.remove("provider");
        value.as_object_mut().unwrap().remove("assets");

        let bundle = from_raw(&RawFeature(value)).unwrap();
        assert_eq!(bundle.image.cloud_cover, 0.0);
        assert_eq!(bundle.image.clear_confidence_percent, 0);
        assert_eq!(bundle.satellite.pixel_res, None);
        assert_eq!(bundle.satellite.name, "2424");
        assert!(bundle.asset_types.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["satellite_id", "acquired", "item_type"] {
            let mut value = raw_feature();
            value["properties"].as_object_mut().unwrap().remove(field);
            let err = from_raw(&RawFeature(value)).unwrap_err();
            assert!(matches!(err, AppError::MalformedFeature { .. }), "{field}");
            assert!(err.to_string().contains(field));
        }

        let mut value = raw_feature();
        value.as_object_mut().unwrap().remove("id");
        assert!(matches!(
            from_raw(&RawFeature(value)).unwrap_err(),
            AppError::MalformedFeature { .. }
        ));

        let mut value = raw_feature();
        value["geometry"] = Value::Null;
        assert!(matches!(
            from_raw(&RawFeature(value)).unwrap_err(),
            AppError::MalformedFeature { .. }
        ));
    }

    #[test]
    fn test_multipolygon_footprint_is_rejected() {
        let mut value = raw_feature();
        value["geometry"] = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]]]
            ]
        });
        let err = from_raw(&RawFeature(value)).unwrap_err();
        assert!(matches!(err, AppError::GeometryRejected { .. }));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut value = raw_feature();
        value["properties"]["cloud_cover"] = json!(1.5);
        assert!(from_raw(&RawFeature(value)).is_err());

        let mut value = raw_feature();
        value["properties"]["clear_confidence_percent"] = json!(140);
        assert!(from_raw(&RawFeature(value)).is_err());
    }

    #[test]
    fn test_wrong_types_rejected() {
        let mut value = raw_feature();
        value["properties"]["cloud_cover"] = json!("cloudy");
        assert!(from_raw(&RawFeature(value)).is_err());

        let mut value = raw_feature();
        value["assets"] = json!([1, 2]);
        assert!(from_raw(&RawFeature(value)).is_err());
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let parsed = parse_timestamp("2022-09-01T10:12:33").unwrap();
        assert_eq!(parsed.hour(), 10);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("planetscope"), "Planetscope");
        assert_eq!(title_case("SKYSAT"), "Skysat");
        assert_eq!(title_case("rapid eye"), "Rapid Eye");
    }

    #[test]
    fn test_raw_feature_id() {
        assert_eq!(RawFeature(raw_feature()).id(), Some("20220901_101233_23_2424"));
        assert_eq!(RawFeature(json!({})).id(), None);
    }
}
