//! Domain records exchanged with the property API.
//!
//! Properties travel as GeoJSON features, so the record keeps the
//! `type`/`geometry`/`properties` envelope instead of flattening it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named grouping of properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
  pub id: i64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

impl Portfolio {
  pub fn new(id: i64, name: impl Into<String>) -> Self {
    Self {
      id,
      name: name.into(),
      created_at: None,
    }
  }

  /// Same record under a different name.
  pub fn renamed(&self, name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..self.clone()
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
  #[default]
  Feature,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
  #[default]
  Point,
}

/// GeoJSON point, coordinates are `[longitude, latitude]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
  #[serde(rename = "type", default)]
  pub kind: GeometryKind,
  pub coordinates: [f64; 2],
}

impl Point {
  pub fn new(longitude: f64, latitude: f64) -> Self {
    Self {
      kind: GeometryKind::Point,
      coordinates: [longitude, latitude],
    }
  }

  pub fn longitude(&self) -> f64 {
    self.coordinates[0]
  }

  pub fn latitude(&self) -> f64 {
    self.coordinates[1]
  }
}

/// Attributes carried in a property feature's `properties` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAttributes {
  pub name: String,
  pub portfolio: Option<i64>,
  pub address: String,
  pub zip_code: String,
  pub city: String,
  pub estimated_value: f64,
  pub relevant_risks: u32,
  pub handled_risks: u32,
  pub total_financial_risk: f64,
}

/// A geolocated real-estate asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub id: i64,
  #[serde(rename = "type", default)]
  pub kind: FeatureKind,
  pub geometry: Point,
  pub properties: PropertyAttributes,
}

/// One page of a paginated property collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPage {
  pub count: u64,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub previous: Option<String>,
  #[serde(default)]
  pub features: Vec<Property>,
}

impl PropertyPage {
  /// Number of pages needed to show `count` features at `page_size` per page.
  pub fn total_pages(&self, page_size: u32) -> u64 {
    if page_size == 0 {
      return 0;
    }
    self.count.div_ceil(u64::from(page_size))
  }
}

/// Geographic rectangle `[min_lon, min_lat, max_lon, max_lat]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
  pub min_lon: f64,
  pub min_lat: f64,
  pub max_lon: f64,
  pub max_lat: f64,
}

impl Bbox {
  pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
    Self {
      min_lon,
      min_lat,
      max_lon,
      max_lat,
    }
  }

  pub fn contains(&self, point: &Point) -> bool {
    (self.min_lon..=self.max_lon).contains(&point.longitude())
      && (self.min_lat..=self.max_lat).contains(&point.latitude())
  }
}

/// Formats as the `in_bbox` query value: `minLon,minLat,maxLon,maxLat`
impl fmt::Display for Bbox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{},{},{},{}",
      self.min_lon, self.min_lat, self.max_lon, self.max_lat
    )
  }
}

impl FromStr for Bbox {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let parts = s
      .split(',')
      .map(|p| p.trim().parse::<f64>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|e| format!("invalid bounding box '{}': {}", s, e))?;

    match parts.as_slice() {
      [min_lon, min_lat, max_lon, max_lat] => {
        if min_lon > max_lon || min_lat > max_lat {
          return Err(format!("bounding box '{}' has min greater than max", s));
        }
        Ok(Self::new(*min_lon, *min_lat, *max_lon, *max_lat))
      }
      _ => Err(format!(
        "bounding box '{}' must have exactly four comma-separated numbers",
        s
      )),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = r#"{
    "type": "FeatureCollection",
    "count": 25,
    "next": "http://localhost:8000/api/properties/?page=2&page_size=12",
    "previous": null,
    "features": [
      {
        "id": 7,
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [10.75, 59.91] },
        "properties": {
          "name": "Harbour office",
          "portfolio": 3,
          "address": "Kaigata 1",
          "zip_code": "0150",
          "city": "Oslo",
          "estimated_value": 12500000,
          "relevant_risks": 4,
          "handled_risks": 2,
          "total_financial_risk": 300000
        }
      }
    ]
  }"#;

  #[test]
  fn test_decode_geojson_page() {
    let page: PropertyPage = serde_json::from_str(PAGE).unwrap();

    assert_eq!(page.count, 25);
    assert_eq!(page.features.len(), 1);

    let property = &page.features[0];
    assert_eq!(property.id, 7);
    assert_eq!(property.geometry.longitude(), 10.75);
    assert_eq!(property.geometry.latitude(), 59.91);
    assert_eq!(property.properties.portfolio, Some(3));
    assert_eq!(property.properties.estimated_value, 12_500_000.0);
  }

  #[test]
  fn test_total_pages_rounds_up() {
    let page: PropertyPage = serde_json::from_str(PAGE).unwrap();
    assert_eq!(page.total_pages(12), 3);
    assert_eq!(page.total_pages(25), 1);
    assert_eq!(page.total_pages(0), 0);
  }

  #[test]
  fn test_portfolio_without_created_at() {
    let portfolio: Portfolio = serde_json::from_str(r#"{"id": 1, "name": "A"}"#).unwrap();
    assert_eq!(portfolio, Portfolio::new(1, "A"));

    let with_ts: Portfolio = serde_json::from_str(
      r#"{"id": 2, "name": "B", "created_at": "2024-05-01T08:30:00.123456Z"}"#,
    )
    .unwrap();
    assert!(with_ts.created_at.is_some());
  }

  #[test]
  fn test_bbox_parse_and_display() {
    let bbox: Bbox = "10.5, 59.8,10.9,60.0".parse().unwrap();
    assert_eq!(bbox, Bbox::new(10.5, 59.8, 10.9, 60.0));
    assert_eq!(bbox.to_string(), "10.5,59.8,10.9,60");
    assert!(bbox.contains(&Point::new(10.75, 59.91)));
    assert!(!bbox.contains(&Point::new(11.0, 59.91)));
  }

  #[test]
  fn test_bbox_rejects_bad_input() {
    assert!("1,2,3".parse::<Bbox>().is_err());
    assert!("a,b,c,d".parse::<Bbox>().is_err());
    assert!("5,0,1,1".parse::<Bbox>().is_err());
  }
}
