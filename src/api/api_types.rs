//! Request bodies and list filters sent to the property API.
//!
//! These types are separate from the records in `types` because the server
//! assigns ids and only accepts a subset of fields on write.

use serde::{Deserialize, Serialize};

use super::types::{Bbox, FeatureKind, Point, Property, PropertyAttributes};

/// Body of `POST /api/portfolios/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPortfolio {
  pub name: String,
}

/// Body of `PATCH /api/portfolios/{id}/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioPatch {
  pub name: String,
}

/// A property feature without an id, used for create and full replace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDraft {
  #[serde(rename = "type", default)]
  pub kind: FeatureKind,
  pub geometry: Point,
  pub properties: PropertyAttributes,
}

impl PropertyDraft {
  pub fn new(geometry: Point, properties: PropertyAttributes) -> Self {
    Self {
      kind: FeatureKind::Feature,
      geometry,
      properties,
    }
  }

  /// Attach a server-assigned id.
  pub fn into_property(self, id: i64) -> Property {
    Property {
      id,
      kind: self.kind,
      geometry: self.geometry,
      properties: self.properties,
    }
  }
}

/// Page number (1-based) and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
  pub number: u32,
  pub size: u32,
}

impl Page {
  pub fn new(number: u32, size: u32) -> Self {
    Self { number, size }
  }
}

/// Filters accepted by `GET /api/properties/`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PropertyFilter {
  pub bbox: Option<Bbox>,
  pub portfolio: Option<i64>,
  pub page: Option<Page>,
}

impl PropertyFilter {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn in_bbox(bbox: Bbox) -> Self {
    Self {
      bbox: Some(bbox),
      ..Self::default()
    }
  }

  pub fn portfolio(id: i64) -> Self {
    Self {
      portfolio: Some(id),
      ..Self::default()
    }
  }

  pub fn paged(self, number: u32, size: u32) -> Self {
    Self {
      page: Some(Page::new(number, size)),
      ..self
    }
  }

  /// Query string pairs in the order the API documents them.
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(bbox) = &self.bbox {
      pairs.push(("in_bbox", bbox.to_string()));
    }
    if let Some(id) = self.portfolio {
      pairs.push(("portfolio", id.to_string()));
    }
    if let Some(page) = self.page {
      pairs.push(("page", page.number.to_string()));
      pairs.push(("page_size", page.size.to_string()));
    }
    pairs
  }
}
