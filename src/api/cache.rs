//! Query keys for cached API calls.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

use super::api_types::PropertyFilter;

pub const PORTFOLIOS: &str = "portfolios";
pub const PORTFOLIO: &str = "portfolio";
pub const PROPERTY: &str = "property";
pub const PROPERTIES_IN_BBOX: &str = "properties:bbox";
pub const PROPERTY_LISTS: &str = "properties:list";

/// Query key types for property API calls.
#[derive(Clone, Debug)]
pub enum ApiQueryKey {
  /// All portfolios
  Portfolios,
  /// A single portfolio by id
  Portfolio { id: i64 },
  /// A single property by id
  Property { id: i64 },
  /// A property collection; bounding box, portfolio and page all key it
  Properties(PropertyFilter),
}

impl QueryKey for ApiQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::Portfolios => "portfolios".to_string(),
      Self::Portfolio { id } => format!("portfolio:{}", id),
      Self::Property { id } => format!("property:{}", id),
      Self::Properties(filter) => {
        let mut input = String::from("properties");
        for (name, value) in filter.query_pairs() {
          input.push_str(&format!(":{}={}", name, value));
        }
        input
      }
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::Portfolios => "all portfolios".to_string(),
      Self::Portfolio { id } => format!("portfolio {}", id),
      Self::Property { id } => format!("property {}", id),
      Self::Properties(filter) => {
        let pairs = filter.query_pairs();
        if pairs.is_empty() {
          "all properties".to_string()
        } else {
          let params: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
          format!("properties: {}", params.join("&"))
        }
      }
    }
  }

  fn family(&self) -> &'static str {
    match self {
      Self::Portfolios => PORTFOLIOS,
      Self::Portfolio { .. } => PORTFOLIO,
      Self::Property { .. } => PROPERTY,
      Self::Properties(filter) if filter.bbox.is_some() => PROPERTIES_IN_BBOX,
      Self::Properties(_) => PROPERTY_LISTS,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Bbox;

  #[test]
  fn test_pages_hash_differently() {
    let page1 = ApiQueryKey::Properties(PropertyFilter::all().paged(1, 12));
    let page2 = ApiQueryKey::Properties(PropertyFilter::all().paged(2, 12));
    let page1_again = ApiQueryKey::Properties(PropertyFilter::all().paged(1, 12));

    assert_ne!(page1.cache_hash(), page2.cache_hash());
    assert_eq!(page1.cache_hash(), page1_again.cache_hash());
    assert_eq!(page1.cache_hash().len(), 64);
  }

  #[test]
  fn test_page_size_is_part_of_key() {
    let small = ApiQueryKey::Properties(PropertyFilter::portfolio(3).paged(1, 12));
    let large = ApiQueryKey::Properties(PropertyFilter::portfolio(3).paged(1, 24));
    assert_ne!(small.cache_hash(), large.cache_hash());
  }

  #[test]
  fn test_bbox_keys() {
    let a = ApiQueryKey::Properties(PropertyFilter::in_bbox(Bbox::new(10.0, 59.0, 11.0, 60.0)));
    let b = ApiQueryKey::Properties(PropertyFilter::in_bbox(Bbox::new(10.0, 59.0, 11.0, 60.5)));

    assert_ne!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.family(), PROPERTIES_IN_BBOX);
    assert_eq!(a.description(), "properties: in_bbox=10,59,11,60");
  }

  #[test]
  fn test_families() {
    assert_eq!(ApiQueryKey::Portfolios.family(), PORTFOLIOS);
    assert_eq!(ApiQueryKey::Property { id: 1 }.family(), PROPERTY);
    assert_eq!(
      ApiQueryKey::Properties(PropertyFilter::portfolio(1)).family(),
      PROPERTY_LISTS
    );
    assert_ne!(
      ApiQueryKey::Portfolio { id: 1 }.cache_hash(),
      ApiQueryKey::Property { id: 1 }.cache_hash()
    );
  }
}
