//! Cached API client that wraps ApiClient with transparent caching.

use async_trait::async_trait;
use color_eyre::Result;
use tracing::debug;

use crate::cache::{CacheLayer, CacheResult, MemoryStorage, NoopStorage, QueryOptions};
use crate::config::{CacheConfig, Config, ExecutionContext};

use super::api_types::{NewPortfolio, PortfolioPatch, PropertyDraft, PropertyFilter};
use super::cache::{ApiQueryKey, PROPERTIES_IN_BBOX, PROPERTY_LISTS};
use super::client::ApiClient;
use super::error::ApiResult;
use super::gateway::PortfolioGateway;
use super::types::{Portfolio, Property, PropertyPage};

/// API client with transparent caching support.
///
/// This wraps the underlying ApiClient and provides the same API, but caches
/// reads and keeps the cache consistent with its own writes.
#[derive(Clone)]
pub struct CachedApiClient {
  inner: ApiClient,
  cache: CacheLayer,
  map_stale_time: chrono::Duration,
}

impl CachedApiClient {
  /// Create a new cached API client.
  pub fn new(config: &Config, context: ExecutionContext) -> Result<Self> {
    let inner = ApiClient::new(&config.api, context)?;
    Ok(Self::from_parts(inner, &config.cache))
  }

  pub fn from_parts(inner: ApiClient, config: &CacheConfig) -> Self {
    let cache = if config.enabled {
      CacheLayer::new(MemoryStorage::new())
    } else {
      CacheLayer::new(NoopStorage)
    };

    Self {
      inner,
      cache: cache.with_stale_time(config.stale_time()),
      map_stale_time: config.map_stale_time(),
    }
  }

  /// All portfolios with caching.
  pub async fn portfolios(&self) -> ApiResult<CacheResult<Vec<Portfolio>>> {
    let inner = self.inner.clone();
    self
      .cache
      .fetch(&ApiQueryKey::Portfolios, QueryOptions::default(), move || async move {
        inner.list_portfolios().await
      })
      .await
  }

  /// A single portfolio with caching.
  pub async fn portfolio(&self, id: i64) -> ApiResult<Portfolio> {
    let inner = self.inner.clone();
    let result = self
      .cache
      .fetch(&ApiQueryKey::Portfolio { id }, QueryOptions::default(), move || async move {
        inner.get_portfolio(id).await
      })
      .await?;

    Ok(result.data)
  }

  /// A single property with caching.
  pub async fn property(&self, id: i64) -> ApiResult<Property> {
    let inner = self.inner.clone();
    let result = self
      .cache
      .fetch(&ApiQueryKey::Property { id }, QueryOptions::default(), move || async move {
        inner.get_property(id).await
      })
      .await?;

    Ok(result.data)
  }

  /// A page of properties with caching.
  ///
  /// Bounding-box queries serve the previous result while revalidating, so a
  /// map that pans back and forth does not flicker.
  pub async fn properties(&self, filter: PropertyFilter) -> ApiResult<CacheResult<PropertyPage>> {
    let inner = self.inner.clone();
    self
      .cache
      .fetch(&ApiQueryKey::Properties(filter), self.options(&filter), move || async move {
        inner.list_properties(&filter).await
      })
      .await
  }

  fn options(&self, filter: &PropertyFilter) -> QueryOptions {
    if filter.bbox.is_some() {
      QueryOptions::default()
        .stale_time(self.map_stale_time)
        .stale_while_revalidate()
    } else {
      QueryOptions::default()
    }
  }

  /// Pre-fetch a page of properties, reusing any cached copy.
  pub async fn ensure_properties(
    &self,
    filter: PropertyFilter,
  ) -> ApiResult<CacheResult<PropertyPage>> {
    let inner = self.inner.clone();
    self
      .cache
      .ensure(&ApiQueryKey::Properties(filter), self.options(&filter), move || async move {
        inner.list_properties(&filter).await
      })
      .await
  }

  /// What to show for `filter` while it loads: its own entry, or the latest
  /// result of the same kind of query.
  pub fn placeholder_properties(&self, filter: PropertyFilter) -> ApiResult<Option<PropertyPage>> {
    self.cache.placeholder(&ApiQueryKey::Properties(filter))
  }

  /// Create a property (write operation, evicts cached lists).
  pub async fn create_property(&self, draft: &PropertyDraft) -> ApiResult<Property> {
    let created = self.inner.create_property(draft).await?;
    self.after_property_write(&created)?;
    Ok(created)
  }

  /// Replace a property (write operation, evicts cached lists).
  pub async fn update_property(&self, id: i64, draft: &PropertyDraft) -> ApiResult<Property> {
    let updated = self.inner.update_property(id, draft).await?;
    self.after_property_write(&updated)?;
    Ok(updated)
  }

  /// Delete a property (write operation, evicts cached lists).
  pub async fn delete_property(&self, id: i64) -> ApiResult<()> {
    self.inner.delete_property(id).await?;
    self.after_property_delete(id);
    Ok(())
  }

  fn after_property_write(&self, property: &Property) -> ApiResult<()> {
    self
      .cache
      .set_query_data(&ApiQueryKey::Property { id: property.id }, property)?;
    self.invalidate_property_lists();
    Ok(())
  }

  fn after_property_delete(&self, id: i64) {
    self.cache.invalidate(&ApiQueryKey::Property { id });
    self.invalidate_property_lists();
  }

  fn invalidate_property_lists(&self) {
    let removed =
      self.cache.invalidate_family(PROPERTY_LISTS) + self.cache.invalidate_family(PROPERTIES_IN_BBOX);
    debug!(removed, "evicted cached property lists");
  }

  fn after_portfolio_write(&self, id: Option<i64>) {
    self.cache.invalidate(&ApiQueryKey::Portfolios);
    if let Some(id) = id {
      self.cache.invalidate(&ApiQueryKey::Portfolio { id });
    }
  }
}

#[async_trait]
impl PortfolioGateway for CachedApiClient {
  async fn list_portfolios(&self) -> ApiResult<Vec<Portfolio>> {
    Ok(self.portfolios().await?.into_data())
  }

  async fn create_portfolio(&self, draft: NewPortfolio) -> ApiResult<Portfolio> {
    let created = self.inner.create_portfolio(&draft).await?;
    self.after_portfolio_write(None);
    Ok(created)
  }

  async fn rename_portfolio(&self, id: i64, patch: PortfolioPatch) -> ApiResult<Portfolio> {
    let renamed = self.inner.update_portfolio(id, &patch).await?;
    self.after_portfolio_write(Some(id));
    Ok(renamed)
  }

  async fn delete_portfolio(&self, id: i64) -> ApiResult<()> {
    self.inner.delete_portfolio(id).await?;
    self.after_portfolio_write(Some(id));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{Bbox, FeatureKind, Point, PropertyAttributes};
  use crate::cache::CacheSource;
  use crate::config::ApiConfig;

  // Nothing listens on the discard port, so any request fails fast
  fn client(stale_time_secs: i64, map_stale_time_secs: i64) -> CachedApiClient {
    let api = ApiConfig {
      url: "http://127.0.0.1:9".to_string(),
      internal_url: "http://127.0.0.1:9".to_string(),
      co_located: false,
      timeout_secs: 1,
    };
    let inner = ApiClient::new(&api, ExecutionContext::Client).unwrap();
    CachedApiClient::from_parts(
      inner,
      &CacheConfig {
        enabled: true,
        stale_time_secs,
        map_stale_time_secs,
      },
    )
  }

  fn property(id: i64, name: &str) -> Property {
    Property {
      id,
      kind: FeatureKind::Feature,
      geometry: Point::new(10.75, 59.91),
      properties: PropertyAttributes {
        name: name.to_string(),
        portfolio: Some(3),
        address: "Kaigata 1".to_string(),
        zip_code: "0150".to_string(),
        city: "Oslo".to_string(),
        estimated_value: 25_000_000.0,
        relevant_risks: 4,
        handled_risks: 2,
        total_financial_risk: 1_200_000.0,
      },
    }
  }

  fn page(properties: Vec<Property>) -> PropertyPage {
    PropertyPage {
      count: properties.len() as u64,
      next: None,
      previous: None,
      features: properties,
    }
  }

  fn bbox_filter() -> PropertyFilter {
    PropertyFilter::in_bbox(Bbox::new(10.0, 59.5, 11.0, 60.0))
  }

  fn cached<T: serde::de::DeserializeOwned>(client: &CachedApiClient, key: &ApiQueryKey) -> Option<T> {
    client.cache.get_query_data(key).unwrap()
  }

  #[tokio::test]
  async fn test_bbox_reads_use_map_stale_time() {
    let client = client(0, 300);
    let list = PropertyFilter::all().paged(1, 12);
    client
      .cache
      .set_query_data(&ApiQueryKey::Properties(bbox_filter()), &page(vec![property(1, "A")]))
      .unwrap();
    client
      .cache
      .set_query_data(&ApiQueryKey::Properties(list), &page(vec![property(2, "B")]))
      .unwrap();

    let map = client.properties(bbox_filter()).await.unwrap();
    assert_eq!(map.source, CacheSource::CacheFresh);

    // Global stale time of zero: the list refetches, fails and falls back
    let listed = client.properties(list).await.unwrap();
    assert_eq!(listed.source, CacheSource::Offline);
    assert_eq!(listed.data.features[0].id, 2);
  }

  #[tokio::test]
  async fn test_stale_bbox_is_served_while_revalidating() {
    let client = client(300, 0);
    client
      .cache
      .set_query_data(&ApiQueryKey::Properties(bbox_filter()), &page(vec![property(1, "A")]))
      .unwrap();

    let map = client.properties(bbox_filter()).await.unwrap();
    assert_eq!(map.source, CacheSource::CacheStale);
    assert_eq!(map.data.count, 1);
  }

  #[tokio::test]
  async fn test_ensure_properties_reuses_cached_page() {
    let client = client(0, 0);
    let list = PropertyFilter::portfolio(3).paged(2, 12);
    client
      .cache
      .set_query_data(&ApiQueryKey::Properties(list), &page(vec![property(5, "E")]))
      .unwrap();

    let result = client.ensure_properties(list).await.unwrap();
    assert_eq!(result.source, CacheSource::CacheStale);
    assert_eq!(result.data.features[0].id, 5);
  }

  #[tokio::test]
  async fn test_property_write_evicts_lists_and_primes_detail() {
    let client = client(60, 60);
    let list = ApiQueryKey::Properties(PropertyFilter::all().paged(1, 12));
    let map = ApiQueryKey::Properties(bbox_filter());
    let other = ApiQueryKey::Portfolios;
    client.cache.set_query_data(&list, &page(vec![])).unwrap();
    client.cache.set_query_data(&map, &page(vec![])).unwrap();
    client.cache.set_query_data(&other, &Vec::<Portfolio>::new()).unwrap();

    client.after_property_write(&property(7, "Harbour office")).unwrap();

    assert_eq!(cached::<PropertyPage>(&client, &list), None);
    assert_eq!(cached::<PropertyPage>(&client, &map), None);
    assert!(cached::<Vec<Portfolio>>(&client, &other).is_some());
    assert_eq!(
      cached::<Property>(&client, &ApiQueryKey::Property { id: 7 }),
      Some(property(7, "Harbour office"))
    );
  }

  #[tokio::test]
  async fn test_property_delete_evicts_detail_and_lists() {
    let client = client(60, 60);
    let detail = ApiQueryKey::Property { id: 7 };
    let map = ApiQueryKey::Properties(bbox_filter());
    client.cache.set_query_data(&detail, &property(7, "A")).unwrap();
    client.cache.set_query_data(&map, &page(vec![property(7, "A")])).unwrap();

    client.after_property_delete(7);

    assert_eq!(cached::<Property>(&client, &detail), None);
    assert_eq!(cached::<PropertyPage>(&client, &map), None);
  }

  #[tokio::test]
  async fn test_portfolio_write_evicts_list_and_entry() {
    let client = client(60, 60);
    let all = ApiQueryKey::Portfolios;
    let one = ApiQueryKey::Portfolio { id: 3 };
    let another = ApiQueryKey::Portfolio { id: 4 };
    client.cache.set_query_data(&all, &vec![Portfolio::new(3, "A")]).unwrap();
    client.cache.set_query_data(&one, &Portfolio::new(3, "A")).unwrap();
    client.cache.set_query_data(&another, &Portfolio::new(4, "B")).unwrap();

    client.after_portfolio_write(Some(3));

    assert_eq!(cached::<Vec<Portfolio>>(&client, &all), None);
    assert_eq!(cached::<Portfolio>(&client, &one), None);
    assert_eq!(cached::<Portfolio>(&client, &another), Some(Portfolio::new(4, "B")));
  }
}
