use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::api::api_types::{NewPortfolio, PortfolioPatch, PropertyDraft, PropertyFilter};
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{Portfolio, Property, PropertyPage};
use crate::config::{ApiConfig, ExecutionContext};

/// Base URLs the client can reach the API under.
#[derive(Debug, Clone)]
pub struct Endpoints {
  public: Url,
  internal: Url,
  co_located: bool,
}

impl Endpoints {
  pub fn from_config(config: &ApiConfig) -> ApiResult<Self> {
    Ok(Self {
      public: parse_base(&config.url)?,
      internal: parse_base(&config.internal_url)?,
      co_located: config.co_located,
    })
  }

  /// Base URL for a request issued from `context`.
  pub fn base(&self, context: ExecutionContext) -> &Url {
    match context {
      ExecutionContext::Server if self.co_located => &self.internal,
      _ => &self.public,
    }
  }

  /// Resolve `path` against the base URL for `context`.
  pub fn resolve(&self, context: ExecutionContext, path: &str) -> ApiResult<Url> {
    self
      .base(context)
      .join(path)
      .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
  }
}

// A trailing slash makes `join` append instead of replacing the last segment
fn parse_base(raw: &str) -> ApiResult<Url> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Property API client wrapper
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  endpoints: Endpoints,
  context: ExecutionContext,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, context: ExecutionContext) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let endpoints = Endpoints::from_config(config)
      .map_err(|e| eyre!("Invalid API configuration: {}", e))?;

    Ok(Self {
      http,
      endpoints,
      context,
    })
  }

  // Resolved per request so the context decides at call time
  fn endpoint(&self, path: &str) -> ApiResult<Url> {
    self.endpoints.resolve(self.context, path)
  }

  async fn send(&self, method: Method, url: &Url, request: RequestBuilder) -> ApiResult<Response> {
    debug!(%method, %url, "request");

    let response = request.send().await.map_err(|e| {
      warn!(%method, %url, error = %e, "request could not be completed");
      ApiError::Network {
        url: url.to_string(),
        message: e.to_string(),
      }
    })?;

    let status = response.status();
    if !status.is_success() {
      warn!(%method, %url, status = status.as_u16(), "request failed");
      return Err(ApiError::Http {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    Ok(response)
  }

  async fn decode<T: DeserializeOwned>(url: &Url, response: Response) -> ApiResult<T> {
    response.json::<T>().await.map_err(|e| ApiError::Decode {
      url: url.to_string(),
      message: e.to_string(),
    })
  }

  async fn get<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
    let request = self.http.get(url.clone());
    let response = self.send(Method::GET, &url, request).await?;
    Self::decode(&url, response).await
  }

  async fn delete(&self, url: Url) -> ApiResult<()> {
    let request = self.http.delete(url.clone());
    self.send(Method::DELETE, &url, request).await?;
    Ok(())
  }

  /// List all portfolios
  pub async fn list_portfolios(&self) -> ApiResult<Vec<Portfolio>> {
    self.get(self.endpoint("api/portfolios/")?).await
  }

  /// Get a single portfolio by id
  pub async fn get_portfolio(&self, id: i64) -> ApiResult<Portfolio> {
    self.get(self.endpoint(&format!("api/portfolios/{}/", id))?).await
  }

  /// Create a portfolio; the server assigns the id
  pub async fn create_portfolio(&self, draft: &NewPortfolio) -> ApiResult<Portfolio> {
    let url = self.endpoint("api/portfolios/")?;
    let request = self.http.post(url.clone()).json(draft);
    let response = self.send(Method::POST, &url, request).await?;
    Self::decode(&url, response).await
  }

  /// Rename a portfolio
  pub async fn update_portfolio(&self, id: i64, patch: &PortfolioPatch) -> ApiResult<Portfolio> {
    let url = self.endpoint(&format!("api/portfolios/{}/", id))?;
    let request = self.http.patch(url.clone()).json(patch);
    let response = self.send(Method::PATCH, &url, request).await?;
    Self::decode(&url, response).await
  }

  pub async fn delete_portfolio(&self, id: i64) -> ApiResult<()> {
    self.delete(self.endpoint(&format!("api/portfolios/{}/", id))?).await
  }

  /// Get a single property by id
  pub async fn get_property(&self, id: i64) -> ApiResult<Property> {
    self.get(self.endpoint(&format!("api/properties/{}/", id))?).await
  }

  /// List properties matching `filter`, one page at a time
  pub async fn list_properties(&self, filter: &PropertyFilter) -> ApiResult<PropertyPage> {
    self.get(with_filter(self.endpoint("api/properties/")?, filter)).await
  }

  pub async fn create_property(&self, draft: &PropertyDraft) -> ApiResult<Property> {
    let url = self.endpoint("api/properties/")?;
    let request = self.http.post(url.clone()).json(draft);
    let response = self.send(Method::POST, &url, request).await?;
    Self::decode(&url, response).await
  }

  /// Replace a property in full
  pub async fn update_property(&self, id: i64, draft: &PropertyDraft) -> ApiResult<Property> {
    let url = self.endpoint(&format!("api/properties/{}/", id))?;
    let request = self.http.put(url.clone()).json(draft);
    let response = self.send(Method::PUT, &url, request).await?;
    Self::decode(&url, response).await
  }

  pub async fn delete_property(&self, id: i64) -> ApiResult<()> {
    self.delete(self.endpoint(&format!("api/properties/{}/", id))?).await
  }
}

fn with_filter(mut url: Url, filter: &PropertyFilter) -> Url {
  let pairs = filter.query_pairs();
  if !pairs.is_empty() {
    url.query_pairs_mut().extend_pairs(pairs);
  }
  url
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Bbox;

  fn endpoints(co_located: bool) -> Endpoints {
    Endpoints::from_config(&ApiConfig {
      url: "http://localhost:8000".to_string(),
      internal_url: "http://backend:8000/prefix".to_string(),
      co_located,
      timeout_secs: 5,
    })
    .unwrap()
  }

  #[test]
  fn test_resolve_uses_public_url_by_default() {
    let url = endpoints(false)
      .resolve(ExecutionContext::Server, "api/portfolios/")
      .unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/portfolios/");
  }

  #[test]
  fn test_resolve_uses_internal_url_server_side() {
    let endpoints = endpoints(true);
    assert_eq!(
      endpoints
        .resolve(ExecutionContext::Server, "api/portfolios/4/")
        .unwrap()
        .as_str(),
      "http://backend:8000/prefix/api/portfolios/4/"
    );
    assert_eq!(
      endpoints
        .resolve(ExecutionContext::Client, "api/portfolios/4/")
        .unwrap()
        .as_str(),
      "http://localhost:8000/api/portfolios/4/"
    );
  }

  #[test]
  fn test_properties_url_query() {
    let base = endpoints(false)
      .resolve(ExecutionContext::Client, "api/properties/")
      .unwrap();

    let url = with_filter(base.clone(), &PropertyFilter::portfolio(3).paged(2, 12));
    assert_eq!(url.path(), "/api/properties/");
    assert_eq!(url.query(), Some("portfolio=3&page=2&page_size=12"));

    let url = with_filter(
      base.clone(),
      &PropertyFilter::in_bbox(Bbox::new(10.0, 59.5, 11.0, 60.0)),
    );
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
      pairs,
      vec![("in_bbox".to_string(), "10,59.5,11,60".to_string())]
    );

    let url = with_filter(base, &PropertyFilter::all());
    assert_eq!(url.query(), None);
  }

  #[test]
  fn test_invalid_base_url() {
    let config = ApiConfig {
      url: "not a url".to_string(),
      ..ApiConfig::default()
    };
    assert!(Endpoints::from_config(&config).is_err());
  }
}
