use async_trait::async_trait;

use super::api_types::{NewPortfolio, PortfolioPatch};
use super::error::ApiResult;
use super::types::Portfolio;

/// Remote portfolio operations the mutation coordinator depends on.
#[async_trait]
pub trait PortfolioGateway: Send + Sync {
  async fn list_portfolios(&self) -> ApiResult<Vec<Portfolio>>;

  async fn create_portfolio(&self, draft: NewPortfolio) -> ApiResult<Portfolio>;

  async fn rename_portfolio(&self, id: i64, patch: PortfolioPatch) -> ApiResult<Portfolio>;

  async fn delete_portfolio(&self, id: i64) -> ApiResult<()>;
}
