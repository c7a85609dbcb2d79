//! Optimistic create/rename/delete of portfolios.
//!
//! Every mutation applies its change to the [`PortfolioStore`] first, then
//! calls the gateway, then either reconciles the store with the server record
//! or reverts the entry it touched. The remote call and the follow-up run on
//! their own task, so a caller that stops waiting cannot leave the store in
//! its optimistic state. A runtime that shuts down mid-call drops that task
//! too, and then the optimistic change stays in the store.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::api_types::{NewPortfolio, PortfolioPatch};
use crate::api::error::{ApiError, ApiResult};
use crate::api::gateway::PortfolioGateway;
use crate::api::types::Portfolio;
use crate::store::PortfolioStore;
use crate::validation::{self, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Create,
  Rename,
  Delete,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Create => "create",
      Self::Rename => "rename",
      Self::Delete => "delete",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
  /// Optimistic change applied, remote call in flight
  Pending,
  /// Store holds the server's record
  Committed,
  /// Store restored to what it held before the mutation
  RolledBack,
}

/// Terminal result of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
  Committed(T),
  RolledBack(ApiError),
}

impl<T> MutationOutcome<T> {
  pub fn state(&self) -> MutationState {
    match self {
      Self::Committed(_) => MutationState::Committed,
      Self::RolledBack(_) => MutationState::RolledBack,
    }
  }

  pub fn into_result(self) -> ApiResult<T> {
    match self {
      Self::Committed(value) => Ok(value),
      Self::RolledBack(err) => Err(err),
    }
  }
}

/// A mutation refused before anything was applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
  #[error(transparent)]
  Validation(#[from] ValidationErrors),

  #[error("portfolio {0} is not in the list")]
  UnknownPortfolio(i64),
}

/// One mutation's progress through Pending -> Committed | RolledBack.
struct Mutation {
  kind: MutationKind,
  target: i64,
  state: MutationState,
}

impl Mutation {
  fn begin(kind: MutationKind, target: i64) -> Self {
    let mutation = Self {
      kind,
      target,
      state: MutationState::Pending,
    };
    debug!(kind = %mutation.kind, target, "optimistic change applied");
    mutation
  }

  fn commit(mut self) {
    self.state = MutationState::Committed;
    info!(kind = %self.kind, target = self.target, state = ?self.state, "mutation committed");
  }

  fn roll_back(mut self, err: &ApiError) {
    self.state = MutationState::RolledBack;
    warn!(
      kind = %self.kind,
      target = self.target,
      state = ?self.state,
      error = %err,
      "mutation rolled back"
    );
  }
}

/// Runs portfolio mutations against a gateway, keeping `store` in step.
pub struct PortfolioCoordinator<G> {
  gateway: Arc<G>,
  store: PortfolioStore,
  next_placeholder: Arc<AtomicI64>,
  in_flight: Arc<AtomicUsize>,
}

impl<G> Clone for PortfolioCoordinator<G> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
      store: self.store.clone(),
      next_placeholder: Arc::clone(&self.next_placeholder),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

impl<G: PortfolioGateway + 'static> PortfolioCoordinator<G> {
  pub fn new(gateway: Arc<G>, store: PortfolioStore) -> Self {
    Self {
      gateway,
      store,
      next_placeholder: Arc::new(AtomicI64::new(-1)),
      in_flight: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn store(&self) -> &PortfolioStore {
    &self.store
  }

  /// Number of mutations still pending.
  pub fn in_flight(&self) -> usize {
    self.in_flight.load(Ordering::SeqCst)
  }

  /// Load the server's list into the store.
  pub async fn refresh(&self) -> ApiResult<()> {
    let portfolios = self.gateway.list_portfolios().await?;
    self.store.set_all(portfolios);
    Ok(())
  }

  /// Create a portfolio, showing it under a placeholder id until the server
  /// assigns the real one.
  pub async fn create(&self, name: &str) -> Result<MutationOutcome<Portfolio>, MutationError> {
    let name = validation::portfolio_name(name)?;
    // Negative ids never collide with server ids
    let placeholder = self.next_placeholder.fetch_sub(1, Ordering::SeqCst);

    self.store.add(Portfolio::new(placeholder, name.clone()));
    let mutation = Mutation::begin(MutationKind::Create, placeholder);

    let outcome = self
      .run(
        mutation,
        move |gateway| async move { gateway.create_portfolio(NewPortfolio { name }).await },
        move |store, created: &Portfolio| store.replace(placeholder, created.clone()),
        move |store| store.remove(placeholder),
      )
      .await;

    Ok(outcome)
  }

  pub async fn rename(
    &self,
    id: i64,
    name: &str,
  ) -> Result<MutationOutcome<Portfolio>, MutationError> {
    let name = validation::portfolio_name(name)?;
    let previous = self.store.get(id).ok_or(MutationError::UnknownPortfolio(id))?;

    self.store.update(previous.renamed(name.clone()));
    let mutation = Mutation::begin(MutationKind::Rename, id);

    let outcome = self
      .run(
        mutation,
        move |gateway| async move { gateway.rename_portfolio(id, PortfolioPatch { name }).await },
        move |store, renamed: &Portfolio| store.replace(id, renamed.clone()),
        move |store| store.update(previous),
      )
      .await;

    Ok(outcome)
  }

  pub async fn delete(&self, id: i64) -> Result<MutationOutcome<()>, MutationError> {
    let previous = self.store.get(id).ok_or(MutationError::UnknownPortfolio(id))?;

    self.store.remove(id);
    let mutation = Mutation::begin(MutationKind::Delete, id);

    let outcome = self
      .run(
        mutation,
        move |gateway| async move { gateway.delete_portfolio(id).await },
        |_, _: &()| {},
        move |store| store.add(previous),
      )
      .await;

    Ok(outcome)
  }

  async fn run<T, Call, Fut, Reconcile, Revert>(
    &self,
    mutation: Mutation,
    call: Call,
    reconcile: Reconcile,
    revert: Revert,
  ) -> MutationOutcome<T>
  where
    T: Send + 'static,
    Call: FnOnce(Arc<G>) -> Fut + Send + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
    Reconcile: FnOnce(&PortfolioStore, &T) + Send + 'static,
    Revert: FnOnce(&PortfolioStore) + Send + 'static,
  {
    let gateway = Arc::clone(&self.gateway);
    let store = self.store.clone();
    let kind = mutation.kind;
    let in_flight = InFlight::enter(&self.in_flight);

    let task = tokio::spawn(async move {
      let _in_flight = in_flight;
      let result = AssertUnwindSafe(async move { call(gateway).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(ApiError::Interrupted(format!("{} call panicked", kind))));

      let result = result.and_then(|value| {
        std::panic::catch_unwind(AssertUnwindSafe(|| reconcile(&store, &value)))
          .map(|()| value)
          .map_err(|_| ApiError::Interrupted(format!("{} reconcile panicked", kind)))
      });

      match result {
        Ok(value) => {
          mutation.commit();
          MutationOutcome::Committed(value)
        }
        Err(err) => {
          revert(&store);
          mutation.roll_back(&err);
          MutationOutcome::RolledBack(err)
        }
      }
    });

    // Only a panicking revert or a runtime shutdown gets here; neither
    // restored the store.
    match task.await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(kind = %kind, error = %e, "mutation task did not finish, store may hold the optimistic change");
        MutationOutcome::RolledBack(ApiError::Interrupted(e.to_string()))
      }
    }
  }
}

/// Counts one pending mutation for as long as it lives.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
  fn enter(counter: &Arc<AtomicUsize>) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(Arc::clone(counter))
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}
