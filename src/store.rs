//! Session-local portfolio list, shared by the views and the mutation
//! coordinator.
//!
//! Every change goes through one `watch` update, so subscribers never see a
//! half-applied state. The list is always sorted by name and holds each id
//! at most once.

use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::types::Portfolio;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfoliosState {
  pub portfolios: Vec<Portfolio>,
}

/// Observable, name-ordered collection of portfolios.
#[derive(Clone)]
pub struct PortfolioStore {
  state: Arc<watch::Sender<PortfoliosState>>,
}

impl Default for PortfolioStore {
  fn default() -> Self {
    Self::new()
  }
}

/// Case-insensitive name order; raw name and id break ties so the order is total.
fn by_name(a: &Portfolio, b: &Portfolio) -> Ordering {
  a.name
    .to_lowercase()
    .cmp(&b.name.to_lowercase())
    .then_with(|| a.name.cmp(&b.name))
    .then_with(|| a.id.cmp(&b.id))
}

fn sort(portfolios: &mut [Portfolio]) {
  portfolios.sort_by(by_name);
}

impl PortfolioStore {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(PortfoliosState::default());
    Self {
      state: Arc::new(tx),
    }
  }

  /// Receiver notified after every change.
  pub fn subscribe(&self) -> watch::Receiver<PortfoliosState> {
    self.state.subscribe()
  }

  pub fn snapshot(&self) -> Vec<Portfolio> {
    self.state.borrow().portfolios.clone()
  }

  pub fn get(&self, id: i64) -> Option<Portfolio> {
    self
      .state
      .borrow()
      .portfolios
      .iter()
      .find(|p| p.id == id)
      .cloned()
  }

  /// Replace the whole list.
  pub fn set_all(&self, portfolios: Vec<Portfolio>) {
    let mut next: Vec<Portfolio> = Vec::with_capacity(portfolios.len());
    for portfolio in portfolios {
      match next.iter_mut().find(|p| p.id == portfolio.id) {
        Some(existing) => *existing = portfolio,
        None => next.push(portfolio),
      }
    }
    sort(&mut next);

    self.state.send_if_modified(|state| {
      if state.portfolios == next {
        return false;
      }
      state.portfolios = next;
      true
    });
  }

  /// Insert a portfolio; an entry with the same id is replaced.
  pub fn add(&self, portfolio: Portfolio) {
    self.state.send_if_modified(|state| upsert(&mut state.portfolios, portfolio));
  }

  /// Replace the entry with the same id; no-op if absent.
  pub fn update(&self, portfolio: Portfolio) {
    self.state.send_if_modified(|state| {
      let Some(existing) = state.portfolios.iter_mut().find(|p| p.id == portfolio.id) else {
        return false;
      };
      if *existing == portfolio {
        return false;
      }
      *existing = portfolio;
      sort(&mut state.portfolios);
      true
    });
  }

  /// Remove the entry with `id`; no-op if absent.
  pub fn remove(&self, id: i64) {
    self.state.send_if_modified(|state| {
      let before = state.portfolios.len();
      state.portfolios.retain(|p| p.id != id);
      state.portfolios.len() != before
    });
  }

  /// Swap the entry `old_id` for `portfolio` in a single update.
  pub fn replace(&self, old_id: i64, portfolio: Portfolio) {
    self.state.send_modify(|state| {
      state.portfolios.retain(|p| p.id != old_id);
      upsert(&mut state.portfolios, portfolio);
    });
  }
}

fn upsert(portfolios: &mut Vec<Portfolio>, portfolio: Portfolio) -> bool {
  match portfolios.iter_mut().find(|p| p.id == portfolio.id) {
    Some(existing) if *existing == portfolio => return false,
    Some(existing) => *existing = portfolio,
    None => portfolios.push(portfolio),
  }
  sort(portfolios);
  true
}
