use std::path::Path;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Report, Result};
use tracing::debug;

use crate::api::api_types::PropertyFilter;
use crate::api::cached_client::CachedApiClient;
use crate::api::error::ApiResult;
use crate::api::types::{Bbox, Portfolio, Property, PropertyPage};
use crate::cache::{CacheResult, CacheSource};
use crate::commands::{Command, PortfolioCommand, PropertyCommand};
use crate::config::{Config, ExecutionContext};
use crate::mutation::{MutationOutcome, PortfolioCoordinator};
use crate::store::PortfolioStore;
use crate::validation::{PropertyForm, ValidationErrors};

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Where requests are issued from
  context: ExecutionContext,

  /// Property API client with query caching
  client: CachedApiClient,

  /// Optimistic portfolio mutations over the shared store
  portfolios: PortfolioCoordinator<CachedApiClient>,
}

impl App {
  pub fn new(config: Config, context: ExecutionContext) -> Result<Self> {
    let client = CachedApiClient::new(&config, context)?;
    let store = PortfolioStore::new();
    watch_store(&store);

    let portfolios = PortfolioCoordinator::new(Arc::new(client.clone()), store);

    Ok(Self {
      config,
      context,
      client,
      portfolios,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Portfolios(cmd) => self.run_portfolio(cmd).await,
      Command::Properties(cmd) => self.run_property(cmd).await,
    }
  }

  async fn run_portfolio(&self, command: PortfolioCommand) -> Result<()> {
    match command {
      PortfolioCommand::List => {
        self.portfolios.refresh().await?;
        print_portfolios(&self.portfolios.store().snapshot());
      }
      PortfolioCommand::Show { id } => self.show_portfolio(id).await?,
      PortfolioCommand::Create { name } => {
        self.portfolios.refresh().await?;
        match self.portfolios.create(&name).await? {
          MutationOutcome::Committed(portfolio) => {
            println!("Created portfolio {} ({})", portfolio.name, portfolio.id);
          }
          MutationOutcome::RolledBack(err) => {
            return Err(eyre!("Creating portfolio '{}' failed: {}", name, err));
          }
        }
        print_portfolios(&self.portfolios.store().snapshot());
      }
      PortfolioCommand::Rename { id, name } => {
        self.portfolios.refresh().await?;
        match self.portfolios.rename(id, &name).await? {
          MutationOutcome::Committed(portfolio) => {
            println!("Renamed portfolio {} to {}", portfolio.id, portfolio.name);
          }
          MutationOutcome::RolledBack(err) => {
            return Err(eyre!(
              "Renaming portfolio {} failed, name restored: {}",
              id,
              err
            ));
          }
        }
      }
      PortfolioCommand::Delete { id } => {
        self.portfolios.refresh().await?;
        match self.portfolios.delete(id).await? {
          MutationOutcome::Committed(()) => println!("Deleted portfolio {}", id),
          MutationOutcome::RolledBack(err) => {
            return Err(eyre!(
              "Deleting portfolio {} failed, portfolio restored: {}",
              id,
              err
            ));
          }
        }
      }
    }

    Ok(())
  }

  async fn run_property(&self, command: PropertyCommand) -> Result<()> {
    match command {
      PropertyCommand::List {
        portfolio,
        page,
        page_size,
        bbox,
      } => {
        let page_size = page_size.unwrap_or(self.config.properties.page_size);
        self.list_properties(portfolio, page, page_size, bbox).await?;
      }
      PropertyCommand::Map { boxes } => self.pan_map(&boxes).await?,
      PropertyCommand::Show { id } => {
        let property = self.client.property(id).await?;
        print_property(&property);
      }
      PropertyCommand::Create { form } => {
        let draft = load_form(&form)?.validate().map_err(form_error)?;
        let created = self.client.create_property(&draft).await?;
        println!("Created property {} ({})", created.properties.name, created.id);
      }
      PropertyCommand::Edit { id, form } => {
        let draft = load_form(&form)?.validate().map_err(form_error)?;
        let updated = self.client.update_property(id, &draft).await?;
        println!("Updated property {} ({})", updated.properties.name, updated.id);
      }
      PropertyCommand::Export { id } => {
        let property = self.client.property(id).await?;
        let form = serde_yaml::to_string(&PropertyForm::from(&property))
          .map_err(|e| eyre!("Failed to serialize property {}: {}", id, e))?;
        print!("{}", form);
      }
      PropertyCommand::Delete { id } => {
        self.client.delete_property(id).await?;
        println!("Deleted property {}", id);
      }
    }

    Ok(())
  }

  async fn show_portfolio(&self, id: i64) -> Result<()> {
    let filter = PropertyFilter::portfolio(id).paged(1, self.config.properties.page_size);
    let (portfolio, page) =
      futures::try_join!(self.client.portfolio(id), self.client.properties(filter))?;

    println!("{} ({})", portfolio.name, portfolio.id);
    if let Some(created_at) = portfolio.created_at {
      println!("Created:    {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    println!("Properties: {}", page.data.count);
    Ok(())
  }

  async fn list_properties(
    &self,
    portfolio: Option<i64>,
    page: u32,
    page_size: u32,
    bbox: Option<Bbox>,
  ) -> Result<()> {
    let mut filter = match bbox {
      Some(bbox) => PropertyFilter::in_bbox(bbox),
      None => PropertyFilter::all().paged(page, page_size),
    };
    filter.portfolio = portfolio;

    let result = match portfolio {
      Some(id) => {
        let (owner, result) =
          futures::try_join!(self.client.portfolio(id), self.load_page(filter))?;
        println!("Portfolio: {} ({})", owner.name, owner.id);
        result
      }
      None => self.load_page(filter).await?,
    };

    if let Some(note) = source_note(&result) {
      eprintln!("{}", note);
    }
    print_properties(&result.data);
    if filter.bbox.is_none() {
      println!(
        "Page {} of {} ({} properties)",
        page,
        result.data.total_pages(page_size).max(1),
        result.data.count
      );
    }
    Ok(())
  }

  /// Server-side loads reuse whatever is cached; the client refreshes stale
  /// entries.
  async fn load_page(&self, filter: PropertyFilter) -> ApiResult<CacheResult<PropertyPage>> {
    match self.context {
      ExecutionContext::Server => self.client.ensure_properties(filter).await,
      ExecutionContext::Client => self.client.properties(filter).await,
    }
  }

  async fn pan_map(&self, boxes: &[Bbox]) -> Result<()> {
    for bbox in boxes {
      let filter = PropertyFilter::in_bbox(*bbox);

      if let Some(previous) = self.client.placeholder_properties(filter)? {
        debug!(%bbox, shown = previous.features.len(), "keeping previous view while loading");
        print!("{}", placeholder_view(bbox, &previous));
      }

      let result = self.client.properties(filter).await?;
      if let Some(note) = source_note(&result) {
        eprintln!("  {}", note);
      }
      print!("{}", map_view(bbox, &result.data));
    }
    Ok(())
  }
}

/// What a map view shows while its own result loads.
fn placeholder_view(bbox: &Bbox, previous: &PropertyPage) -> String {
  let mut out = format!(
    "View {}: loading, showing {} properties from the previous view\n",
    bbox,
    previous.features.len()
  );
  for property in &previous.features {
    out.push_str(&format!("~ {}\n", property_row(property)));
  }
  out
}

fn map_view(bbox: &Bbox, page: &PropertyPage) -> String {
  let mut out = format!("View {}: {} properties\n", bbox, page.count);
  for property in &page.features {
    out.push_str(&format!("  {}\n", property_row(property)));
  }
  out
}

fn watch_store(store: &PortfolioStore) {
  let mut rx = store.subscribe();
  tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      let count = rx.borrow_and_update().portfolios.len();
      debug!(count, "portfolio list changed");
    }
  });
}

fn load_form(path: &Path) -> Result<PropertyForm> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read form {}: {}", path.display(), e))?;
  parse_form(&contents).map_err(|e| eyre!("Failed to parse form {}: {}", path.display(), e))
}

fn parse_form(contents: &str) -> Result<PropertyForm, serde_yaml::Error> {
  serde_yaml::from_str(contents)
}

fn form_error(errors: ValidationErrors) -> Report {
  let lines: Vec<String> = errors
    .errors()
    .iter()
    .map(|e| format!("  {}: {}", e.field, e.message))
    .collect();
  eyre!("The form has errors:\n{}", lines.join("\n"))
}

fn source_note<T>(result: &CacheResult<T>) -> Option<String> {
  let cached_at = result
    .cached_at
    .map(|at| at.format("%H:%M:%S").to_string())
    .unwrap_or_default();
  match result.source {
    CacheSource::Network | CacheSource::CacheFresh => None,
    CacheSource::CacheStale => Some(format!("(cached at {}, refreshing)", cached_at)),
    CacheSource::Offline => Some(format!("(offline, showing data cached at {})", cached_at)),
  }
}

fn print_portfolios(portfolios: &[Portfolio]) {
  if portfolios.is_empty() {
    println!("No portfolios");
    return;
  }
  println!("{:>6}  NAME", "ID");
  for portfolio in portfolios {
    println!("{:>6}  {}", portfolio.id, portfolio.name);
  }
}

fn property_row(property: &Property) -> String {
  let attrs = &property.properties;
  format!(
    "{:>6}  {:<30}  {:<20}  {:>14.0}  {}/{}",
    property.id,
    truncate(&attrs.name, 30),
    truncate(&attrs.city, 20),
    attrs.estimated_value,
    attrs.handled_risks,
    attrs.relevant_risks
  )
}

fn print_properties(page: &PropertyPage) {
  if page.features.is_empty() {
    println!("No properties");
    return;
  }
  println!(
    "{:>6}  {:<30}  {:<20}  {:>14}  RISKS",
    "ID", "NAME", "CITY", "VALUE"
  );
  for property in &page.features {
    println!("{}", property_row(property));
  }
}

fn print_property(property: &Property) {
  let attrs = &property.properties;
  println!("{} ({})", attrs.name, property.id);
  println!("Address:        {}, {} {}", attrs.address, attrs.zip_code, attrs.city);
  println!(
    "Location:       {:.5}, {:.5}",
    property.geometry.latitude(),
    property.geometry.longitude()
  );
  if let Some(portfolio) = attrs.portfolio {
    println!("Portfolio:      {}", portfolio);
  }
  println!("Value:          {:.0}", attrs.estimated_value);
  println!(
    "Risks handled:  {} of {}",
    attrs.handled_risks, attrs.relevant_risks
  );
  println!("Financial risk: {:.0}", attrs.total_financial_risk);
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
  out.push('…');
  out
}
