//! Command-line subcommands
use clap::Subcommand;
use std::path::PathBuf;

use crate::api::types::Bbox;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Manage portfolios
  #[command(subcommand, visible_alias = "pf")]
  Portfolios(PortfolioCommand),

  /// Browse and edit properties
  #[command(subcommand, visible_alias = "p")]
  Properties(PropertyCommand),
}

#[derive(Subcommand, Debug)]
pub enum PortfolioCommand {
  /// List all portfolios by name
  #[command(visible_alias = "ls")]
  List,

  /// Show one portfolio and its property count
  Show { id: i64 },

  /// Create a portfolio
  Create { name: String },

  /// Rename a portfolio
  Rename { id: i64, name: String },

  /// Delete a portfolio
  #[command(visible_alias = "rm")]
  Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum PropertyCommand {
  /// List one page of properties
  #[command(visible_alias = "ls")]
  List {
    /// Only properties in this portfolio
    #[arg(long)]
    portfolio: Option<i64>,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size (default from config)
    #[arg(long)]
    page_size: Option<u32>,

    /// Only properties inside min_lon,min_lat,max_lon,max_lat (not paginated)
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<Bbox>,
  },

  /// Load a sequence of map views, as when panning
  Map {
    /// Bounding boxes as min_lon,min_lat,max_lon,max_lat
    #[arg(long = "bbox", required = true, allow_hyphen_values = true)]
    boxes: Vec<Bbox>,
  },

  /// Show one property
  Show { id: i64 },

  /// Create a property from a YAML form
  Create {
    #[arg(long)]
    form: PathBuf,
  },

  /// Replace a property with the contents of a YAML form
  Edit {
    id: i64,
    #[arg(long)]
    form: PathBuf,
  },

  /// Write an existing property out as a YAML form
  Export { id: i64 },

  /// Delete a property
  #[command(visible_alias = "rm")]
  Delete { id: i64 },
}
