//! Client-side checks that run before anything is sent to the API.
//!
//! Violations are collected per field so a form can show every problem at
//! once instead of stopping at the first.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::api_types::PropertyDraft;
use crate::api::types::{Point, Property, PropertyAttributes};

const MAX_NAME_LEN: usize = 100;
const MAX_ADDRESS_LEN: usize = 255;
const MAX_CITY_LEN: usize = 100;
const MAX_MONEY: f64 = 1_000_000_000.0;
const MAX_RISKS: i64 = 1000;

/// A single violated rule on a named form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub field: &'static str,
  pub message: String,
}

/// Every rule a submission violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed: {}", summarize(.errors))]
pub struct ValidationErrors {
  errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
  errors
    .iter()
    .map(|e| format!("{}: {}", e.field, e.message))
    .collect::<Vec<_>>()
    .join("; ")
}

impl ValidationErrors {
  pub fn errors(&self) -> &[FieldError] {
    &self.errors
  }

  /// First message recorded for `field`, for inline display.
  pub fn field(&self, field: &str) -> Option<&str> {
    self
      .errors
      .iter()
      .find(|e| e.field == field)
      .map(|e| e.message.as_str())
  }
}

#[derive(Default)]
struct Collector {
  errors: Vec<FieldError>,
}

impl Collector {
  fn push(&mut self, field: &'static str, message: impl Into<String>) {
    self.errors.push(FieldError {
      field,
      message: message.into(),
    });
  }

  fn text(&mut self, field: &'static str, label: &str, value: &str, max: usize) -> String {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 {
      self.push(field, format!("{} is required", label));
    } else if len > max {
      self.push(field, format!("{} must be less than {} characters", label, max));
    }
    trimmed.to_string()
  }

  fn range(&mut self, field: &'static str, label: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() {
      self.push(field, format!("{} must be a finite number", label));
    } else if value < min || value > max {
      self.push(field, format!("{} must be between {} and {}", label, min, max));
    }
  }

  fn risks(&mut self, field: &'static str, label: &str, value: i64) {
    if value < 0 {
      self.push(field, format!("{} must be positive", label));
    } else if value > MAX_RISKS {
      self.push(field, format!("Number of {} seems unreasonably high", label.to_lowercase()));
    }
  }

  fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
    if self.errors.is_empty() {
      Ok(value)
    } else {
      Err(ValidationErrors {
        errors: self.errors,
      })
    }
  }
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Trim a portfolio name and check its length.
pub fn portfolio_name(name: &str) -> Result<String, ValidationErrors> {
  let mut collector = Collector::default();
  let name = collector.text("name", "Name", name, MAX_NAME_LEN);
  collector.finish(name)
}

/// Raw property form input, as typed by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyForm {
  pub name: String,
  #[serde(default)]
  pub portfolio_id: Option<i64>,
  pub address: String,
  pub zip_code: String,
  pub city: String,
  pub longitude: f64,
  pub latitude: f64,
  pub estimated_value: f64,
  pub relevant_risks: i64,
  pub handled_risks: i64,
  pub financial_risk: f64,
}

impl From<&Property> for PropertyForm {
  fn from(property: &Property) -> Self {
    let attrs = &property.properties;
    Self {
      name: attrs.name.clone(),
      portfolio_id: attrs.portfolio,
      address: attrs.address.clone(),
      zip_code: attrs.zip_code.clone(),
      city: attrs.city.clone(),
      longitude: property.geometry.longitude(),
      latitude: property.geometry.latitude(),
      estimated_value: attrs.estimated_value,
      relevant_risks: i64::from(attrs.relevant_risks),
      handled_risks: i64::from(attrs.handled_risks),
      financial_risk: attrs.total_financial_risk,
    }
  }
}

impl PropertyForm {
  /// Check every field and build the request body.
  ///
  /// Name and address are trimmed and get an upper-case first letter; city is
  /// only trimmed.
  pub fn validate(&self) -> Result<PropertyDraft, ValidationErrors> {
    let mut c = Collector::default();

    let name = capitalize(&c.text("name", "Name", &self.name, MAX_NAME_LEN));
    let address = capitalize(&c.text("address", "Address", &self.address, MAX_ADDRESS_LEN));
    let city = c.text("city", "City", &self.city, MAX_CITY_LEN);

    let zip_code = self.zip_code.trim();
    if zip_code.is_empty() {
      c.push("zip_code", "ZIP code is required");
    } else if zip_code.len() != 4 || !zip_code.bytes().all(|b| b.is_ascii_digit()) {
      c.push("zip_code", "ZIP code must be 4 digits");
    }

    c.range("longitude", "Longitude", self.longitude, -180.0, 180.0);
    c.range("latitude", "Latitude", self.latitude, -90.0, 90.0);
    c.range("estimated_value", "Estimated value", self.estimated_value, 0.0, MAX_MONEY);
    c.range("financial_risk", "Financial risk", self.financial_risk, 0.0, MAX_MONEY);

    c.risks("relevant_risks", "Relevant risks", self.relevant_risks);
    c.risks("handled_risks", "Handled risks", self.handled_risks);
    if self.handled_risks > self.relevant_risks {
      c.push(
        "handled_risks",
        "Number of handled risks cannot exceed number of relevant risks",
      );
    }

    let draft = PropertyDraft::new(
      Point::new(self.longitude, self.latitude),
      PropertyAttributes {
        name,
        portfolio: self.portfolio_id,
        address,
        zip_code: zip_code.to_string(),
        city,
        estimated_value: self.estimated_value,
        relevant_risks: u32::try_from(self.relevant_risks).unwrap_or_default(),
        handled_risks: u32::try_from(self.handled_risks).unwrap_or_default(),
        total_financial_risk: self.financial_risk,
      },
    );

    c.finish(draft)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn form() -> PropertyForm {
    PropertyForm {
      name: "  harbour office ".to_string(),
      portfolio_id: Some(3),
      address: "kaigata 1".to_string(),
      zip_code: "0150".to_string(),
      city: " Oslo ".to_string(),
      longitude: 10.75,
      latitude: 59.91,
      estimated_value: 12_500_000.0,
      relevant_risks: 4,
      handled_risks: 2,
      financial_risk: 300_000.0,
    }
  }

  #[test]
  fn test_valid_form_normalizes_text() {
    let draft = form().validate().unwrap();

    assert_eq!(draft.properties.name, "Harbour office");
    assert_eq!(draft.properties.address, "Kaigata 1");
    assert_eq!(draft.properties.city, "Oslo");
    assert_eq!(draft.geometry.coordinates, [10.75, 59.91]);
    assert_eq!(draft.properties.relevant_risks, 4);
  }

  #[test]
  fn test_handled_risks_cannot_exceed_relevant() {
    let mut f = form();
    f.relevant_risks = 2;
    f.handled_risks = 3;

    let err = f.validate().unwrap_err();
    assert_eq!(
      err.field("handled_risks"),
      Some("Number of handled risks cannot exceed number of relevant risks")
    );
  }

  #[test]
  fn test_equal_risks_are_accepted() {
    let mut f = form();
    f.relevant_risks = 3;
    f.handled_risks = 3;
    assert!(f.validate().is_ok());
  }

  #[test]
  fn test_collects_every_field_error() {
    let mut f = form();
    f.name = "   ".to_string();
    f.zip_code = "12a4".to_string();
    f.latitude = 91.0;
    f.longitude = f64::NAN;
    f.estimated_value = -1.0;

    let err = f.validate().unwrap_err();
    assert_eq!(err.field("name"), Some("Name is required"));
    assert_eq!(err.field("zip_code"), Some("ZIP code must be 4 digits"));
    assert_eq!(err.field("latitude"), Some("Latitude must be between -90 and 90"));
    assert_eq!(err.field("longitude"), Some("Longitude must be a finite number"));
    assert!(err.field("estimated_value").is_some());
    assert_eq!(err.errors().len(), 5);
  }

  #[test]
  fn test_zip_code_length() {
    let mut f = form();
    f.zip_code = "01500".to_string();
    assert!(f.validate().unwrap_err().field("zip_code").is_some());
  }

  #[test]
  fn test_portfolio_name() {
    assert_eq!(portfolio_name("  Nordics ").unwrap(), "Nordics");
    assert!(portfolio_name("   ").is_err());
    assert!(portfolio_name(&"x".repeat(101)).is_err());
    assert!(portfolio_name(&"x".repeat(100)).is_ok());
  }

  #[test]
  fn test_form_from_property_round_trips() {
    let draft = form().validate().unwrap();
    let property = draft.into_property(7);
    let again = PropertyForm::from(&property).validate().unwrap();
    assert_eq!(again.properties, property.properties);
  }
}
