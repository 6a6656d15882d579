//! Commissioning records as the caller builds them.
//!
//! These are plain values. Optional parts are `Option`s so an omitted field
//! is never confused with one set to an empty string. Encoding into the wire
//! format lives in [`crate::envelope`].

use bon::Builder;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;

/// How the goods were produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionType {
    OwnProduction,
    ContractProduction,
}

/// Kind of conformity document attached to a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateType {
    ConformityCertificate,
    ConformityDeclaration,
}

/// Participant INN wrapper carried in `description`.
///
/// The remote API expects it re-serialized into a JSON string of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub participant_inn: String,
}

impl Description {
    pub fn new(participant_inn: impl Into<String>) -> Self {
        Self {
            participant_inn: participant_inn.into(),
        }
    }
}

/// A single commissioning record.
///
/// ```rust
/// use chrono::NaiveDate;
/// use crpt_client::Document;
/// use crpt_client::ProductionType;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let document = Document::builder()
///     .doc_id("1")
///     .doc_status("NEW")
///     .doc_type("LP_INTRODUCE_GOODS")
///     .owner_inn("7700000000")
///     .participant_inn("7700000000")
///     .producer_inn("7700000000")
///     .production_date(date)
///     .production_type(ProductionType::OwnProduction)
///     .reg_date(date)
///     .reg_number("42")
///     .build();
///
/// assert!(document.products.is_none());
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Deserialize)]
pub struct Document {
    #[builder(into)]
    pub doc_id: String,
    #[builder(into)]
    pub doc_status: String,
    #[builder(into)]
    pub doc_type: String,
    #[builder(into)]
    pub owner_inn: String,
    #[builder(into)]
    pub participant_inn: String,
    #[builder(into)]
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: ProductionType,
    pub reg_date: NaiveDate,
    #[builder(into)]
    pub reg_number: String,
    pub description: Option<Description>,
    pub import_request: Option<bool>,
    pub products: Option<Vec<Product>>,
}

impl Document {
    /// Checks every product for a usable identity code.
    pub fn validate(&self) -> Result<(), ApiError> {
        for (index, product) in self.products.iter().flatten().enumerate() {
            product.unit_code(index)?;
        }
        Ok(())
    }
}

/// One product unit being introduced into circulation.
///
/// Exactly one identity code is sent per product. When both are set the
/// `uit_code` wins; an empty string counts as unset.
#[derive(Builder, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub production_date: NaiveDate,
    #[builder(into)]
    pub owner_inn: String,
    #[builder(into)]
    pub producer_inn: String,
    #[builder(into)]
    pub tnved_code: String,
    pub certificate_document: Option<CertificateType>,
    pub certificate_document_date: Option<NaiveDate>,
    #[builder(into)]
    pub certificate_document_number: Option<String>,
    #[builder(into)]
    pub uit_code: Option<String>,
    #[builder(into)]
    pub uitu_code: Option<String>,
}

/// The identity code a product is sent under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitCode<'a> {
    /// Code of an individual unit.
    Uit(&'a str),
    /// Code of an aggregated unit.
    Uitu(&'a str),
}

impl Product {
    /// Resolves the identity code, `index` only labels the error.
    pub fn unit_code(&self, index: usize) -> Result<UnitCode<'_>, ApiError> {
        if let Some(code) = non_empty(&self.uit_code) {
            Ok(UnitCode::Uit(code))
        } else if let Some(code) = non_empty(&self.uitu_code) {
            Ok(UnitCode::Uitu(code))
        } else {
            Err(ApiError::InvalidDocument {
                index,
                reason: "must carry a non-empty uit_code or uitu_code".to_owned(),
            })
        }
    }
}

fn non_empty(code: &Option<String>) -> Option<&str> {
    code.as_deref().filter(|c| !c.is_empty())
}
