//! Wire encoding of a [`Document`].
//!
//! The document is rendered as JSON with fixed snake_case keys, then base64
//! encoded and carried as `product_document` inside a [`SubmitBody`]. Key
//! order follows field declaration order, so the output is deterministic.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use serde::Serialize;

use crate::document::CertificateType;
use crate::document::Document;
use crate::document::Product;
use crate::document::ProductionType;
use crate::document::UnitCode;
use crate::error::ApiError;

pub const DOCUMENT_FORMAT: &str = "MANUAL";
pub const DOCUMENT_TYPE: &str = "LP_INTRODUCE_GOODS";

/// The JSON request body posted to the document endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitBody<'a> {
    pub document_format: &'static str,
    pub product_document: &'a str,
    pub signature: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl<'a> SubmitBody<'a> {
    pub fn new(product_document: &'a str, signature: &'a str) -> Self {
        Self {
            document_format: DOCUMENT_FORMAT,
            product_document,
            signature,
            kind: DOCUMENT_TYPE,
        }
    }
}

#[derive(Serialize)]
struct EncodedDocument<'a> {
    doc_id: &'a str,
    doc_status: &'a str,
    doc_type: &'a str,
    owner_inn: &'a str,
    participant_inn: &'a str,
    producer_inn: &'a str,
    production_date: NaiveDate,
    production_type: ProductionType,
    reg_date: NaiveDate,
    reg_number: &'a str,
    /// Already-encoded JSON text, not a nested object.
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    import_request: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    products: Option<Vec<EncodedProduct<'a>>>,
}

#[derive(Serialize)]
struct EncodedProduct<'a> {
    owner_inn: &'a str,
    producer_inn: &'a str,
    tnved_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_document: Option<CertificateType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_document_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_document_number: Option<&'a str>,
    production_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    uit_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uitu_code: Option<&'a str>,
}

impl<'a> EncodedProduct<'a> {
    fn new(index: usize, product: &'a Product) -> Result<Self, ApiError> {
        let (uit_code, uitu_code) = match product.unit_code(index)? {
            UnitCode::Uit(code) => (Some(code), None),
            UnitCode::Uitu(code) => (None, Some(code)),
        };

        Ok(Self {
            owner_inn: &product.owner_inn,
            producer_inn: &product.producer_inn,
            tnved_code: &product.tnved_code,
            certificate_document: product.certificate_document,
            certificate_document_date: product.certificate_document_date,
            certificate_document_number: product.certificate_document_number.as_deref(),
            production_date: product.production_date,
            uit_code,
            uitu_code,
        })
    }
}

/// Renders `document` as the JSON text the remote API expects.
pub fn document_json(document: &Document) -> Result<String, ApiError> {
    let description = document
        .description
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::Encoding(e.to_string()))?;

    let products = document
        .products
        .as_ref()
        .map(|products| {
            products
                .iter()
                .enumerate()
                .map(|(index, product)| EncodedProduct::new(index, product))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let encoded = EncodedDocument {
        doc_id: &document.doc_id,
        doc_status: &document.doc_status,
        doc_type: &document.doc_type,
        owner_inn: &document.owner_inn,
        participant_inn: &document.participant_inn,
        producer_inn: &document.producer_inn,
        production_date: document.production_date,
        production_type: document.production_type,
        reg_date: document.reg_date,
        reg_number: &document.reg_number,
        description,
        import_request: document.import_request,
        products,
    };

    serde_json::to_string(&encoded).map_err(|e| ApiError::Encoding(e.to_string()))
}

/// Renders `document` and base64 encodes it for the `product_document` field.
///
/// # Errors
///
/// [`ApiError::InvalidDocument`] when a product has no identity code.
pub fn encode_document(document: &Document) -> Result<String, ApiError> {
    document_json(document).map(|json| STANDARD.encode(json))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::document::Description;
    use serde_json::Value;
    use serde_json::json;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn document() -> Document {
        Document::builder()
            .doc_id("1")
            .doc_status("NEW")
            .doc_type("LP_INTRODUCE_GOODS")
            .owner_inn("7700000001")
            .participant_inn("7700000002")
            .producer_inn("7700000003")
            .production_date(date(1))
            .production_type(ProductionType::OwnProduction)
            .reg_date(date(2))
            .reg_number("R-1")
            .build()
    }

    fn decode(envelope: &str) -> Value {
        let bytes = STANDARD.decode(envelope).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn minimal_document_has_only_mandatory_keys() {
        let value = decode(&encode_document(&document()).unwrap());

        assert_eq!(
            value,
            json!({
                "doc_id": "1",
                "doc_status": "NEW",
                "doc_type": "LP_INTRODUCE_GOODS",
                "owner_inn": "7700000001",
                "participant_inn": "7700000002",
                "producer_inn": "7700000003",
                "production_date": "2024-03-01",
                "production_type": "OWN_PRODUCTION",
                "reg_date": "2024-03-02",
                "reg_number": "R-1",
            })
        );
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("products"));
        assert!(!object.contains_key("description"));
        assert!(!object.contains_key("import_request"));
    }

    #[test]
    fn encoding_is_deterministic() {
        let doc = document();
        assert_eq!(document_json(&doc).unwrap(), document_json(&doc).unwrap());
        assert!(
            document_json(&doc)
                .unwrap()
                .starts_with(r#"{"doc_id":"1","doc_status":"NEW""#)
        );
    }

    #[test]
    fn description_is_a_nested_string() {
        let doc = Document {
            description: Some(Description::new("7700000009")),
            import_request: Some(true),
            ..document()
        };
        let value = decode(&encode_document(&doc).unwrap());

        assert_eq!(value["description"], json!(r#"{"participantInn":"7700000009"}"#));
        assert_eq!(value["import_request"], json!(true));
    }

    #[test]
    fn uit_code_round_trips_without_uitu_code() {
        let doc = Document {
            products: Some(vec![
                Product::builder()
                    .production_date(date(1))
                    .owner_inn("1")
                    .producer_inn("2")
                    .tnved_code("6401")
                    .uit_code("X")
                    .build(),
            ]),
            ..document()
        };
        let value = decode(&encode_document(&doc).unwrap());
        let product = &value["products"][0];

        assert_eq!(product["uit_code"], json!("X"));
        assert!(product.get("uitu_code").is_none());
        assert!(product.get("certificate_document").is_none());
        assert!(document_json(&doc).unwrap().contains(r#""uit_code":"X""#));
    }

    #[test]
    fn products_carry_their_own_fields() {
        let doc = Document {
            products: Some(vec![
                Product::builder()
                    .production_date(date(1))
                    .owner_inn("1")
                    .producer_inn("2")
                    .tnved_code("6401")
                    .uit_code("A")
                    .build(),
                Product::builder()
                    .production_date(date(1))
                    .owner_inn("3")
                    .producer_inn("4")
                    .tnved_code("6402")
                    .certificate_document(CertificateType::ConformityCertificate)
                    .certificate_document_date(date(5))
                    .certificate_document_number("C-9")
                    .uitu_code("B")
                    .build(),
            ]),
            ..document()
        };
        let value = decode(&encode_document(&doc).unwrap());
        let products = value["products"].as_array().unwrap();

        assert_eq!(products.len(), 2);
        for product in products {
            assert_eq!(product["production_date"], json!("2024-03-01"));
        }
        assert_eq!(
            products[1],
            json!({
                "owner_inn": "3",
                "producer_inn": "4",
                "tnved_code": "6402",
                "certificate_document": "CONFORMITY_CERTIFICATE",
                "certificate_document_date": "2024-03-05",
                "certificate_document_number": "C-9",
                "production_date": "2024-03-01",
                "uitu_code": "B",
            })
        );
    }

    #[test]
    fn products_keep_their_own_production_date() {
        let doc = Document {
            products: Some(vec![
                Product::builder()
                    .production_date(date(20))
                    .owner_inn("1")
                    .producer_inn("2")
                    .tnved_code("6401")
                    .uit_code("A")
                    .build(),
            ]),
            ..document()
        };
        let value = decode(&encode_document(&doc).unwrap());
        assert_eq!(value["products"][0]["production_date"], json!("2024-03-20"));
    }

    #[test]
    fn empty_product_list_is_kept() {
        let doc = Document {
            products: Some(Vec::new()),
            ..document()
        };
        let value = decode(&encode_document(&doc).unwrap());
        assert_eq!(value["products"], json!([]));
    }

    #[test]
    fn product_without_codes_is_rejected() {
        let doc = Document {
            products: Some(vec![
                Product::builder()
                    .production_date(date(1))
                    .owner_inn("1")
                    .producer_inn("2")
                    .tnved_code("6401")
                    .build(),
            ]),
            ..document()
        };
        assert!(matches!(
            encode_document(&doc),
            Err(ApiError::InvalidDocument { index: 0, .. })
        ));
    }

    #[test]
    fn submit_body_has_the_four_fixed_fields() {
        let body = serde_json::to_value(SubmitBody::new("ZW52", "sig")).unwrap();
        assert_eq!(
            body,
            json!({
                "document_format": "MANUAL",
                "product_document": "ZW52",
                "signature": "sig",
                "type": "LP_INTRODUCE_GOODS",
            })
        );
    }
}
