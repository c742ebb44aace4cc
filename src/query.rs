//! Address query construction and validation.
//!
//! Single requests, table enrichment and the CLI all go through [`build_query`].

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::util::present;

/// Raw caller input before validation. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    pub free_form_query: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl AddressFields {
    pub fn free_form(text: impl Into<String>) -> Self {
        Self {
            free_form_query: Some(text.into()),
            ..Self::default()
        }
    }

    fn structured_present(&self) -> bool {
        [
            &self.address1,
            &self.address2,
            &self.city,
            &self.state,
            &self.zip_code,
        ]
        .iter()
        .any(|field| present(field.as_deref()).is_some())
    }
}

/// A validated address query. Exactly one form is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressQuery {
    FreeForm {
        text: String,
    },
    Structured {
        address1: Option<String>,
        address2: Option<String>,
        city: Option<String>,
        state: Option<String>,
        zip_code: Option<String>,
    },
}

impl AddressQuery {
    /// Query-string pairs sent to the service for this address.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            AddressQuery::FreeForm { text } => vec![("free_form_query", text.as_str())],
            AddressQuery::Structured {
                address1,
                address2,
                city,
                state,
                zip_code,
            } => [
                ("address1", address1),
                ("address2", address2),
                ("city", city),
                ("state", state),
                ("zip_code", zip_code),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
            .collect(),
        }
    }

    pub fn is_free_form(&self) -> bool {
        matches!(self, AddressQuery::FreeForm { .. })
    }
}

/// Validates `fields` and shapes them into an [`AddressQuery`].
///
/// Blank strings count as absent. Fails with [`ClientError::ConflictingInput`]
/// when both forms are present and [`ClientError::MissingInput`] when neither is.
pub fn build_query(fields: &AddressFields) -> Result<AddressQuery> {
    let free_form = present(fields.free_form_query.as_deref());
    let structured = fields.structured_present();

    match (free_form, structured) {
        (Some(_), true) => Err(ClientError::ConflictingInput),
        (None, false) => Err(ClientError::MissingInput),
        (Some(text), false) => Ok(AddressQuery::FreeForm {
            text: text.to_string(),
        }),
        (None, true) => {
            let keep = |v: &Option<String>| present(v.as_deref()).map(str::to_string);
            Ok(AddressQuery::Structured {
                address1: keep(&fields.address1),
                address2: keep(&fields.address2),
                city: keep(&fields.city),
                state: keep(&fields.state),
                zip_code: keep(&fields.zip_code),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured() -> AddressFields {
        AddressFields {
            address1: Some("123 Main Street".into()),
            city: Some("Tallahassee".into()),
            state: Some("FL".into()),
            zip_code: Some("12345".into()),
            ..AddressFields::default()
        }
    }

    #[test]
    fn test_free_form_query() {
        let query = build_query(&AddressFields::free_form(
            " 123 Main Street, Tallahassee, FL, 12345 ",
        ))
        .unwrap();
        assert_eq!(
            query,
            AddressQuery::FreeForm {
                text: "123 Main Street, Tallahassee, FL, 12345".into()
            }
        );
        assert_eq!(
            query.params(),
            vec![("free_form_query", "123 Main Street, Tallahassee, FL, 12345")]
        );
    }

    #[test]
    fn test_structured_query_drops_empty_fields() {
        let mut fields = structured();
        fields.address2 = Some("  ".into());
        fields.free_form_query = Some(String::new());
        let query = build_query(&fields).unwrap();
        assert!(!query.is_free_form());
        assert_eq!(
            query.params(),
            vec![
                ("address1", "123 Main Street"),
                ("city", "Tallahassee"),
                ("state", "FL"),
                ("zip_code", "12345"),
            ]
        );
    }

    #[test]
    fn test_single_structured_field_is_enough() {
        let fields = AddressFields {
            zip_code: Some("32301".into()),
            ..AddressFields::default()
        };
        assert_eq!(build_query(&fields).unwrap().params(), vec![("zip_code", "32301")]);
    }

    #[test]
    fn test_address2_alone_counts_as_structured() {
        let fields = AddressFields {
            address2: Some("Apt 4".into()),
            ..AddressFields::default()
        };
        assert!(build_query(&fields).is_ok());
    }

    #[test]
    fn test_conflicting_input() {
        let mut fields = structured();
        fields.free_form_query = Some("123 Main Street".into());
        assert!(matches!(build_query(&fields), Err(ClientError::ConflictingInput)));

        let fields = AddressFields {
            free_form_query: Some("123 Main Street".into()),
            address2: Some("Suite 9".into()),
            ..AddressFields::default()
        };
        assert!(matches!(build_query(&fields), Err(ClientError::ConflictingInput)));
    }

    #[test]
    fn test_missing_input() {
        assert!(matches!(
            build_query(&AddressFields::default()),
            Err(ClientError::MissingInput)
        ));
        let blank = AddressFields {
            free_form_query: Some(" ".into()),
            city: Some(String::new()),
            ..AddressFields::default()
        };
        assert!(matches!(build_query(&blank), Err(ClientError::MissingInput)));
    }

    #[test]
    fn test_exactly_one_form_over_all_combinations() {
        // Every subset of populated fields: success iff exactly one form is present.
        for mask in 0u32..64 {
            let pick = |bit: u32, value: &str| (mask & (1 << bit) != 0).then(|| value.to_string());
            let fields = AddressFields {
                free_form_query: pick(0, "1 Elm St, Cairo, GA"),
                address1: pick(1, "1 Elm St"),
                address2: pick(2, "Unit B"),
                city: pick(3, "Cairo"),
                state: pick(4, "GA"),
                zip_code: pick(5, "39828"),
            };
            let free = mask & 1 != 0;
            let structured = mask & !1 != 0;
            match build_query(&fields) {
                Ok(query) => {
                    assert!(free ^ structured, "mask {mask:#08b} should fail");
                    assert_eq!(query.is_free_form(), free);
                }
                Err(ClientError::ConflictingInput) => assert!(free && structured),
                Err(ClientError::MissingInput) => assert!(!free && !structured),
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }
}
