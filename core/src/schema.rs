//! FollowTheMoney-compatible schema catalog and property validation.
//!
//! There is no FTM model library to lean on here, so the catalog is built
//! in: the entity schemas the extractor emits, the relation schemas with
//! their endpoint slots, and typed properties for the fields the cleaner
//! and validator care about. Records carrying schemas outside the catalog
//! are still accepted (only their well-known field names are type-checked),
//! matching the tolerant fallback behavior of FTM-less deployments.

use crate::errors::{CoreError, CoreResult};
use crate::types::PropertyMap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Value type of a schema property, used for validation and cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Name,
    Text,
    Date,
    Number,
    Country,
    Email,
    Url,
    Entity,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Name => "name",
            Self::Text => "text",
            Self::Date => "date",
            Self::Number => "number",
            Self::Country => "country",
            Self::Email => "email",
            Self::Url => "url",
            Self::Entity => "entity",
        }
    }
}

/// Property details for a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProperty {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub multiple: bool,
}

/// Basic schema description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub label: String,
    pub plural: String,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub matchable: bool,
}

/// Schema details including available properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDetail {
    #[serde(flatten)]
    pub info: SchemaInfo,
    pub properties: Vec<SchemaProperty>,
}

struct SchemaDef {
    info: SchemaInfo,
    properties: IndexMap<String, SchemaProperty>,
}

/// Property names allowed through validation without a catalog entry; these
/// are bookkeeping fields the extractor attaches.
const CUSTOM_ALLOWED_PROPERTIES: [&str; 4] = ["confidence", "charStart", "charEnd", "relationGroup"];

/// Field names type-checked even on schemas outside the catalog.
const COMMON_DATE_FIELDS: [&str; 5] = ["startDate", "endDate", "date", "retrievedAt", "modifiedAt"];
const COMMON_NUMBER_FIELDS: [&str; 4] = ["amount", "amountUsd", "amountEur", "confidence"];

static ISO_DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(-\d{2}(-\d{2})?)?$").expect("static pattern"));

fn prop(name: &str, label: &str, property_type: PropertyType) -> (String, SchemaProperty) {
    (
        name.to_string(),
        SchemaProperty {
            name: name.to_string(),
            label: label.to_string(),
            property_type,
            multiple: true,
        },
    )
}

fn thing_properties() -> Vec<(String, SchemaProperty)> {
    vec![
        prop("name", "Name", PropertyType::Name),
        prop("alias", "Other name", PropertyType::Name),
        prop("description", "Description", PropertyType::Text),
        prop("summary", "Summary", PropertyType::Text),
        prop("country", "Country", PropertyType::Country),
        prop("sourceUrl", "Source link", PropertyType::Url),
        prop("notes", "Notes", PropertyType::Text),
        prop("retrievedAt", "Retrieved on", PropertyType::Date),
        prop("modifiedAt", "Modified on", PropertyType::Date),
    ]
}

fn interval_properties() -> Vec<(String, SchemaProperty)> {
    vec![
        prop("startDate", "Start date", PropertyType::Date),
        prop("endDate", "End date", PropertyType::Date),
        prop("date", "Date", PropertyType::Date),
        prop("role", "Role", PropertyType::String),
        prop("status", "Status", PropertyType::String),
        prop("summary", "Summary", PropertyType::Text),
        prop("description", "Description", PropertyType::Text),
        prop("sourceUrl", "Source link", PropertyType::Url),
        prop("proof", "Source document", PropertyType::Entity),
    ]
}

fn entity_schema(
    name: &str,
    label: &str,
    plural: &str,
    is_abstract: bool,
    matchable: bool,
    extra: Vec<(String, SchemaProperty)>,
) -> SchemaDef {
    let mut properties: IndexMap<String, SchemaProperty> = thing_properties().into_iter().collect();
    properties.extend(extra);
    SchemaDef {
        info: SchemaInfo {
            name: name.to_string(),
            label: label.to_string(),
            plural: plural.to_string(),
            is_abstract,
            matchable,
        },
        properties,
    }
}

fn relation_schema(
    name: &str,
    label: &str,
    plural: &str,
    slots: &[(&str, &str)],
    extra: Vec<(String, SchemaProperty)>,
) -> SchemaDef {
    let mut properties: IndexMap<String, SchemaProperty> =
        interval_properties().into_iter().collect();
    for &(slot, slot_label) in slots {
        let (key, value) = prop(slot, slot_label, PropertyType::Entity);
        properties.insert(key, value);
    }
    properties.extend(extra);
    SchemaDef {
        info: SchemaInfo {
            name: name.to_string(),
            label: label.to_string(),
            plural: plural.to_string(),
            is_abstract: false,
            matchable: false,
        },
        properties,
    }
}

fn build_catalog() -> IndexMap<String, SchemaDef> {
    let defs = vec![
        entity_schema("Thing", "Thing", "Things", true, false, Vec::new()),
        entity_schema(
            "Person",
            "Person",
            "People",
            false,
            true,
            vec![
                prop("birthDate", "Birth date", PropertyType::Date),
                prop("deathDate", "Death date", PropertyType::Date),
                prop("nationality", "Nationality", PropertyType::Country),
                prop("email", "E-Mail", PropertyType::Email),
                prop("position", "Position", PropertyType::String),
                prop("idNumber", "ID number", PropertyType::String),
                prop("innCode", "INN", PropertyType::String),
            ],
        ),
        entity_schema(
            "Company",
            "Company",
            "Companies",
            false,
            true,
            vec![
                prop("jurisdiction", "Jurisdiction", PropertyType::Country),
                prop("registrationNumber", "Registration number", PropertyType::String),
                prop("incorporationDate", "Incorporation date", PropertyType::Date),
                prop("dissolutionDate", "Dissolution date", PropertyType::Date),
                prop("ticker", "Stock ticker", PropertyType::String),
                prop("website", "Website", PropertyType::Url),
                prop("email", "E-Mail", PropertyType::Email),
                prop("vatCode", "VAT number", PropertyType::String),
                prop("innCode", "INN", PropertyType::String),
            ],
        ),
        entity_schema(
            "Organization",
            "Organization",
            "Organizations",
            false,
            true,
            vec![
                prop("jurisdiction", "Jurisdiction", PropertyType::Country),
                prop("registrationNumber", "Registration number", PropertyType::String),
                prop("website", "Website", PropertyType::Url),
                prop("email", "E-Mail", PropertyType::Email),
            ],
        ),
        entity_schema(
            "Document",
            "Document",
            "Documents",
            false,
            false,
            vec![
                prop("fileName", "File name", PropertyType::String),
                prop("extension", "File extension", PropertyType::String),
                prop("mimeType", "MIME type", PropertyType::String),
                prop("bodyText", "Text", PropertyType::Text),
                prop("title", "Title", PropertyType::String),
                prop("author", "Author", PropertyType::String),
                prop("date", "Date", PropertyType::Date),
                prop("processingStatus", "Processing status", PropertyType::String),
            ],
        ),
        entity_schema(
            "Security",
            "Security",
            "Securities",
            false,
            true,
            vec![
                prop("ticker", "Stock ticker", PropertyType::String),
                prop("isin", "ISIN", PropertyType::String),
                prop("issuer", "Issuer", PropertyType::Entity),
                prop("issueDate", "Issue date", PropertyType::Date),
            ],
        ),
        entity_schema(
            "Email",
            "E-Mail",
            "E-Mails",
            false,
            false,
            vec![
                prop("email", "E-Mail", PropertyType::Email),
                prop("subject", "Subject", PropertyType::String),
                prop("sender", "Sender", PropertyType::String),
                prop("bodyText", "Text", PropertyType::Text),
                prop("date", "Date", PropertyType::Date),
            ],
        ),
        relation_schema(
            "Ownership",
            "Ownership",
            "Ownerships",
            &[("owner", "Owner"), ("asset", "Asset")],
            vec![
                prop("percentage", "Percentage held", PropertyType::Number),
                prop("sharesCount", "Number of shares", PropertyType::Number),
            ],
        ),
        relation_schema(
            "Directorship",
            "Directorship",
            "Directorships",
            &[("director", "Director"), ("organization", "Organization")],
            Vec::new(),
        ),
        relation_schema(
            "Employment",
            "Employment",
            "Employments",
            &[("employee", "Employee"), ("employer", "Employer")],
            Vec::new(),
        ),
        relation_schema(
            "Associate",
            "Associate",
            "Associates",
            &[("person", "Person"), ("associate", "Associate")],
            vec![prop("relationship", "Relationship", PropertyType::String)],
        ),
        relation_schema(
            "Family",
            "Family",
            "Family relations",
            &[("person", "Person"), ("relative", "Relative")],
            vec![prop("relationship", "Relationship", PropertyType::String)],
        ),
        relation_schema(
            "Membership",
            "Membership",
            "Memberships",
            &[("member", "Member"), ("organization", "Organization")],
            Vec::new(),
        ),
        relation_schema(
            "Representation",
            "Representation",
            "Representations",
            &[("agent", "Agent"), ("client", "Client")],
            Vec::new(),
        ),
        relation_schema(
            "Payment",
            "Payment",
            "Payments",
            &[("payer", "Payer"), ("beneficiary", "Beneficiary")],
            vec![
                prop("amount", "Amount", PropertyType::Number),
                prop("amountUsd", "Amount in USD", PropertyType::Number),
                prop("amountEur", "Amount in EUR", PropertyType::Number),
                prop("currency", "Currency", PropertyType::String),
            ],
        ),
        relation_schema(
            "UnknownLink",
            "Link",
            "Links",
            &[("subject", "Subject"), ("object", "Object")],
            Vec::new(),
        ),
    ];

    defs.into_iter()
        .map(|def| (def.info.name.clone(), def))
        .collect()
}

/// Schema catalog with per-property validation. Construct once and share.
pub struct SchemaCatalog {
    schemas: IndexMap<String, SchemaDef>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self {
            schemas: build_catalog(),
        }
    }

    /// Every schema in catalog order.
    pub fn list(&self) -> Vec<SchemaInfo> {
        self.schemas.values().map(|def| def.info.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<SchemaDetail> {
        self.schemas.get(name).map(|def| SchemaDetail {
            info: def.info.clone(),
            properties: def.properties.values().cloned().collect(),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Validate a property map against the named schema. Underscore-prefixed
    /// keys and the extractor bookkeeping fields bypass the catalog; unknown
    /// property keys are accepted for extensibility; schemas outside the
    /// catalog fall back to checks on well-known field names.
    pub fn validate(&self, schema: &str, properties: &PropertyMap) -> CoreResult<()> {
        if schema.trim().is_empty() {
            return Err(CoreError::schema("Schema must be a non-empty string"));
        }

        let Some(def) = self.schemas.get(schema) else {
            return self.validate_common_fields(properties);
        };

        for (key, values) in properties.iter() {
            if key.starts_with('_') || CUSTOM_ALLOWED_PROPERTIES.contains(&key.as_str()) {
                continue;
            }
            let Some(property) = def.properties.get(key) else {
                continue;
            };
            for value in values {
                Self::check_value(key, value, property.property_type)?;
            }
        }
        Ok(())
    }

    fn validate_common_fields(&self, properties: &PropertyMap) -> CoreResult<()> {
        for (key, values) in properties.iter() {
            if COMMON_DATE_FIELDS.contains(&key.as_str()) {
                for value in values {
                    Self::check_value(key, value, PropertyType::Date)?;
                }
            }
            if COMMON_NUMBER_FIELDS.contains(&key.as_str()) {
                for value in values {
                    Self::check_value(key, value, PropertyType::Number)?;
                }
            }
        }
        Ok(())
    }

    fn check_value(key: &str, value: &str, property_type: PropertyType) -> CoreResult<()> {
        match property_type {
            PropertyType::Date => {
                if !value.is_empty() && !ISO_DATE_PATTERN.is_match(value) {
                    return Err(CoreError::schema(format!(
                        "Property '{key}' must be ISO date format (YYYY, YYYY-MM, or YYYY-MM-DD)"
                    )));
                }
            }
            PropertyType::Number => {
                let parsed: Result<f64, _> = value.parse();
                match parsed {
                    Ok(number) if number.is_finite() => {}
                    _ => {
                        return Err(CoreError::schema(format!(
                            "Property '{key}' must be numeric"
                        )))
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &[&str])]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn catalog_carries_entity_and_relation_schemas() {
        let catalog = SchemaCatalog::new();
        for name in [
            "Thing",
            "Person",
            "Company",
            "Organization",
            "Document",
            "Security",
            "Email",
            "Ownership",
            "Directorship",
            "Employment",
            "Associate",
            "Family",
            "Membership",
            "Representation",
            "Payment",
            "UnknownLink",
        ] {
            assert!(catalog.exists(name), "missing schema {name}");
        }
        assert!(!catalog.exists("Spaceship"));
    }

    #[test]
    fn schema_detail_lists_typed_properties() {
        let catalog = SchemaCatalog::new();
        let person = catalog.get("Person").unwrap();
        let birth = person
            .properties
            .iter()
            .find(|p| p.name == "birthDate")
            .unwrap();
        assert_eq!(birth.property_type, PropertyType::Date);
        assert!(birth.multiple);
    }

    #[test]
    fn validate_accepts_good_dates_and_numbers() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[
            ("name", &["Jane Doe"]),
            ("birthDate", &["1980", "1980-02", "1980-02-29"]),
            ("confidence", &["0.92"]),
        ]);
        catalog.validate("Person", &properties).unwrap();
    }

    #[test]
    fn validate_rejects_bad_date() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[("birthDate", &["02/29/1980"])]);
        let err = catalog.validate("Person", &properties).unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)));
        assert!(err.to_string().contains("birthDate"));
    }

    #[test]
    fn validate_rejects_non_numeric_amount() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[("amount", &["a lot"])]);
        let err = catalog.validate("Payment", &properties).unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn validate_rejects_empty_schema_name() {
        let catalog = SchemaCatalog::new();
        let err = catalog.validate("  ", &PropertyMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)));
    }

    #[test]
    fn unknown_schema_falls_back_to_common_checks() {
        let catalog = SchemaCatalog::new();
        catalog
            .validate("Passport", &props(&[("number", &["X123"])]))
            .unwrap();
        let err = catalog
            .validate("Passport", &props(&[("startDate", &["yesterday"])]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)));
    }

    #[test]
    fn underscore_and_bookkeeping_keys_bypass_checks() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[
            ("_raw", &["anything"]),
            ("charStart", &["12"]),
            ("relationGroup", &["g1"]),
        ]);
        catalog.validate("Person", &properties).unwrap();
    }

    #[test]
    fn unknown_property_keys_are_accepted() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[("favouriteColour", &["teal"])]);
        catalog.validate("Person", &properties).unwrap();
    }

    #[test]
    fn empty_date_values_pass() {
        let catalog = SchemaCatalog::new();
        let properties = props(&[("birthDate", &[""])]);
        catalog.validate("Person", &properties).unwrap();
    }
}
