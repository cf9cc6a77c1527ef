//! Cypher rendering with inline `CYPHER` parameter prologues.
//!
//! FalkorDB takes parameters as a `CYPHER name=value ...` prefix on the
//! query string, so every value is encoded into a literal here: strings as
//! JSON string literals (the escaping rules coincide), lists element-wise.
//! Property keys are never spliced bare into map syntax; assignments go
//! through backtick-escaped identifiers instead, which keeps arbitrary
//! user-supplied keys safe.

use casefile_core::types::PropertyMap;

/// A parameter value bound into the query prologue.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Str(String),
    StrList(Vec<String>),
    Int(i64),
    Null,
}

impl ParamValue {
    fn encode(&self) -> String {
        match self {
            Self::Str(value) => encode_str(value),
            Self::StrList(values) => {
                let encoded: Vec<String> = values.iter().map(|v| encode_str(v)).collect();
                format!("[{}]", encoded.join(", "))
            }
            Self::Int(value) => value.to_string(),
            Self::Null => "null".to_string(),
        }
    }
}

fn encode_str(value: &str) -> String {
    // JSON string literals are valid Cypher string literals.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Backtick-escape an identifier (property key or relation type position).
pub fn escape_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Accumulates query text plus its bound parameters.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    text: String,
    params: Vec<(String, ParamValue)>,
}

impl QueryBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn bind(&mut self, name: impl Into<String>, value: ParamValue) -> String {
        let name = name.into();
        self.params.push((name.clone(), value));
        format!("${name}")
    }

    /// `SET {target}.`key` = $pN, ...` clauses for a property map, with
    /// the storage underscore prefix applied to every key.
    pub fn property_assignments(&mut self, target: &str, properties: &PropertyMap) -> String {
        let mut assignments = Vec::with_capacity(properties.len());
        for (index, (key, values)) in properties.iter().enumerate() {
            let param = self.bind(
                format!("{target}_prop_{index}"),
                ParamValue::StrList(values.clone()),
            );
            assignments.push(format!(
                "{target}.{} = {param}",
                escape_identifier(&format!("_{key}"))
            ));
        }
        assignments.join(", ")
    }

    /// Full query string with the `CYPHER` parameter prologue.
    pub fn render(&self) -> String {
        if self.params.is_empty() {
            return self.text.clone();
        }
        let prologue: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{name}={}", value.encode()))
            .collect();
        format!("CYPHER {} {}", prologue.join(" "), self.text)
    }
}

/// Drop empty value lists; they are persisted as absent.
pub fn stripped(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(key, values)| (key.clone(), values.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_json_escaped() {
        assert_eq!(
            ParamValue::Str("O\"Brien\n".into()).encode(),
            "\"O\\\"Brien\\n\""
        );
    }

    #[test]
    fn render_prepends_prologue() {
        let mut builder = QueryBuilder::new("MATCH (n:Entity {id: ");
        let param = builder.bind("entity_id", ParamValue::Str("p1".into()));
        builder.push(&format!("{param}}}) RETURN n"));
        assert_eq!(
            builder.render(),
            "CYPHER entity_id=\"p1\" MATCH (n:Entity {id: $entity_id}) RETURN n"
        );
    }

    #[test]
    fn identifiers_are_backticked() {
        assert_eq!(escape_identifier("_name"), "`_name`");
        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn property_assignments_prefix_keys() {
        let properties: PropertyMap = [("name".to_string(), vec!["Jane".to_string()])]
            .into_iter()
            .collect();
        let mut builder = QueryBuilder::new("");
        let clause = builder.property_assignments("n", &properties);
        assert_eq!(clause, "n.`_name` = $n_prop_0");
    }
}
