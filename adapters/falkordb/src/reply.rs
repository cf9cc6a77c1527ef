//! Decoding of FalkorDB `GRAPH.QUERY` replies.
//!
//! A read query answers with `[header, result_set, statistics]`; write-only
//! queries answer with `[statistics]` alone. Vertices and relations arrive
//! as nested key/value arrays. The storage underscore prefix on property
//! keys is stripped here, so everything above this module sees logical
//! property names only.

use casefile_core::errors::{GraphError, GraphResult};
use casefile_core::types::{EdgeRecord, Entity, PropertyMap};
use redis::Value;

/// Rows plus the statistics strings of one query.
#[derive(Debug)]
pub struct Reply {
    pub rows: Vec<Vec<Value>>,
    pub stats: Vec<String>,
}

impl Reply {
    /// Whether the statistics report at least one created relationship.
    pub fn relationships_created(&self) -> bool {
        self.stats.iter().any(|line| {
            line.starts_with("Relationships created")
                && line
                    .rsplit(':')
                    .next()
                    .and_then(|count| count.trim().parse::<i64>().ok())
                    .is_some_and(|count| count > 0)
        })
    }
}

/// Split a raw reply into rows and statistics.
pub fn split_reply(value: Value) -> GraphResult<Reply> {
    let Value::Array(mut parts) = value else {
        return Err(GraphError::new(format!(
            "unexpected GRAPH.QUERY reply shape: {value:?}"
        )));
    };

    match parts.len() {
        // statistics only (write query without RETURN)
        1 => {
            let stats = stats_lines(parts.remove(0));
            Ok(Reply {
                rows: Vec::new(),
                stats,
            })
        }
        2 | 3 => {
            let stats = stats_lines(parts.pop().unwrap_or(Value::Nil));
            let result_set = if parts.len() == 2 {
                parts.remove(1)
            } else {
                parts.remove(0)
            };
            let rows = match result_set {
                Value::Array(rows) => rows
                    .into_iter()
                    .map(|row| match row {
                        Value::Array(cells) => cells,
                        other => vec![other],
                    })
                    .collect(),
                Value::Nil => Vec::new(),
                other => {
                    return Err(GraphError::new(format!(
                        "unexpected result set shape: {other:?}"
                    )))
                }
            };
            Ok(Reply { rows, stats })
        }
        n => Err(GraphError::new(format!(
            "unexpected GRAPH.QUERY reply arity: {n}"
        ))),
    }
}

fn stats_lines(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(|item| text(&item)).collect(),
        other => text(&other).map(|line| vec![line]).unwrap_or_default(),
    }
}

/// Scalar cell as text.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(status) => Some(status.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        Value::Int(number) => Some(number.to_string()),
        Value::Double(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Scalar cell as integer.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(number) => Some(*number),
        Value::BulkString(bytes) => String::from_utf8_lossy(bytes).trim().parse().ok(),
        Value::SimpleString(status) => status.trim().parse().ok(),
        _ => None,
    }
}

/// Key/value sections of a vertex or relation reply.
fn sections(value: &Value) -> Vec<(String, &Value)> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(pair) if pair.len() == 2 => {
                text(&pair[0]).map(|key| (key, &pair[1]))
            }
            _ => None,
        })
        .collect()
}

/// Stored property map split into the reserved parts and the logical map.
#[derive(Debug, Default)]
pub struct DbProperties {
    pub id: Option<String>,
    pub schema: Option<String>,
    pub logical: PropertyMap,
}

fn parse_properties(value: &Value) -> DbProperties {
    let mut parsed = DbProperties::default();
    let Value::Array(entries) = value else {
        return parsed;
    };
    for entry in entries {
        let Value::Array(pair) = entry else {
            continue;
        };
        if pair.len() < 2 {
            continue;
        }
        // compact replies carry [key, type, value]; plain ones [key, value]
        let value_cell = pair.last().unwrap_or(&Value::Nil);
        let Some(key) = text(&pair[0]) else {
            continue;
        };
        let values = property_values(value_cell);
        match key.as_str() {
            "id" => parsed.id = values.first().cloned(),
            "schema" => parsed.schema = values.first().cloned(),
            _ => {
                let logical_key = key.strip_prefix('_').unwrap_or(&key).to_string();
                parsed.logical.set(logical_key, values);
            }
        }
    }
    parsed
}

fn property_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::Nil => Vec::new(),
        other => text(other).map(|item| vec![item]).unwrap_or_default(),
    }
}

/// A vertex cell as an [`Entity`].
pub fn node_entity(value: &Value) -> Option<Entity> {
    let sections = sections(value);
    let properties = sections
        .iter()
        .find(|(key, _)| key == "properties")
        .map(|(_, value)| parse_properties(value))?;
    Some(Entity {
        id: properties.id.unwrap_or_default(),
        schema: properties.schema.unwrap_or_else(|| "Thing".to_string()),
        properties: properties.logical,
    })
}

/// A relation cell plus its endpoint entity ids as an [`EdgeRecord`].
pub fn edge_record(value: &Value, source_id: String, target_id: String) -> Option<EdgeRecord> {
    let sections = sections(value);
    let edge_type = sections
        .iter()
        .find(|(key, _)| key == "type")
        .and_then(|(_, value)| text(value))?;
    let internal_id = sections
        .iter()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| integer(value));
    let properties = sections
        .iter()
        .find(|(key, _)| key == "properties")
        .map(|(_, value)| parse_properties(value))
        .unwrap_or_default();

    Some(EdgeRecord {
        id: properties
            .id
            .or_else(|| internal_id.map(|id| id.to_string()))
            .unwrap_or_default(),
        source: source_id,
        target: target_id,
        schema: properties.schema.unwrap_or(edge_type),
        properties: properties.logical,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(text: &str) -> Value {
        Value::BulkString(text.as_bytes().to_vec())
    }

    fn vertex(id: &str, schema: &str, name: &str) -> Value {
        Value::Array(vec![
            Value::Array(vec![bulk("id"), Value::Int(7)]),
            Value::Array(vec![bulk("labels"), Value::Array(vec![bulk("Entity")])]),
            Value::Array(vec![
                bulk("properties"),
                Value::Array(vec![
                    Value::Array(vec![bulk("id"), bulk(id)]),
                    Value::Array(vec![bulk("schema"), bulk(schema)]),
                    Value::Array(vec![bulk("_name"), Value::Array(vec![bulk(name)])]),
                ]),
            ]),
        ])
    }

    #[test]
    fn splits_read_reply_into_rows_and_stats() {
        let reply = Value::Array(vec![
            Value::Array(vec![bulk("n")]),
            Value::Array(vec![Value::Array(vec![vertex("p1", "Person", "Jane")])]),
            Value::Array(vec![bulk("Cached execution: 1")]),
        ]);
        let reply = split_reply(reply).unwrap();
        assert_eq!(reply.rows.len(), 1);
        assert_eq!(reply.stats, ["Cached execution: 1"]);
    }

    #[test]
    fn splits_write_only_reply() {
        let reply = Value::Array(vec![Value::Array(vec![bulk("Nodes created: 1")])]);
        let reply = split_reply(reply).unwrap();
        assert!(reply.rows.is_empty());
        assert_eq!(reply.stats, ["Nodes created: 1"]);
    }

    #[test]
    fn detects_created_relationships() {
        let with = Reply {
            rows: Vec::new(),
            stats: vec!["Relationships created: 1".into()],
        };
        let without = Reply {
            rows: Vec::new(),
            stats: vec!["Properties set: 3".into()],
        };
        assert!(with.relationships_created());
        assert!(!without.relationships_created());
    }

    #[test]
    fn decodes_vertices_with_logical_property_names() {
        let entity = node_entity(&vertex("p1", "Person", "Jane")).unwrap();
        assert_eq!(entity.id, "p1");
        assert_eq!(entity.schema, "Person");
        assert_eq!(entity.properties.values("name"), ["Jane"]);
        assert!(!entity.properties.contains_key("_name"));
    }

    #[test]
    fn decodes_relations_with_stored_ids() {
        let relation = Value::Array(vec![
            Value::Array(vec![bulk("id"), Value::Int(3)]),
            Value::Array(vec![bulk("type"), bulk("EMPLOYMENT")]),
            Value::Array(vec![bulk("src_node"), Value::Int(1)]),
            Value::Array(vec![bulk("dest_node"), Value::Int(2)]),
            Value::Array(vec![
                bulk("properties"),
                Value::Array(vec![
                    Value::Array(vec![bulk("id"), bulk("rel-1")]),
                    Value::Array(vec![bulk("schema"), bulk("Employment")]),
                    Value::Array(vec![bulk("_role"), Value::Array(vec![bulk("CEO")])]),
                ]),
            ]),
        ]);
        let edge = edge_record(&relation, "a".into(), "b".into()).unwrap();
        assert_eq!(edge.id, "rel-1");
        assert_eq!(edge.schema, "Employment");
        assert_eq!(edge.source, "a");
        assert_eq!(edge.properties.values("role"), ["CEO"]);
    }
}
