//! FalkorDB implementation of the Casefile graph store.
//!
//! FalkorDB keeps one named property graph per investigation plus the
//! metadata graph, all reachable over the Redis protocol: `GRAPH.QUERY`
//! executes Cypher, `GRAPH.LIST` enumerates graphs, `GRAPH.DELETE` drops
//! one. A single multiplexed [`ConnectionManager`] is shared by every
//! graph handle.

use async_trait::async_trait;
use casefile_core::prelude::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, info};

mod config;
mod cypher;
mod reply;

pub use config::FalkorConfig;

use cypher::{escape_identifier, stripped, ParamValue, QueryBuilder};
use reply::{edge_record, integer, node_entity, split_reply, text, Reply};

/// FalkorDB-backed [`GraphStore`].
pub struct FalkorStore {
    manager: ConnectionManager,
}

impl FalkorStore {
    /// Connect and verify the server answers.
    pub async fn new(config: FalkorConfig) -> Result<Self, GraphError> {
        info!("Connecting to FalkorDB at {}:{}", config.host, config.port);
        let client = redis::Client::open(config.url())
            .map_err(|err| GraphError::new(format!("invalid FalkorDB URL: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| GraphError::new(format!("FalkorDB connection failed: {err}")))?;

        let store = Self { manager };
        store.health_check().await?;
        Ok(store)
    }

    fn handle(&self, name: String) -> FalkorGraph {
        FalkorGraph {
            name,
            manager: self.manager.clone(),
        }
    }

    fn meta(&self) -> FalkorGraph {
        self.handle(META_GRAPH_NAME.to_string())
    }

    async fn graph_names(&self) -> GraphResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let value: redis::Value = redis::cmd("GRAPH.LIST")
            .query_async(&mut conn)
            .await
            .map_err(|err| GraphError::new(format!("GRAPH.LIST failed: {err}")))?;
        let redis::Value::Array(items) = value else {
            return Ok(Vec::new());
        };
        Ok(items.iter().filter_map(text).collect())
    }

    fn meta_from_row(row: &[redis::Value]) -> Option<InvestigationMeta> {
        let id = row.first().and_then(text)?;
        let name = row.get(1).and_then(text).unwrap_or_default();
        let description = row.get(2).and_then(text);
        let created_at = row
            .get(3)
            .and_then(text)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Some(InvestigationMeta {
            id,
            name,
            description,
            created_at,
        })
    }
}

#[async_trait]
impl GraphStore for FalkorStore {
    fn graph(&self, investigation: &InvestigationId) -> Arc<dyn InvestigationGraph> {
        Arc::new(self.handle(graph_name(investigation)))
    }

    async fn delete_graph(&self, investigation: &InvestigationId) -> GraphResult<()> {
        let name = graph_name(investigation);
        if !self.graph_names().await?.contains(&name) {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        redis::cmd("GRAPH.DELETE")
            .arg(&name)
            .query_async::<redis::Value>(&mut conn)
            .await
            .map_err(|err| GraphError::new(format!("GRAPH.DELETE {name} failed: {err}")))?;
        info!("Deleted graph {}", name);
        Ok(())
    }

    async fn list_investigations(&self) -> GraphResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .graph_names()
            .await?
            .iter()
            .filter_map(|name| name.strip_prefix(INVESTIGATION_GRAPH_PREFIX))
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn put_metadata(&self, meta: &InvestigationMeta) -> GraphResult<()> {
        let mut builder = QueryBuilder::new("MERGE (i:Investigation {id: ");
        let id = builder.bind("id", ParamValue::Str(meta.id.clone()));
        let name = builder.bind("name", ParamValue::Str(meta.name.clone()));
        let description = builder.bind(
            "description",
            meta.description
                .clone()
                .map(ParamValue::Str)
                .unwrap_or(ParamValue::Null),
        );
        let created_at = builder.bind(
            "created_at",
            ParamValue::Str(meta.created_at.to_rfc3339()),
        );
        builder.push(&format!(
            "{id}}}) SET i.name = {name}, i.description = {description}, \
             i.created_at = {created_at}"
        ));
        self.meta().query(builder).await?;
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> GraphResult<Option<InvestigationMeta>> {
        let mut builder = QueryBuilder::new("MATCH (i:Investigation {id: ");
        let id_param = builder.bind("id", ParamValue::Str(id.to_string()));
        builder.push(&format!(
            "{id_param}}}) RETURN i.id, i.name, i.description, i.created_at LIMIT 1"
        ));
        let reply = self.meta().query(builder).await?;
        Ok(reply.rows.first().and_then(|row| Self::meta_from_row(row)))
    }

    async fn list_metadata(&self) -> GraphResult<Vec<InvestigationMeta>> {
        let builder = QueryBuilder::new(
            "MATCH (i:Investigation) \
             RETURN i.id, i.name, i.description, i.created_at \
             ORDER BY i.created_at DESC",
        );
        let reply = self.meta().query(builder).await?;
        Ok(reply
            .rows
            .iter()
            .filter_map(|row| Self::meta_from_row(row))
            .collect())
    }

    async fn delete_metadata(&self, id: &str) -> GraphResult<()> {
        let mut builder = QueryBuilder::new("MATCH (i:Investigation {id: ");
        let id_param = builder.bind("id", ParamValue::Str(id.to_string()));
        builder.push(&format!("{id_param}}}) DETACH DELETE i"));
        self.meta().query(builder).await?;
        Ok(())
    }

    async fn health_check(&self) -> GraphResult<()> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| GraphError::new(format!("FalkorDB ping failed: {err}")))?;
        debug!("FalkorDB health check: {}", pong);
        Ok(())
    }
}

/// Handle onto one named FalkorDB graph.
struct FalkorGraph {
    name: String,
    manager: ConnectionManager,
}

impl FalkorGraph {
    async fn query(&self, builder: QueryBuilder) -> GraphResult<Reply> {
        let rendered = builder.render();
        debug!("GRAPH.QUERY {}: {}", self.name, rendered);
        let mut conn = self.manager.clone();
        let value: redis::Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.name)
            .arg(&rendered)
            .query_async(&mut conn)
            .await
            .map_err(|err| GraphError::new(format!("GRAPH.QUERY failed: {err}")))?;
        split_reply(value)
    }

    async fn get_node(&self, id: &str) -> GraphResult<Option<Entity>> {
        let mut builder = QueryBuilder::new("MATCH (n:Entity {id: ");
        let id_param = builder.bind("entity_id", ParamValue::Str(id.to_string()));
        builder.push(&format!("{id_param}}}) RETURN n LIMIT 1"));
        let reply = self.query(builder).await?;
        Ok(reply
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(node_entity))
    }

    /// Edge rows for one direction; `outgoing` selects which endpoint is
    /// pinned to the entity id.
    async fn edge_rows(&self, id: &str, outgoing: bool) -> GraphResult<Vec<Row>> {
        let pattern = if outgoing {
            "MATCH (a:Entity {id: $entity_id})-[r]->(b:Entity) "
        } else {
            "MATCH (a:Entity)-[r]->(b:Entity {id: $entity_id}) "
        };
        let mut builder = QueryBuilder::new("");
        builder.bind("entity_id", ParamValue::Str(id.to_string()));
        builder.push(pattern);
        builder.push("RETURN r, a.id, b.id");
        let reply = self.query(builder).await?;
        Ok(reply
            .rows
            .iter()
            .filter_map(|row| {
                let source = row.get(1).and_then(text)?;
                let target = row.get(2).and_then(text)?;
                let edge = edge_record(row.first()?, source, target)?;
                Some(vec![GraphValue::Edge(edge)])
            })
            .collect())
    }

    fn node_rows(reply: &Reply) -> Vec<Row> {
        reply
            .rows
            .iter()
            .filter_map(|row| row.first())
            .filter_map(node_entity)
            .map(|entity| vec![GraphValue::Node(entity)])
            .collect()
    }
}

#[async_trait]
impl InvestigationGraph for FalkorGraph {
    async fn run(&self, statement: GraphStatement) -> GraphResult<Vec<Row>> {
        match statement {
            GraphStatement::CreateNode {
                id,
                schema,
                properties,
            } => {
                let properties = stripped(&properties);
                let mut builder = QueryBuilder::new("CREATE (n:Entity {id: ");
                let id_param = builder.bind("entity_id", ParamValue::Str(id));
                let schema_param = builder.bind("schema", ParamValue::Str(schema));
                builder.push(&format!("{id_param}, schema: {schema_param}}})"));
                let assignments = builder.property_assignments("n", &properties);
                if !assignments.is_empty() {
                    builder.push(&format!(" SET {assignments}"));
                }
                builder.push(" RETURN n");
                let reply = self.query(builder).await?;
                Ok(Self::node_rows(&reply))
            }

            GraphStatement::GetNode { id } => Ok(self
                .get_node(&id)
                .await?
                .map(|entity| vec![vec![GraphValue::Node(entity)]])
                .unwrap_or_default()),

            GraphStatement::ListNodes { search } => {
                let mut builder = QueryBuilder::new("MATCH (n:Entity) ");
                if let Some(search) = search {
                    let param = builder.bind("search", ParamValue::Str(search));
                    builder.push(&format!(
                        "WHERE toLower(n.id) CONTAINS toLower({param}) \
                         OR any(name IN coalesce(n._name, []) \
                         WHERE toLower(name) CONTAINS toLower({param})) "
                    ));
                }
                builder.push("RETURN n ORDER BY n.id");
                let reply = self.query(builder).await?;
                Ok(Self::node_rows(&reply))
            }

            GraphStatement::ReplaceNodeProperties { id, properties } => {
                let Some(current) = self.get_node(&id).await? else {
                    return Ok(Vec::new());
                };
                let properties = stripped(&properties);

                let mut builder = QueryBuilder::new("MATCH (n:Entity {id: ");
                let id_param = builder.bind("entity_id", ParamValue::Str(id));
                builder.push(&format!("{id_param}}})"));
                let removable: Vec<String> = current
                    .properties
                    .keys()
                    .map(|key| format!("n.{}", escape_identifier(&format!("_{key}"))))
                    .collect();
                if !removable.is_empty() {
                    builder.push(&format!(" REMOVE {}", removable.join(", ")));
                }
                let assignments = builder.property_assignments("n", &properties);
                if !assignments.is_empty() {
                    builder.push(&format!(" SET {assignments}"));
                }
                builder.push(" RETURN n");
                let reply = self.query(builder).await?;
                Ok(Self::node_rows(&reply))
            }

            GraphStatement::DeleteNode { id } => {
                let mut builder = QueryBuilder::new("MATCH (n:Entity {id: ");
                let id_param = builder.bind("entity_id", ParamValue::Str(id));
                builder.push(&format!(
                    "{id_param}}}) WITH n LIMIT 1 DETACH DELETE n RETURN 1"
                ));
                let reply = self.query(builder).await?;
                Ok(reply
                    .rows
                    .iter()
                    .map(|_| vec![GraphValue::Integer(1)])
                    .collect())
            }

            GraphStatement::Expand { id } => {
                let Some(entity) = self.get_node(&id).await? else {
                    return Ok(Vec::new());
                };
                let mut edges: Vec<GraphValue> = Vec::new();
                let mut neighbors: Vec<GraphValue> = Vec::new();
                let mut seen: Vec<String> = Vec::new();
                for rows in [
                    self.edge_rows(&id, true).await?,
                    self.edge_rows(&id, false).await?,
                ] {
                    for row in rows {
                        let Some(GraphValue::Edge(edge)) = row.into_iter().next() else {
                            continue;
                        };
                        let other = if edge.source == id {
                            edge.target.clone()
                        } else {
                            edge.source.clone()
                        };
                        if !seen.contains(&other) {
                            seen.push(other.clone());
                            if let Some(neighbor) = self.get_node(&other).await? {
                                neighbors.push(GraphValue::Node(neighbor));
                            }
                        }
                        edges.push(GraphValue::Edge(edge));
                    }
                }
                Ok(vec![vec![
                    GraphValue::Node(entity),
                    GraphValue::List(neighbors),
                    GraphValue::List(edges),
                ]])
            }

            GraphStatement::FindNodeIdByName { name } => {
                let mut builder = QueryBuilder::new("MATCH (n:Entity) WHERE ");
                let param = builder.bind("name", ParamValue::Str(name));
                builder.push(&format!(
                    "any(name IN coalesce(n._name, []) \
                     WHERE toLower(name) = toLower({param})) \
                     RETURN n.id LIMIT 1"
                ));
                let reply = self.query(builder).await?;
                Ok(reply
                    .rows
                    .iter()
                    .filter_map(|row| row.first().and_then(text))
                    .map(|id| vec![GraphValue::Text(id)])
                    .collect())
            }

            GraphStatement::NodeIdsIn { ids } => {
                let mut builder = QueryBuilder::new("MATCH (n:Entity) WHERE n.id IN ");
                let param = builder.bind("ids", ParamValue::StrList(ids));
                builder.push(&format!("{param} RETURN n.id"));
                let reply = self.query(builder).await?;
                Ok(reply
                    .rows
                    .iter()
                    .filter_map(|row| row.first().and_then(text))
                    .map(|id| vec![GraphValue::Text(id)])
                    .collect())
            }

            GraphStatement::UpsertEdge {
                id,
                schema,
                source,
                target,
                properties,
            } => {
                let properties = stripped(&properties);
                let relation = relation_type(&schema);
                let mut builder = QueryBuilder::new("MATCH (a:Entity {id: ");
                let source_param = builder.bind("source", ParamValue::Str(source.clone()));
                let target_param = builder.bind("target", ParamValue::Str(target.clone()));
                let edge_id = builder.bind("edge_id", ParamValue::Str(id));
                let schema_param = builder.bind("schema", ParamValue::Str(schema));
                builder.push(&format!(
                    "{source_param}}}), (b:Entity {{id: {target_param}}}) \
                     MERGE (a)-[r:{relation} {{id: {edge_id}}}]->(b) \
                     SET r.schema = {schema_param}"
                ));
                let assignments = builder.property_assignments("r", &properties);
                if !assignments.is_empty() {
                    builder.push(&format!(", {assignments}"));
                }
                builder.push(" RETURN r");
                let reply = self.query(builder).await?;
                let created = reply.relationships_created();
                Ok(reply
                    .rows
                    .iter()
                    .filter_map(|row| {
                        edge_record(row.first()?, source.clone(), target.clone())
                    })
                    .map(|edge| vec![GraphValue::Edge(edge), GraphValue::Bool(created)])
                    .collect())
            }

            GraphStatement::OutgoingEdges { id } => self.edge_rows(&id, true).await,

            GraphStatement::IncomingEdges { id } => self.edge_rows(&id, false).await,

            GraphStatement::CountNodes => {
                let reply = self
                    .query(QueryBuilder::new("MATCH (n:Entity) RETURN COUNT(n)"))
                    .await?;
                let count = reply
                    .rows
                    .first()
                    .and_then(|row| row.first())
                    .and_then(integer)
                    .unwrap_or(0);
                Ok(vec![vec![GraphValue::Integer(count)]])
            }

            GraphStatement::CountEdges => {
                let reply = self
                    .query(QueryBuilder::new(
                        "MATCH (:Entity)-[r]->(:Entity) RETURN COUNT(r)",
                    ))
                    .await?;
                let count = reply
                    .rows
                    .first()
                    .and_then(|row| row.first())
                    .and_then(integer)
                    .unwrap_or(0);
                Ok(vec![vec![GraphValue::Integer(count)]])
            }

            GraphStatement::PageNodes { skip, limit } => {
                let mut builder = QueryBuilder::new("MATCH (n:Entity) RETURN n ORDER BY n.id ");
                let skip_param = builder.bind("skip", ParamValue::Int(skip as i64));
                let limit_param = builder.bind("limit", ParamValue::Int(limit as i64));
                builder.push(&format!("SKIP {skip_param} LIMIT {limit_param}"));
                let reply = self.query(builder).await?;
                Ok(Self::node_rows(&reply))
            }

            GraphStatement::PageEdges { skip, limit } => {
                let mut builder =
                    QueryBuilder::new("MATCH (a:Entity)-[r]->(b:Entity) RETURN r, a.id, b.id ");
                let skip_param = builder.bind("skip", ParamValue::Int(skip as i64));
                let limit_param = builder.bind("limit", ParamValue::Int(limit as i64));
                builder.push(&format!(
                    "ORDER BY a.id, b.id SKIP {skip_param} LIMIT {limit_param}"
                ));
                let reply = self.query(builder).await?;
                Ok(reply
                    .rows
                    .iter()
                    .filter_map(|row| {
                        let source = row.get(1).and_then(text)?;
                        let target = row.get(2).and_then(text)?;
                        let edge = edge_record(row.first()?, source, target)?;
                        Some(vec![GraphValue::Edge(edge)])
                    })
                    .collect())
            }
        }
    }
}
