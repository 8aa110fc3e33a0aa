//! Minimal connected schema subgraph spanning the mapped root words.

use std::collections::BTreeSet;

use nl2sparql_ir::QueryIr;
use nl2sparql_schema::{has_dome, SchemaGraph, SchemaIndex};
use tracing::{debug, warn};

use crate::error::DisconnectedSchemaError;
use crate::mapping::MappingTable;
use crate::resolve::ResolvedQuery;

/// Entities the subgraph must contain and entity pairs it must connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanRequest {
    pub entities: Vec<String>,
    pub pairs: Vec<(String, String)>,
}

impl SpanRequest {
    /// Root words and their `L1` neighbours, plus the synthetic occurrences
    /// and their owners.
    pub fn for_query(ir: &QueryIr, mapping: &MappingTable, resolved: &ResolvedQuery) -> Self {
        let mut request = Self::default();
        for root in &ir.root_words {
            let Some(entity) = mapping.get(&root.word) else {
                continue;
            };
            request.add_entity(&entity.name);
            for n in &root.neighbors {
                if let Some(other) = mapping.get(n) {
                    request.add_pair(&entity.name, &other.name);
                }
            }
        }
        for occ in resolved.occurrences().iter().filter(|o| o.synthetic) {
            request.add_entity(&occ.entity);
            let owner = occ.subject.as_deref().and_then(|s| resolved.get(s));
            if let Some(owner) = owner {
                request.add_pair(&owner.entity, &occ.entity);
            }
        }
        request
    }

    pub fn add_entity(&mut self, entity: &str) {
        if !self.entities.iter().any(|e| e == entity) {
            self.entities.push(entity.to_string());
        }
    }

    pub fn add_pair(&mut self, a: &str, b: &str) {
        if a != b {
            self.pairs.push((a.to_string(), b.to_string()));
        }
    }
}

/// Shortest of the first `k` simple paths that walks no dome.
pub fn dome_free_path(graph: &SchemaGraph, from: &str, to: &str, k: usize) -> Option<Vec<String>> {
    graph
        .shortest_simple_paths(from, to, k)
        .into_iter()
        .find(|p| graph.directed_steps(p).is_some_and(|steps| !has_dome(&steps)))
}

pub fn synthesize(
    schema: &SchemaIndex,
    request: &SpanRequest,
    max_candidate_paths: usize,
) -> Result<SchemaGraph, DisconnectedSchemaError> {
    let graph = schema.graph();
    let mut nodes: BTreeSet<String> = request.entities.iter().cloned().collect();

    for (a, b) in &request.pairs {
        match dome_free_path(graph, a, b, max_candidate_paths) {
            Some(path) => {
                debug!(from = %a, to = %b, len = path.len(), "retained schema path");
                nodes.extend(path);
            }
            None => warn!(from = %a, to = %b, "no dome-free schema path"),
        }
    }

    let sub = graph.induced(nodes.iter().map(String::as_str));
    if sub.is_weakly_connected() {
        return Ok(sub);
    }

    debug!("pruned paths leave the subgraph disconnected; retrying with pairwise shortest paths");
    let mut nodes: BTreeSet<String> = request.entities.iter().cloned().collect();
    for (i, a) in request.entities.iter().enumerate() {
        for b in &request.entities[i + 1..] {
            if let Some(path) = graph.shortest_path(a, b) {
                nodes.extend(path);
            }
        }
    }
    let sub = graph.induced(nodes.iter().map(String::as_str));
    if sub.is_weakly_connected() {
        return Ok(sub);
    }
    Err(DisconnectedSchemaError::Subgraph {
        entities: request.entities.clone(),
    })
}
