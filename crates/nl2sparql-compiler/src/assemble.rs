//! Final query text.

use std::collections::BTreeSet;
use std::fmt;

use nl2sparql_ir::{Projection, ProjectionItem};
use nl2sparql_schema::EntityKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::FilterSet;
use crate::resolve::ResolvedQuery;
use crate::triples::{variables_in, GroupBody, GroupTarget, TripleGroup};

const RDF_PREFIX: &str = "PREFIX rdf:<http://www.w3.org/1999/02/22-rdf-syntax-ns#>";
const RDFS_PREFIX: &str = "PREFIX rdfs:<http://www.w3.org/2000/01/rdf-schema#>";

/// A SPARQL 1.1 query, one entry per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub lines: Vec<String>,
}

impl CompiledQuery {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}

/// Everything the assembler needs besides the body.
pub struct QueryHead<'a> {
    pub prefix: &'a str,
    pub namespace: &'a str,
    pub graph_uri: &'a str,
}

/// Projection items plus the coordinate occurrences of projected points.
pub fn effective_projection(projection: &Projection, resolved: &ResolvedQuery) -> Vec<ProjectionItem> {
    let mut items = projection.items.clone();
    for item in &projection.items {
        for occ in resolved
            .occurrences()
            .iter()
            .filter(|o| o.synthetic && o.subject.as_deref() == Some(item.variable.as_str()))
        {
            if !items.iter().any(|i| i.variable == occ.id) {
                items.push(ProjectionItem::variable(occ.id.clone()));
            }
        }
    }
    items
}

fn projection_term(item: &ProjectionItem) -> String {
    let v = &item.variable;
    match (&item.aggregate, &item.group_by) {
        (Some(f), Some(_)) => format!("({f}(?{v}) AS ?grouped_{v})"),
        (Some(f), None) => format!("({f}(?{v}) AS ?overall_{v})"),
        (None, _) => format!("?{v}"),
    }
}

/// Drop data-property path groups whose value variable nothing else uses.
pub fn prune_unreferenced(
    groups: Vec<TripleGroup>,
    items: &[ProjectionItem],
    filters: &FilterSet,
    resolved: &ResolvedQuery,
) -> Vec<TripleGroup> {
    let mut outside: BTreeSet<String> = BTreeSet::new();
    for item in items {
        outside.insert(item.variable.clone());
        outside.extend(item.group_by.iter().cloned());
    }
    for f in &filters.filters {
        outside.extend(f.variables());
    }
    outside.extend(filters.grouping.group_by.iter().cloned());
    for text in filters.grouping.having.iter().chain(&filters.ordering.keys) {
        outside.extend(variables_in(text));
    }

    let prunable = |g: &TripleGroup| match (&g.target, &g.body) {
        (GroupTarget::Occurrence(id), GroupBody::Triples(_)) => {
            resolved.kind_of(id) == Some(EntityKind::DataProperty)
        }
        _ => false,
    };
    let keep: Vec<bool> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let GroupTarget::Occurrence(id) = &g.target else {
                return true;
            };
            if !prunable(g) || outside.contains(id) {
                return true;
            }
            groups
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && !prunable(other) && other.variables().contains(id))
        })
        .collect();

    groups
        .into_iter()
        .zip(keep)
        .filter_map(|(g, keep)| {
            if !keep {
                debug!(target = ?g.target, "pruning unreferenced property group");
            }
            keep.then_some(g)
        })
        .collect()
}

pub fn assemble(
    head: &QueryHead<'_>,
    projection: &Projection,
    items: &[ProjectionItem],
    groups: &[TripleGroup],
    filters: &FilterSet,
) -> CompiledQuery {
    let mut lines = vec![
        RDF_PREFIX.to_string(),
        RDFS_PREFIX.to_string(),
        format!("PREFIX {}:<{}>", head.prefix, head.namespace),
    ];

    let mut select = format!("{} DISTINCT", projection.verb.trim().to_uppercase());
    if items.is_empty() {
        select.push_str(" *");
    }
    for item in items {
        select.push(' ');
        select.push_str(&projection_term(item));
    }
    lines.push(select);
    lines.push(format!("FROM <{}>", head.graph_uri));
    lines.push("WHERE {".to_string());

    // Top-level triples appear once; operator blocks are their own scope and
    // keep every line.
    let mut seen = BTreeSet::new();
    for group in groups {
        let scoped = matches!(group.body, GroupBody::Block(_));
        for line in group.render(head.prefix) {
            if scoped || seen.insert(line.clone()) {
                lines.push(line);
            }
        }
    }
    for f in &filters.filters {
        lines.push(format!("FILTER ({})", f.expression));
    }
    lines.push("}".to_string());

    let mut grouping = filters.grouping.clone();
    if grouping.group_by.is_empty() {
        for item in items.iter().filter(|i| i.aggregate.is_some()) {
            if let Some(var) = &item.group_by {
                grouping.group_by(var);
            }
        }
    }
    lines.extend(grouping.lines());
    lines.extend(filters.ordering.lines());

    CompiledQuery { lines }
}
