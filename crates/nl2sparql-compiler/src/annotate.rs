//! Path annotation: one triple group per occurrence neighbourhood edge.
//!
//! Class occurrences become `?id` variable nodes hanging off their class by a
//! `type` edge. Every neighbour of a class occurrence is then reached through
//! the query graph:
//!
//! - relationships: `subject -> relationship -> object`,
//! - data properties: `subject -> property` plus two scaffold triples that
//!   the cleaner folds into `subject schema:prop ?occ`,
//! - classes/individuals: a direct path through at least one relationship or
//!   property, unless an explicit relationship already links the pair.

use std::collections::BTreeSet;

use nl2sparql_ir::MalformedIrError;
use nl2sparql_schema::{has_dome, EdgeLabel, EntityKind, PathStep, SchemaGraph};
use tracing::{debug, warn};

use crate::error::{CompileError, DisconnectedSchemaError};
use crate::resolve::{ResolvedOccurrence, ResolvedQuery};
use crate::triples::{Predicate, Term, Triple, TripleGroup};

/// Query subgraph plus one `?occ --type--> Class` edge per class occurrence.
pub fn query_graph(subgraph: &SchemaGraph, resolved: &ResolvedQuery) -> SchemaGraph {
    let mut graph = subgraph.clone();
    for occ in resolved.occurrences() {
        if occ.kind == EntityKind::Class {
            graph.add_edge(&occ.node(), &occ.entity, EdgeLabel::Type);
        }
    }
    graph
}

/// Shortest dome-free path among the first `k`, as directed steps.
/// `through_property` additionally requires a `domain`/`range` step.
pub fn segment(
    graph: &SchemaGraph,
    from: &str,
    to: &str,
    k: usize,
    through_property: bool,
) -> Option<Vec<PathStep>> {
    graph
        .shortest_simple_paths(from, to, k)
        .iter()
        .filter_map(|p| graph.directed_steps(p))
        .filter(|steps| !has_dome(steps))
        .find(|steps| !through_property || steps.iter().any(|s| s.label.is_domain_or_range()))
}

struct Annotator<'a> {
    graph: SchemaGraph,
    resolved: &'a ResolvedQuery,
    max_paths: usize,
    groups: Vec<TripleGroup>,
    /// Occurrence pairs already linked by a relationship or implicit path.
    closed: BTreeSet<(String, String)>,
    /// Relationship occurrences already written out.
    consumed: BTreeSet<String>,
}

pub fn annotate(
    resolved: &ResolvedQuery,
    subgraph: &SchemaGraph,
    max_paths: usize,
) -> Result<Vec<TripleGroup>, CompileError> {
    let mut annotator = Annotator {
        graph: query_graph(subgraph, resolved),
        resolved,
        max_paths,
        groups: Vec::new(),
        closed: BTreeSet::new(),
        consumed: BTreeSet::new(),
    };
    for occ in resolved.occurrences() {
        if occ.kind == EntityKind::Class {
            annotator.occurrence(occ)?;
        }
    }
    debug!(groups = annotator.groups.len(), "annotated occurrence paths");
    Ok(annotator.groups)
}

impl<'a> Annotator<'a> {
    fn occurrence(&mut self, occ: &'a ResolvedOccurrence) -> Result<(), CompileError> {
        let resolved = self.resolved;
        self.groups.push(TripleGroup::declaration(&occ.id, &occ.entity));

        for name in &occ.neighbors {
            if resolved.is_literal(name) {
                continue;
            }
            let Some(neighbor) = resolved.get(name) else {
                return Err(MalformedIrError::Invalid(format!(
                    "occurrence `{}` lists unknown neighbour `{name}`",
                    occ.id
                ))
                .into());
            };
            match neighbor.kind {
                EntityKind::Relationship => self.relationship(occ, neighbor)?,
                EntityKind::DataProperty => self.property(occ, neighbor)?,
                EntityKind::Class | EntityKind::Individual => self.implicit(occ, neighbor),
            }
        }
        Ok(())
    }

    fn relationship(
        &mut self,
        occ: &ResolvedOccurrence,
        rel: &ResolvedOccurrence,
    ) -> Result<(), CompileError> {
        if self.consumed.contains(&rel.id) {
            return Ok(());
        }
        let subject = self.endpoint(rel, rel.subject.as_deref(), "subject")?;
        let object = self.endpoint(rel, rel.object.as_deref(), "object")?;
        let from_subject = subject.id == occ.id;
        let from_object = subject.kind == EntityKind::Individual && object.id == occ.id;
        if !from_subject && !from_object {
            return Ok(());
        }

        let mut head = self.require(&rel.id, &subject.node(), &rel.entity, false)?;
        let mut tail = self.require(&rel.id, &rel.entity, &object.node(), false)?;
        // Relationship whose domain and range are the same class: the schema
        // graph keeps one edge, so enter through domain and leave through range.
        if let (Some(last), Some(first)) = (head.last_mut(), tail.first_mut()) {
            if last.label == first.label {
                last.label = EdgeLabel::Domain;
                first.label = EdgeLabel::Range;
            }
        }

        let triples = head.iter().chain(&tail).map(Triple::from_step).collect();
        self.groups.push(TripleGroup::path(&occ.id, &rel.id, triples));
        self.consumed.insert(rel.id.clone());
        self.close(&subject.id, &object.id);
        Ok(())
    }

    fn endpoint(
        &self,
        rel: &ResolvedOccurrence,
        id: Option<&str>,
        role: &str,
    ) -> Result<&'a ResolvedOccurrence, MalformedIrError> {
        let id = id.ok_or_else(|| {
            MalformedIrError::Invalid(format!("relationship occurrence `{}` has no {role}", rel.id))
        })?;
        let resolved = self.resolved;
        resolved.get(id).ok_or_else(|| {
            MalformedIrError::Invalid(format!(
                "{role} `{id}` of relationship occurrence `{}` is not an occurrence",
                rel.id
            ))
        })
    }

    fn property(
        &mut self,
        occ: &ResolvedOccurrence,
        prop: &ResolvedOccurrence,
    ) -> Result<(), CompileError> {
        // A property without a subject belongs to the occurrence listing it.
        if prop.subject.as_deref().is_some_and(|s| s != occ.id) {
            return Ok(());
        }
        let steps = self.require(&prop.id, &occ.node(), &prop.entity, false)?;
        let mut triples: Vec<Triple> = steps.iter().map(Triple::from_step).collect();
        triples.push(Triple::new(
            Term::entity(&prop.entity),
            Predicate::Schema(EdgeLabel::Range),
            Term::Scaffold,
        ));
        triples.push(Triple::new(
            Term::var(&prop.id),
            Predicate::Schema(EdgeLabel::Type),
            Term::Scaffold,
        ));
        self.groups.push(TripleGroup::path(&occ.id, &prop.id, triples));
        Ok(())
    }

    fn implicit(&mut self, occ: &ResolvedOccurrence, other: &ResolvedOccurrence) {
        if self.is_closed(&occ.id, &other.id) || self.explicitly_related(occ, other) {
            return;
        }
        match segment(&self.graph, &occ.node(), &other.node(), self.max_paths, true) {
            Some(steps) => {
                let triples = steps.iter().map(Triple::from_step).collect();
                self.groups.push(TripleGroup::path(&occ.id, &other.id, triples));
                self.close(&occ.id, &other.id);
            }
            None => warn!(from = %occ.id, to = %other.id, "no path through a property between neighbours"),
        }
    }

    /// A relationship among `occ`'s neighbours links `occ` and `other`.
    fn explicitly_related(&self, occ: &ResolvedOccurrence, other: &ResolvedOccurrence) -> bool {
        occ.neighbors
            .iter()
            .filter_map(|n| self.resolved.get(n))
            .filter(|r| r.kind == EntityKind::Relationship)
            .any(|r| {
                let (s, o) = (r.subject.as_deref(), r.object.as_deref());
                let (a, b) = (Some(occ.id.as_str()), Some(other.id.as_str()));
                (s == a && o == b) || (s == b && o == a)
            })
    }

    fn require(
        &self,
        occurrence: &str,
        from: &str,
        to: &str,
        through_property: bool,
    ) -> Result<Vec<PathStep>, DisconnectedSchemaError> {
        segment(&self.graph, from, to, self.max_paths, through_property).ok_or_else(|| {
            DisconnectedSchemaError::Segment {
                occurrence: occurrence.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            }
        })
    }

    fn close(&mut self, a: &str, b: &str) {
        self.closed.insert((a.to_string(), b.to_string()));
        self.closed.insert((b.to_string(), a.to_string()));
    }

    fn is_closed(&self, a: &str, b: &str) -> bool {
        self.closed.contains(&(a.to_string(), b.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triples::GroupBody;
    use nl2sparql_schema::SchemaBuilder;

    fn render(groups: &[TripleGroup]) -> Vec<Vec<String>> {
        groups.iter().map(|g| g.render("schema")).collect()
    }

    #[test]
    fn segment_prefers_paths_through_properties() {
        let schema = SchemaBuilder::new()
            .class("Point")
            .class("Building")
            .sub_class_of("Point", "Building")
            .relationship("partOf", "Point", "Building")
            .build();
        let g = schema.graph();
        let direct = segment(g, "Point", "Building", 10, false).unwrap();
        assert_eq!(direct.len(), 1);
        let through = segment(g, "Point", "Building", 10, true).unwrap();
        assert_eq!(through.len(), 2);
        assert!(through.iter().any(|s| s.label == EdgeLabel::Domain));
    }

    #[test]
    fn reflexive_relationship_enters_by_domain_and_leaves_by_range() {
        use nl2sparql_ir::{Occurrence, QueryIr, RootWord};

        let schema = SchemaBuilder::new()
            .class("Building")
            .relationship("adjacentTo", "Building", "Building")
            .build();
        let ir = QueryIr {
            root_words: vec![
                RootWord::new("building", &["adjacentTo"]),
                RootWord::new("adjacentTo", &["building"]),
            ],
            occurrences: vec![
                Occurrence::new("building1", "building", &["adjacentTo1"]),
                Occurrence::new("building2", "building", &["adjacentTo1"]),
                Occurrence::new("adjacentTo1", "adjacentTo", &["building1", "building2"])
                    .with_subject("building1")
                    .with_object("building2"),
            ],
            ..QueryIr::default()
        };
        let mapping = crate::mapping::map_root_words(
            &ir,
            &schema,
            &crate::collaborators::NoSynonyms,
            &crate::collaborators::RejectUnmapped,
            &crate::collaborators::AcceptProposed,
            &crate::config::CompilerConfig::default(),
        )
        .unwrap();
        let resolved = ResolvedQuery::new(&ir, &mapping).unwrap();
        let groups = annotate(&resolved, schema.graph(), 10).unwrap();

        let rendered = render(&groups);
        assert_eq!(rendered[0], ["?building1 rdf:type schema:Building."]);
        assert_eq!(
            rendered[1],
            [
                "?building1 rdf:type schema:Building.",
                "schema:adjacentTo rdfs:domain schema:Building.",
                "schema:adjacentTo rdfs:range schema:Building.",
                "?building2 rdf:type schema:Building.",
            ]
        );
        // The relationship is consumed: building2 only gets its declaration.
        assert_eq!(groups.len(), 3);
        assert!(matches!(&groups[2].body, GroupBody::Triples(t) if t.len() == 1));
    }

    #[test]
    fn relationship_without_endpoints_is_malformed() {
        use nl2sparql_ir::{Occurrence, QueryIr, RootWord};

        let schema = SchemaBuilder::new()
            .class("Point")
            .class("Building")
            .relationship("partOf", "Point", "Building")
            .build();
        let ir = QueryIr {
            root_words: vec![
                RootWord::new("point", &["partOf"]),
                RootWord::new("partOf", &["point", "building"]),
                RootWord::new("building", &["partOf"]),
            ],
            occurrences: vec![
                Occurrence::new("point1", "point", &["partOf1"]),
                Occurrence::new("partOf1", "partOf", &["point1", "building1"]),
                Occurrence::new("building1", "building", &["partOf1"]),
            ],
            ..QueryIr::default()
        };
        let mapping = crate::mapping::map_root_words(
            &ir,
            &schema,
            &crate::collaborators::NoSynonyms,
            &crate::collaborators::RejectUnmapped,
            &crate::collaborators::AcceptProposed,
            &crate::config::CompilerConfig::default(),
        )
        .unwrap();
        let resolved = ResolvedQuery::new(&ir, &mapping).unwrap();
        let err = annotate(&resolved, schema.graph(), 10).unwrap_err();
        assert!(matches!(
            &err,
            CompileError::MalformedIr(MalformedIrError::Invalid(m)) if m.contains("`partOf1` has no subject")
        ));
    }
}
