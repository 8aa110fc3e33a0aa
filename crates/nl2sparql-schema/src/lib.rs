//! Ontology schema index.
//!
//! Loads an RDF/OWL schema (RDF/XML, Turtle or N-Triples, via Sophia) into:
//!
//! - sorted name lists per entity kind (classes, data properties,
//!   relationships, individuals), and
//! - a [`SchemaGraph`] whose edges are the `subClassOf`, `subPropertyOf`,
//!   `domain`, `range` and `type` statements between non-standard IRIs.
//!
//! The index is read-only after loading and can be shared across concurrent
//! compilations.

pub mod graph;
pub mod rdf;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use graph::{has_dome, EdgeLabel, PathStep, SchemaGraph, StepDirection};
pub use rdf::RdfFormat;

use rdf::{
    is_standard_namespace, local_name, namespace_of, RdfObject, Statement, OWL_NS, RDFS_NS, RDF_NS,
    XSD_NS,
};

#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("failed to read schema: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported RDF format: .{0}")]
    UnsupportedFormat(String),
    #[error("failed to parse {format}: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Kind of a schema entity. The declaration order is the order in which
/// entity lists are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Class,
    DataProperty,
    Relationship,
    Individual,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Class,
        EntityKind::DataProperty,
        EntityKind::Relationship,
        EntityKind::Individual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::DataProperty => "data_property",
            EntityKind::Relationship => "relationship",
            EntityKind::Individual => "individual",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaEntity<'a> {
    pub name: &'a str,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
    classes: Vec<String>,
    data_properties: Vec<String>,
    relationships: Vec<String>,
    individuals: Vec<String>,
    string_properties: BTreeSet<String>,
    namespace: Option<String>,
    graph: SchemaGraph,
}

impl SchemaIndex {
    /// Load a schema file; the format follows the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaLoadError> {
        let path = path.as_ref();
        let format = RdfFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        let index = Self::from_rdf(&bytes, format)?;
        debug!(
            path = %path.display(),
            classes = index.classes.len(),
            data_properties = index.data_properties.len(),
            relationships = index.relationships.len(),
            individuals = index.individuals.len(),
            edges = index.graph.edge_count(),
            "loaded ontology schema"
        );
        Ok(index)
    }

    pub fn from_rdf(bytes: &[u8], format: RdfFormat) -> Result<Self, SchemaLoadError> {
        let statements = rdf::parse_statements(bytes, format)?;
        Ok(Self::from_statements(&statements))
    }

    fn from_statements(statements: &[Statement]) -> Self {
        let rdf_type = format!("{RDF_NS}type");
        let mut builder = SchemaBuilder::new();
        let mut typed: Vec<(&str, &str)> = Vec::new();
        let mut first_class_iri: Option<&str> = None;

        for stmt in statements {
            let RdfObject::Iri(object) = &stmt.object else {
                continue;
            };
            let subject = local_name(&stmt.subject);

            if stmt.predicate == rdf_type && !is_standard_namespace(&stmt.subject) {
                match declared_kind(object) {
                    Some(kind) => {
                        if kind == EntityKind::Class {
                            first_class_iri.get_or_insert(stmt.subject.as_str());
                        }
                        builder.declare(subject, kind);
                    }
                    None if !is_standard_namespace(object) => typed.push((subject, local_name(object))),
                    None => {}
                }
            }

            if stmt.predicate == format!("{RDFS_NS}range")
                && (object == &format!("{XSD_NS}string") || object == &format!("{RDFS_NS}Literal"))
            {
                builder.index.string_properties.insert(subject.to_string());
            }

            let Some(label) = edge_label_for(&stmt.predicate) else {
                continue;
            };
            if is_standard_namespace(&stmt.subject) || is_standard_namespace(object) {
                continue;
            }
            builder.index.graph.add_edge(subject, local_name(object), label);
        }

        // Resources typed by a declared class are individuals even without
        // an explicit owl:NamedIndividual declaration.
        for (subject, class) in typed {
            if builder.index.classes.iter().any(|c| c == class) {
                builder.declare(subject, EntityKind::Individual);
            }
        }

        builder.index.namespace = first_class_iri.map(|iri| namespace_of(iri).to_string());
        builder.build()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn data_properties(&self) -> &[String] {
        &self.data_properties
    }

    pub fn relationships(&self) -> &[String] {
        &self.relationships
    }

    pub fn individuals(&self) -> &[String] {
        &self.individuals
    }

    pub fn names_of(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Class => &self.classes,
            EntityKind::DataProperty => &self.data_properties,
            EntityKind::Relationship => &self.relationships,
            EntityKind::Individual => &self.individuals,
        }
    }

    /// Every entity, classes first, then data properties, relationships and
    /// individuals; names sorted within a kind.
    pub fn entities(&self) -> impl Iterator<Item = SchemaEntity<'_>> {
        EntityKind::ALL.into_iter().flat_map(move |kind| {
            self.names_of(kind).iter().map(move |name| SchemaEntity {
                name: name.as_str(),
                kind,
            })
        })
    }

    /// First kind (in search order) that declares `name`.
    pub fn kind_of(&self, name: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| self.names_of(*kind).binary_search_by(|n| n.as_str().cmp(name)).is_ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Whether a data property's declared range admits string literals.
    pub fn accepts_string_literal(&self, property: &str) -> bool {
        self.string_properties.contains(property)
    }

    /// Namespace of the first declared class, when loaded from RDF.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    /// Strict subclasses of `class`, transitively.
    pub fn descendants(&self, class: &str) -> BTreeSet<String> {
        self.graph.descendants(class)
    }
}

fn declared_kind(type_iri: &str) -> Option<EntityKind> {
    if type_iri == format!("{RDFS_NS}Class") {
        return Some(EntityKind::Class);
    }
    match type_iri.strip_prefix(OWL_NS)? {
        "Class" => Some(EntityKind::Class),
        "DatatypeProperty" => Some(EntityKind::DataProperty),
        "ObjectProperty" => Some(EntityKind::Relationship),
        "NamedIndividual" => Some(EntityKind::Individual),
        _ => None,
    }
}

fn edge_label_for(predicate: &str) -> Option<EdgeLabel> {
    if let Some(local) = predicate.strip_prefix(RDFS_NS) {
        return match local {
            "subClassOf" => Some(EdgeLabel::SubClassOf),
            "subPropertyOf" => Some(EdgeLabel::SubPropertyOf),
            "domain" => Some(EdgeLabel::Domain),
            "range" => Some(EdgeLabel::Range),
            _ => None,
        };
    }
    (predicate == format!("{RDF_NS}type")).then_some(EdgeLabel::Type)
}

/// Programmatic schema construction.
///
/// ```
/// use nl2sparql_schema::{EntityKind, SchemaBuilder};
///
/// let schema = SchemaBuilder::new()
///     .class("Point")
///     .class("Building")
///     .relationship("partOf", "Point", "Building")
///     .data_property("builtYear", "Building")
///     .build();
/// assert_eq!(schema.kind_of("partOf"), Some(EntityKind::Relationship));
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    index: SchemaIndex,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(&mut self, name: &str, kind: EntityKind) {
        let list = match kind {
            EntityKind::Class => &mut self.index.classes,
            EntityKind::DataProperty => &mut self.index.data_properties,
            EntityKind::Relationship => &mut self.index.relationships,
            EntityKind::Individual => &mut self.index.individuals,
        };
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
        self.index.graph.add_node(name);
    }

    pub fn class(mut self, name: &str) -> Self {
        self.declare(name, EntityKind::Class);
        self
    }

    pub fn sub_class_of(mut self, child: &str, parent: &str) -> Self {
        self.declare(child, EntityKind::Class);
        self.declare(parent, EntityKind::Class);
        self.index.graph.add_edge(child, parent, EdgeLabel::SubClassOf);
        self
    }

    /// Object property `domain --name--> range`.
    pub fn relationship(mut self, name: &str, domain: &str, range: &str) -> Self {
        self.declare(name, EntityKind::Relationship);
        self.index.graph.add_edge(name, domain, EdgeLabel::Domain);
        self.index.graph.add_edge(name, range, EdgeLabel::Range);
        self
    }

    pub fn sub_property_of(mut self, child: &str, parent: &str) -> Self {
        self.index.graph.add_edge(child, parent, EdgeLabel::SubPropertyOf);
        self
    }

    /// Non-string data property on `domain`.
    pub fn data_property(mut self, name: &str, domain: &str) -> Self {
        self.declare(name, EntityKind::DataProperty);
        self.index.graph.add_edge(name, domain, EdgeLabel::Domain);
        self
    }

    /// Data property on `domain` whose range is `xsd:string`.
    pub fn string_property(self, name: &str, domain: &str) -> Self {
        let mut this = self.data_property(name, domain);
        this.index.string_properties.insert(name.to_string());
        this
    }

    pub fn individual(mut self, name: &str, class: &str) -> Self {
        self.declare(name, EntityKind::Individual);
        self.index.graph.add_edge(name, class, EdgeLabel::Type);
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.index.namespace = Some(namespace.to_string());
        self
    }

    pub fn build(mut self) -> SchemaIndex {
        for kind in EntityKind::ALL {
            let list = match kind {
                EntityKind::Class => &mut self.index.classes,
                EntityKind::DataProperty => &mut self.index.data_properties,
                EntityKind::Relationship => &mut self.index.relationships,
                EntityKind::Individual => &mut self.index.individuals,
            };
            list.sort();
            list.dedup();
        }
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONTOLOGY: &str = r#"
@prefix : <http://example.org/urban#> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

:Points a owl:Class .
:Building a owl:Class .
:Church a owl:Class ; rdfs:subClassOf :Building .
:partOf a owl:ObjectProperty ; rdfs:domain :Points ; rdfs:range :Building .
:builtYear a owl:DatatypeProperty ; rdfs:domain :Building ; rdfs:range xsd:integer .
:style a owl:DatatypeProperty ; rdfs:domain :Building ; rdfs:range xsd:string .
:duomo a :Church .
"#;

    #[test]
    fn indexes_turtle_schema() {
        let schema = SchemaIndex::from_rdf(ONTOLOGY.as_bytes(), RdfFormat::Turtle).expect("load");
        assert_eq!(schema.classes(), ["Building", "Church", "Points"]);
        assert_eq!(schema.data_properties(), ["builtYear", "style"]);
        assert_eq!(schema.relationships(), ["partOf"]);
        assert_eq!(schema.individuals(), ["duomo"]);
        assert_eq!(schema.namespace(), Some("http://example.org/urban#"));

        assert!(schema.accepts_string_literal("style"));
        assert!(!schema.accepts_string_literal("builtYear"));

        let g = schema.graph();
        assert_eq!(g.edge_label("partOf", "Points"), Some(EdgeLabel::Domain));
        assert_eq!(g.edge_label("duomo", "Church"), Some(EdgeLabel::Type));
        // Standard-namespace objects stay off the graph.
        assert!(!g.contains("Class"));
        assert!(!g.contains("integer"));
    }

    #[test]
    fn entities_follow_kind_order() {
        let schema = SchemaBuilder::new()
            .class("Point")
            .relationship("partOf", "Point", "Building")
            .class("Building")
            .data_property("builtYear", "Building")
            .individual("rome", "City")
            .build();
        let kinds: Vec<EntityKind> = schema.entities().map(|e| e.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(schema.kind_of("Building"), Some(EntityKind::Class));
        assert_eq!(schema.kind_of("rome"), Some(EntityKind::Individual));
        assert_eq!(schema.kind_of("nothing"), None);
    }

    #[test]
    fn descendants_of_class() {
        let schema = SchemaBuilder::new()
            .sub_class_of("Church", "Building")
            .sub_class_of("Chapel", "Church")
            .build();
        let d: Vec<String> = schema.descendants("Building").into_iter().collect();
        assert_eq!(d, ["Chapel", "Church"]);
    }
}
