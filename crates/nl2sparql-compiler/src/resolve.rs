//! Occurrences with their mapped schema entity attached.

use std::collections::BTreeMap;

use nl2sparql_ir::QueryIr;
use nl2sparql_schema::{EntityKind, SchemaIndex};
use tracing::{debug, warn};

use crate::config::PointsConfig;
use crate::error::{CompileError, UnmappableQueryError};
use crate::mapping::MappingTable;
use crate::triples::Term;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOccurrence {
    pub id: String,
    pub root_word: String,
    pub entity: String,
    pub kind: EntityKind,
    pub neighbors: Vec<String>,
    pub subject: Option<String>,
    pub object: Option<String>,
    /// Added by the compiler rather than the parser.
    pub synthetic: bool,
}

impl ResolvedOccurrence {
    /// Node standing for this occurrence in the query graph: the individual
    /// itself, or the `?id` variable.
    pub fn node(&self) -> String {
        match self.kind {
            EntityKind::Individual => self.entity.clone(),
            _ => format!("?{}", self.id),
        }
    }

    pub fn term(&self) -> Term {
        Term::from_node(&self.node())
    }
}

/// `L2` after mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedQuery {
    occurrences: Vec<ResolvedOccurrence>,
    /// Occurrence id -> string-literal word it mentions.
    literal_occurrences: BTreeMap<String, String>,
    /// String-literal word -> property it constrains.
    literal_words: BTreeMap<String, String>,
}

impl ResolvedQuery {
    pub fn new(ir: &QueryIr, mapping: &MappingTable) -> Result<Self, CompileError> {
        let mut out = Self::default();
        for (word, property) in mapping.string_literals() {
            out.literal_words.insert(word.to_string(), property.to_string());
        }
        for occ in &ir.occurrences {
            if mapping.is_string_literal(&occ.root_word) {
                out.literal_occurrences
                    .insert(occ.id.clone(), occ.root_word.clone());
                continue;
            }
            let entity = mapping.get(&occ.root_word).ok_or_else(|| {
                UnmappableQueryError::Unresolved {
                    words: vec![occ.root_word.clone()],
                }
            })?;
            out.occurrences.push(ResolvedOccurrence {
                id: occ.id.clone(),
                root_word: occ.root_word.clone(),
                entity: entity.name.clone(),
                kind: entity.kind,
                neighbors: occ.neighbors.clone(),
                subject: occ.subject.clone(),
                object: occ.object.clone(),
                synthetic: false,
            });
        }
        Ok(out)
    }

    pub fn occurrences(&self) -> &[ResolvedOccurrence] {
        &self.occurrences
    }

    pub fn get(&self, id: &str) -> Option<&ResolvedOccurrence> {
        self.occurrences.iter().find(|o| o.id == id)
    }

    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.get(id).map(|o| o.kind)
    }

    /// Whether `name` is a string-literal word or one of its occurrences.
    pub fn is_literal(&self, name: &str) -> bool {
        self.literal_occurrences.contains_key(name) || self.literal_words.contains_key(name)
    }

    /// `(word, property)` of every string-literal word.
    pub fn literal_words(&self) -> impl Iterator<Item = (&str, &str)> {
        self.literal_words
            .iter()
            .map(|(w, p)| (w.as_str(), p.as_str()))
    }

    /// Names (the word and its occurrence ids) that stand for `word`.
    pub fn literal_names<'a>(&'a self, word: &'a str) -> impl Iterator<Item = &'a str> {
        std::iter::once(word).chain(
            self.literal_occurrences
                .iter()
                .filter(move |(_, w)| w.as_str() == word)
                .map(|(id, _)| id.as_str()),
        )
    }

    /// Give every points-class occurrence without a coordinate neighbour one
    /// synthetic occurrence per coordinate property.
    pub fn with_point_coordinates(mut self, schema: &SchemaIndex, points: &PointsConfig) -> Self {
        let coordinates: Vec<&String> = points
            .coordinates
            .iter()
            .filter(|c| {
                let known = schema.kind_of(c) == Some(EntityKind::DataProperty);
                if !known {
                    warn!(coordinate = %c, "coordinate property is not a data property of the schema");
                }
                known
            })
            .collect();
        if coordinates.is_empty() {
            return self;
        }
        let point_classes = {
            let mut set = schema.descendants(&points.class);
            set.insert(points.class.clone());
            set
        };

        let mut added: Vec<ResolvedOccurrence> = Vec::new();
        for i in 0..self.occurrences.len() {
            let occ = &self.occurrences[i];
            if occ.kind != EntityKind::Class || !point_classes.contains(&occ.entity) {
                continue;
            }
            let has_coordinate = occ.neighbors.iter().any(|n| {
                self.get(n)
                    .is_some_and(|o| coordinates.iter().any(|c| **c == o.entity))
            });
            if has_coordinate {
                continue;
            }

            let owner = occ.id.clone();
            let mut ids = Vec::new();
            for coordinate in &coordinates {
                let id = self.fresh_id(&coordinate.to_lowercase(), &added);
                debug!(occurrence = %owner, %id, "adding coordinate occurrence");
                added.push(ResolvedOccurrence {
                    id: id.clone(),
                    root_word: coordinate.to_string(),
                    entity: coordinate.to_string(),
                    kind: EntityKind::DataProperty,
                    neighbors: vec![owner.clone()],
                    subject: Some(owner.clone()),
                    object: None,
                    synthetic: true,
                });
                ids.push(id);
            }
            self.occurrences[i].neighbors.extend(ids);
        }
        self.occurrences.extend(added);
        self
    }

    fn fresh_id(&self, stem: &str, pending: &[ResolvedOccurrence]) -> String {
        let taken = |id: &str| {
            self.get(id).is_some()
                || self.literal_occurrences.contains_key(id)
                || pending.iter().any(|o| o.id == id)
        };
        let mut n = 1;
        loop {
            let id = format!("{stem}{n}");
            if !taken(&id) {
                return id;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AcceptProposed, NoSynonyms, RejectUnmapped};
    use crate::config::CompilerConfig;
    use crate::mapping::map_root_words;
    use nl2sparql_ir::{Occurrence, RootWord};
    use nl2sparql_schema::SchemaBuilder;

    #[test]
    fn points_get_missing_coordinates() {
        let schema = SchemaBuilder::new()
            .class("Point")
            .sub_class_of("RoofPoint", "Point")
            .data_property("X", "Point")
            .data_property("Y", "Point")
            .build();
        let ir = QueryIr {
            root_words: vec![RootWord::new("point", &["x"]), RootWord::new("x", &["point"])],
            occurrences: vec![
                Occurrence::new("point1", "point", &["x1"]),
                Occurrence::new("point2", "point", &[]),
                Occurrence::new("x1", "x", &["point1"]).with_subject("point1"),
            ],
            ..QueryIr::default()
        };
        let mapping = map_root_words(
            &ir,
            &schema,
            &NoSynonyms,
            &RejectUnmapped,
            &AcceptProposed,
            &CompilerConfig::default(),
        )
        .expect("mapping");
        let points = PointsConfig {
            class: "Point".into(),
            coordinates: vec!["X".into(), "Y".into(), "Z".into()],
        };
        let resolved = ResolvedQuery::new(&ir, &mapping)
            .expect("resolved")
            .with_point_coordinates(&schema, &points);

        // point1 already has a coordinate; point2 gets X and Y (Z is unknown).
        assert_eq!(resolved.get("point1").map(|o| o.neighbors.len()), Some(1));
        let point2 = resolved.get("point2").expect("point2");
        assert_eq!(point2.neighbors, ["x2", "y1"]);
        let x2 = resolved.get("x2").expect("synthetic");
        assert!(x2.synthetic);
        assert_eq!(x2.subject.as_deref(), Some("point2"));
        assert_eq!(x2.entity, "X");
    }
}
