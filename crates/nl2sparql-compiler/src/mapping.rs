//! Root word -> schema entity resolution.
//!
//! Tiers, first hit wins:
//!
//! 1. case-insensitive exact name match,
//! 2. exact match of a synonym,
//! 3. fuzzy match against the word, then against its synonyms.
//!
//! Words still unmapped that sit next to a string-valued data property turn
//! into string-literal filters on it. The rest go to the manual resolver, and
//! the whole table goes through the confirmer.

use std::collections::{BTreeMap, BTreeSet};

use nl2sparql_ir::QueryIr;
use nl2sparql_schema::{EntityKind, SchemaEntity, SchemaIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::{ManualResolver, MappingConfirmer, SynonymSource};
use crate::config::CompilerConfig;
use crate::error::{CompileError, UnmappableQueryError};
use crate::fuzzy::similarity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedEntity {
    pub name: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Synonym,
    Fuzzy,
    FuzzySynonym,
}

/// Confirmed mapping of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: BTreeMap<String, MappedEntity>,
    /// Unmapped word -> string-valued property it constrains.
    string_literals: BTreeMap<String, String>,
}

impl MappingTable {
    pub fn get(&self, word: &str) -> Option<&MappedEntity> {
        self.entries.get(word)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MappedEntity)> {
        self.entries.iter().map(|(w, e)| (w.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_string_literal(&self, word: &str) -> bool {
        self.string_literals.contains_key(word)
    }

    /// `(word, property)` pairs of string-literal words.
    pub fn string_literals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.string_literals
            .iter()
            .map(|(w, p)| (w.as_str(), p.as_str()))
    }
}

/// Automatic tiers of the cascade over one schema.
pub struct EntityMapper<'a> {
    schema: &'a SchemaIndex,
    synonyms: &'a dyn SynonymSource,
    config: &'a CompilerConfig,
    hidden: BTreeSet<String>,
}

impl<'a> EntityMapper<'a> {
    pub fn new(
        schema: &'a SchemaIndex,
        synonyms: &'a dyn SynonymSource,
        config: &'a CompilerConfig,
    ) -> Self {
        // Strict subclasses of the points class are not mappable.
        let hidden = config
            .points
            .as_ref()
            .map(|p| schema.descendants(&p.class))
            .unwrap_or_default();
        Self {
            schema,
            synonyms,
            config,
            hidden,
        }
    }

    fn candidates(&self) -> impl Iterator<Item = SchemaEntity<'a>> + '_ {
        self.schema
            .entities()
            .filter(move |e| !(e.kind == EntityKind::Class && self.hidden.contains(e.name)))
    }

    fn exact(&self, word: &str) -> Option<SchemaEntity<'a>> {
        let needle = word.to_lowercase();
        self.candidates().find(|e| e.name.to_lowercase() == needle)
    }

    /// Best entity scoring at least `threshold` against any of `needles`.
    /// Candidates come in kind-then-name order and only a strictly better
    /// score replaces the current best.
    fn fuzzy(&self, needles: &[String], threshold: f64) -> Option<SchemaEntity<'a>> {
        let mut best: Option<(f64, SchemaEntity<'a>)> = None;
        for entity in self.candidates() {
            let score = needles
                .iter()
                .map(|n| similarity(n, entity.name))
                .fold(0.0_f64, f64::max);
            if score < threshold {
                continue;
            }
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, entity));
            }
        }
        best.map(|(_, e)| e)
    }

    /// Run tiers 1-3 for one word.
    pub fn match_word(
        &self,
        word: &str,
    ) -> Result<Option<(MappedEntity, MatchTier)>, UnmappableQueryError> {
        let found = |e: SchemaEntity<'_>, tier| {
            Some((
                MappedEntity {
                    name: e.name.to_string(),
                    kind: e.kind,
                },
                tier,
            ))
        };

        if let Some(e) = self.exact(word) {
            return Ok(found(e, MatchTier::Exact));
        }

        let synonyms = self.synonyms.synonyms_of(word)?;
        if let Some(e) = synonyms.iter().find_map(|s| self.exact(s)) {
            return Ok(found(e, MatchTier::Synonym));
        }

        if let Some(e) = self.fuzzy(&[word.to_string()], self.config.direct_match_threshold) {
            return Ok(found(e, MatchTier::Fuzzy));
        }
        if !synonyms.is_empty() {
            if let Some(e) = self.fuzzy(&synonyms, self.config.synonym_match_threshold) {
                return Ok(found(e, MatchTier::FuzzySynonym));
            }
        }
        Ok(None)
    }
}

/// Build the confirmed mapping table for `ir`.
pub fn map_root_words(
    ir: &QueryIr,
    schema: &SchemaIndex,
    synonyms: &dyn SynonymSource,
    resolver: &dyn ManualResolver,
    confirmer: &dyn MappingConfirmer,
    config: &CompilerConfig,
) -> Result<MappingTable, CompileError> {
    let mapper = EntityMapper::new(schema, synonyms, config);
    let mut table = MappingTable::default();
    let mut unmapped: Vec<String> = Vec::new();

    for root in &ir.root_words {
        match mapper.match_word(&root.word)? {
            Some((entity, tier)) => {
                debug!(word = %root.word, entity = %entity.name, kind = %entity.kind, ?tier, "mapped root word");
                table.entries.insert(root.word.clone(), entity);
            }
            None => unmapped.push(root.word.clone()),
        }
    }

    let mut residual: Vec<String> = Vec::new();
    for word in unmapped {
        let property = ir.root_word(&word).and_then(|root| {
            root.neighbors.iter().find_map(|n| {
                let e = table.entries.get(n)?;
                (e.kind == EntityKind::DataProperty && schema.accepts_string_literal(&e.name))
                    .then(|| e.name.clone())
            })
        });
        match property {
            Some(p) => {
                debug!(%word, property = %p, "root word becomes a string literal");
                table.string_literals.insert(word, p);
            }
            None => residual.push(word),
        }
    }

    if !residual.is_empty() {
        let resolved = resolver
            .resolve_unmapped(&residual, schema)
            .map_err(UnmappableQueryError::from)?;
        for (word, name) in resolved {
            if !residual.contains(&word) {
                warn!(%word, "resolver answered for a word it was not asked about");
                continue;
            }
            let entity = known_entity(schema, &word, name)?;
            table.entries.insert(word, entity);
        }
    }

    let confirmed = confirmer
        .confirm_mapping(&table.entries)
        .map_err(UnmappableQueryError::from)?;
    let mut entries = BTreeMap::new();
    for (word, name) in confirmed {
        if ir.root_word(&word).is_none() {
            warn!(%word, "confirmer returned a word absent from L1");
            continue;
        }
        let entity = known_entity(schema, &word, name)?;
        entries.insert(word, entity);
    }
    table.entries = entries;

    let missing: Vec<String> = ir
        .root_words
        .iter()
        .map(|r| &r.word)
        .filter(|w| ir.occurrences_of(w).next().is_some())
        .filter(|w| !table.entries.contains_key(*w) && !table.is_string_literal(w))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(UnmappableQueryError::Unresolved { words: missing }.into());
    }
    Ok(table)
}

fn known_entity(
    schema: &SchemaIndex,
    word: &str,
    name: String,
) -> Result<MappedEntity, UnmappableQueryError> {
    match schema.kind_of(&name) {
        Some(kind) => Ok(MappedEntity { name, kind }),
        None => Err(UnmappableQueryError::UnknownEntity {
            word: word.to_string(),
            entity: name,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AcceptProposed, NoSynonyms, RejectUnmapped, SynonymTable};
    use crate::config::PointsConfig;
    use crate::error::CollaboratorError;
    use nl2sparql_ir::{Occurrence, RootWord};
    use nl2sparql_schema::SchemaBuilder;

    fn schema() -> SchemaIndex {
        SchemaBuilder::new()
            .class("Point")
            .class("Building")
            .sub_class_of("Church", "Building")
            .sub_class_of("GroundPoint", "Point")
            .relationship("partOf", "Point", "Building")
            .data_property("builtYear", "Building")
            .string_property("style", "Building")
            .individual("duomo", "Church")
            .build()
    }

    fn ir(words: &[(&str, &[&str])]) -> QueryIr {
        QueryIr {
            root_words: words.iter().map(|(w, n)| RootWord::new(*w, n)).collect(),
            occurrences: words
                .iter()
                .map(|(w, _)| Occurrence::new(format!("{w}1"), *w, &[]))
                .collect(),
            ..QueryIr::default()
        }
    }

    fn map(ir: &QueryIr, synonyms: &dyn SynonymSource) -> Result<MappingTable, CompileError> {
        map_root_words(
            ir,
            &schema(),
            synonyms,
            &RejectUnmapped,
            &AcceptProposed,
            &CompilerConfig::default(),
        )
    }

    #[test]
    fn cascade_tiers() {
        let schema = schema();
        let config = CompilerConfig::default();
        let table = SynonymTable::new().with("year", &["builtYear"]).with("cathedral", &["churchs"]);
        let mapper = EntityMapper::new(&schema, &table, &config);

        let (e, tier) = mapper.match_word("BUILDING").unwrap().unwrap();
        assert_eq!((e.name.as_str(), tier), ("Building", MatchTier::Exact));

        let (e, tier) = mapper.match_word("year").unwrap().unwrap();
        assert_eq!((e.name.as_str(), tier), ("builtYear", MatchTier::Synonym));

        let (e, tier) = mapper.match_word("buildings").unwrap().unwrap();
        assert_eq!((e.name.as_str(), tier), ("Building", MatchTier::Fuzzy));

        let (e, tier) = mapper.match_word("cathedral").unwrap().unwrap();
        assert_eq!((e.name.as_str(), tier), ("Church", MatchTier::FuzzySynonym));

        assert!(mapper.match_word("weather").unwrap().is_none());
    }

    #[test]
    fn points_subclasses_are_hidden() {
        let schema = schema();
        let config = CompilerConfig {
            points: Some(PointsConfig {
                class: "Point".into(),
                coordinates: vec![],
            }),
            ..CompilerConfig::default()
        };
        let mapper = EntityMapper::new(&schema, &NoSynonyms, &config);
        assert!(mapper.match_word("groundpoint").unwrap().is_none());
        let (e, _) = mapper.match_word("point").unwrap().unwrap();
        assert_eq!(e.name, "Point");

        let default_config = CompilerConfig::default();
        let visible = EntityMapper::new(&schema, &NoSynonyms, &default_config);
        let (e, _) = visible.match_word("groundpoint").unwrap().unwrap();
        assert_eq!(e.name, "GroundPoint");
    }

    #[test]
    fn string_literal_words_need_no_entity() {
        let ir = ir(&[("building", &["style"]), ("style", &["gothic"]), ("gothic", &["style"])]);
        let table = map(&ir, &NoSynonyms).expect("mapping");
        assert_eq!(table.get("style").map(|e| e.kind), Some(EntityKind::DataProperty));
        assert_eq!(table.string_literals().collect::<Vec<_>>(), vec![("gothic", "style")]);
    }

    #[test]
    fn unresolved_words_with_occurrences_fail() {
        let ir = ir(&[("building", &[]), ("weather", &[])]);
        let err = map(&ir, &NoSynonyms).unwrap_err();
        assert_eq!(
            err,
            CompileError::Unmappable(UnmappableQueryError::Unresolved {
                words: vec!["weather".into()]
            })
        );
    }

    struct Fixed(&'static str, &'static str);

    impl ManualResolver for Fixed {
        fn resolve_unmapped(
            &self,
            _words: &[String],
            _schema: &SchemaIndex,
        ) -> Result<BTreeMap<String, String>, CollaboratorError> {
            Ok(BTreeMap::from([(self.0.to_string(), self.1.to_string())]))
        }
    }

    #[test]
    fn resolver_answers_are_checked_against_schema() {
        let ir = ir(&[("weather", &[])]);
        let ok = map_root_words(
            &ir,
            &schema(),
            &NoSynonyms,
            &Fixed("weather", "Building"),
            &AcceptProposed,
            &CompilerConfig::default(),
        )
        .expect("resolved");
        assert_eq!(ok.get("weather").map(|e| e.name.as_str()), Some("Building"));

        let err = map_root_words(
            &ir,
            &schema(),
            &NoSynonyms,
            &Fixed("weather", "Climate"),
            &AcceptProposed,
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unmappable(UnmappableQueryError::UnknownEntity { .. })
        ));
    }
}
