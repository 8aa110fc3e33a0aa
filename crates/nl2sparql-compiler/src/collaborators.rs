//! Pluggable collaborators of the entity mapper.
//!
//! The compiler itself is deterministic and offline; anything that needs a
//! thesaurus or a human goes through these traits.

use std::collections::BTreeMap;

use nl2sparql_schema::SchemaIndex;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::mapping::MappedEntity;

/// Synonyms for a root word (thesaurus, embedding neighbours, a fixed table).
pub trait SynonymSource {
    fn synonyms_of(&self, word: &str) -> Result<Vec<String>, CollaboratorError>;
}

/// Maps words the automatic cascade could not resolve to schema entity
/// names. Words it leaves out stay unmapped.
pub trait ManualResolver {
    fn resolve_unmapped(
        &self,
        words: &[String],
        schema: &SchemaIndex,
    ) -> Result<BTreeMap<String, String>, CollaboratorError>;
}

/// Final say over the proposed mapping. Returns word -> entity name.
pub trait MappingConfirmer {
    fn confirm_mapping(
        &self,
        proposed: &BTreeMap<String, MappedEntity>,
    ) -> Result<BTreeMap<String, String>, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSynonyms;

impl SynonymSource for NoSynonyms {
    fn synonyms_of(&self, _word: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(Vec::new())
    }
}

/// Static synonym table, keyed by lowercase word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(text)?;
        let mut table = Self::new();
        for (word, synonyms) in raw {
            table = table.with(&word, &synonyms.iter().map(String::as_str).collect::<Vec<_>>());
        }
        Ok(table)
    }

    pub fn with(mut self, word: &str, synonyms: &[&str]) -> Self {
        let entry = self.entries.entry(word.to_lowercase()).or_default();
        for s in synonyms {
            if !entry.iter().any(|e| e == s) {
                entry.push(s.to_string());
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynonymSource for SynonymTable {
    fn synonyms_of(&self, word: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(self
            .entries
            .get(&word.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolver for non-interactive runs: nothing gets resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectUnmapped;

impl ManualResolver for RejectUnmapped {
    fn resolve_unmapped(
        &self,
        _words: &[String],
        _schema: &SchemaIndex,
    ) -> Result<BTreeMap<String, String>, CollaboratorError> {
        Ok(BTreeMap::new())
    }
}

/// Confirmer for non-interactive runs: the proposal stands.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptProposed;

impl MappingConfirmer for AcceptProposed {
    fn confirm_mapping(
        &self,
        proposed: &BTreeMap<String, MappedEntity>,
    ) -> Result<BTreeMap<String, String>, CollaboratorError> {
        Ok(proposed
            .iter()
            .map(|(word, entity)| (word.clone(), entity.name.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonym_table_is_case_insensitive_and_deduplicated() {
        let table = SynonymTable::new()
            .with("Year", &["builtYear", "constructionYear"])
            .with("year", &["builtYear"]);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.synonyms_of("YEAR").unwrap(),
            vec!["builtYear".to_string(), "constructionYear".to_string()]
        );
        assert!(table.synonyms_of("tower").unwrap().is_empty());
    }

    #[test]
    fn synonym_table_loads_json() {
        let table = SynonymTable::from_json(r#"{"Tower": ["Building"]}"#).expect("json");
        assert_eq!(table.synonyms_of("tower").unwrap(), vec!["Building".to_string()]);
    }
}
