//! Question parsing.
//!
//! A [`QueryParser`] turns a natural-language question into the five IR
//! lists. [`ChatQueryParser`] asks a fine-tuned chat model for the list
//! literals; [`StaticParser`] replays a fixed answer for tests and offline
//! runs.

#[cfg(feature = "openai")]
pub mod chat;

use async_trait::async_trait;
use nl2sparql_ir::{parse_ir_lists, MalformedIrError, QueryIr};
use nl2sparql_schema::{EntityKind, SchemaIndex};

#[cfg(feature = "openai")]
pub use chat::{ChatQueryParser, LlmConfig};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingEnv(&'static str),
    #[error("http error: {0}")]
    Http(String),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response has no message content")]
    EmptyResponse,
    #[error("model output is not valid IR: {0}")]
    Malformed(#[from] MalformedIrError),
}

/// Natural-language question -> [`QueryIr`].
#[async_trait]
pub trait QueryParser: Send + Sync {
    async fn parse_query(&self, question: &str) -> Result<QueryIr, LlmError>;
}

/// Parser that answers every question with the same list literals.
#[derive(Debug, Clone)]
pub struct StaticParser {
    lists: String,
}

impl StaticParser {
    pub fn new(lists: impl Into<String>) -> Self {
        Self {
            lists: lists.into(),
        }
    }
}

#[async_trait]
impl QueryParser for StaticParser {
    async fn parse_query(&self, _question: &str) -> Result<QueryIr, LlmError> {
        Ok(parse_ir_lists(&self.lists)?)
    }
}

const BASE_PROMPT: &str = "You will receive a natural language query by the user. \
You just have to parse it. Do not say anything else.";

/// System prompt, optionally carrying the annotated word list.
pub fn system_prompt(wordlist: Option<&str>) -> String {
    match wordlist {
        None => BASE_PROMPT.to_string(),
        Some(words) => format!(
            "{BASE_PROMPT} Also, a list of words in a word-type format follows, delimited by XML tags. \
Use it for two tasks: (1) if a multi-word expression of the query is in the list (or something \
very similar is), treat it as a single word, otherwise treat its parts as different expressions; \
(2) if you are unsure whether a word is a noun, property or relationship, check it in the list. \
<LIST> {words} </LIST>"
        ),
    }
}

fn word_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Class | EntityKind::Individual => "noun",
        EntityKind::DataProperty => "property",
        EntityKind::Relationship => "relationship",
    }
}

/// Multi-word schema names with their word type: `main_entrance-noun, `.
pub fn annotated_wordlist(schema: &SchemaIndex) -> String {
    let mut out = String::new();
    for kind in EntityKind::ALL {
        for name in schema.names_of(kind) {
            if name.contains(['_', ' ', '-']) {
                out.push_str(&format!("{name}-{}, ", word_type(kind)));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl2sparql_schema::SchemaBuilder;

    #[test]
    fn wordlist_keeps_only_multi_word_names() {
        let schema = SchemaBuilder::new()
            .class("Building")
            .class("bell_tower")
            .data_property("built-year", "Building")
            .relationship("part_of", "bell_tower", "Building")
            .individual("san_marco", "Building")
            .build();
        assert_eq!(
            annotated_wordlist(&schema),
            "bell_tower-noun, built-year-property, part_of-relationship, san_marco-noun, "
        );
    }

    #[test]
    fn prompt_embeds_wordlist() {
        assert!(!system_prompt(None).contains("<LIST>"));
        let prompt = system_prompt(Some("bell_tower-noun, "));
        assert!(prompt.ends_with("<LIST> bell_tower-noun,  </LIST>"));
    }

    #[tokio::test]
    async fn static_parser_parses_its_lists() {
        let parser = StaticParser::new(
            r#"L1 = [["point", []]]
L2 = [["point1", "point", [], []]]
L3 = []
L4 = []
L5 = ["SELECT", [["point1"], [], [], []]]"#,
        );
        let ir = parser.parse_query("all points").await.expect("parsed");
        assert_eq!(ir.occurrences.len(), 1);
        assert_eq!(ir.projection.items[0].variable, "point1");
    }

    #[tokio::test]
    async fn static_parser_reports_malformed_lists() {
        let parser = StaticParser::new("L1 = [");
        assert!(matches!(
            parser.parse_query("?").await,
            Err(LlmError::Malformed(_))
        ));
    }
}
