//! Intermediate representation (IR) of a parsed natural-language question.
//!
//! The upstream semantic parser (usually an LLM) emits five lists:
//!
//! - `L1` root words and their semantic neighbours,
//! - `L2` occurrences of root words (with subject/object for relationships),
//! - `L3` logical operators (`NOT` / `OR`) over occurrences, conditions and
//!   other operators,
//! - `L4` filter rows (comparisons, aggregates, superlatives),
//! - `L5` the projection.
//!
//! The positional lists are turned into typed rows here. Two surface formats
//! are accepted:
//!
//! - JSON (the serde form of [`QueryIr`]), and
//! - the `L1 = [...]` list-literal text the parser actually prints
//!   (see [`lists::parse_ir_lists`]).

pub mod lists;
pub mod repair;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use lists::parse_ir_lists;
pub use repair::{operand_identifiers, repair, validate};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedIrError {
    #[error("syntax error in IR lists near `{near}`")]
    Syntax { near: String },
    #[error("missing list L{0}")]
    MissingList(u8),
    #[error("L{list} row {row}: {message}")]
    Row {
        list: u8,
        row: usize,
        message: String,
    },
    #[error("invalid IR JSON: {0}")]
    Json(String),
    #[error("occurrence `{occurrence}` references root word `{root_word}` absent from L1")]
    UnknownRootWord {
        occurrence: String,
        root_word: String,
    },
    #[error("duplicate occurrence id `{0}`")]
    DuplicateOccurrence(String),
    #[error("duplicate operator name `{0}`")]
    DuplicateOperator(String),
    #[error("operator `{operator}` references unknown name `{name}`")]
    DanglingReference { operator: String, name: String },
    #[error("operator `{0}` is part of a reference cycle")]
    CyclicOperators(String),
    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// L1 / L2
// ============================================================================

/// `L1` row: a content word of the question plus the words it is grouped with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootWord {
    pub word: String,
    #[serde(default)]
    pub neighbors: Vec<String>,
}

impl RootWord {
    pub fn new(word: impl Into<String>, neighbors: &[&str]) -> Self {
        Self {
            word: word.into(),
            neighbors: neighbors.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// `L2` row: one concrete mention of a root word.
///
/// `subject`/`object` are only meaningful for relationship and data property
/// occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: String,
    pub root_word: String,
    #[serde(default)]
    pub neighbors: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
}

impl Occurrence {
    pub fn new(id: impl Into<String>, root_word: impl Into<String>, neighbors: &[&str]) -> Self {
        Self {
            id: id.into(),
            root_word: root_word.into(),
            neighbors: neighbors.iter().map(|n| n.to_string()).collect(),
            subject: None,
            object: None,
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_object(mut self, object: &str) -> Self {
        self.object = Some(object.to_string());
        self
    }
}

// ============================================================================
// L3
// ============================================================================

/// One element inside a `NOT` operand list or an `OR` branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// An occurrence id or the name of another operator.
    Name(String),
    /// A filter condition on one occurrence: `[occurrence, condition]`.
    Condition {
        occurrence: String,
        condition: String,
    },
    /// An identity/difference condition: `[left, right, "=" | "!="]`.
    Identity {
        left: String,
        right: String,
        condition: String,
    },
}

/// A condition inside a single-occurrence `OR`; a bracketed group is a
/// conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionGroup {
    Single(String),
    All(Vec<String>),
}

impl ConditionGroup {
    pub fn conditions(&self) -> Vec<&str> {
        match self {
            ConditionGroup::Single(c) => vec![c.as_str()],
            ConditionGroup::All(cs) => cs.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogicalOperator {
    Not {
        name: String,
        operands: Vec<Operand>,
    },
    /// `OR` over conditions of a single occurrence (rendered with `||`).
    ConditionOr {
        name: String,
        occurrence: String,
        groups: Vec<ConditionGroup>,
    },
    /// `OR` over occurrences, conditions and operators (rendered with `UNION`).
    BranchOr {
        name: String,
        branches: Vec<Vec<Operand>>,
    },
}

impl LogicalOperator {
    pub fn name(&self) -> &str {
        match self {
            LogicalOperator::Not { name, .. }
            | LogicalOperator::ConditionOr { name, .. }
            | LogicalOperator::BranchOr { name, .. } => name,
        }
    }

    /// Every operand referenced by name (occurrences or operators).
    pub fn referenced_names(&self) -> Vec<&str> {
        let operands: Box<dyn Iterator<Item = &Operand>> = match self {
            LogicalOperator::Not { operands, .. } => Box::new(operands.iter()),
            LogicalOperator::BranchOr { branches, .. } => Box::new(branches.iter().flatten()),
            LogicalOperator::ConditionOr { .. } => Box::new(std::iter::empty()),
        };
        operands
            .filter_map(|o| match o {
                Operand::Name(n) => Some(n.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// L4 / L5
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregate {
    Avg,
    Sum,
    Count,
    Min,
    Max,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregate::Avg => "AVG",
            Aggregate::Sum => "SUM",
            Aggregate::Count => "COUNT",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        };
        f.write_str(s)
    }
}

impl FromStr for Aggregate {
    type Err = MalformedIrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVG" => Ok(Aggregate::Avg),
            "SUM" => Ok(Aggregate::Sum),
            "COUNT" => Ok(Aggregate::Count),
            "MIN" => Ok(Aggregate::Min),
            "MAX" => Ok(Aggregate::Max),
            other => Err(MalformedIrError::Invalid(format!(
                "unknown aggregate function `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Superlative {
    Greatest,
    Lowest,
}

/// `L4` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRow {
    pub condition: String,
    pub occurrences: Vec<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub group_by: Option<String>,
}

impl FilterRow {
    pub fn new(condition: impl Into<String>, occurrences: &[&str]) -> Self {
        Self {
            condition: condition.into(),
            occurrences: occurrences.iter().map(|o| o.to_string()).collect(),
            limit: None,
            aggregate: None,
            group_by: None,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn with_group_by(mut self, group_by: &str) -> Self {
        self.group_by = Some(group_by.to_string());
        self
    }

    pub fn superlative(&self) -> Option<Superlative> {
        match self.condition.trim().to_ascii_uppercase().as_str() {
            "GREATEST" => Some(Superlative::Greatest),
            "LOWEST" => Some(Superlative::Lowest),
            _ => None,
        }
    }

    /// `=` / `!=` between two occurrences.
    pub fn is_identity(&self) -> bool {
        matches!(self.condition.trim(), "=" | "!=")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub variable: String,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub group_by: Option<String>,
}

impl ProjectionItem {
    pub fn variable(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            aggregate: None,
            group_by: None,
        }
    }
}

/// `L5`: the query verb plus its output variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default = "default_verb")]
    pub verb: String,
    #[serde(default)]
    pub items: Vec<ProjectionItem>,
}

fn default_verb() -> String {
    "SELECT".to_string()
}

impl Projection {
    pub fn select(variables: &[&str]) -> Self {
        Self {
            verb: default_verb(),
            items: variables.iter().map(|v| ProjectionItem::variable(*v)).collect(),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::select(&[])
    }
}

// ============================================================================
// The five lists
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIr {
    pub root_words: Vec<RootWord>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default)]
    pub operators: Vec<LogicalOperator>,
    #[serde(default)]
    pub filters: Vec<FilterRow>,
    #[serde(default)]
    pub projection: Projection,
}

impl QueryIr {
    pub fn from_json(text: &str) -> Result<Self, MalformedIrError> {
        serde_json::from_str(text).map_err(|e| MalformedIrError::Json(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn root_word(&self, word: &str) -> Option<&RootWord> {
        self.root_words.iter().find(|r| r.word == word)
    }

    pub fn occurrence(&self, id: &str) -> Option<&Occurrence> {
        self.occurrences.iter().find(|o| o.id == id)
    }

    pub fn operator(&self, name: &str) -> Option<&LogicalOperator> {
        self.operators.iter().find(|o| o.name() == name)
    }

    pub fn occurrences_of<'a>(&'a self, word: &'a str) -> impl Iterator<Item = &'a Occurrence> {
        self.occurrences.iter().filter(move |o| o.root_word == word)
    }
}
