//! Triple fragments and the groups they travel in between stages.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use nl2sparql_schema::{EdgeLabel, PathStep};
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// `?name`
    Var(String),
    /// `schema:name`
    Entity(String),
    /// Placeholder object of the data-property scaffold triples.
    Scaffold,
}

impl Term {
    /// Term for a query-graph node: `?x` nodes are variables.
    pub fn from_node(node: &str) -> Self {
        match node.strip_prefix('?') {
            Some(var) => Term::Var(var.to_string()),
            None => Term::Entity(node.to_string()),
        }
    }

    pub fn var(name: &str) -> Self {
        Term::Var(name.to_string())
    }

    pub fn entity(name: &str) -> Self {
        Term::Entity(name.to_string())
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&str> {
        match self {
            Term::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn render(&self, prefix: &str) -> String {
        match self {
            Term::Var(v) => format!("?{v}"),
            Term::Entity(e) => format!("{prefix}:{e}"),
            Term::Scaffold => "values".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predicate {
    Schema(EdgeLabel),
    /// A relationship or data property used directly between its endpoints.
    Property(String),
}

impl Predicate {
    pub fn render(&self, prefix: &str) -> String {
        match self {
            Predicate::Schema(EdgeLabel::Type) => "rdf:type".to_string(),
            Predicate::Schema(label) => format!("rdfs:{label}"),
            Predicate::Property(p) => format!("{prefix}:{p}"),
        }
    }

    pub fn label(&self) -> Option<EdgeLabel> {
        match self {
            Predicate::Schema(label) => Some(*label),
            Predicate::Property(_) => None,
        }
    }

    pub fn is_domain_or_range(&self) -> bool {
        self.label().is_some_and(EdgeLabel::is_domain_or_range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Predicate,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Predicate, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// The schema edge a path step walks, written subject-first.
    pub fn from_step(step: &PathStep) -> Self {
        let (s, o) = step.edge_endpoints();
        Self::new(Term::from_node(s), Predicate::Schema(step.label), Term::from_node(o))
    }

    pub fn is(&self, label: EdgeLabel) -> bool {
        self.predicate.label() == Some(label)
    }

    pub fn render(&self, prefix: &str) -> String {
        format!(
            "{} {} {}.",
            self.subject.render(prefix),
            self.predicate.render(prefix),
            self.object.render(prefix)
        )
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.object].into_iter().filter_map(Term::as_var)
    }
}

/// What a triple group stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupTarget {
    /// `?occ rdf:type schema:Class.` of the source occurrence.
    Declaration(String),
    /// The path from the source occurrence to this occurrence.
    Occurrence(String),
    /// A block produced by a logical operator.
    Operator(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockLine {
    /// Structural line (`{`, `}`, `UNION`, `FILTER NOT EXISTS {`).
    Text(String),
    Triple(Triple),
    /// Filter expression, rendered as `FILTER (<expr>)`.
    Filter(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupBody {
    Triples(Vec<Triple>),
    Block(Vec<BlockLine>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripleGroup {
    pub source: Option<String>,
    pub target: GroupTarget,
    pub body: GroupBody,
}

impl TripleGroup {
    pub fn declaration(occurrence: &str, class: &str) -> Self {
        Self {
            source: Some(occurrence.to_string()),
            target: GroupTarget::Declaration(class.to_string()),
            body: GroupBody::Triples(vec![Triple::new(
                Term::var(occurrence),
                Predicate::Schema(EdgeLabel::Type),
                Term::entity(class),
            )]),
        }
    }

    pub fn path(source: &str, target: &str, triples: Vec<Triple>) -> Self {
        Self {
            source: Some(source.to_string()),
            target: GroupTarget::Occurrence(target.to_string()),
            body: GroupBody::Triples(triples),
        }
    }

    pub fn block(operator: &str, lines: Vec<BlockLine>) -> Self {
        Self {
            source: None,
            target: GroupTarget::Operator(operator.to_string()),
            body: GroupBody::Block(lines),
        }
    }

    pub fn is_declaration_of(&self, occurrence: &str) -> bool {
        matches!(self.target, GroupTarget::Declaration(_)) && self.source.as_deref() == Some(occurrence)
    }

    pub fn targets_occurrence(&self, occurrence: &str) -> bool {
        matches!(&self.target, GroupTarget::Occurrence(o) if o == occurrence)
    }

    pub fn targets_operator(&self, operator: &str) -> bool {
        matches!(&self.target, GroupTarget::Operator(o) if o == operator)
    }

    /// Body as block lines, for nesting into another block.
    pub fn lines(&self) -> Vec<BlockLine> {
        match &self.body {
            GroupBody::Triples(triples) => triples.iter().cloned().map(BlockLine::Triple).collect(),
            GroupBody::Block(lines) => lines.clone(),
        }
    }

    pub fn render(&self, prefix: &str) -> Vec<String> {
        self.lines().iter().map(|l| render_line(l, prefix)).collect()
    }

    /// Every variable the group mentions, filters included.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for line in self.lines() {
            match line {
                BlockLine::Triple(t) => out.extend(t.variables().map(str::to_string)),
                BlockLine::Filter(f) => out.extend(variables_in(&f)),
                BlockLine::Text(_) => {}
            }
        }
        out
    }
}

pub fn render_line(line: &BlockLine, prefix: &str) -> String {
    match line {
        BlockLine::Text(t) => t.clone(),
        BlockLine::Triple(t) => t.render(prefix),
        BlockLine::Filter(f) => format!("FILTER ({f})"),
    }
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?([A-Za-z_][A-Za-z0-9_]*)").expect("variable regex"))
}

/// `?name` variables mentioned in a SPARQL expression.
pub fn variables_in(text: &str) -> BTreeSet<String> {
    variable_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl2sparql_schema::StepDirection;

    #[test]
    fn renders_with_schema_prefix() {
        let t = Triple::new(
            Term::var("point1"),
            Predicate::Property("partOf".into()),
            Term::entity("duomo"),
        );
        assert_eq!(t.render("schema"), "?point1 schema:partOf schema:duomo.");

        let step = PathStep {
            from: "Point".into(),
            to: "partOf".into(),
            label: EdgeLabel::Domain,
            direction: StepDirection::Backward,
        };
        assert_eq!(
            Triple::from_step(&step).render("base"),
            "base:partOf rdfs:domain base:Point."
        );
    }

    #[test]
    fn group_variables_include_filters() {
        let group = TripleGroup::block(
            "NOT1",
            vec![
                BlockLine::Text("FILTER NOT EXISTS {".into()),
                BlockLine::Triple(Triple::new(
                    Term::var("building1"),
                    Predicate::Property("builtYear".into()),
                    Term::var("year1"),
                )),
                BlockLine::Filter("?year1 > ?year2".into()),
                BlockLine::Text("}".into()),
            ],
        );
        let vars: Vec<String> = group.variables().into_iter().collect();
        assert_eq!(vars, ["building1", "year1", "year2"]);
        assert_eq!(group.render("schema")[2], "FILTER (?year1 > ?year2)");
    }
}
