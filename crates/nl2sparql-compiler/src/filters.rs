//! `L4` rows -> `FILTER`, `GROUP BY`/`HAVING` and `ORDER BY`/`LIMIT`.

use std::sync::OnceLock;

use nl2sparql_ir::{FilterRow, MalformedIrError, Superlative};
use nl2sparql_schema::EntityKind;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::CompileError;
use crate::resolve::ResolvedQuery;
use crate::triples::variables_in;

/// One `FILTER (...)` expression plus the `L4` row it came from, so logical
/// operators can find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub expression: String,
    pub occurrences: Vec<String>,
    pub condition: String,
    /// Operator that produced this expression by merging others.
    pub origin: Option<String>,
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

impl FilterExpr {
    pub fn new(expression: String, occurrences: &[String], condition: &str) -> Self {
        Self {
            expression,
            occurrences: occurrences.to_vec(),
            condition: condition.to_string(),
            origin: None,
        }
    }

    pub fn is_on(&self, occurrence: &str) -> bool {
        self.origin.is_none()
            && self.occurrences.len() == 1
            && squash(&self.occurrences[0]) == squash(occurrence)
    }

    /// Single-occurrence filter `occurrence <condition>`.
    pub fn matches(&self, occurrence: &str, condition: &str) -> bool {
        self.is_on(occurrence) && squash(&self.condition) == squash(condition)
    }

    /// `left = right` / `left != right`, in either order.
    pub fn matches_identity(&self, left: &str, right: &str, condition: &str) -> bool {
        let [a, b] = self.occurrences.as_slice() else {
            return false;
        };
        self.origin.is_none()
            && squash(&self.condition) == squash(condition)
            && ((a == left && b == right) || (a == right && b == left))
    }

    pub fn variables(&self) -> Vec<String> {
        variables_in(&self.expression).into_iter().collect()
    }
}

/// `GROUP BY` variables and `HAVING` conjuncts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    pub group_by: Vec<String>,
    pub having: Vec<String>,
}

impl Grouping {
    pub fn group_by(&mut self, var: &str) {
        if !self.group_by.iter().any(|v| v == var) {
            self.group_by.push(var.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.group_by.is_empty() && self.having.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.group_by.is_empty() {
            let vars: Vec<String> = self.group_by.iter().map(|v| format!("?{v}")).collect();
            out.push(format!("GROUP BY {}", vars.join(" ")));
        }
        if !self.having.is_empty() {
            out.push(format!("HAVING ({})", self.having.join(" && ")));
        }
        out
    }
}

/// `ORDER BY` keys and the tightest `LIMIT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    pub keys: Vec<String>,
    pub limit: Option<u64>,
}

impl Ordering {
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.keys.is_empty() {
            out.push(format!("ORDER BY {}", self.keys.join(" ")));
        }
        if let Some(limit) = self.limit {
            out.push(format!("LIMIT {limit}"));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub filters: Vec<FilterExpr>,
    pub grouping: Grouping,
    pub ordering: Ordering,
}

fn compositional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([a-zA-Z_]+\d+)\s*([\-\+\*/])\s*([a-zA-Z_]+\d+)").expect("compositional regex")
    })
}

/// `year1 - year2` and friends.
pub fn is_compositional(occurrence: &str) -> bool {
    occurrence.contains([' ', '-', '+', '*', '/'])
}

/// Subject of a filter: `?occ`, or the arithmetic expression with its
/// operands turned into variables.
fn filter_subject(occurrence: &str) -> String {
    if is_compositional(occurrence) {
        compositional_re()
            .replace_all(occurrence.trim(), "?${1} ${2} ?${3}")
            .into_owned()
    } else {
        format!("?{}", occurrence.trim())
    }
}

/// Turn the bare identifiers of a condition into variables; quoted strings,
/// numbers and booleans stay as they are.
pub fn variablize(condition: &str) -> String {
    let chars: Vec<char> = condition.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|d| *d == c)
                .map_or(chars.len(), |p| i + 1 + p + 1);
            out.extend(&chars[i..end]);
            i = end;
        } else if c.is_ascii_digit() {
            let end = run_end(&chars, i, |d| d.is_ascii_alphanumeric() || d == '.' || d == '_');
            out.extend(&chars[i..end]);
            i = end;
        } else if c.is_alphabetic() || c == '_' {
            let end = run_end(&chars, i, |d| d.is_alphanumeric() || d == '_');
            let word: String = chars[i..end].iter().collect();
            let already_var = i > 0 && chars[i - 1] == '?';
            if !already_var && !matches!(word.as_str(), "true" | "false") {
                out.push('?');
            }
            out.push_str(&word);
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn run_end(chars: &[char], start: usize, keep: impl Fn(char) -> bool) -> usize {
    chars[start..]
        .iter()
        .position(|c| !keep(*c))
        .map_or(chars.len(), |p| start + p)
}

/// Compile the `L4` rows.
///
/// Rows on class occurrences are kept as plain filters over the occurrence
/// variable instead of being skipped.
pub fn compile_filters(
    rows: &[FilterRow],
    resolved: &ResolvedQuery,
    prefix: &str,
) -> Result<FilterSet, CompileError> {
    let mut set = FilterSet::default();

    for (index, row) in rows.iter().enumerate() {
        let Some(first) = row.occurrences.first() else {
            continue;
        };
        let kind = resolved.kind_of(first);

        if let Some(superlative) = row.superlative() {
            let order = match superlative {
                Superlative::Greatest => "DESC",
                Superlative::Lowest => "ASC",
            };
            let expr = if let Some(aggregate) = row.aggregate {
                if let Some(var) = &row.group_by {
                    set.grouping.group_by(var);
                }
                format!("{aggregate}({})", filter_subject(first))
            } else if let Some(var) = &row.group_by {
                set.grouping.group_by(var);
                format!("COUNT({})", relationship_object(resolved, first, index, prefix)?)
            } else {
                filter_subject(first)
            };
            set.ordering.keys.push(format!("{order}({expr})"));
            if let Some(limit) = row.limit {
                set.ordering.limit = Some(set.ordering.limit.map_or(limit, |l| l.min(limit)));
            }
            continue;
        }

        let condition = variablize(&row.condition);
        if let (true, [left, right]) = (row.is_identity(), row.occurrences.as_slice()) {
            let side = |occ: &str| match resolved.get(occ) {
                Some(o) if o.kind == EntityKind::Individual => format!("{prefix}:{}", o.entity),
                _ => format!("?{occ}"),
            };
            let expression = format!("{} {} {}", side(left), row.condition.trim(), side(right));
            set.filters
                .push(FilterExpr::new(expression, &row.occurrences, &row.condition));
            continue;
        }

        if let Some(aggregate) = row.aggregate {
            if let Some(var) = &row.group_by {
                set.grouping.group_by(var);
            }
            set.grouping
                .having
                .push(format!("{aggregate}({}){condition}", filter_subject(first)));
            continue;
        }

        if kind == Some(EntityKind::Relationship) {
            let object = relationship_object(resolved, first, index, prefix)?;
            let group_var = row
                .group_by
                .clone()
                .or_else(|| resolved.get(first).and_then(|r| r.subject.clone()));
            if let Some(var) = group_var {
                set.grouping.group_by(&var);
            }
            set.grouping.having.push(format!("COUNT({object}){condition}"));
            continue;
        }

        let expression = format!("{} {condition}", filter_subject(first));
        set.filters
            .push(FilterExpr::new(expression, &row.occurrences, &row.condition));
    }

    for (word, property) in resolved.literal_words() {
        let names: Vec<&str> = resolved.literal_names(word).collect();
        let targets: Vec<&str> = resolved
            .occurrences()
            .iter()
            .filter(|o| o.kind == EntityKind::DataProperty && o.entity == property)
            .filter(|o| o.neighbors.iter().any(|n| names.contains(&n.as_str())))
            .map(|o| o.id.as_str())
            .collect();
        if targets.is_empty() {
            warn!(%word, %property, "string literal has no neighbouring property occurrence");
        }
        for id in targets {
            let condition = format!("= \"{word}\"");
            set.filters.push(FilterExpr::new(
                format!("?{id} {condition}"),
                &[id.to_string()],
                &condition,
            ));
        }
    }

    debug!(
        filters = set.filters.len(),
        having = set.grouping.having.len(),
        order_keys = set.ordering.keys.len(),
        "compiled filter rows"
    );
    Ok(set)
}

fn relationship_object(
    resolved: &ResolvedQuery,
    occurrence: &str,
    row: usize,
    prefix: &str,
) -> Result<String, MalformedIrError> {
    let object = resolved
        .get(occurrence)
        .filter(|o| o.kind == EntityKind::Relationship)
        .and_then(|o| o.object.as_deref());
    match object {
        Some(obj) => Ok(match resolved.get(obj) {
            Some(o) => o.term().render(prefix),
            None => format!("?{obj}"),
        }),
        None => Err(MalformedIrError::Row {
            list: 4,
            row,
            message: format!("`{occurrence}` is not a relationship occurrence with an object"),
        }),
    }
}
