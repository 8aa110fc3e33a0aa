//! Parser for the list-literal text printed by the upstream parser:
//!
//! ```text
//! L1 = [["points", ["buildings"]], ["buildings", ["points"]]]
//! L2 = [["points1", "points", ["buildings1"], [None, None]], ...]
//! L3 = [["OR1", "year1", [[">1200", "<=1500"], [">=1700", "<1900"]]]]
//! L4 = [[">1200", ["year1"], [], [], []]]
//! L5 = ["SELECT", [["points1"], [], [], []]]
//! ```
//!
//! Model output is not always valid Python: quotes go missing and commas
//! between rows are dropped. Bare tokens are accepted up to the next `,` `[`
//! `]` or newline, and list elements may be separated by whitespace alone.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char as pchar, multispace0},
    combinator::{map, opt},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult,
};

use crate::{
    Aggregate, ConditionGroup, FilterRow, LogicalOperator, MalformedIrError, Occurrence, Operand,
    Projection, ProjectionItem, QueryIr, RootWord,
};

/// Generic list-literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    List(Vec<Value>),
    Str(String),
    None,
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

fn quoted(input: &str) -> IResult<&str, Value> {
    let single = delimited(pchar('\''), take_while(|c| c != '\''), pchar('\''));
    let double = delimited(pchar('"'), take_while(|c| c != '"'), pchar('"'));
    map(alt((single, double)), |s: &str| Value::Str(s.to_string()))(input)
}

fn bare(input: &str) -> IResult<&str, Value> {
    map(
        take_while1(|c: char| !matches!(c, ',' | '[' | ']' | '\n' | '\r')),
        |s: &str| {
            let s = s.trim();
            if s == "None" || s == "null" {
                Value::None
            } else {
                Value::Str(s.to_string())
            }
        },
    )(input)
}

fn list(input: &str) -> IResult<&str, Value> {
    let (input, _) = pchar('[')(input)?;
    let (input, items) = many0(terminated(
        preceded(ws, value),
        preceded(ws, opt(pchar(','))),
    ))(input)?;
    let (input, _) = preceded(ws, pchar(']'))(input)?;
    Ok((input, Value::List(items)))
}

fn value(input: &str) -> IResult<&str, Value> {
    alt((list, quoted, bare))(input)
}

fn list_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn assignment(input: &str) -> IResult<&str, (&str, Value)> {
    let (input, _) = ws(input)?;
    let (input, name) = list_name(input)?;
    let (input, _) = delimited(ws, pchar('='), ws)(input)?;
    let (input, v) = list(input)?;
    Ok((input, (name, v)))
}

fn syntax_error(rest: &str) -> MalformedIrError {
    MalformedIrError::Syntax {
        near: rest.trim().chars().take(40).collect(),
    }
}

/// Parse the five `Ln = [...]` assignments (or one outer list holding the five
/// lists) into raw values, indexed 0..5.
pub fn parse_raw_lists(text: &str) -> Result<[Value; 5], MalformedIrError> {
    let text = text.trim().trim_start_matches("```python").trim_matches('`').trim();

    let mut slots: [Option<Value>; 5] = Default::default();
    if text.starts_with('[') {
        let (rest, v) = list(text).map_err(|_| syntax_error(text))?;
        if !rest.trim().is_empty() {
            return Err(syntax_error(rest));
        }
        let Value::List(items) = v else {
            return Err(syntax_error(text));
        };
        for (i, item) in items.into_iter().take(5).enumerate() {
            slots[i] = Some(item);
        }
    } else {
        let mut input = text;
        while !input.trim().is_empty() {
            let (rest, (name, v)) = assignment(input).map_err(|_| syntax_error(input))?;
            let index = name
                .trim_start_matches(['L', 'l'])
                .parse::<usize>()
                .ok()
                .filter(|i| (1..=5).contains(i))
                .ok_or_else(|| MalformedIrError::Invalid(format!("unknown list name `{name}`")))?;
            slots[index - 1] = Some(v);
            input = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
        }
    }

    // L3 and L4 may legitimately be absent; L1, L2 and L5 may not.
    for (i, required) in [(0usize, true), (1, true), (2, false), (3, false), (4, true)] {
        if slots[i].is_none() {
            if required {
                return Err(MalformedIrError::MissingList(i as u8 + 1));
            }
            slots[i] = Some(Value::List(Vec::new()));
        }
    }
    let [l1, l2, l3, l4, l5] = slots;
    Ok([
        l1.unwrap_or(Value::None),
        l2.unwrap_or(Value::None),
        l3.unwrap_or(Value::None),
        l4.unwrap_or(Value::None),
        l5.unwrap_or(Value::None),
    ])
}

// ============================================================================
// Typed conversion
// ============================================================================

fn row_err(list: u8, row: usize, message: impl Into<String>) -> MalformedIrError {
    MalformedIrError::Row {
        list,
        row,
        message: message.into(),
    }
}

fn rows(list: u8, v: &Value) -> Result<&[Value], MalformedIrError> {
    v.as_list()
        .ok_or_else(|| MalformedIrError::Invalid(format!("L{list} is not a list")))
}

fn strings(list: u8, row: usize, v: Option<&Value>) -> Result<Vec<String>, MalformedIrError> {
    match v {
        None | Some(Value::None) => Ok(Vec::new()),
        Some(Value::Str(s)) => Ok(vec![s.clone()]),
        Some(Value::List(items)) => items
            .iter()
            .filter(|i| **i != Value::None)
            .map(|i| {
                i.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| row_err(list, row, "expected a list of words"))
            })
            .collect(),
    }
}

fn first_string(list: u8, row: usize, v: Option<&Value>) -> Result<Option<String>, MalformedIrError> {
    Ok(strings(list, row, v)?.into_iter().next())
}

fn required_str(list: u8, row: usize, v: Option<&Value>, what: &str) -> Result<String, MalformedIrError> {
    v.and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| row_err(list, row, format!("expected {what}")))
}

fn root_words(v: &Value) -> Result<Vec<RootWord>, MalformedIrError> {
    rows(1, v)?
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cols = row.as_list().ok_or_else(|| row_err(1, i, "row is not a list"))?;
            Ok(RootWord {
                word: required_str(1, i, cols.first(), "a root word")?,
                neighbors: strings(1, i, cols.get(1))?,
            })
        })
        .collect()
}

fn occurrences(v: &Value) -> Result<Vec<Occurrence>, MalformedIrError> {
    rows(2, v)?
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cols = row.as_list().ok_or_else(|| row_err(2, i, "row is not a list"))?;
            let (subject, object) = match cols.get(3) {
                Some(Value::List(so)) => (
                    so.first().and_then(Value::as_str).map(str::to_string),
                    so.get(1).and_then(Value::as_str).map(str::to_string),
                ),
                _ => (None, None),
            };
            Ok(Occurrence {
                id: required_str(2, i, cols.first(), "an occurrence id")?,
                root_word: required_str(2, i, cols.get(1), "a root word")?,
                neighbors: strings(2, i, cols.get(2))?,
                subject,
                object,
            })
        })
        .collect()
}

fn operand(row: usize, v: &Value) -> Result<Operand, MalformedIrError> {
    match v {
        Value::Str(name) => Ok(Operand::Name(name.clone())),
        Value::List(items) => {
            let parts = strings(3, row, Some(v))?;
            match parts.as_slice() {
                [occurrence, condition] => Ok(Operand::Condition {
                    occurrence: occurrence.clone(),
                    condition: condition.clone(),
                }),
                [left, right, condition] => Ok(Operand::Identity {
                    left: left.clone(),
                    right: right.clone(),
                    condition: condition.clone(),
                }),
                _ => Err(row_err(
                    3,
                    row,
                    format!("operand with {} elements (expected 2 or 3)", items.len()),
                )),
            }
        }
        Value::None => Err(row_err(3, row, "empty operand")),
    }
}

fn operands(row: usize, v: &Value) -> Result<Vec<Operand>, MalformedIrError> {
    match v {
        Value::List(items) => items.iter().map(|item| operand(row, item)).collect(),
        other => Ok(vec![operand(row, other)?]),
    }
}

fn operators(v: &Value) -> Result<Vec<LogicalOperator>, MalformedIrError> {
    rows(3, v)?
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cols = row.as_list().ok_or_else(|| row_err(3, i, "row is not a list"))?;
            let name = required_str(3, i, cols.first(), "an operator name")?;
            let upper = name.to_ascii_uppercase();
            if upper.starts_with("NOT") {
                let operands = match cols.get(1) {
                    Some(v) => operands(i, v)?,
                    None => return Err(row_err(3, i, "NOT without operands")),
                };
                return Ok(LogicalOperator::Not { name, operands });
            }
            if !upper.starts_with("OR") {
                return Err(row_err(3, i, format!("unknown operator `{name}`")));
            }
            match cols.get(1) {
                Some(Value::Str(occurrence)) => {
                    let groups = cols
                        .get(2)
                        .and_then(Value::as_list)
                        .ok_or_else(|| row_err(3, i, "OR over one occurrence needs a condition list"))?
                        .iter()
                        .map(|g| match g {
                            Value::Str(c) => Ok(ConditionGroup::Single(c.clone())),
                            Value::List(_) => Ok(ConditionGroup::All(strings(3, i, Some(g))?)),
                            Value::None => Err(row_err(3, i, "empty condition")),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(LogicalOperator::ConditionOr {
                        name,
                        occurrence: occurrence.clone(),
                        groups,
                    })
                }
                Some(Value::List(_)) => {
                    let branches = cols[1..]
                        .iter()
                        .map(|b| operands(i, b))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(LogicalOperator::BranchOr { name, branches })
                }
                _ => Err(row_err(3, i, "OR without operands")),
            }
        })
        .collect()
}

fn filters(v: &Value) -> Result<Vec<FilterRow>, MalformedIrError> {
    rows(4, v)?
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cols = row.as_list().ok_or_else(|| row_err(4, i, "row is not a list"))?;
            let limit = first_string(4, i, cols.get(2))?
                .map(|l| {
                    l.trim()
                        .parse::<u64>()
                        .map_err(|_| row_err(4, i, format!("limit `{l}` is not a number")))
                })
                .transpose()?;
            let aggregate = first_string(4, i, cols.get(3))?
                .map(|a| a.parse::<Aggregate>())
                .transpose()
                .map_err(|e| row_err(4, i, e.to_string()))?;
            Ok(FilterRow {
                condition: required_str(4, i, cols.first(), "a condition")?,
                occurrences: strings(4, i, cols.get(1))?,
                limit,
                aggregate,
                group_by: first_string(4, i, cols.get(4))?,
            })
        })
        .collect()
}

fn projection(v: &Value) -> Result<Projection, MalformedIrError> {
    let cols = rows(5, v)?;
    let verb = required_str(5, 0, cols.first(), "a query verb")?;
    let items = cols[1..]
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row_index = i + 1;
            let parts = row
                .as_list()
                .ok_or_else(|| row_err(5, row_index, "projection row is not a list"))?;
            let variable = first_string(5, row_index, parts.first())?
                .ok_or_else(|| row_err(5, row_index, "missing variable"))?;
            let aggregate = first_string(5, row_index, parts.get(1))?
                .map(|a| a.parse::<Aggregate>())
                .transpose()
                .map_err(|e| row_err(5, row_index, e.to_string()))?;
            let group_by = first_string(5, row_index, parts.get(3))?;
            Ok(ProjectionItem {
                variable,
                aggregate,
                group_by,
            })
        })
        .collect::<Result<Vec<_>, MalformedIrError>>()?;
    Ok(Projection { verb, items })
}

/// Parse list-literal text into a typed [`QueryIr`].
///
/// This does not run the repair pass; see [`crate::repair`].
pub fn parse_ir_lists(text: &str) -> Result<QueryIr, MalformedIrError> {
    let [l1, l2, l3, l4, l5] = parse_raw_lists(text)?;
    Ok(QueryIr {
        root_words: root_words(&l1)?,
        occurrences: occurrences(&l2)?,
        operators: operators(&l3)?,
        filters: filters(&l4)?,
        projection: projection(&l5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
L1 = [
    ["x", ["points"]],
    ["points", ["historical_buildings", "constitutes"]],
    ["constitutes", ["points", "historical_buildings"]],
    ["historical_buildings", ["construction_year", "points", "constitutes"]],
    ["construction_year", ["historical_buildings"]],
]
L2 = [
    ["x1", "x", ["points1"], ["points1", None]],
    ["points1", "points", ["historical_buildings1", "constitutes1"], [None, None]],
    ["constitutes1", "constitutes", ["points1", "historical_buildings1"], ["points1", "historical_buildings1"]],
    ["historical_buildings1", "historical_buildings", ["construction_year1", "points1", "constitutes1"], [None, None]],
    ["construction_year1", "construction_year", ["historical_buildings1"], ["historical_buildings1", None]],
]
L3 = [["OR1", "construction_year1", [[">1200", "<=1500"], [">=1700", "<1900"]]]]
L4 = [
    [">1200", ["construction_year1"], [], [], []],
    ["<=1500", ["construction_year1"], [], [], []],
    [">=1700", ["construction_year1"], [], [], []],
    ["<1900", ["construction_year1"], [], [], []],
]
L5 = ["SELECT", [["x1"], [], [], []]]
"#;

    #[test]
    fn parses_the_five_lists() {
        let ir = parse_ir_lists(SAMPLE).expect("parse");
        assert_eq!(ir.root_words.len(), 5);
        assert_eq!(ir.occurrences.len(), 5);
        let rel = ir.occurrence("constitutes1").unwrap();
        assert_eq!(rel.subject.as_deref(), Some("points1"));
        assert_eq!(rel.object.as_deref(), Some("historical_buildings1"));
        assert_eq!(ir.occurrence("points1").unwrap().subject, None);

        match &ir.operators[0] {
            LogicalOperator::ConditionOr {
                occurrence, groups, ..
            } => {
                assert_eq!(occurrence, "construction_year1");
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[1].conditions(), vec![">=1700", "<1900"]);
            }
            other => panic!("unexpected operator {other:?}"),
        }
        assert_eq!(ir.filters.len(), 4);
        assert_eq!(ir.projection.verb, "SELECT");
        assert_eq!(ir.projection.items[0].variable, "x1");
    }

    #[test]
    fn tolerates_missing_quotes_and_commas() {
        let text = "L1 = [[point, [building]]\n[building, [point]]]\nL2 = [[point1, point, [building1], [None, None]]]\nL5 = [SELECT, [[point1], [], [], []]]";
        let ir = parse_ir_lists(text).expect("parse");
        assert_eq!(ir.root_words.len(), 2);
        assert_eq!(ir.root_words[1].word, "building");
        assert!(ir.operators.is_empty());
        assert!(ir.filters.is_empty());
    }

    #[test]
    fn parses_superlative_and_aggregate_rows() {
        let text = r#"
L1 = [["year", []]]
L2 = [["year1", "year", [], [None, None]]]
L4 = [["GREATEST", ["year1"], ["5"], [], []], [">3", ["year1"], [], ["AVG"], ["building1"]]]
L5 = ["SELECT", [["year1"], ["AVG"], ["GROUP"], ["building1"]]]
"#;
        let ir = parse_ir_lists(text).expect("parse");
        assert_eq!(ir.filters[0].limit, Some(5));
        assert_eq!(ir.filters[1].aggregate, Some(Aggregate::Avg));
        assert_eq!(ir.filters[1].group_by.as_deref(), Some("building1"));
        assert_eq!(ir.projection.items[0].group_by.as_deref(), Some("building1"));
    }

    #[test]
    fn parses_not_and_branch_or() {
        let text = r#"
L1 = [["a", []]]
L2 = [["a1", "a", [], [None, None]]]
L3 = [["NOT1", ["rel1", ["year1", ">3"]]], ["OR2", ["a1"], ["NOT1", ["a1", "b1", "!="]]]]
L5 = ["SELECT", [["a1"], [], [], []]]
"#;
        let ir = parse_ir_lists(text).expect("parse");
        match &ir.operators[0] {
            LogicalOperator::Not { operands, .. } => {
                assert_eq!(operands[0], Operand::Name("rel1".into()));
                assert!(matches!(&operands[1], Operand::Condition { condition, .. } if condition == ">3"));
            }
            other => panic!("unexpected operator {other:?}"),
        }
        match &ir.operators[1] {
            LogicalOperator::BranchOr { branches, .. } => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(&branches[1][1], Operand::Identity { condition, .. } if condition == "!="));
            }
            other => panic!("unexpected operator {other:?}"),
        }
    }

    #[test]
    fn reports_missing_required_lists() {
        let err = parse_ir_lists("L1 = [[\"a\", []]]").unwrap_err();
        assert_eq!(err, MalformedIrError::MissingList(2));
    }

    #[test]
    fn rejects_unknown_operator_kind() {
        let text = "L1 = [[a, []]]\nL2 = []\nL3 = [[XOR1, a1, [x]]]\nL5 = [SELECT]";
        let err = parse_ir_lists(text).unwrap_err();
        assert!(matches!(err, MalformedIrError::Row { list: 3, .. }));
    }
}
