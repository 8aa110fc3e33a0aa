//! Consistency repair and validation of the five lists.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::{LogicalOperator, MalformedIrError, Operand, QueryIr, RootWord};

/// Add the `L1` rows the parser forgot.
///
/// A word that appears as an `L1` neighbour or an `L2` root word but has no
/// `L1` row of its own gets one; its neighbours are the `L1` words that list
/// it. Existing rows are left untouched and the pass is idempotent.
pub fn repair(mut ir: QueryIr) -> QueryIr {
    let known: BTreeSet<String> = ir.root_words.iter().map(|r| r.word.clone()).collect();

    let mut missing: Vec<String> = Vec::new();
    let candidates = ir
        .root_words
        .iter()
        .flat_map(|r| r.neighbors.iter())
        .chain(ir.occurrences.iter().map(|o| &o.root_word));
    for word in candidates {
        if !known.contains(word) && !missing.contains(word) {
            missing.push(word.clone());
        }
    }

    for word in missing {
        let neighbors = ir
            .root_words
            .iter()
            .filter(|r| r.neighbors.iter().any(|n| *n == word))
            .map(|r| r.word.clone())
            .collect();
        ir.root_words.push(RootWord { word, neighbors });
    }
    ir
}

/// Check the structural invariants the compiler relies on.
pub fn validate(ir: &QueryIr) -> Result<(), MalformedIrError> {
    let roots: HashSet<&str> = ir.root_words.iter().map(|r| r.word.as_str()).collect();

    let mut occurrence_ids = HashSet::new();
    for occ in &ir.occurrences {
        if !occurrence_ids.insert(occ.id.as_str()) {
            return Err(MalformedIrError::DuplicateOccurrence(occ.id.clone()));
        }
        if !roots.contains(occ.root_word.as_str()) {
            return Err(MalformedIrError::UnknownRootWord {
                occurrence: occ.id.clone(),
                root_word: occ.root_word.clone(),
            });
        }
    }

    let mut operator_names = HashSet::new();
    for op in &ir.operators {
        if !operator_names.insert(op.name()) {
            return Err(MalformedIrError::DuplicateOperator(op.name().to_string()));
        }
    }

    for op in &ir.operators {
        for name in operand_occurrences(op) {
            if !occurrence_ids.contains(name) && !operator_names.contains(name) {
                return Err(MalformedIrError::DanglingReference {
                    operator: op.name().to_string(),
                    name: name.to_string(),
                });
            }
        }
    }
    check_acyclic(ir)?;

    for (i, row) in ir.filters.iter().enumerate() {
        if row.occurrences.is_empty() {
            return Err(MalformedIrError::Row {
                list: 4,
                row: i,
                message: "filter without occurrences".into(),
            });
        }
        if row.is_identity() && row.occurrences.len() != 2 {
            return Err(MalformedIrError::Row {
                list: 4,
                row: i,
                message: format!("`{}` needs exactly two occurrences", row.condition.trim()),
            });
        }
    }
    Ok(())
}

/// Occurrence ids inside a filter subject, which may be arithmetic over
/// several occurrences (`year1 - height1`).
pub fn operand_identifiers(subject: &str) -> impl Iterator<Item = &str> {
    subject
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_'))
}

/// Names an operator points at, including the occurrences inside condition
/// and identity operands.
fn operand_occurrences(op: &LogicalOperator) -> Vec<&str> {
    let operands: Vec<&Operand> = match op {
        LogicalOperator::Not { operands, .. } => operands.iter().collect(),
        LogicalOperator::BranchOr { branches, .. } => branches.iter().flatten().collect(),
        LogicalOperator::ConditionOr { occurrence, .. } => {
            return operand_identifiers(occurrence).collect()
        }
    };
    operands
        .into_iter()
        .flat_map(|o| match o {
            Operand::Name(n) => vec![n.as_str()],
            Operand::Condition { occurrence, .. } => operand_identifiers(occurrence).collect(),
            Operand::Identity { left, right, .. } => vec![left.as_str(), right.as_str()],
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(ir: &QueryIr) -> Result<(), MalformedIrError> {
    let edges: BTreeMap<&str, Vec<&str>> = ir
        .operators
        .iter()
        .map(|op| {
            let refs = op
                .referenced_names()
                .into_iter()
                .filter(|n| ir.operator(n).is_some())
                .collect();
            (op.name(), refs)
        })
        .collect();

    fn visit<'a>(
        node: &'a str,
        edges: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Result<(), MalformedIrError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(MalformedIrError::CyclicOperators(node.to_string())),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        for next in edges.get(node).into_iter().flatten() {
            visit(*next, edges, marks)?;
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for node in edges.keys() {
        visit(*node, &edges, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FilterRow, Occurrence, Projection};

    fn base() -> QueryIr {
        QueryIr {
            root_words: vec![RootWord::new("point", &["building"])],
            occurrences: vec![
                Occurrence::new("point1", "point", &["building1"]),
                Occurrence::new("building1", "building", &["point1"]),
            ],
            operators: vec![],
            filters: vec![],
            projection: Projection::select(&["point1"]),
        }
    }

    #[test]
    fn repair_adds_missing_root_words() {
        let ir = repair(base());
        let building = ir.root_word("building").expect("added");
        assert_eq!(building.neighbors, vec!["point".to_string()]);
        assert!(validate(&ir).is_ok());

        let again = repair(ir.clone());
        assert_eq!(again, ir);
    }

    #[test]
    fn validate_rejects_unknown_root_word() {
        let err = validate(&base()).unwrap_err();
        assert!(matches!(err, MalformedIrError::UnknownRootWord { .. }));
    }

    #[test]
    fn validate_rejects_dangling_and_cyclic_operators() {
        let mut ir = repair(base());
        ir.operators.push(LogicalOperator::Not {
            name: "NOT1".into(),
            operands: vec![Operand::Name("ghost1".into())],
        });
        assert!(matches!(
            validate(&ir).unwrap_err(),
            MalformedIrError::DanglingReference { .. }
        ));

        let mut ir = repair(base());
        ir.operators = vec![
            LogicalOperator::Not {
                name: "NOT1".into(),
                operands: vec![Operand::Name("OR1".into())],
            },
            LogicalOperator::BranchOr {
                name: "OR1".into(),
                branches: vec![vec![Operand::Name("NOT1".into())], vec![Operand::Name("point1".into())]],
            },
        ];
        assert!(matches!(
            validate(&ir).unwrap_err(),
            MalformedIrError::CyclicOperators(_)
        ));
    }

    #[test]
    fn validate_accepts_arithmetic_condition_operands() {
        let mut ir = repair(base());
        ir.operators = vec![
            LogicalOperator::Not {
                name: "NOT1".into(),
                operands: vec![Operand::Condition {
                    occurrence: "point1 - building1".into(),
                    condition: ">10".into(),
                }],
            },
            LogicalOperator::ConditionOr {
                name: "OR1".into(),
                occurrence: "point1 + building1".into(),
                groups: vec![crate::ConditionGroup::Single("<3".into())],
            },
        ];
        assert!(validate(&ir).is_ok());

        ir.operators.truncate(1);
        ir.operators[0] = LogicalOperator::Not {
            name: "NOT1".into(),
            operands: vec![Operand::Condition {
                occurrence: "point1 - ghost1".into(),
                condition: ">10".into(),
            }],
        };
        assert!(matches!(
            validate(&ir).unwrap_err(),
            MalformedIrError::DanglingReference { name, .. } if name == "ghost1"
        ));
    }

    #[test]
    fn operand_identifiers_skip_numbers_and_operators() {
        let ids: Vec<&str> = operand_identifiers("year1 - height1 * 2").collect();
        assert_eq!(ids, ["year1", "height1"]);
        assert_eq!(operand_identifiers("year1").collect::<Vec<_>>(), ["year1"]);
    }

    #[test]
    fn validate_checks_identity_arity() {
        let mut ir = repair(base());
        ir.filters.push(FilterRow::new("!=", &["point1"]));
        assert!(matches!(
            validate(&ir).unwrap_err(),
            MalformedIrError::Row { list: 4, row: 0, .. }
        ));
    }
}
