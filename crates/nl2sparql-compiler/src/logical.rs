//! Logical operators (`L3`): `NOT` blocks, `||` merges and `UNION` branches.
//!
//! Operators run innermost first: an operator referencing another operator
//! sees the block (or merged filter) the inner one already produced.

use std::collections::{BTreeMap, BTreeSet};

use nl2sparql_ir::{operand_identifiers, LogicalOperator, MalformedIrError, Operand};
use nl2sparql_schema::EntityKind;
use tracing::debug;

use crate::error::CompileError;
use crate::filters::{FilterExpr, FilterSet};
use crate::resolve::ResolvedQuery;
use crate::triples::{BlockLine, GroupTarget, TripleGroup};

/// Operators sorted by nesting depth, `L3` order within a depth.
pub fn order_operators(operators: &[LogicalOperator]) -> Result<Vec<&LogicalOperator>, MalformedIrError> {
    let by_name: BTreeMap<&str, &LogicalOperator> =
        operators.iter().map(|op| (op.name(), op)).collect();

    fn depth<'a>(
        op: &'a LogicalOperator,
        by_name: &BTreeMap<&'a str, &'a LogicalOperator>,
        memo: &mut BTreeMap<&'a str, usize>,
        visiting: &mut BTreeSet<&'a str>,
    ) -> Result<usize, MalformedIrError> {
        if let Some(d) = memo.get(op.name()) {
            return Ok(*d);
        }
        if !visiting.insert(op.name()) {
            return Err(MalformedIrError::CyclicOperators(op.name().to_string()));
        }
        let mut d = 0;
        for name in op.referenced_names() {
            if let Some(inner) = by_name.get(name) {
                d = d.max(depth(inner, by_name, memo, visiting)? + 1);
            }
        }
        visiting.remove(op.name());
        memo.insert(op.name(), d);
        Ok(d)
    }

    let mut memo = BTreeMap::new();
    let mut keyed = Vec::with_capacity(operators.len());
    for op in operators {
        keyed.push((depth(op, &by_name, &mut memo, &mut BTreeSet::new())?, op));
    }
    keyed.sort_by_key(|(d, _)| *d);
    Ok(keyed.into_iter().map(|(_, op)| op).collect())
}

/// Lines gathered for one block, and what they were taken from.
#[derive(Default)]
struct Gathered {
    triples: Vec<BlockLine>,
    /// Blocks of inner operators, kept verbatim.
    nested: Vec<BlockLine>,
    filters: Vec<BlockLine>,
    moved_groups: BTreeSet<usize>,
    moved_filters: BTreeSet<usize>,
}

impl Gathered {
    fn push(&mut self, line: BlockLine) {
        let bucket = match line {
            BlockLine::Filter(_) => &mut self.filters,
            _ => &mut self.triples,
        };
        if !bucket.contains(&line) {
            bucket.push(line);
        }
    }

    fn push_block(&mut self, lines: Vec<BlockLine>) {
        self.nested.extend(lines);
    }

    fn is_empty(&self) -> bool {
        self.triples.is_empty() && self.nested.is_empty() && self.filters.is_empty()
    }

    fn into_lines(self) -> Vec<BlockLine> {
        self.triples
            .into_iter()
            .chain(self.nested)
            .chain(self.filters)
            .collect()
    }
}

struct Rewriter<'a> {
    groups: Vec<TripleGroup>,
    filters: Vec<FilterExpr>,
    resolved: &'a ResolvedQuery,
    /// Property bindings already moved into a block, by property occurrence.
    bindings: BTreeMap<String, Vec<BlockLine>>,
}

fn unmatched(operator: &str, what: impl std::fmt::Display) -> CompileError {
    MalformedIrError::Invalid(format!("operator `{operator}`: {what}")).into()
}

pub fn apply_operators(
    operators: &[LogicalOperator],
    groups: Vec<TripleGroup>,
    filters: FilterSet,
    resolved: &ResolvedQuery,
) -> Result<(Vec<TripleGroup>, FilterSet), CompileError> {
    let FilterSet {
        filters: exprs,
        grouping,
        ordering,
    } = filters;
    let mut rewriter = Rewriter {
        groups,
        filters: exprs,
        resolved,
        bindings: BTreeMap::new(),
    };
    for op in order_operators(operators)? {
        debug!(operator = op.name(), "applying logical operator");
        match op {
            LogicalOperator::Not { name, operands } => rewriter.not(name, operands)?,
            LogicalOperator::ConditionOr {
                name,
                occurrence,
                groups,
            } => {
                let groups: Vec<Vec<&str>> = groups.iter().map(|g| g.conditions()).collect();
                rewriter.condition_or(name, occurrence, &groups)?
            }
            LogicalOperator::BranchOr { name, branches } => rewriter.branch_or(name, branches)?,
        }
    }
    Ok((
        rewriter.groups,
        FilterSet {
            filters: rewriter.filters,
            grouping,
            ordering,
        },
    ))
}

impl Rewriter<'_> {
    fn not(&mut self, name: &str, operands: &[Operand]) -> Result<(), CompileError> {
        let mut gathered = Gathered::default();
        for operand in operands {
            self.gather(name, operand, &mut gathered)?;
        }
        if gathered.is_empty() {
            return Err(unmatched(name, "NOT matches nothing in the query"));
        }
        let moved_groups = std::mem::take(&mut gathered.moved_groups);
        let moved_filters = std::mem::take(&mut gathered.moved_filters);
        let mut lines = vec![BlockLine::Text("FILTER NOT EXISTS {".into())];
        lines.extend(gathered.into_lines());
        lines.push(BlockLine::Text("}".into()));
        self.remember_bindings(&moved_groups);
        self.remove(&moved_groups, &moved_filters);
        self.groups.push(TripleGroup::block(name, lines));
        Ok(())
    }

    fn branch_or(&mut self, name: &str, branches: &[Vec<Operand>]) -> Result<(), CompileError> {
        let mut lines = Vec::new();
        let mut moved_groups = BTreeSet::new();
        let mut moved_filters = BTreeSet::new();
        for (index, branch) in branches.iter().enumerate() {
            let mut gathered = Gathered::default();
            for operand in branch {
                self.gather(name, operand, &mut gathered)?;
            }
            if gathered.is_empty() {
                return Err(unmatched(name, format!("UNION branch {index} matches nothing in the query")));
            }
            moved_groups.append(&mut gathered.moved_groups);
            moved_filters.append(&mut gathered.moved_filters);
            if !lines.is_empty() {
                lines.push(BlockLine::Text("UNION".into()));
            }
            lines.push(BlockLine::Text("{".into()));
            lines.extend(gathered.into_lines());
            lines.push(BlockLine::Text("}".into()));
        }
        if lines.is_empty() {
            return Err(unmatched(name, "UNION without branches"));
        }
        self.remember_bindings(&moved_groups);
        self.remove(&moved_groups, &moved_filters);
        self.groups.push(TripleGroup::block(name, lines));
        Ok(())
    }

    fn condition_or(
        &mut self,
        name: &str,
        occurrence: &str,
        groups: &[Vec<&str>],
    ) -> Result<(), CompileError> {
        let mut used = BTreeSet::new();
        let mut disjuncts = Vec::new();
        for conditions in groups {
            let mut conjuncts = Vec::new();
            for condition in conditions {
                let i = self
                    .filters
                    .iter()
                    .position(|f| f.matches(occurrence, condition))
                    .ok_or_else(|| unmatched(name, format!("no `{occurrence} {condition}` row in L4")))?;
                used.insert(i);
                conjuncts.push(self.filters[i].expression.clone());
            }
            match conjuncts.len() {
                0 => {}
                1 => disjuncts.extend(conjuncts),
                _ => disjuncts.push(format!("({})", conjuncts.join(" && "))),
            }
        }
        let Some(&first) = used.first() else {
            return Err(unmatched(name, "OR without conditions"));
        };
        let merged = FilterExpr {
            expression: disjuncts.join(" || "),
            occurrences: vec![occurrence.to_string()],
            condition: String::new(),
            origin: Some(name.to_string()),
        };
        self.filters[first] = merged;
        used.remove(&first);
        self.remove(&BTreeSet::new(), &used);
        Ok(())
    }

    fn gather(&self, operator: &str, operand: &Operand, into: &mut Gathered) -> Result<(), CompileError> {
        match operand {
            Operand::Name(name) => self.gather_name(name, into),
            Operand::Condition {
                occurrence,
                condition,
            } => {
                let matched: Vec<usize> = (0..self.filters.len())
                    .filter(|&i| self.filters[i].matches(occurrence, condition))
                    .collect();
                if matched.is_empty() {
                    return Err(unmatched(operator, format!("no `{occurrence} {condition}` row in L4")));
                }
                for i in matched {
                    into.moved_filters.insert(i);
                    into.push(BlockLine::Filter(self.filters[i].expression.clone()));
                }
                for id in operand_identifiers(occurrence) {
                    if self.resolved.kind_of(id) == Some(EntityKind::DataProperty) {
                        self.bind(id, into);
                    }
                }
            }
            Operand::Identity {
                left,
                right,
                condition,
            } => {
                let matched: Vec<usize> = (0..self.filters.len())
                    .filter(|&i| self.filters[i].matches_identity(left, right, condition))
                    .collect();
                if matched.is_empty() {
                    return Err(unmatched(operator, format!("no `{left} {condition} {right}` row in L4")));
                }
                for i in matched {
                    into.moved_filters.insert(i);
                    into.push(BlockLine::Filter(self.filters[i].expression.clone()));
                }
                self.copy_declaration(left, into);
                self.copy_declaration(right, into);
            }
        }
        Ok(())
    }

    fn gather_name(&self, name: &str, into: &mut Gathered) {
        if let Some(i) = self.groups.iter().position(|g| g.targets_operator(name)) {
            into.moved_groups.insert(i);
            into.push_block(self.groups[i].lines());
            return;
        }
        if let Some(i) = self
            .filters
            .iter()
            .position(|f| f.origin.as_deref() == Some(name))
        {
            into.moved_filters.insert(i);
            into.push(BlockLine::Filter(self.filters[i].expression.clone()));
            return;
        }

        self.bind(name, into);
        for (i, f) in self.filters.iter().enumerate() {
            if f.is_on(name) {
                into.moved_filters.insert(i);
                into.push(BlockLine::Filter(f.expression.clone()));
            }
        }
        if let Some(rel) = self
            .resolved
            .get(name)
            .filter(|o| o.kind == EntityKind::Relationship)
        {
            if let Some(object) = &rel.object {
                self.copy_declaration(object, into);
            }
        }
    }

    /// Move the path groups reaching `occurrence`; when an earlier block
    /// already took them, repeat that block's binding instead.
    fn bind(&self, occurrence: &str, into: &mut Gathered) {
        if self.groups.iter().any(|g| g.targets_occurrence(occurrence)) {
            self.move_groups(|g| g.targets_occurrence(occurrence), into);
        } else {
            for line in self.bindings.get(occurrence).into_iter().flatten() {
                into.push(line.clone());
            }
        }
    }

    fn move_groups(&self, select: impl Fn(&TripleGroup) -> bool, into: &mut Gathered) {
        for (i, g) in self.groups.iter().enumerate() {
            if select(g) {
                into.moved_groups.insert(i);
                for line in g.lines() {
                    into.push(line);
                }
            }
        }
    }

    fn copy_declaration(&self, occurrence: &str, into: &mut Gathered) {
        if let Some(g) = self.groups.iter().find(|g| g.is_declaration_of(occurrence)) {
            for line in g.lines() {
                into.push(line);
            }
        }
    }

    fn remember_bindings(&mut self, moved: &BTreeSet<usize>) {
        for &i in moved {
            let group = &self.groups[i];
            if let GroupTarget::Occurrence(id) = &group.target {
                if self.resolved.kind_of(id) == Some(EntityKind::DataProperty) {
                    self.bindings.insert(id.clone(), group.lines());
                }
            }
        }
    }

    fn remove(&mut self, groups: &BTreeSet<usize>, filters: &BTreeSet<usize>) {
        let mut i = 0;
        self.groups.retain(|_| {
            i += 1;
            !groups.contains(&(i - 1))
        });
        let mut j = 0;
        self.filters.retain(|_| {
            j += 1;
            !filters.contains(&(j - 1))
        });
    }
}
