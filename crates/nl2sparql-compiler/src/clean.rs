//! Path cleaning.
//!
//! Annotated paths spell out the schema walk (`rdf:type`, `rdfs:subClassOf`,
//! `rdfs:domain`, `rdfs:range`). Two passes rewrite each group into the
//! triples a SPARQL endpoint can match:
//!
//! 1. **Joints**: a class entered through one property's domain/range and
//!    left through another's, with only `subClassOf` triples in between,
//!    becomes a fresh `?Class_<group>` variable shared by both properties.
//! 2. **Folding**: each relationship's domain/range pair and each data
//!    property's domain triple plus scaffold become one
//!    `subject schema:prop object.` triple. Endpoints are found by walking
//!    over `subClassOf` triples to the `rdf:type` triple naming the instance.
//!
//! Both passes are idempotent.

use std::collections::BTreeSet;

use nl2sparql_schema::{EdgeLabel, EntityKind, SchemaIndex};
use tracing::{debug, warn};

use crate::triples::{GroupBody, Predicate, Term, Triple, TripleGroup};

pub fn clean(groups: Vec<TripleGroup>, schema: &SchemaIndex) -> Vec<TripleGroup> {
    groups
        .into_iter()
        .enumerate()
        .map(|(index, mut group)| {
            if let GroupBody::Triples(triples) = group.body {
                let triples = collapse_joints(triples, index);
                group.body = GroupBody::Triples(fold_scaffolds(triples, schema));
            }
            group
        })
        .collect()
}

/// `domain`/`range` triple of a property whose object is still a class.
fn is_joint_boundary(t: &Triple) -> bool {
    t.predicate.is_domain_or_range()
        && matches!(t.subject, Term::Entity(_))
        && matches!(t.object, Term::Entity(_))
}

pub fn collapse_joints(mut triples: Vec<Triple>, group_index: usize) -> Vec<Triple> {
    let mut used: BTreeSet<String> = triples
        .iter()
        .flat_map(|t| t.variables().map(str::to_string).collect::<Vec<_>>())
        .collect();
    let mut out = Vec::with_capacity(triples.len());
    let mut i = 0;

    while i < triples.len() {
        if is_joint_boundary(&triples[i]) {
            let mut j = i + 1;
            while j < triples.len() && triples[j].is(EdgeLabel::SubClassOf) {
                j += 1;
            }
            let is_joint = j < triples.len()
                && is_joint_boundary(&triples[j])
                && triples[j].subject != triples[i].subject;
            if let (true, Some(class)) = (is_joint, triples[i].object.as_entity()) {
                let var = fresh_variable(class, group_index, &mut used);
                debug!(%var, group = group_index, "collapsing class joint");
                let mut entry = triples[i].clone();
                entry.object = Term::Var(var.clone());
                out.push(entry);
                triples[j].object = Term::Var(var);
                i = j;
                continue;
            }
        }
        out.push(triples[i].clone());
        i += 1;
    }
    out
}

fn fresh_variable(class: &str, group_index: usize, used: &mut BTreeSet<String>) -> String {
    let base = format!("{class}_{group_index}");
    let mut var = base.clone();
    let mut n = 2;
    while used.contains(&var) {
        var = format!("{base}_{n}");
        n += 1;
    }
    used.insert(var.clone());
    var
}

/// Instance term behind the object of `triples[at]`, and the index of the
/// triple naming it. Walks towards lower indices, never below `floor`.
fn endpoint_backward(
    triples: &[Triple],
    at: usize,
    floor: usize,
    schema: &SchemaIndex,
) -> Option<(Term, usize)> {
    if let Some(term) = instance_object(&triples[at], schema) {
        return Some((term, at));
    }
    let mut j = at;
    while j > floor {
        j -= 1;
        let t = &triples[j];
        if t.is(EdgeLabel::SubClassOf) {
            continue;
        }
        return t.is(EdgeLabel::Type).then(|| (t.subject.clone(), j));
    }
    None
}

/// Same walk towards higher indices.
fn endpoint_forward(triples: &[Triple], at: usize, schema: &SchemaIndex) -> Option<(Term, usize)> {
    if let Some(term) = instance_object(&triples[at], schema) {
        return Some((term, at));
    }
    for (j, t) in triples.iter().enumerate().skip(at + 1) {
        if t.is(EdgeLabel::SubClassOf) {
            continue;
        }
        return t.is(EdgeLabel::Type).then(|| (t.subject.clone(), j));
    }
    None
}

/// Variable or individual already standing in the object position.
fn instance_object(t: &Triple, schema: &SchemaIndex) -> Option<Term> {
    match &t.object {
        Term::Var(_) => Some(t.object.clone()),
        Term::Entity(e) if schema.kind_of(e) == Some(EntityKind::Individual) => Some(t.object.clone()),
        _ => None,
    }
}

fn is_scaffold(t: Option<&Triple>, subject: &Term, label: EdgeLabel) -> bool {
    t.is_some_and(|t| t.is(label) && t.object == Term::Scaffold && &t.subject == subject)
}

pub fn fold_scaffolds(triples: Vec<Triple>, schema: &SchemaIndex) -> Vec<Triple> {
    let mut spans: Vec<(usize, usize, Triple)> = Vec::new();
    let mut floor = 0;
    let mut i = 0;

    while i < triples.len() {
        let t = &triples[i];
        let property = match (&t.subject, t.predicate.is_domain_or_range()) {
            (Term::Entity(p), true) => p,
            _ => {
                i += 1;
                continue;
            }
        };

        match schema.kind_of(property) {
            Some(EntityKind::Relationship) => {
                let exit = (i + 1..triples.len())
                    .find(|&k| triples[k].subject == t.subject && triples[k].predicate.is_domain_or_range());
                let Some(k) = exit else {
                    i += 1;
                    continue;
                };
                let entry = endpoint_backward(&triples, i, floor, schema);
                let leave = endpoint_forward(&triples, k, schema);
                match (entry, leave) {
                    (Some((a, start)), Some((b, end))) => {
                        let (s, o) = if t.is(EdgeLabel::Domain) { (a, b) } else { (b, a) };
                        spans.push((start, end, Triple::new(s, Predicate::Property(property.clone()), o)));
                        floor = end + 1;
                        i = end + 1;
                    }
                    _ => {
                        warn!(relationship = %property, "cannot fold relationship endpoints");
                        i = k + 1;
                    }
                }
            }
            Some(EntityKind::DataProperty) if t.is(EdgeLabel::Domain) => {
                let range = is_scaffold(triples.get(i + 1), &t.subject, EdgeLabel::Range);
                let instance = triples
                    .get(i + 2)
                    .filter(|s| s.is(EdgeLabel::Type) && s.object == Term::Scaffold)
                    .map(|s| s.subject.clone());
                let entry = endpoint_backward(&triples, i, floor, schema);
                match (range, instance, entry) {
                    (true, Some(value), Some((subject, start))) => {
                        spans.push((
                            start,
                            i + 2,
                            Triple::new(subject, Predicate::Property(property.clone()), value),
                        ));
                        floor = i + 3;
                        i += 3;
                    }
                    _ => i += 1,
                }
            }
            _ => i += 1,
        }
    }

    let mut out = Vec::with_capacity(triples.len());
    let mut next = 0;
    for (start, end, triple) in spans {
        out.extend_from_slice(&triples[next..start]);
        out.push(triple);
        next = end + 1;
    }
    out.extend_from_slice(&triples[next..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl2sparql_schema::SchemaBuilder;

    fn schema() -> SchemaIndex {
        SchemaBuilder::new()
            .class("Point")
            .class("Building")
            .class("District")
            .sub_class_of("Church", "Building")
            .relationship("partOf", "Point", "Building")
            .relationship("locatedIn", "Building", "District")
            .data_property("builtYear", "Building")
            .individual("centro", "District")
            .build()
    }

    fn t(s: &str, p: EdgeLabel, o: &str) -> Triple {
        Triple::new(Term::from_node(s), Predicate::Schema(p), Term::from_node(o))
    }

    fn scaffold(prop: &str, var: &str) -> [Triple; 2] {
        [
            Triple::new(Term::entity(prop), Predicate::Schema(EdgeLabel::Range), Term::Scaffold),
            Triple::new(Term::var(var), Predicate::Schema(EdgeLabel::Type), Term::Scaffold),
        ]
    }

    fn render(triples: &[Triple]) -> Vec<String> {
        triples.iter().map(|t| t.render("schema")).collect()
    }

    #[test]
    fn folds_relationship_between_type_triples() {
        let path = vec![
            t("?point1", EdgeLabel::Type, "Point"),
            t("partOf", EdgeLabel::Domain, "Point"),
            t("partOf", EdgeLabel::Range, "Building"),
            t("Church", EdgeLabel::SubClassOf, "Building"),
            t("?church1", EdgeLabel::Type, "Church"),
        ];
        let cleaned = fold_scaffolds(collapse_joints(path, 0), &schema());
        assert_eq!(render(&cleaned), ["?point1 schema:partOf ?church1."]);
    }

    #[test]
    fn folds_data_property_scaffold() {
        let mut path = vec![
            t("?church1", EdgeLabel::Type, "Church"),
            t("Church", EdgeLabel::SubClassOf, "Building"),
            t("builtYear", EdgeLabel::Domain, "Building"),
        ];
        path.extend(scaffold("builtYear", "year1"));
        let cleaned = fold_scaffolds(path, &schema());
        assert_eq!(render(&cleaned), ["?church1 schema:builtYear ?year1."]);
    }

    #[test]
    fn joint_becomes_shared_variable() {
        let path = vec![
            t("?point1", EdgeLabel::Type, "Point"),
            t("partOf", EdgeLabel::Domain, "Point"),
            t("partOf", EdgeLabel::Range, "Building"),
            t("locatedIn", EdgeLabel::Domain, "Building"),
            t("locatedIn", EdgeLabel::Range, "District"),
            t("centro", EdgeLabel::Type, "District"),
        ];
        let joined = collapse_joints(path, 3);
        assert_eq!(render(&joined)[2], "schema:partOf rdfs:range ?Building_3.");
        assert_eq!(render(&joined)[3], "schema:locatedIn rdfs:domain ?Building_3.");

        let cleaned = fold_scaffolds(joined, &schema());
        assert_eq!(
            render(&cleaned),
            [
                "?point1 schema:partOf ?Building_3.",
                "?Building_3 schema:locatedIn schema:centro.",
            ]
        );
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let mut path = vec![
            t("?point1", EdgeLabel::Type, "Point"),
            t("partOf", EdgeLabel::Domain, "Point"),
            t("partOf", EdgeLabel::Range, "Building"),
            t("builtYear", EdgeLabel::Domain, "Building"),
        ];
        path.extend(scaffold("builtYear", "year1"));
        let groups = vec![
            TripleGroup::declaration("point1", "Point"),
            TripleGroup::path("point1", "year1", path),
        ];
        let once = clean(groups, &schema());
        let twice = clean(once.clone(), &schema());
        assert_eq!(once, twice);
        assert_eq!(
            once[1].render("schema"),
            ["?point1 schema:partOf ?Building_1.", "?Building_1 schema:builtYear ?year1."]
        );
    }
}
