use nl2sparql_compiler::annotate::annotate;
use nl2sparql_compiler::clean::clean;
use nl2sparql_compiler::logical::order_operators;
use nl2sparql_compiler::mapping::map_root_words;
use nl2sparql_compiler::resolve::ResolvedQuery;
use nl2sparql_compiler::subgraph::{dome_free_path, synthesize, SpanRequest};
use nl2sparql_compiler::{AcceptProposed, Compiler, CompilerConfig, RejectUnmapped, SynonymTable};
use nl2sparql_ir::{LogicalOperator, Occurrence, Operand, Projection, QueryIr, RootWord};
use nl2sparql_schema::{has_dome, SchemaBuilder, SchemaIndex};
use proptest::prelude::*;

fn city() -> SchemaIndex {
    SchemaBuilder::new()
        .class("Point")
        .class("Building")
        .class("District")
        .sub_class_of("Church", "Building")
        .relationship("partOf", "Point", "Building")
        .relationship("locatedIn", "Building", "District")
        .data_property("builtYear", "Building")
        .data_property("area", "District")
        .individual("centro", "District")
        .build()
}

fn synonyms() -> SynonymTable {
    SynonymTable::new().with("year", &["builtYear"])
}

/// A building-like word plus any of point / district / year around it.
fn query(building: &str, point: bool, district: bool, year: bool) -> QueryIr {
    let b1 = format!("{building}1");
    let mut neighbors_b = Vec::new();
    let mut words_b = Vec::new();
    let mut ir = QueryIr::default();
    if point {
        ir.root_words.push(RootWord::new("point", &[building]));
        ir.occurrences.push(Occurrence::new("point1", "point", &[b1.as_str()]));
        neighbors_b.push("point1");
        words_b.push("point");
    }
    if district {
        ir.root_words.push(RootWord::new("district", &[building]));
        ir.occurrences.push(Occurrence::new("district1", "district", &[b1.as_str()]));
        neighbors_b.push("district1");
        words_b.push("district");
    }
    if year {
        ir.root_words.push(RootWord::new("year", &[building]));
        ir.occurrences
            .push(Occurrence::new("year1", "year", &[b1.as_str()]).with_subject(&b1));
        neighbors_b.push("year1");
        words_b.push("year");
    }
    ir.root_words.push(RootWord::new(building, &words_b));
    ir.occurrences.push(Occurrence::new(b1.as_str(), building, &neighbors_b));
    ir.projection = Projection::select(&[b1.as_str()]);
    ir
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cleaning_is_idempotent(
        building in prop::sample::select(vec!["building", "church"]),
        point in any::<bool>(),
        district in any::<bool>(),
        year in any::<bool>(),
    ) {
        let schema = city();
        let synonyms = synonyms();
        let config = CompilerConfig::default();
        let ir = query(building, point, district, year);

        let mapping = map_root_words(&ir, &schema, &synonyms, &RejectUnmapped, &AcceptProposed, &config)
            .expect("mapping");
        let resolved = ResolvedQuery::new(&ir, &mapping).expect("resolved");
        let request = SpanRequest::for_query(&ir, &mapping, &resolved);
        let subgraph = synthesize(&schema, &request, config.max_candidate_paths).expect("subgraph");
        prop_assert!(subgraph.is_weakly_connected());
        for entity in &request.entities {
            prop_assert!(subgraph.contains(entity));
        }

        let groups = annotate(&resolved, &subgraph, config.max_annotation_paths).expect("annotated");
        let once = clean(groups, &schema);
        let twice = clean(once.clone(), &schema);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn compilation_is_deterministic(
        building in prop::sample::select(vec!["building", "church"]),
        point in any::<bool>(),
        district in any::<bool>(),
        year in any::<bool>(),
    ) {
        let schema = city();
        let synonyms = synonyms();
        let ir = query(building, point, district, year);
        let compiler = Compiler::new(&schema).with_synonyms(&synonyms);
        let first = compiler.compile(&ir, "http://example.org/city#", "urn:g").expect("compiles");
        let second = compiler.compile(&ir, "http://example.org/city#", "urn:g").expect("compiles");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn retained_paths_have_no_domes(
        from in prop::sample::select(vec!["Point", "Building", "District", "Church", "builtYear", "area", "centro"]),
        to in prop::sample::select(vec!["Point", "Building", "District", "Church", "builtYear", "area", "centro"]),
    ) {
        let schema = city();
        let graph = schema.graph();
        if let Some(path) = dome_free_path(graph, from, to, 10) {
            let steps = graph.directed_steps(&path).expect("path follows edges");
            prop_assert!(!has_dome(&steps));
            prop_assert_eq!(path.first().map(String::as_str), Some(from));
            prop_assert_eq!(path.last().map(String::as_str), Some(to));
        }
    }

    #[test]
    fn operators_follow_their_references(order in Just((0..5).collect::<Vec<usize>>()).prop_shuffle()) {
        // NOT0 -> NOT1 -> ... -> NOT4, listed in a shuffled order.
        let ops: Vec<LogicalOperator> = order
            .iter()
            .map(|&i| LogicalOperator::Not {
                name: format!("NOT{i}"),
                operands: if i < 4 {
                    vec![Operand::Name(format!("NOT{}", i + 1))]
                } else {
                    vec![Operand::Name("year1".into())]
                },
            })
            .collect();
        let sorted: Vec<&str> = order_operators(&ops).expect("acyclic").iter().map(|o| o.name()).collect();
        prop_assert_eq!(sorted, vec!["NOT4", "NOT3", "NOT2", "NOT1", "NOT0"]);
    }
}
