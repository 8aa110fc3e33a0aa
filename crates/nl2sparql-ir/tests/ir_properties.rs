use nl2sparql_ir::{parse_ir_lists, repair, validate, Occurrence, QueryIr, RootWord};
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn occurrences_for(words: &[String]) -> Vec<Occurrence> {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| Occurrence::new(format!("{w}{}", i + 1), w.clone(), &[]))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn parser_never_panics(text in "\\PC{0,200}") {
        let _ = parse_ir_lists(&text);
    }

    #[test]
    fn repair_is_idempotent_and_makes_root_words_valid(
        listed in prop::collection::vec(word(), 0..5),
        unlisted in prop::collection::vec(word(), 0..5),
    ) {
        let root_words: Vec<RootWord> = listed
            .iter()
            .map(|w| RootWord { word: w.clone(), neighbors: unlisted.clone() })
            .collect();
        let mut all = listed.clone();
        all.extend(unlisted.iter().cloned());
        let ir = QueryIr {
            root_words,
            occurrences: occurrences_for(&all),
            ..QueryIr::default()
        };

        let once = repair(ir);
        let twice = repair(once.clone());
        prop_assert_eq!(&once, &twice);
        for occ in &once.occurrences {
            prop_assert!(once.root_word(&occ.root_word).is_some());
        }
        prop_assert!(validate(&once).is_ok());
    }

    #[test]
    fn bare_tokens_parse_like_quoted_ones(
        w in "[a-z]{1,8}".prop_filter("`null` is a bare null token", |w| w != "null"),
    ) {
        let quoted = format!(
            "L1 = [[\"{w}\", []]]\nL2 = [[\"{w}1\", \"{w}\", [], []]]\nL3 = []\nL4 = []\nL5 = [\"SELECT\", [[\"{w}1\"], [], [], []]]"
        );
        let bare = format!(
            "L1 = [[{w}, []]]\nL2 = [[{w}1, {w}, [], []]]\nL3 = []\nL4 = []\nL5 = [SELECT, [[{w}1], [], [], []]]"
        );
        prop_assert_eq!(parse_ir_lists(&quoted), parse_ir_lists(&bare));
    }
}
