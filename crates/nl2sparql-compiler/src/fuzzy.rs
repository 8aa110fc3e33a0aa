//! String similarity used by the fuzzy tier of the entity mapper.
//!
//! `similarity = (normalized edit-distance similarity + Jaro-Winkler) / 2`,
//! both computed on lowercase strings, in `[0, 1]`.

pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    (strsim::normalized_levenshtein(&a, &b) + strsim::jaro_winkler(&a, &b)) / 2.0
}
