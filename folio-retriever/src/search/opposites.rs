//! Opposing-concept lexicon for dialectical search.
//!
//! The table pairs classic philosophical antitheses. Matching is by whole
//! word against either side of a pair, so "the freedom of the will" pulls
//! in "determinism" and a query about "determinism" pulls in "freedom".

use std::collections::HashSet;

const OPPOSITION_PAIRS: &[(&str, &str)] = &[
    ("being", "nothing"),
    ("nothingness", "being"),
    ("freedom", "determinism"),
    ("mind", "body"),
    ("subject", "object"),
    ("essence", "appearance"),
    ("appearance", "reality"),
    ("universal", "particular"),
    ("finite", "infinite"),
    ("necessity", "contingency"),
    ("presence", "absence"),
    ("order", "chaos"),
    ("reason", "passion"),
    ("self", "other"),
    ("master", "slave"),
    ("faith", "doubt"),
    ("good", "evil"),
    ("form", "matter"),
    ("unity", "plurality"),
    ("permanence", "change"),
    ("transcendence", "immanence"),
    ("idealism", "materialism"),
    ("theory", "practice"),
    ("nature", "culture"),
];

/// Opposing concepts for terms appearing in `query`, as
/// `(matched term, opposite)` pairs. At most `limit` pairs are returned,
/// one per distinct matched term, in lexicon order.
pub fn opposing_concepts(query: &str, limit: usize) -> Vec<(String, String)> {
    let lowered = query.to_lowercase();
    let words: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut matched: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for (a, b) in OPPOSITION_PAIRS {
        if out.len() == limit {
            break;
        }
        if words.contains(a) && matched.insert(a) {
            out.push(((*a).to_string(), (*b).to_string()));
        } else if words.contains(b) && matched.insert(b) {
            out.push(((*b).to_string(), (*a).to_string()));
        }
    }
    out
}
