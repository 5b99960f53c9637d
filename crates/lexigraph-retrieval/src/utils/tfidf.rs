//! Character n-gram TF-IDF scoring.
//!
//! Ranks candidate strings against a set of match terms without a model.
//! Match terms are positional: rows before `num_primary_match_values`
//! count at full weight, later (supplementary) rows at a tenth, so query
//! tokens dominate entity-context terms without drowning them out.

use std::collections::HashMap;

const NGRAM_LENGTH: usize = 3;
const SUPPLEMENTARY_WEIGHT: f64 = 0.1;

fn ngrams(s: &str) -> HashMap<String, f64> {
    // Pad so even single-character strings produce a gram.
    let padded: Vec<char> = format!(" {} ", s.to_lowercase()).chars().collect();
    let mut counts: HashMap<String, f64> = HashMap::new();
    for window in padded.windows(NGRAM_LENGTH) {
        *counts.entry(window.iter().collect()).or_insert(0.0) += 1.0;
    }
    counts
}

struct TfidfVector {
    weights: HashMap<String, f64>,
    norm: f64,
}

fn tfidf_vector(grams: &HashMap<String, f64>, idf: &HashMap<String, f64>) -> TfidfVector {
    let weights: HashMap<String, f64> = grams
        .iter()
        .map(|(g, tf)| {
            let idf = idf.get(g).copied().unwrap_or(1.0);
            (g.clone(), tf * idf)
        })
        .collect();
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    TfidfVector { weights, norm }
}

fn cosine(a: &TfidfVector, b: &TfidfVector) -> f64 {
    if a.norm == 0.0 || b.norm == 0.0 {
        return 0.0;
    }
    let (small, large) = if a.weights.len() <= b.weights.len() {
        (a, b)
    } else {
        (b, a)
    };
    let dot: f64 = small
        .weights
        .iter()
        .filter_map(|(g, w)| large.weights.get(g).map(|v| w * v))
        .sum();
    dot / (a.norm * b.norm)
}

/// Score candidate `values` against `match_values`.
///
/// For each match term, the closest `limit` candidates (by n-gram cosine
/// similarity) receive that term's score, weighted down for supplementary
/// rows; a candidate's final score is the mean of the scores it collected.
/// Returns `(value, score)` pairs sorted descending; candidates that
/// matched nothing are absent.
pub fn score_values(
    values: &[String],
    match_values: &[String],
    limit: Option<usize>,
    num_primary_match_values: Option<usize>,
) -> Vec<(String, f64)> {
    if values.is_empty() || match_values.is_empty() {
        return Vec::new();
    }

    let num_primary = num_primary_match_values.unwrap_or(match_values.len());
    let max_per_term = limit.unwrap_or(values.len()).min(values.len());

    // Document frequencies over the candidate corpus.
    let value_grams: Vec<HashMap<String, f64>> = values.iter().map(|v| ngrams(v)).collect();
    let mut df: HashMap<String, f64> = HashMap::new();
    for grams in &value_grams {
        for g in grams.keys() {
            *df.entry(g.clone()).or_insert(0.0) += 1.0;
        }
    }
    let n = values.len() as f64;
    let idf: HashMap<String, f64> = df
        .into_iter()
        .map(|(g, df)| (g, ((1.0 + n) / (1.0 + df)).ln() + 1.0))
        .collect();

    let value_vectors: Vec<TfidfVector> =
        value_grams.iter().map(|g| tfidf_vector(g, &idf)).collect();

    let mut collected: HashMap<&str, Vec<f64>> = HashMap::new();

    for (row, term) in match_values.iter().enumerate() {
        let term_vector = tfidf_vector(&ngrams(term), &idf);
        let multiplier = if row < num_primary {
            1.0
        } else {
            SUPPLEMENTARY_WEIGHT
        };

        let mut similarities: Vec<(f64, usize)> = value_vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine(&term_vector, v), i))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        similarities.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (similarity, index) in similarities.into_iter().take(max_per_term) {
            collected
                .entry(values[index].as_str())
                .or_default()
                .push(similarity * multiplier);
        }
    }

    let mut scored: Vec<(String, f64)> = collected
        .into_iter()
        .map(|(value, scores)| {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            (value.to_string(), mean)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
}

/// Split text into whitespace-token windows of `size` tokens with
/// `overlap` tokens shared between consecutive windows.
pub fn token_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(tokens.len());
        windows.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += step;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn closest_candidate_scores_highest() {
        let values = strings(&[
            "alice reviewed invoice 42",
            "bob approved the budget",
            "carol archived invoice 42",
        ]);
        let scored = score_values(&values, &strings(&["invoice 42"]), None, None);
        assert!(!scored.is_empty());
        assert!(scored[0].0.contains("invoice 42"));
        let bob = scored.iter().find(|(v, _)| v.contains("bob"));
        if let Some((_, bob_score)) = bob {
            assert!(scored[0].1 > *bob_score);
        }
    }

    #[test]
    fn supplementary_terms_are_downweighted() {
        let values = strings(&["quarterly totals", "employee onboarding"]);
        // Same term twice: once primary, once supplementary.
        let scored_primary =
            score_values(&values, &strings(&["quarterly totals"]), None, Some(1));
        let scored_supplementary =
            score_values(&values, &strings(&["quarterly totals"]), None, Some(0));
        let top_primary = scored_primary.first().unwrap().1;
        let top_supplementary = scored_supplementary.first().unwrap().1;
        assert!(top_supplementary < top_primary);
        assert!((top_supplementary - top_primary * SUPPLEMENTARY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn limit_caps_candidates_per_term() {
        let values = strings(&["invoice a", "invoice b", "invoice c"]);
        let scored = score_values(&values, &strings(&["invoice"]), Some(2), None);
        assert_eq!(scored.len(), 2);
    }

    #[test]
    fn empty_inputs_yield_empty_output() {
        assert!(score_values(&[], &strings(&["x"]), None, None).is_empty());
        assert!(score_values(&strings(&["x"]), &[], None, None).is_empty());
    }

    #[test]
    fn token_windows_overlap() {
        let windows = token_windows("a b c d e f g", 4, 2);
        assert_eq!(windows[0], "a b c d");
        assert_eq!(windows[1], "c d e f");
        assert_eq!(windows.last().unwrap(), "e f g");
    }

    #[test]
    fn token_windows_short_text() {
        assert_eq!(token_windows("one two", 25, 5), vec!["one two".to_string()]);
        assert!(token_windows("", 25, 5).is_empty());
    }
}
