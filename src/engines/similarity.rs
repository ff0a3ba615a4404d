//! String similarity scores in `[0, 1]` used by fuzzy dedupe

use crate::models::SimilarityAlgorithm;

/// Maximum shared prefix length rewarded by the Winkler adjustment
const WINKLER_PREFIX_LIMIT: usize = 4;
const WINKLER_SCALE: f64 = 0.1;

impl SimilarityAlgorithm {
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityAlgorithm::JaroWinkler => jaro_winkler(a, b),
            SimilarityAlgorithm::Levenshtein => levenshtein_similarity(a, b),
        }
    }
}

/// Plain Jaro similarity
pub fn jaro(s1: &str, s2: &str) -> f64 {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    if s1_chars.is_empty() && s2_chars.is_empty() {
        return 1.0;
    }
    if s1_chars.is_empty() || s2_chars.is_empty() {
        return 0.0;
    }

    let match_window = (s1_chars.len().max(s2_chars.len()) / 2).saturating_sub(1);
    let mut s1_matches = vec![false; s1_chars.len()];
    let mut s2_matches = vec![false; s2_chars.len()];
    let mut matches = 0usize;

    for (i, c) in s1_chars.iter().enumerate() {
        let start = i.saturating_sub(match_window);
        let end = (i + match_window + 1).min(s2_chars.len());
        for j in start..end {
            if s2_matches[j] || *c != s2_chars[j] {
                continue;
            }
            s1_matches[i] = true;
            s2_matches[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0;
    for (i, c) in s1_chars.iter().enumerate() {
        if !s1_matches[i] {
            continue;
        }
        while !s2_matches[k] {
            k += 1;
        }
        if *c != s2_chars[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    (m / s1_chars.len() as f64 + m / s2_chars.len() as f64 + (m - transpositions as f64 / 2.0) / m)
        / 3.0
}

/// Jaro score plus a bonus for up to four matching leading characters
pub fn jaro_winkler(s1: &str, s2: &str) -> f64 {
    let base = jaro(s1, s2);
    let prefix = s1
        .chars()
        .zip(s2.chars())
        .take(WINKLER_PREFIX_LIMIT)
        .take_while(|(a, b)| a == b)
        .count() as f64;

    (base + WINKLER_SCALE * prefix * (1.0 - base)).min(1.0)
}

pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    // two-row variant of the full matrix
    let mut previous: Vec<usize> = (0..=s2_chars.len()).collect();
    let mut current = vec![0; s2_chars.len() + 1];

    for (i, a) in s1_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b) in s2_chars.iter().enumerate() {
            let cost = usize::from(a != b);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[s2_chars.len()]
}

/// `1 - distance / max_len`
pub fn levenshtein_similarity(s1: &str, s2: &str) -> f64 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f64 / max_len as f64
}
