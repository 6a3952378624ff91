//! Stop name normalization and fuzzy comparison.

/// Normalize a display name into a slug: ASCII-lowercased, with every
/// maximal run of characters outside `[a-z0-9]` collapsed to a single
/// hyphen and leading/trailing hyphens trimmed.
///
/// The transform is idempotent: slugifying a slug yields the same slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Similarity ratio between two strings in `[0, 1]`.
///
/// `1.0` iff the strings are equal, `0.0` when either is empty, otherwise
/// `1 - levenshtein(a, b) / max(len(a), len(b))`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let dist = levenshtein(&a, &b);
    1.0 - dist as f64 / a.len().max(b.len()) as f64
}

/// Classic dynamic-programming Levenshtein distance with unit costs.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
