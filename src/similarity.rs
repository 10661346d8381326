//! Wrapper-directory name matching
//!
//! Decides whether a directory found at the root of an archive is "the same"
//! as the archive's base name. The comparison runs in three stages, stopping at
//! the first that matches:
//!
//! 1. case-insensitive equality
//! 2. case-insensitive containment in either direction
//! 3. normalized Levenshtein similarity `1 - distance / max(len_a, len_b)`
//!    at or above the threshold (0.7 by default)

/// Default similarity ratio at which two names are considered the same
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Compares archive base names with root directory names
#[derive(Clone, Copy, Debug)]
pub struct NameSimilarityMatcher {
    threshold: f64,
}

impl Default for NameSimilarityMatcher {
    fn default() -> Self {
        Self {
            threshold: SIMILARITY_THRESHOLD,
        }
    }
}

impl NameSimilarityMatcher {
    /// Matcher with a custom edit-distance threshold
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The edit-distance threshold in use
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True if `a` and `b` name the same thing
    pub fn is_similar(&self, a: &str, b: &str) -> bool {
        let a = a.to_lowercase();
        let b = b.to_lowercase();

        if a == b {
            return true;
        }
        // An empty name would be contained in anything
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a.contains(&b) || b.contains(&a) {
            return true;
        }
        similarity_ratio(&a, &b) >= self.threshold
    }
}

/// `1 - levenshtein(a, b) / max(len_a, len_b)`, counted in chars
///
/// Two empty strings are identical (1.0).
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Edit distance (insert, delete, substitute) between two strings, over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row of the DP table
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}
