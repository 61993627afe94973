//! Name fragments and similarity scoring.
//!
//! Provider directories rarely expose emails, so matching leans on name
//! evidence: containment of first/last fragments in a login, and a fuzzy
//! blend of whole-string similarity with fragment containment for display
//! names.

/// First/last name fragments extracted from an email local part or a
/// display name. Lowercased, ASCII-alphanumeric only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub first: String,
    pub last: Option<String>,
}

impl NameParts {
    /// Split the local part of an email on `.`, `_`, `-` and `+`.
    /// `jane.doe@acme.com` yields `jane` / `doe`.
    pub fn from_email(email: &str) -> Option<Self> {
        let local = email.split('@').next()?;
        let fragments: Vec<String> = local
            .split(['.', '_', '-', '+'])
            .map(sanitize)
            .filter(|f| !f.is_empty())
            .collect();
        Self::from_fragments(fragments)
    }

    /// Split a display name on whitespace. `Jane Doe` yields `jane` / `doe`.
    pub fn from_full_name(name: &str) -> Option<Self> {
        let fragments: Vec<String> = name
            .split_whitespace()
            .map(sanitize)
            .filter(|f| !f.is_empty())
            .collect();
        Self::from_fragments(fragments)
    }

    fn from_fragments(fragments: Vec<String>) -> Option<Self> {
        let mut iter = fragments.into_iter();
        let first = iter.next()?;
        let last = iter.last();
        Some(Self { first, last })
    }

    /// Fragments worth testing for containment, longest first.
    pub fn fragments(&self) -> Vec<&str> {
        let mut out: Vec<&str> = match &self.last {
            Some(last) => vec![self.first.as_str(), last.as_str()],
            None => vec![self.first.as_str()],
        };
        out.sort_by_key(|f| std::cmp::Reverse(f.len()));
        out
    }
}

fn sanitize(fragment: &str) -> String {
    fragment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Containment score of the name fragments within a login: the share of the
/// login covered by matched fragments. `0.0` when nothing matches, `1.0`
/// when the fragments cover the login entirely.
pub fn substring_score(login: &str, parts: &NameParts) -> f64 {
    let login = login.to_lowercase();
    if login.is_empty() {
        return 0.0;
    }
    let mut matched_len = 0usize;
    let mut best_single = 0usize;
    for fragment in parts.fragments() {
        // Two-character fragments and shorter are noise.
        if fragment.len() > 2 && login.contains(fragment) {
            matched_len += fragment.len();
            best_single = best_single.max(fragment.len());
        }
    }
    let covered = matched_len.min(login.len()).max(best_single);
    covered as f64 / login.len() as f64
}

/// Dice coefficient over character bigrams. `1.0` for identical strings,
/// `0.0` for no shared bigrams.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }
    let mut b_pool = b_bigrams.clone();
    let mut shared = 0usize;
    for bigram in &a_bigrams {
        if let Some(pos) = b_pool.iter().position(|other| other == bigram) {
            b_pool.swap_remove(pos);
            shared += 1;
        }
    }
    2.0 * shared as f64 / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn bigrams(s: &str) -> Vec<[char; 2]> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| [w[0], w[1]]).collect()
}

/// Fuzzy score for a candidate display name against the target person:
/// a 0.6/0.4 blend of whole-string similarity and first/last containment.
pub fn blended_name_score(candidate: &str, target: &str, parts: &NameParts) -> f64 {
    let whole = similarity(candidate, target);
    let candidate_lower = candidate.to_lowercase();
    let mut containment = 0.0;
    let fragment_weight = match parts.last {
        Some(_) => 0.5,
        None => 1.0,
    };
    if candidate_lower.contains(&parts.first) {
        containment += fragment_weight;
    }
    if let Some(last) = &parts.last {
        if candidate_lower.contains(last) {
            containment += fragment_weight;
        }
    }
    0.6 * whole + 0.4 * containment
}
