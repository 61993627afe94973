//! Canonical username pattern synthesis.

use crate::scoring::NameParts;

/// Ordered candidate usernames for a person, most common convention first.
/// Deduplicated; order is the probe order.
pub fn username_candidates(parts: &NameParts) -> Vec<String> {
    let first = &parts.first;
    let mut candidates = match &parts.last {
        Some(last) => {
            let mut list = vec![
                format!("{first}{last}"),
                format!("{first}.{last}"),
                format!("{first}-{last}"),
                format!("{first}_{last}"),
            ];
            if let Some(initial) = first.chars().next() {
                list.push(format!("{initial}{last}"));
            }
            if let Some(initial) = last.chars().next() {
                list.push(format!("{first}{initial}"));
            }
            list.push(format!("{last}{first}"));
            list.push(first.clone());
            list
        }
        None => vec![first.clone()],
    };
    candidates.retain(|c| c.len() > 2);
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}
