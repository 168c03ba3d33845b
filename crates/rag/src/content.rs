//! Retrieved content and the normalisation used to deduplicate it.

use std::collections::HashMap;

use recall_memory::MemoryRecord;

/// A snippet produced by one retriever for one request. Never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub text: String,
    /// Id of the retriever that produced it.
    pub source: String,
    pub score: Option<f64>,
}

impl Content {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Distance from the search becomes a similarity: `1 - dist`.
    pub fn from_record(record: MemoryRecord, source: &str) -> Self {
        Self {
            text: record.text,
            source: source.to_string(),
            score: record.dist.map(|dist| 1.0 - dist),
        }
    }
}

/// Lowercased, trimmed, with runs of whitespace collapsed to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Collapse items whose normalised text matches, keeping the highest score
/// in the slot of the first occurrence. Unscored items lose to scored ones.
pub fn dedup_by_text(items: Vec<Content>) -> Vec<Content> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Content> = Vec::with_capacity(items.len());

    for item in items {
        let key = normalize_text(&item.text);
        match seen.get(&key) {
            Some(&slot) => {
                if rank(&item) > rank(&kept[slot]) {
                    kept[slot] = item;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(item);
            }
        }
    }
    kept
}

fn rank(item: &Content) -> f64 {
    item.score.unwrap_or(f64::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_ignores_case_and_spacing() {
        assert_eq!(normalize_text("  Likes\tGREEN  tea \n"), "likes green tea");
    }

    #[test]
    fn duplicates_keep_the_higher_score() {
        let items = vec![
            Content::new("User likes tea", "user-memory").with_score(0.4),
            Content::new("Paris is in France", "knowledge-base").with_score(0.7),
            Content::new("user likes  tea", "knowledge-base").with_score(0.9),
        ];
        let deduped = dedup_by_text(items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].text, "user likes  tea");
        assert_eq!(deduped[0].score, Some(0.9));
        assert_eq!(deduped[1].text, "Paris is in France");
    }

    #[test]
    fn first_occurrence_wins_among_unscored() {
        let items = vec![Content::new("a", "one"), Content::new("A", "two")];
        let deduped = dedup_by_text(items);
        assert_eq!(deduped, vec![Content::new("a", "one")]);
    }

    #[test]
    fn record_distance_becomes_similarity() {
        let record = MemoryRecord {
            id: None,
            text: "likes tea".into(),
            dist: Some(0.25),
        };
        let content = Content::from_record(record, "user-memory");
        assert_eq!(content.score, Some(0.75));
        assert_eq!(content.source, "user-memory");
    }
}
