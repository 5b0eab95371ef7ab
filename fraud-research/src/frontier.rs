//! Topic frontier: the bounded, deduplicated set of search queries for one run

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// A search query tracked by the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub query: String,
    /// 1-5 where 5 is most urgent
    pub priority: u8,
    pub discovered_urls: IndexSet<String>,
    pub explored: bool,
}

/// A follow-up question emitted by analysis, waiting to become a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub question: String,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct TopicFrontier {
    topics: IndexMap<String, Topic>,
    capacity: usize,
}

impl TopicFrontier {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: IndexMap::new(),
            capacity,
        }
    }

    /// Insert a new unexplored topic
    ///
    /// Returns `false` when the normalized query is empty, already present,
    /// or the frontier is full.
    pub fn add_topic(&mut self, query: &str, priority: u8) -> bool {
        let key = normalize_query(query);
        if key.is_empty() || self.topics.contains_key(&key) {
            return false;
        }
        if self.topics.len() >= self.capacity {
            debug!("Frontier full ({} topics), dropping: {}", self.capacity, key);
            return false;
        }

        let priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        debug!("Added topic: [P{}] {}", priority, key);
        self.topics.insert(
            key.clone(),
            Topic {
                query: key,
                priority,
                discovered_urls: IndexSet::new(),
                explored: false,
            },
        );
        true
    }

    /// Add follow-up questions, returning how many became new topics
    pub fn add_questions<I>(&mut self, questions: I) -> usize
    where
        I: IntoIterator<Item = FollowUp>,
    {
        questions
            .into_iter()
            .filter(|q| self.add_topic(&q.question, q.priority))
            .count()
    }

    /// Snapshot of unexplored topics, highest priority first
    ///
    /// Ties keep insertion order. The snapshot is detached from the frontier,
    /// so topics added while it is processed wait for the next round.
    pub fn unexplored_topics(&self) -> Vec<Topic> {
        let mut pending: Vec<Topic> = self
            .topics
            .values()
            .filter(|t| !t.explored)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority));
        pending
    }

    pub fn mark_explored(&mut self, query: &str) {
        if let Some(topic) = self.topics.get_mut(&normalize_query(query)) {
            topic.explored = true;
        }
    }

    pub fn record_urls<I>(&mut self, query: &str, urls: I)
    where
        I: IntoIterator<Item = String>,
    {
        if let Some(topic) = self.topics.get_mut(&normalize_query(query)) {
            topic.discovered_urls.extend(urls);
        }
    }

    pub fn get(&self, query: &str) -> Option<&Topic> {
        self.topics.get(&normalize_query(query))
    }

    pub fn all_explored(&self) -> bool {
        self.topics.values().all(|t| t.explored)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Trim and collapse internal whitespace; case is preserved
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn follow_up(question: &str, priority: u8) -> FollowUp {
        FollowUp {
            question: question.to_string(),
            priority,
        }
    }

    #[test]
    fn test_duplicate_queries_ignored() {
        let mut frontier = TopicFrontier::new(10);
        assert!(frontier.add_topic("ACME fraud", 5));
        assert!(!frontier.add_topic("  ACME   fraud ", 3));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.get("ACME fraud").unwrap().priority, 5);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut frontier = TopicFrontier::new(10);
        assert!(frontier.add_topic("ACME fraud", 5));
        assert!(frontier.add_topic("acme fraud", 5));
        assert_eq!(frontier.len(), 2);
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut frontier = TopicFrontier::new(3);
        let added = frontier.add_questions((0..10).map(|i| follow_up(&format!("q{}", i), 2)));
        assert_eq!(added, 3);
        assert_eq!(frontier.len(), 3);
        assert!(!frontier.add_topic("one more", 5));
        assert_eq!(frontier.len(), frontier.capacity());
    }

    #[test]
    fn test_empty_query_rejected() {
        let mut frontier = TopicFrontier::new(3);
        assert!(!frontier.add_topic("   ", 5));
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_priority_clamped() {
        let mut frontier = TopicFrontier::new(3);
        frontier.add_topic("low", 0);
        frontier.add_topic("high", 9);
        assert_eq!(frontier.get("low").unwrap().priority, 1);
        assert_eq!(frontier.get("high").unwrap().priority, 5);
    }

    #[test]
    fn test_snapshot_orders_by_priority_then_insertion() {
        let mut frontier = TopicFrontier::new(10);
        frontier.add_topic("a", 2);
        frontier.add_topic("b", 5);
        frontier.add_topic("c", 2);
        frontier.add_topic("d", 4);

        let order: Vec<_> = frontier
            .unexplored_topics()
            .into_iter()
            .map(|t| t.query)
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut frontier = TopicFrontier::new(10);
        frontier.add_topic("seed", 5);
        let snapshot = frontier.unexplored_topics();
        frontier.add_topic("late arrival", 5);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(frontier.unexplored_topics().len(), 2);
    }

    #[test]
    fn test_explored_topics_never_reselected() {
        let mut frontier = TopicFrontier::new(10);
        frontier.add_topic("seed", 5);
        frontier.mark_explored("seed");
        frontier.mark_explored("seed");
        assert!(frontier.unexplored_topics().is_empty());
        assert!(frontier.all_explored());

        // Re-adding an explored query does not resurrect it
        assert!(!frontier.add_topic("seed", 5));
        assert!(frontier.unexplored_topics().is_empty());
    }

    #[test]
    fn test_record_urls_deduplicates() {
        let mut frontier = TopicFrontier::new(10);
        frontier.add_topic("seed", 5);
        frontier.record_urls("seed", vec!["https://a".to_string(), "https://a".to_string()]);
        assert_eq!(frontier.get("seed").unwrap().discovered_urls.len(), 1);
    }

    #[test]
    fn test_unique_keys_under_mixed_inserts() {
        let mut frontier = TopicFrontier::new(8);
        for round in 0..5 {
            frontier.add_topic(&format!("topic {}", round % 3), 5);
            frontier.add_questions(vec![
                follow_up(&format!("question {}", round), 3),
                follow_up(&format!("question  {}", round), 3),
            ]);
        }
        let snapshot = frontier.unexplored_topics();
        let mut keys: Vec<_> = snapshot.iter().map(|t| t.query.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), snapshot.len());
        assert!(frontier.len() <= 8);
    }
}
