// ── Subscription ledger ──
//
// The set of topics the caller currently wants pushed. It is the source of
// truth the session replays after every (re)connect, not a mirror of what
// the daemon believes. Synchronization is the session's job: the ledger
// lives next to the outbound link under one lock.

use std::collections::HashSet;

use gantry_api::Topic;

/// Durable topic membership for server and host topics.
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    topics: HashSet<Topic>,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a topic. Returns `false` if it was already present.
    pub fn insert(&mut self, topic: Topic) -> bool {
        self.topics.insert(topic)
    }

    /// Remove a topic. Returns `false` if it was never added.
    pub fn remove(&mut self, topic: &Topic) -> bool {
        self.topics.remove(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }

    /// Sorted copy of the current topics.
    pub fn snapshot(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.topics.iter().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_api::TopicKind;

    #[test]
    fn insert_is_idempotent() {
        let mut ledger = SubscriptionLedger::new();
        assert!(ledger.insert(Topic::server("S1")));
        assert!(!ledger.insert(Topic::server("S1")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn server_and_host_topics_are_independent() {
        let mut ledger = SubscriptionLedger::new();
        ledger.insert(Topic::server("node-1"));
        ledger.insert(Topic::host("node-1"));
        assert_eq!(ledger.len(), 2);

        assert!(ledger.remove(&Topic::new(TopicKind::Host, "node-1")));
        assert_eq!(ledger.snapshot(), vec![Topic::server("node-1")]);
    }

    #[test]
    fn removing_unknown_topic_is_noop() {
        let mut ledger = SubscriptionLedger::new();
        assert!(!ledger.remove(&Topic::server("ghost")));
        assert!(ledger.is_empty());
    }

    #[test]
    fn snapshot_is_order_independent() {
        let mut a = SubscriptionLedger::new();
        a.insert(Topic::server("B"));
        a.insert(Topic::server("A"));

        let mut b = SubscriptionLedger::new();
        b.insert(Topic::server("A"));
        b.insert(Topic::server("B"));

        assert_eq!(a.snapshot(), b.snapshot());
    }
}
