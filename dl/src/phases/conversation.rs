//! Bounded per-phase conversation
//!
//! A phase's working context grows with every model exchange. The
//! conversation caps that growth with a fixed policy: keep the head and
//! tail, always retain error/decision entries, and either drop or digest
//! the middle. The mode is chosen at construction, never implicitly.

use serde::{Deserialize, Serialize};

/// How entries removed by pruning are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PruneMode {
    /// Removed entries vanish
    #[default]
    Drop,
    /// Removed entries are folded into one synthetic digest entry
    Summarize,
}

/// Pruning policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrunePolicy {
    /// Prune once the conversation exceeds this many entries
    pub cap: usize,
    /// Entries preserved from the start
    pub keep_head: usize,
    /// Entries preserved from the end
    pub keep_tail: usize,
    pub mode: PruneMode,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            cap: 50,
            keep_head: 5,
            keep_tail: 20,
            mode: PruneMode::Drop,
        }
    }
}

/// Importance tag on a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    #[default]
    Normal,
    /// Retained through pruning
    Error,
    /// Retained through pruning
    Decision,
}

/// One entry in a phase's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub text: String,
    pub tag: EntryTag,
}

impl ConversationEntry {
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: EntryTag::Normal,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: EntryTag::Error,
        }
    }

    pub fn decision(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: EntryTag::Decision,
        }
    }
}

/// Bounded conversation with automatic pruning
#[derive(Debug, Clone)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
    policy: PrunePolicy,
    pruned_total: usize,
}

impl Conversation {
    pub fn new(policy: PrunePolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
            pruned_total: 0,
        }
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.policy.cap {
            self.prune();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Total entries removed by pruning so far
    pub fn pruned_total(&self) -> usize {
        self.pruned_total
    }

    /// Render the conversation as prompt context
    pub fn render(&self) -> String {
        self.entries.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join("\n")
    }

    fn prune(&mut self) {
        let head_end = self.policy.keep_head.min(self.entries.len());
        let tail_start = self.entries.len().saturating_sub(self.policy.keep_tail).max(head_end);

        let mut kept: Vec<ConversationEntry> = self.entries[..head_end].to_vec();
        let middle = &self.entries[head_end..tail_start];

        let retained: Vec<ConversationEntry> = middle
            .iter()
            .filter(|e| e.tag != EntryTag::Normal)
            .cloned()
            .collect();
        let removed = middle.len() - retained.len();
        self.pruned_total += removed;

        if self.policy.mode == PruneMode::Summarize && removed > 0 {
            let first_line = middle
                .iter()
                .find(|e| e.tag == EntryTag::Normal)
                .map(|e| e.text.lines().next().unwrap_or("").to_string())
                .unwrap_or_default();
            kept.push(ConversationEntry::normal(format!(
                "[pruned {} earlier exchanges, starting with: {}]",
                removed, first_line
            )));
        }
        kept.extend(retained);
        kept.extend_from_slice(&self.entries[tail_start..]);

        self.entries = kept;
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(PrunePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(policy: PrunePolicy, n: usize) -> Conversation {
        let mut conversation = Conversation::new(policy);
        for i in 0..n {
            conversation.push(ConversationEntry::normal(format!("entry {}", i)));
        }
        conversation
    }

    #[test]
    fn test_no_prune_under_cap() {
        let conversation = filled(PrunePolicy::default(), 50);
        assert_eq!(conversation.len(), 50);
        assert_eq!(conversation.pruned_total(), 0);
    }

    #[test]
    fn test_prune_keeps_head_and_tail() {
        let conversation = filled(PrunePolicy::default(), 51);

        // 5 head + 20 tail survive the first prune
        assert_eq!(conversation.len(), 25);
        assert_eq!(conversation.entries()[0].text, "entry 0");
        assert_eq!(conversation.entries()[4].text, "entry 4");
        assert_eq!(conversation.entries()[5].text, "entry 31");
        assert_eq!(conversation.entries().last().unwrap().text, "entry 50");
    }

    #[test]
    fn test_prune_retains_tagged_entries() {
        let mut conversation = Conversation::new(PrunePolicy::default());
        for i in 0..20 {
            conversation.push(ConversationEntry::normal(format!("entry {}", i)));
        }
        conversation.push(ConversationEntry::error("rate limited"));
        conversation.push(ConversationEntry::decision("chose edit over rewrite"));
        for i in 0..29 {
            conversation.push(ConversationEntry::normal(format!("late {}", i)));
        }

        // 51 entries pushed, prune fired; tagged middle entries survive
        let texts: Vec<&str> = conversation.entries().iter().map(|e| e.text.as_str()).collect();
        assert!(texts.contains(&"rate limited"));
        assert!(texts.contains(&"chose edit over rewrite"));
    }

    #[test]
    fn test_summarize_mode_inserts_digest() {
        let policy = PrunePolicy {
            mode: PruneMode::Summarize,
            ..Default::default()
        };
        let conversation = filled(policy, 51);

        let digest = &conversation.entries()[5];
        assert!(digest.text.starts_with("[pruned"));
        assert!(digest.text.contains("entry 5"));
        // head 5 + digest + tail 20
        assert_eq!(conversation.len(), 26);
    }

    #[test]
    fn test_repeated_pruning_stays_bounded() {
        let mut conversation = Conversation::new(PrunePolicy::default());
        for i in 0..500 {
            conversation.push(ConversationEntry::normal(format!("entry {}", i)));
        }
        assert!(conversation.len() <= 51);
        assert!(conversation.pruned_total() > 400);
    }

    #[test]
    fn test_render_joins_entries() {
        let mut conversation = Conversation::default();
        conversation.push(ConversationEntry::normal("a"));
        conversation.push(ConversationEntry::normal("b"));
        assert_eq!(conversation.render(), "a\nb");
    }
}
