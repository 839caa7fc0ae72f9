//! Discovery loop bookkeeping (§4.5 step 1-2): track which
//! `audio:stream:*` keys already have a spawned per-stream task, so a
//! repeated scan doesn't double-spawn.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct StreamRegistry {
    active: HashSet<String>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Given the current full scan of stream keys and a predicate telling
    /// whether `transcription:complete:{session_id}` already exists for a
    /// given stream, return the set that should get a newly spawned task.
    pub fn newly_discovered<'a>(
        &mut self,
        observed: impl IntoIterator<Item = &'a str>,
        already_complete: impl Fn(&str) -> bool,
    ) -> Vec<String> {
        let mut fresh = Vec::new();
        for stream in observed {
            if self.active.contains(stream) {
                continue;
            }
            if already_complete(stream) {
                continue;
            }
            self.active.insert(stream.to_string());
            fresh.push(stream.to_string());
        }
        fresh
    }

    pub fn retire(&mut self, stream: &str) {
        self.active.remove(stream);
    }

    pub fn is_active(&self, stream: &str) -> bool {
        self.active.contains(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_new_streams_only_once() {
        let mut reg = StreamRegistry::new();
        let first = reg.newly_discovered(["audio:stream:a"], |_| false);
        assert_eq!(first, vec!["audio:stream:a".to_string()]);
        let second = reg.newly_discovered(["audio:stream:a"], |_| false);
        assert!(second.is_empty());
    }

    #[test]
    fn skips_streams_already_marked_complete() {
        let mut reg = StreamRegistry::new();
        let fresh = reg.newly_discovered(["audio:stream:a"], |_| true);
        assert!(fresh.is_empty());
        assert!(!reg.is_active("audio:stream:a"));
    }

    #[test]
    fn retiring_allows_rediscovery() {
        let mut reg = StreamRegistry::new();
        reg.newly_discovered(["audio:stream:a"], |_| false);
        reg.retire("audio:stream:a");
        let fresh = reg.newly_discovered(["audio:stream:a"], |_| false);
        assert_eq!(fresh, vec!["audio:stream:a".to_string()]);
    }
}
