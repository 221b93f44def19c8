//! Per-connection tag counter.

use crate::types::Tag;

/// Produces `x1`, `x2`, ... for one physical connection.
///
/// Owned by the engine; a fresh connection calls [`TagCounter::reset`].
#[derive(Debug, Clone)]
pub struct TagCounter {
    prefix: &'static str,
    next: u64,
}

impl TagCounter {
    /// A counter whose first tag is `<prefix>1`.
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    /// Hands out the next tag.
    pub fn next_tag(&mut self) -> Tag {
        let tag = Tag::new(format!("{}{}", self.prefix, self.next));
        self.next = self.next.saturating_add(1);
        tag
    }

    /// How many tags were handed out since the last reset.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.next - 1
    }

    /// Starts over at `<prefix>1`.
    pub const fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for TagCounter {
    fn default() -> Self {
        Self::new("x")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_first_tags() {
        let mut tags = TagCounter::default();
        assert_eq!(tags.next_tag().as_str(), "x1");
        assert_eq!(tags.next_tag().as_str(), "x2");
        assert_eq!(tags.issued(), 2);
    }

    #[test]
    fn test_reset() {
        let mut tags = TagCounter::default();
        let _ = tags.next_tag();
        let _ = tags.next_tag();
        tags.reset();
        assert_eq!(tags.issued(), 0);
        assert_eq!(tags.next_tag().as_str(), "x1");
    }

    proptest! {
        #[test]
        fn tags_are_unique_and_increasing(count in 1usize..500) {
            let mut tags = TagCounter::default();
            let mut last = 0u64;
            for _ in 0..count {
                let tag = tags.next_tag();
                let n: u64 = tag.as_str()[1..].parse().unwrap();
                prop_assert!(n > last);
                last = n;
            }
            prop_assert_eq!(last, count as u64);
        }
    }
}
