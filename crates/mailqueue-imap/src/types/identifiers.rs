//! Tags and message identifiers.

use std::fmt;
use std::num::NonZeroU32;

/// Correlation tag echoed back by the server on command completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Wraps a tag string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Returns `None` for zero, which the protocol never assigns.
            #[must_use]
            pub fn new(value: u32) -> Option<Self> {
                NonZeroU32::new(value).map(Self)
            }

            /// The raw value.
            #[must_use]
            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

nonzero_id!(
    /// Message sequence number; shifts when messages are expunged.
    SeqNum
);
nonzero_id!(
    /// Persistent message identifier within one UIDVALIDITY epoch.
    Uid
);
nonzero_id!(
    /// Mailbox UIDVALIDITY; a change invalidates every cached UID.
    UidValidity
);

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
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
    }

    #[test]
    fn values_round_trip() {
        assert_eq!(Uid::new(4294967295).unwrap().get(), u32::MAX);
        assert_eq!(SeqNum::new(12).unwrap().to_string(), "12");
        assert_eq!(Tag::new("x7").as_str(), "x7");
    }

    #[test]
    fn uids_order_numerically() {
        assert!(Uid::new(9).unwrap() < Uid::new(10).unwrap());
    }
}
