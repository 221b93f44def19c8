//! Message sets for sequence-number and UID commands.

use std::fmt;

use super::{SeqNum, Uid};

/// A set of message sequence numbers (`1`, `2:5`, `7:*`, `*`, `1,3:4`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// One message.
    Single(SeqNum),
    /// Inclusive range.
    Range(SeqNum, SeqNum),
    /// From a message to the last one (`n:*`).
    From(SeqNum),
    /// The last message (`*`), or all of them in a range context.
    All,
    /// Comma-joined members.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// A single message; `None` for zero.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// An inclusive range; `None` if either end is zero.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::From(start) => write!(f, "{start}:*"),
            Self::All => f.write_str("*"),
            Self::Set(members) => write_joined(f, members),
        }
    }
}

/// A set of UIDs, with the same shape as [`SequenceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// One UID.
    Single(Uid),
    /// Inclusive range.
    Range(Uid, Uid),
    /// From a UID to the highest one.
    From(Uid),
    /// The highest UID (`*`).
    All,
    /// Comma-joined members.
    Set(Vec<Self>),
}

impl UidSet {
    /// Expands a server-sent uid-set such as `304,319:320` into its members.
    ///
    /// Returns `None` on malformed input, zero values or `*`, which the
    /// server never sends in APPENDUID or COPYUID.
    #[must_use]
    pub fn expand(text: &str) -> Option<Vec<Uid>> {
        let mut uids = Vec::new();
        for member in text.split(',') {
            match member.split_once(':') {
                Some((a, b)) => {
                    let a: u32 = a.parse().ok()?;
                    let b: u32 = b.parse().ok()?;
                    let (low, high) = if a <= b { (a, b) } else { (b, a) };
                    for n in low..=high {
                        uids.push(Uid::new(n)?);
                    }
                }
                None => uids.push(Uid::new(member.parse().ok()?)?),
            }
        }
        Some(uids)
    }
}

impl From<Uid> for UidSet {
    fn from(uid: Uid) -> Self {
        Self::Single(uid)
    }
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::From(start) => write!(f, "{start}:*"),
            Self::All => f.write_str("*"),
            Self::Set(members) => write_joined(f, members),
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, members: &[T]) -> fmt::Result {
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{member}")?;
    }
    Ok(())
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
    use super::*;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn sequence_set_display() {
        assert_eq!(SequenceSet::single(4).unwrap().to_string(), "4");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
        assert_eq!(SequenceSet::From(SeqNum::new(7).unwrap()).to_string(), "7:*");
        let set = SequenceSet::Set(vec![
            SequenceSet::single(1).unwrap(),
            SequenceSet::range(3, 4).unwrap(),
            SequenceSet::All,
        ]);
        assert_eq!(set.to_string(), "1,3:4,*");
    }

    #[test]
    fn zero_is_not_a_sequence_number() {
        assert!(SequenceSet::single(0).is_none());
        assert!(SequenceSet::range(0, 5).is_none());
    }

    #[test]
    fn uid_set_display() {
        let set = UidSet::Set(vec![uid(9).into(), UidSet::Range(uid(20), uid(22))]);
        assert_eq!(set.to_string(), "9,20:22");
    }

    #[test]
    fn expand_server_uid_sets() {
        assert_eq!(UidSet::expand("3955").unwrap(), vec![uid(3955)]);
        assert_eq!(
            UidSet::expand("304,319:320").unwrap(),
            vec![uid(304), uid(319), uid(320)]
        );
        assert_eq!(UidSet::expand("5:3").unwrap(), vec![uid(3), uid(4), uid(5)]);
        assert!(UidSet::expand("1:*").is_none());
        assert!(UidSet::expand("0").is_none());
        assert!(UidSet::expand("").is_none());
    }
}
