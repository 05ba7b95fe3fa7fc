use std::fmt;

use crate::{AppError, AppResult};

const SEPARATOR: char = ':';

/// Two distinct display names in sorted order. `(a, b)` and `(b, a)` build the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: String,
    high: String,
}

impl ParticipantPair {
    pub fn new(a: &str, b: &str) -> AppResult<Self> {
        if a == b {
            return Err(AppError::SelfChat);
        }
        if a.contains(SEPARATOR) || b.contains(SEPARATOR) {
            return Err(AppError::MalformedPayload);
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            low: low.to_owned(),
            high: high.to_owned(),
        })
    }

    /// Primary key of the conversation between the two.
    pub fn key(&self) -> String {
        format!("{}{SEPARATOR}{}", self.low, self.high)
    }

    pub fn participants(&self) -> [String; 2] {
        [self.low.clone(), self.high.clone()]
    }

    pub fn other(&self, username: &str) -> Option<&str> {
        if self.low == username {
            Some(&self.high)
        } else if self.high == username {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for ParticipantPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_matter() {
        let ab = ParticipantPair::new("alice", "bob").unwrap();
        let ba = ParticipantPair::new("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.key(), "alice:bob");
        assert_eq!(ba.key(), "alice:bob");
    }

    #[test]
    fn other_participant() {
        let pair = ParticipantPair::new("zed", "amy").unwrap();
        assert_eq!(pair.other("zed"), Some("amy"));
        assert_eq!(pair.other("amy"), Some("zed"));
        assert_eq!(pair.other("carol"), None);
    }

    #[test]
    fn rejects_self_and_separator() {
        assert!(matches!(ParticipantPair::new("amy", "amy"), Err(AppError::SelfChat)));
        assert!(ParticipantPair::new("a:b", "c").is_err());
    }
}
