//! Platform identifiers
//!
//! Subjects, groups and messages are opaque integers assigned by the
//! messaging platform. They are wrapped so that a subject id can never be
//! passed where a group id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw platform value
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

platform_id!(
    /// Member (user) identifier
    SubjectId
);
platform_id!(
    /// Group (chat) identifier; negative for supergroups on Telegram
    GroupId
);
platform_id!(
    /// Message identifier, unique within a group
    MessageId
);

/// Key of a pending verification: one member in one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerificationKey {
    pub subject: SubjectId,
    pub group: GroupId,
}

impl VerificationKey {
    pub fn new(subject: impl Into<SubjectId>, group: impl Into<GroupId>) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.subject, self.group)
    }
}
