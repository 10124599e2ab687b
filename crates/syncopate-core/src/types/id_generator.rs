use std::fmt;

use serde::{Deserialize, Serialize};

/// The id generation strategy of an entity type. Immutable after
/// registration; defaults to auto-increment when the payload omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneratorKind {
    #[default]
    AutoIncrement,
    Uuid,
    Cuid,
    Custom,
}

impl IdGeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoIncrement => "auto_increment",
            Self::Uuid => "uuid",
            Self::Cuid => "cuid",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for IdGeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
