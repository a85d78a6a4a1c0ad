//! The sequence id type.

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// The sequence id type. Printers send it either as a number or as a
/// numeric string depending on the firmware and the command.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, FromStr)]
#[serde(untagged)]
#[display("{0}")]
pub enum SequenceId {
    /// An integer sequence id.
    Integer(u32),
    /// A string sequence id.
    String(String),
}

impl Default for SequenceId {
    fn default() -> Self {
        Self::Integer(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_id_deserialize_either_form() {
        let id: SequenceId = serde_json::from_str("12").unwrap();
        assert_eq!(id, SequenceId::Integer(12));

        let id: SequenceId = serde_json::from_str(r#""12""#).unwrap();
        assert_eq!(id, SequenceId::String("12".to_string()));
    }
}
