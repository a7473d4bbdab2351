//! Protocol configuration types.

use super::defaults::default_max_room_id_length;
use serde::{Deserialize, Serialize};

/// Limits applied to client-supplied identifiers.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    /// Maximum length for room ids and robot labels (bytes)
    #[serde(default = "default_max_room_id_length")]
    pub max_room_id_length: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_room_id_length: default_max_room_id_length(),
        }
    }
}
