use serde::{Deserialize, Serialize};

/// Synthetic payload pushed by `ferry run` producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub producer: usize,
    pub seq: u64,
}
