use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One provider row, keyed by the provider's own column names.
pub type RawRow = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query: Option<String>,
    pub rows: Vec<RawRow>,
}
