//! Per-shard log entry format (spec §4.G, §6): one JSON line per entry,
//! `Delete{recid}` or `Insert{cols, rows}`. Replay order is write order.

use columnstore_core::{RecId, Value};
use serde::{Deserialize, Serialize};

/// One durable operation against a shard's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LogEntry {
    /// Tombstone a row.
    Delete {
        /// The row being deleted.
        recid: RecId,
    },
    /// Append one batch of rows.
    Insert {
        /// Column names, in the same order as each row's values.
        cols: Vec<String>,
        /// One `Vec<Value>` per row, ordered to match `cols`.
        rows: Vec<Vec<Value>>,
    },
}

impl LogEntry {
    /// Render as one log line: `"delete <json>\n"` or `"insert <json>\n"`
    /// (spec §6 on-disk layout).
    pub fn to_line(&self) -> String {
        let (tag, payload) = match self {
            LogEntry::Delete { recid } => ("delete", serde_json::to_string(&LineBody::Delete { recid: *recid })),
            LogEntry::Insert { cols, rows } => (
                "insert",
                serde_json::to_string(&LineBody::Insert {
                    cols: cols.clone(),
                    rows: rows.clone(),
                }),
            ),
        };
        format!("{tag} {}\n", payload.expect("LogEntry is always JSON-serializable"))
    }

    /// Parse one line previously produced by [`LogEntry::to_line`].
    pub fn from_line(line: &str) -> Result<Self, super::DurabilityError> {
        let (tag, rest) = line
            .split_once(' ')
            .ok_or_else(|| super::DurabilityError::Corrupt("log line missing op tag".into()))?;
        let body: LineBody = serde_json::from_str(rest.trim_end())
            .map_err(|e| super::DurabilityError::Corrupt(e.to_string()))?;
        match (tag, body) {
            ("delete", LineBody::Delete { recid }) => Ok(LogEntry::Delete { recid }),
            ("insert", LineBody::Insert { cols, rows }) => Ok(LogEntry::Insert { cols, rows }),
            _ => Err(super::DurabilityError::Corrupt(format!("log op/body mismatch: {tag}"))),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LineBody {
    Delete { recid: RecId },
    Insert { cols: Vec<String>, rows: Vec<Vec<Value>> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_round_trips_through_a_line() {
        let entry = LogEntry::Delete { recid: 42 };
        let line = entry.to_line();
        assert!(line.starts_with("delete "));
        assert_eq!(LogEntry::from_line(&line).unwrap(), entry);
    }

    #[test]
    fn insert_round_trips_through_a_line() {
        let entry = LogEntry::Insert {
            cols: vec!["a".into(), "b".into()],
            rows: vec![vec![Value::Int64(1), Value::Null]],
        };
        let line = entry.to_line();
        assert!(line.starts_with("insert "));
        assert_eq!(LogEntry::from_line(&line).unwrap(), entry);
    }
}
