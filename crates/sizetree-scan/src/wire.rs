//! Messages exchanged between the pool and its worker units.
//!
//! On the wire a message is either the literal string `"stop"` or an array of
//! path strings. A reply is always an array of file records, possibly empty.

use std::fmt;
use std::path::PathBuf;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use sizetree_core::FileRecord;

/// Literal used for the stop signal.
pub const STOP_SIGNAL: &str = "stop";

/// A message sent from the pool to a worker unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Abandon the current batch, if any.
    Stop,
    /// Stat every path and reply with the survivors.
    Batch(Vec<PathBuf>),
}

/// What a worker unit sends back for every batch.
pub type WorkerReply = Vec<FileRecord>;

impl Serialize for WorkerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Stop => serializer.serialize_str(STOP_SIGNAL),
            Self::Batch(paths) => paths.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WorkerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MessageVisitor;

        impl<'de> Visitor<'de> for MessageVisitor {
            type Value = WorkerMessage;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "\"{STOP_SIGNAL}\" or an array of paths")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value == STOP_SIGNAL {
                    Ok(WorkerMessage::Stop)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(value), &self))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut paths = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(path) = seq.next_element::<PathBuf>()? {
                    paths.push(path);
                }
                Ok(WorkerMessage::Batch(paths))
            }
        }

        deserializer.deserialize_any(MessageVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_a_bare_string() {
        assert_eq!(serde_json::to_string(&WorkerMessage::Stop).unwrap(), "\"stop\"");
        let parsed: WorkerMessage = serde_json::from_str("\"stop\"").unwrap();
        assert_eq!(parsed, WorkerMessage::Stop);
    }

    #[test]
    fn test_batch_is_a_path_array() {
        let message = WorkerMessage::Batch(vec!["/a/x.txt".into(), "/a/y.md".into()]);
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"["/a/x.txt","/a/y.md"]"#);

        let empty: WorkerMessage = serde_json::from_str("[]").unwrap();
        assert_eq!(empty, WorkerMessage::Batch(Vec::new()));
    }

    #[test]
    fn test_rejects_other_shapes() {
        assert!(serde_json::from_str::<WorkerMessage>("\"go\"").is_err());
        assert!(serde_json::from_str::<WorkerMessage>("42").is_err());
        assert!(serde_json::from_str::<WorkerMessage>(r#"{"paths":[]}"#).is_err());
    }

    #[test]
    fn test_reply_shape() {
        let reply: WorkerReply = vec![FileRecord::new("/a/x.txt", 1500)];
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["size"], 1500);
        assert_eq!(json[0]["name"], "x.txt");

        let empty: WorkerReply = serde_json::from_str("[]").unwrap();
        assert!(empty.is_empty());
    }
}
