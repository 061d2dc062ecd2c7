use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::offset::Offset;

/// Everything the coordinator may answer to a completion request.
///
/// Callers branch on this closed enumeration rather than on errors;
/// `Failed` is reserved for protocol violations that must not be retried
/// verbatim, while retransmissions of already-applied messages get
/// `Processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CompletionResponse {
    /// The addressed replica is the committer: build and upload the segment
    /// up to `offset`, within the deadline hint.
    #[serde(rename = "COMMIT")]
    Commit {
        offset: Offset,

        #[serde(rename = "buildTimeMs")]
        build_time_ms: u64,
    },

    /// No decision yet; retry shortly.
    #[serde(rename = "HOLD")]
    Hold,

    /// Another replica is committing at `offset`; keep consuming until the
    /// local position reaches it, then report again.
    #[serde(rename = "CATCH_UP")]
    CatchUp { offset: Offset },

    /// The replica is aligned with the decision; check back for the outcome.
    #[serde(rename = "KEEP_ALIVE")]
    KeepAlive,

    /// This coordinator instance is not authoritative; retry elsewhere.
    #[serde(rename = "NOT_LEADER")]
    NotLeader,

    /// Protocol violation; the caller must not retry the same payload.
    #[serde(rename = "FAILED")]
    Failed,

    /// Idempotent acknowledgment of a message that is already handled.
    #[serde(rename = "PROCESSED")]
    Processed,
}

impl CompletionResponse {
    pub fn status(&self) -> &'static str {
        match self {
            CompletionResponse::Commit { .. } => "COMMIT",
            CompletionResponse::Hold => "HOLD",
            CompletionResponse::CatchUp { .. } => "CATCH_UP",
            CompletionResponse::KeepAlive => "KEEP_ALIVE",
            CompletionResponse::NotLeader => "NOT_LEADER",
            CompletionResponse::Failed => "FAILED",
            CompletionResponse::Processed => "PROCESSED",
        }
    }
}

impl Display for CompletionResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CompletionResponse::Commit {
                offset,
                build_time_ms,
            } => {
                write!(f, "COMMIT(offset={}, buildTimeMs={})", offset, build_time_ms)
            }
            CompletionResponse::CatchUp { offset } => write!(f, "CATCH_UP(offset={})", offset),
            other => write!(f, "{}", other.status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let response = CompletionResponse::CatchUp {
            offset: Offset::new(105),
        };
        assert_eq!(
            r#"{"status":"CATCH_UP","offset":105}"#,
            serde_json::to_string(&response).unwrap()
        );

        let response = CompletionResponse::KeepAlive;
        assert_eq!(
            r#"{"status":"KEEP_ALIVE"}"#,
            serde_json::to_string(&response).unwrap()
        );
    }

    #[test]
    fn test_round_trip() {
        let response = CompletionResponse::Commit {
            offset: Offset::new(105),
            build_time_ms: 120_000,
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: CompletionResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn test_display() {
        assert_eq!("HOLD", CompletionResponse::Hold.to_string());
        assert_eq!(
            "CATCH_UP(offset=7)",
            CompletionResponse::CatchUp {
                offset: Offset::new(7)
            }
            .to_string()
        );
    }
}
