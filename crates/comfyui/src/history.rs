//! Parsing of the ComfyUI `/history/{prompt_id}` response.
//!
//! The endpoint returns `{}` while a job is still queued, and
//! `{"<prompt_id>": {"status": {...}, "outputs": {...}}}` once the backend
//! has a record for it. This module turns that body into a [`JobStatus`].
//!
//! Output image selection is deterministic: output nodes are visited in
//! ascending numeric id order (non-numeric ids sort after numeric ones,
//! lexicographically), and images within a node keep the backend's order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Folder type assumed when the backend omits it.
pub const DEFAULT_FOLDER_TYPE: &str = "output";

/// Descriptor of an image stored by the backend, as reported in job
/// outputs and accepted by `/view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output`, `input` or `temp`.
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    DEFAULT_FOLDER_TYPE.to_string()
}

/// Backend-reported state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// No history record yet; the job is still queued.
    Pending,
    /// A record exists but is neither successful nor failed.
    Processing { status_str: Option<String> },
    /// Reported success. `images` is in selection order and may be empty
    /// if the backend produced no image outputs.
    Completed { images: Vec<ImageRef> },
    /// Reported failure, with the backend's error message when present.
    Failed { error: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    status: Option<HistoryStatus>,
    #[serde(default)]
    outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryStatus {
    #[serde(default)]
    status_str: Option<String>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    // Some builds nest outputs under `status`.
    #[serde(default)]
    outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeOutput {
    #[serde(default)]
    images: Vec<ImageRef>,
}

/// Interpret a `/history/{prompt_id}` body.
pub fn parse_history(
    prompt_id: &str,
    body: &serde_json::Value,
) -> Result<JobStatus, serde_json::Error> {
    let Some(entry) = body.get(prompt_id) else {
        return Ok(JobStatus::Pending);
    };
    let entry: HistoryEntry = serde_json::from_value(entry.clone())?;
    let status = entry.status.unwrap_or_default();

    match status.status_str.as_deref() {
        Some(STATUS_SUCCESS) => {
            let outputs = if entry.outputs.is_empty() {
                &status.outputs
            } else {
                &entry.outputs
            };
            Ok(JobStatus::Completed {
                images: ordered_images(outputs),
            })
        }
        Some(STATUS_ERROR) => Ok(JobStatus::Failed {
            error: execution_error_message(&status.messages),
        }),
        other => Ok(JobStatus::Processing {
            status_str: other.map(str::to_string),
        }),
    }
}

/// Sort key placing numeric node ids first, in numeric order.
fn node_order(id: &str) -> (bool, u64, &str) {
    match id.parse::<u64>() {
        Ok(n) => (false, n, id),
        Err(_) => (true, 0, id),
    }
}

fn ordered_images(outputs: &BTreeMap<String, NodeOutput>) -> Vec<ImageRef> {
    let mut nodes: Vec<(&String, &NodeOutput)> = outputs.iter().collect();
    nodes.sort_by(|(a, _), (b, _)| node_order(a).cmp(&node_order(b)));
    nodes
        .into_iter()
        .flat_map(|(_, output)| output.images.iter().cloned())
        .collect()
}

/// Pull a readable message out of the `execution_error` entry in
/// `status.messages` (`[["execution_error", {...}], ...]`).
fn execution_error_message(messages: &[serde_json::Value]) -> Option<String> {
    messages.iter().find_map(|message| {
        let pair = message.as_array()?;
        if pair.first()?.as_str()? != "execution_error" {
            return None;
        }
        let data = pair.get(1)?;
        let text = data.get("exception_message")?.as_str()?.trim();
        match data.get("node_id").and_then(|n| n.as_str()) {
            Some(node) => Some(format!("node {node}: {text}")),
            None => Some(text.to_string()),
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_entry_is_pending() {
        assert_eq!(parse_history("abc", &json!({})).unwrap(), JobStatus::Pending);
    }

    #[test]
    fn success_with_image() {
        let body = json!({
            "abc": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {"7": {"images": [{"filename": "x.png", "subfolder": "", "type": "output"}]}}
            }
        });
        assert_eq!(
            parse_history("abc", &body).unwrap(),
            JobStatus::Completed {
                images: vec![ImageRef {
                    filename: "x.png".into(),
                    subfolder: String::new(),
                    folder_type: "output".into(),
                }]
            }
        );
    }

    #[test]
    fn outputs_nested_under_status_are_accepted() {
        let body = json!({
            "abc": {
                "status": {
                    "status_str": "success",
                    "outputs": {"9": {"images": [{"filename": "nested.png"}]}}
                }
            }
        });
        match parse_history("abc", &body).unwrap() {
            JobStatus::Completed { images } => {
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].filename, "nested.png");
                assert_eq!(images[0].folder_type, DEFAULT_FOLDER_TYPE);
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn success_without_images_is_completed_empty() {
        let body = json!({"abc": {"status": {"status_str": "success"}, "outputs": {"5": {}}}});
        assert_eq!(
            parse_history("abc", &body).unwrap(),
            JobStatus::Completed { images: vec![] }
        );
    }

    #[test]
    fn images_ordered_by_numeric_node_id() {
        let body = json!({
            "abc": {
                "status": {"status_str": "success"},
                "outputs": {
                    "save": {"images": [{"filename": "named.png"}]},
                    "10": {"images": [{"filename": "ten.png"}]},
                    "9": {"images": [{"filename": "nine_a.png"}, {"filename": "nine_b.png"}]}
                }
            }
        });
        let JobStatus::Completed { images } = parse_history("abc", &body).unwrap() else {
            panic!("Expected Completed");
        };
        let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, ["nine_a.png", "nine_b.png", "ten.png", "named.png"]);
    }

    #[test]
    fn error_extracts_exception_message() {
        let body = json!({
            "abc": {
                "status": {
                    "status_str": "error",
                    "messages": [
                        ["execution_start", {"prompt_id": "abc"}],
                        ["execution_error", {"node_id": "5", "exception_message": "CUDA out of memory\n"}]
                    ]
                },
                "outputs": {}
            }
        });
        assert_eq!(
            parse_history("abc", &body).unwrap(),
            JobStatus::Failed {
                error: Some("node 5: CUDA out of memory".into())
            }
        );
    }

    #[test]
    fn error_without_messages_has_no_detail() {
        let body = json!({"abc": {"status": {"status_str": "error"}}});
        assert_eq!(
            parse_history("abc", &body).unwrap(),
            JobStatus::Failed { error: None }
        );
    }

    #[test]
    fn other_status_is_processing() {
        let body = json!({"abc": {"status": {"status_str": "running"}}});
        assert_eq!(
            parse_history("abc", &body).unwrap(),
            JobStatus::Processing {
                status_str: Some("running".into())
            }
        );
    }

    #[test]
    fn other_prompt_ids_are_ignored() {
        let body = json!({"other": {"status": {"status_str": "success"}}});
        assert_eq!(parse_history("abc", &body).unwrap(), JobStatus::Pending);
    }

    #[test]
    fn malformed_entry_is_an_error() {
        let body = json!({"abc": {"outputs": "not a map"}});
        assert!(parse_history("abc", &body).is_err());
    }
}
