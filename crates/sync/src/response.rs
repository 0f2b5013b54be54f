//! The LLM prompt contract and structured response schema.

use crate::llm::LlmError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictResolutionResponse {
    pub all_resolved: bool,
    pub confidence: String,
    pub summary: String,
    pub files: BTreeMap<String, FileResolution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileResolution {
    pub action: FileAction,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Modified,
    Deleted,
}

/// Builds the literal one-shot prompt: workspace path, the
/// default-branch commit hash, the local commit hash and subject, and a
/// sorted ASCII list of conflicted files, asking for a single JSON object
/// with no surrounding text.
pub fn build_prompt(
    workspace_path: &Path,
    default_branch_hash: &str,
    local_commit_hash: &str,
    local_commit_subject: &str,
    conflicted_files: &[String],
) -> String {
    let mut files = conflicted_files.to_vec();
    files.sort();
    let file_list = files.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
    format!(
        "You are resolving a git rebase conflict.\n\n\
         Workspace: {}\n\
         Default-branch commit: {}\n\
         Local commit: {} {}\n\n\
         Conflicted files:\n{}\n\n\
         Resolve every conflict marker in the files listed above, then reply \
         with a single JSON object and no text outside the JSON (a fenced \
         ```json code block around it is fine):\n\
         {{\"all_resolved\": bool, \"confidence\": \"high\"|\"medium\"|\"low\", \
         \"summary\": string, \"files\": {{\"<path>\": {{\"action\": \
         \"modified\"|\"deleted\", \"description\": string}}}}}}",
        workspace_path.display(),
        default_branch_hash,
        local_commit_hash,
        local_commit_subject,
        file_list,
    )
}

/// Extracts and parses the model's structured response, tolerating a fenced
/// code block wrapped around the JSON object.
pub fn parse_response(raw: &str) -> Result<ConflictResolutionResponse, LlmError> {
    let trimmed = raw.trim();
    let json_text = extract_fenced_json(trimmed).unwrap_or(trimmed);
    serde_json::from_str(json_text).map_err(LlmError::InvalidJson)
}

fn extract_fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_open = &text[start + 3..];
    let after_open = after_open
        .strip_prefix("json\r\n")
        .or_else(|| after_open.strip_prefix("json\n"))
        .unwrap_or(after_open);
    let end = after_open.find("```")?;
    Some(after_open[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let raw = r#"{"all_resolved":true,"confidence":"high","summary":"ok","files":{}}"#;
        let resp = parse_response(raw).unwrap();
        assert!(resp.all_resolved);
        assert_eq!(resp.confidence, "high");
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"all_resolved\":true,\"confidence\":\"high\",\"summary\":\"ok\",\"files\":{}}\n```\n";
        let resp = parse_response(raw).unwrap();
        assert!(resp.all_resolved);
    }

    #[test]
    fn rejects_unknown_action() {
        let raw = r#"{"all_resolved":true,"confidence":"high","summary":"ok","files":{"a.rs":{"action":"renamed","description":"x"}}}"#;
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn prompt_lists_files_sorted() {
        let prompt = build_prompt(
            Path::new("/ws"),
            "deadbeef",
            "cafe1234",
            "fix thing",
            &["b.rs".to_string(), "a.rs".to_string()],
        );
        let a_idx = prompt.find("- a.rs").unwrap();
        let b_idx = prompt.find("- b.rs").unwrap();
        assert!(a_idx < b_idx);
    }
}
