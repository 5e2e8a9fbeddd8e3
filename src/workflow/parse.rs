use serde::Deserialize;

use crate::error::FailureCause;
use crate::platform::types::AnalysisResponse;
use crate::workflow::types::{ChangeSet, FileChange};

/// Document the analysis service is asked to embed in its `message` string.
#[derive(Debug, Deserialize)]
struct ChangeDocument {
    changes: Vec<FileChange>,
}

/// Decode the analysis response into an ordered change set.
///
/// The service answers `{"message": "<text>", "sources": [...]}` where the
/// text holds a JSON `{"changes": [{"path", "content"}]}` document, either
/// bare or inside a fenced code block.
pub fn parse_change_set(response: &AnalysisResponse) -> Result<ChangeSet, FailureCause> {
    let message = response
        .0
        .get("message")
        .and_then(|m| m.as_str())
        .ok_or_else(|| {
            FailureCause::MalformedResponse("missing string field `message`".to_string())
        })?
        .trim();

    let decode_error = |e: serde_json::Error| {
        FailureCause::MalformedResponse(format!("change list could not be decoded: {e}"))
    };

    // File contents may carry their own fences, so the bare form goes first.
    let document: ChangeDocument = match serde_json::from_str(message) {
        Ok(document) => document,
        Err(bare) => match fenced_block(message) {
            Some(block) => serde_json::from_str(&block).map_err(decode_error)?,
            None => return Err(decode_error(bare)),
        },
    };

    ChangeSet::new(document.changes)
}

/// Lines between the first line opening a fence and the next line that is
/// only a closing fence. An unterminated block runs to the end of the text.
fn fenced_block(message: &str) -> Option<String> {
    let mut lines = message.lines();
    lines.find(|line| line.trim_start().starts_with("```"))?;

    let body: Vec<&str> = lines.take_while(|line| line.trim() != "```").collect();
    Some(body.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(message: &str) -> AnalysisResponse {
        AnalysisResponse(json!({ "message": message, "sources": [] }))
    }

    #[test]
    fn test_parses_bare_document_in_order() {
        let changes = parse_change_set(&response(
            r##"{"changes": [
                {"path": "src/main.rs", "content": "fn main() {}\n"},
                {"path": "README.md", "content": "# Title\n"}
            ]}"##,
        ))
        .unwrap();

        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["src/main.rs", "README.md"]);
        assert_eq!(changes.as_slice()[0].content, "fn main() {}\n");
    }

    #[test]
    fn test_parses_fenced_document_with_prose() {
        let message = "Here is the fix:\n\n```json\n{\"changes\": [{\"path\": \"a.txt\", \"content\": \"a\"}]}\n```\nLet me know!";
        let changes = parse_change_set(&response(message)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.as_slice()[0].path, "a.txt");
    }

    #[test]
    fn test_empty_change_list_is_valid() {
        let changes = parse_change_set(&response(r#"{"changes": []}"#)).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_missing_change_list_is_malformed() {
        let err = parse_change_set(&response(r#"{"summary": "nothing to do"}"#)).unwrap_err();
        match err {
            FailureCause::MalformedResponse(detail) => assert!(detail.contains("changes")),
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn test_missing_message_is_malformed() {
        let err = parse_change_set(&AnalysisResponse(json!({ "sources": [] }))).unwrap_err();
        assert!(matches!(err, FailureCause::MalformedResponse(_)));
    }

    #[test]
    fn test_change_without_content_is_malformed() {
        let err = parse_change_set(&response(r#"{"changes": [{"path": "a.txt"}]}"#)).unwrap_err();
        assert!(matches!(err, FailureCause::MalformedResponse(_)));
    }

    #[test]
    fn test_prose_only_message_is_malformed() {
        let err = parse_change_set(&response("I could not find anything to change.")).unwrap_err();
        assert!(matches!(err, FailureCause::MalformedResponse(_)));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let err = parse_change_set(&response(
            r#"{"changes": [
                {"path": "a.txt", "content": "1"},
                {"path": "a.txt", "content": "2"}
            ]}"#,
        ))
        .unwrap_err();
        assert_eq!(err, FailureCause::DuplicatePath("a.txt".to_string()));
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let changes = parse_change_set(&response(
            "Proposed change:\n```json\n{\"changes\": [{\"path\": \"a.txt\", \"content\": \"a\"}]}",
        ))
        .unwrap();
        assert_eq!(changes.as_slice()[0].path, "a.txt");
    }

    const README_WITH_FENCE: &str =
        r#"{"changes": [{"path": "README.md", "content": "```sh\ncargo run\n```"}]}"#;

    #[test]
    fn test_bare_document_with_fenced_content() {
        let changes = parse_change_set(&response(README_WITH_FENCE)).unwrap();
        assert_eq!(changes.as_slice()[0].content, "```sh\ncargo run\n```");
    }

    #[test]
    fn test_fenced_document_with_fenced_content() {
        let message = format!("Here you go:\n```json\n{README_WITH_FENCE}\n```\nDone.");
        let changes = parse_change_set(&response(&message)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.as_slice()[0].content, "```sh\ncargo run\n```");
    }
}
