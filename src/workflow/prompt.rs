use crate::workflow::types::RepoId;

/// Wrap the submitter's instruction with the output contract that
/// [`crate::workflow::parse::parse_change_set`] relies on.
pub fn analysis_query(repository: &RepoId, branch: &str, instruction: &str) -> String {
    format!(
        r#"You are working on repository `{repository}` at branch `{branch}`.

## Task
{instruction}

## Output format
Answer with a single JSON document and nothing else:

```json
{{"changes": [{{"path": "relative/path/to/file", "content": "complete new file content"}}]}}
```

## Rules
- `path` is relative to the repository root and uses `/` separators.
- `content` is the complete new content of the file, not a diff.
- List each file at most once, in the order the changes should be applied.
- Only touch files needed for the task.
- If no change is needed, answer with `{{"changes": []}}`."#
    )
}
