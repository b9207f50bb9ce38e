//! File viewer and editor with per-path undo history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use proto::{ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Tool, parse_args};

const TAB_WIDTH: usize = 8;

/// Editor settings (`[editor]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    /// Lines of context shown above and below an edit.
    pub snippet_lines: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self { snippet_lines: 3 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum EditCommand {
    View {
        path: PathBuf,
        #[serde(default)]
        view_range: Option<Vec<i64>>,
    },
    Create {
        path: PathBuf,
        #[serde(default)]
        file_text: Option<String>,
    },
    StrReplace {
        path: PathBuf,
        #[serde(default)]
        old_str: Option<String>,
        #[serde(default)]
        new_str: Option<String>,
    },
    Insert {
        path: PathBuf,
        #[serde(default)]
        insert_line: Option<i64>,
        #[serde(default)]
        new_str: Option<String>,
    },
    #[serde(alias = "undo_edit")]
    Undo { path: PathBuf },
}

impl EditCommand {
    fn path(&self) -> &Path {
        match self {
            Self::View { path, .. }
            | Self::Create { path, .. }
            | Self::StrReplace { path, .. }
            | Self::Insert { path, .. }
            | Self::Undo { path } => path,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::View { .. } => "view",
            Self::Create { .. } => "create",
            Self::StrReplace { .. } => "str_replace",
            Self::Insert { .. } => "insert",
            Self::Undo { .. } => "undo",
        }
    }
}

/// Tool that views, creates and edits files.
pub struct EditTool {
    options: EditorOptions,
    history: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl EditTool {
    pub fn new() -> Self {
        Self::with_options(EditorOptions::default())
    }

    pub fn with_options(options: EditorOptions) -> Self {
        Self {
            options,
            history: Mutex::new(HashMap::new()),
        }
    }

    async fn view(&self, path: &Path, view_range: Option<Vec<i64>>) -> Result<String, ToolError> {
        if path.is_dir() {
            return list_directory(path).await;
        }

        let content = tokio::fs::read_to_string(path).await?;
        if content.is_empty() {
            return Ok(format!("File {} is empty", path.display()));
        }
        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len();

        let (start, end) = match view_range {
            None => (1, total),
            Some(range) => resolve_view_range(&range, total)?,
        };
        let shown = &lines[start - 1..end];
        let descriptor = if start == 1 && end == total {
            path.display().to_string()
        } else {
            format!("lines {start}-{end} of {}", path.display())
        };
        Ok(format!(
            "Here's the content of {descriptor}:\n{}\n",
            number_lines(shown, start)
        ))
    }

    async fn create(&self, path: &Path, file_text: Option<String>) -> Result<String, ToolError> {
        let Some(file_text) = file_text else {
            return Err(ToolError::invalid(
                "Parameter `file_text` is required for create command",
            ));
        };
        tokio::fs::write(path, file_text).await?;
        Ok(format!("File {} has been created.", path.display()))
    }

    async fn str_replace(
        &self,
        history: &mut HashMap<PathBuf, Vec<String>>,
        path: &Path,
        old_str: Option<String>,
        new_str: Option<String>,
    ) -> Result<String, ToolError> {
        let (Some(old_str), Some(new_str)) = (old_str, new_str) else {
            return Err(ToolError::invalid(
                "Parameters `old_str` and `new_str` are required for str_replace command",
            ));
        };
        if old_str.is_empty() {
            return Err(ToolError::invalid("Parameter `old_str` must not be empty"));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let occurrences = content.matches(old_str.as_str()).count();
        if occurrences == 0 {
            return Err(ToolError::NotFound(format!(
                "String '{old_str}' not found in {}",
                path.display()
            )));
        }
        if occurrences > 1 {
            let lines = matching_lines(&content, &old_str);
            return Err(ToolError::AmbiguousMatch {
                needle: old_str,
                path: path.to_path_buf(),
                occurrences,
                lines,
            });
        }

        let updated = content.replacen(old_str.as_str(), &new_str, 1);
        tokio::fs::write(path, &updated).await?;

        let edit_line = content
            .find(old_str.as_str())
            .map(|at| content[..at].matches('\n').count())
            .unwrap_or_default();
        let snippet = self.snippet(&updated, edit_line, new_str.matches('\n').count() + 1);
        history.entry(path.to_path_buf()).or_default().push(content);

        Ok(format!(
            "File {} has been edited. Here's the affected section:\n{snippet}\n",
            path.display()
        ))
    }

    async fn insert(
        &self,
        history: &mut HashMap<PathBuf, Vec<String>>,
        path: &Path,
        insert_line: Option<i64>,
        new_str: Option<String>,
    ) -> Result<String, ToolError> {
        let Some(new_str) = new_str else {
            return Err(ToolError::invalid(
                "Parameter `new_str` is required for insert command",
            ));
        };
        let Some(insert_line) = insert_line else {
            return Err(ToolError::invalid(
                "Parameter `insert_line` is required for insert command",
            ));
        };

        let content = tokio::fs::read_to_string(path).await?;
        let lines: Vec<&str> = content.split('\n').collect();
        let at = usize::try_from(insert_line)
            .ok()
            .filter(|at| *at <= lines.len())
            .ok_or_else(|| {
                ToolError::invalid(format!(
                    "Invalid `insert_line` parameter: {insert_line}. File has {} lines.",
                    lines.len()
                ))
            })?;

        let new_str = expand_tabs(&new_str);
        let new_lines: Vec<&str> = new_str.split('\n').collect();
        let mut merged = Vec::with_capacity(lines.len() + new_lines.len());
        merged.extend_from_slice(&lines[..at]);
        merged.extend_from_slice(&new_lines);
        merged.extend_from_slice(&lines[at..]);
        let updated = merged.join("\n");

        tokio::fs::write(path, &updated).await?;
        let snippet = self.snippet(&updated, at, new_lines.len());
        history.entry(path.to_path_buf()).or_default().push(content);

        Ok(format!(
            "File {} has been edited. Here's the affected section:\n{snippet}\n",
            path.display()
        ))
    }

    async fn undo(
        &self,
        history: &mut HashMap<PathBuf, Vec<String>>,
        path: &Path,
    ) -> Result<String, ToolError> {
        let snapshot = history.get_mut(path).and_then(Vec::pop).ok_or_else(|| {
            ToolError::NotFound(format!("No edit history found for {}", path.display()))
        })?;
        if let Err(e) = tokio::fs::write(path, &snapshot).await {
            history.entry(path.to_path_buf()).or_default().push(snapshot);
            return Err(e.into());
        }
        Ok(format!("Last edit to {} undone successfully", path.display()))
    }

    /// Numbered window around `count` lines starting at 0-indexed `first`.
    fn snippet(&self, content: &str, first: usize, count: usize) -> String {
        let lines: Vec<&str> = content.split('\n').collect();
        let context = self.options.snippet_lines;
        let start = first.saturating_sub(context);
        let end = (first + count + context).min(lines.len());
        number_lines(&lines[start..end], start + 1)
    }
}

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

/// 1-indexed starting line and its text for every occurrence of `needle`.
fn matching_lines(content: &str, needle: &str) -> Vec<(usize, String)> {
    let lines: Vec<&str> = content.split('\n').collect();
    content
        .match_indices(needle)
        .map(|(at, _)| {
            let index = content[..at].matches('\n').count();
            (index + 1, lines.get(index).copied().unwrap_or_default().to_string())
        })
        .collect()
}

/// Checks the path against the command before anything is read or written.
async fn validate_path(command: &str, path: &Path) -> Result<(), ToolError> {
    if !path.is_absolute() {
        let cwd = std::env::current_dir().unwrap_or_default();
        return Err(ToolError::invalid(format!(
            "The path {} is not an absolute path. Maybe you meant {}?",
            path.display(),
            cwd.join(path).display()
        )));
    }
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => Some(metadata),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let exists = metadata.is_some();
    if command != "create" && !exists {
        return Err(ToolError::NotFound(format!(
            "The path {} does not exist",
            path.display()
        )));
    }
    if command == "create" && exists {
        return Err(ToolError::Conflict(format!(
            "File already exists at {}",
            path.display()
        )));
    }
    if command != "view" && metadata.is_some_and(|m| m.is_dir()) {
        return Err(ToolError::invalid(format!(
            "The path {} is a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Resolves a 1-indexed inclusive `[start, end]` against `total` lines.
fn resolve_view_range(range: &[i64], total: usize) -> Result<(usize, usize), ToolError> {
    let [start, end] = range else {
        return Err(ToolError::invalid(
            "The `view_range` parameter must be a list of two integers",
        ));
    };
    let (start, end) = (*start, *end);
    let last = i64::try_from(total).unwrap_or(i64::MAX);
    if start < 1 || start > last {
        return Err(ToolError::invalid(format!(
            "Invalid `view_range`: first number {start} should be within the range of lines of the file: [1, {total}]"
        )));
    }
    let end = if end == -1 {
        last
    } else if start > end {
        return Err(ToolError::invalid(
            "Invalid `view_range`: first number must be less than or equal to second number",
        ));
    } else {
        end.min(last)
    };
    // Both bounds are within 1..=total here.
    Ok((start as usize, end as usize))
}

async fn list_directory(path: &Path) -> Result<String, ToolError> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push(if is_dir { format!("{name}/") } else { name });
    }
    entries.sort();
    Ok(format!(
        "Here's the files and directories in {}:\n{}\n",
        path.display(),
        entries.join("\n")
    ))
}

/// Prefixes each line with a 6-wide line number and a tab.
fn number_lines(lines: &[&str], first: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", first + i, expand_tabs(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replaces tabs with spaces up to the next multiple of eight columns.
fn expand_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for ch in text.chars() {
        match ch {
            '\t' => {
                let pad = TAB_WIDTH - column % TAB_WIDTH;
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(ch);
                column = 0;
            }
            _ => {
                out.push(ch);
                column += 1;
            }
        }
    }
    out
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn api_type(&self) -> &str {
        "text_editor_20241022"
    }

    fn description(&self) -> &str {
        "View, create and edit files by absolute path. str_replace needs old_str to match \
         exactly once; insert adds text after a line; undo reverts the last edit of a file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert", "undo", "undo_edit"]
                },
                "path": {
                    "type": "string",
                    "description": "Absolute path to a file or directory"
                },
                "view_range": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "[start, end] 1-indexed line range; end -1 reads to the end"
                },
                "file_text": {"type": "string", "description": "Content for create"},
                "old_str": {"type": "string", "description": "Exact text to replace"},
                "new_str": {"type": "string", "description": "Replacement or inserted text"},
                "insert_line": {
                    "type": "integer",
                    "description": "Line after which new_str is inserted (0 prepends)"
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command: EditCommand = parse_args(args)?;
        validate_path(command.name(), command.path()).await?;
        debug!(command = command.name(), path = %command.path().display(), "Edit command");

        let mut history = self.history.lock().await;
        let output = match command {
            EditCommand::View { path, view_range } => self.view(&path, view_range).await?,
            EditCommand::Create { path, file_text } => self.create(&path, file_text).await?,
            EditCommand::StrReplace {
                path,
                old_str,
                new_str,
            } => {
                self.str_replace(&mut history, &path, old_str, new_str)
                    .await?
            }
            EditCommand::Insert {
                path,
                insert_line,
                new_str,
            } => {
                self.insert(&mut history, &path, insert_line, new_str)
                    .await?
            }
            EditCommand::Undo { path } => self.undo(&mut history, &path).await?,
        };
        Ok(ToolResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use proto::ErrorKind;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read")
    }

    async fn run(tool: &EditTool, args: serde_json::Value) -> Result<String, ToolError> {
        tool.execute(args)
            .await
            .map(|r| r.output.unwrap_or_default())
    }

    #[tokio::test]
    async fn create_replace_and_undo_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("a.txt");
        let tool = EditTool::new();

        let out = run(
            &tool,
            serde_json::json!({"command": "create", "path": path, "file_text": "line1\nline2\nline3"}),
        )
        .await
        .expect("create");
        assert!(out.contains("has been created"));

        let out = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "line2", "new_str": "X"}),
        )
        .await
        .expect("replace");
        assert_eq!(read(&path), "line1\nX\nline3");
        assert!(out.contains("     1\tline1\n     2\tX\n     3\tline3"), "{out}");

        let out = run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .expect("undo");
        assert!(out.contains("undone successfully"));
        assert_eq!(read(&path), "line1\nline2\nline3");
    }

    #[tokio::test]
    async fn str_replace_missing_string_is_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "alpha\nbeta\n");
        let tool = EditTool::new();
        let err = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "gamma", "new_str": "x"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("'gamma'"));
        assert_eq!(read(&path), "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn str_replace_ambiguous_lists_lines_and_writes_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "foo = 1\nbar = 2\nfoo = 3\n");
        let tool = EditTool::new();
        let err = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "foo", "new_str": "baz"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let message = err.to_string();
        assert!(message.starts_with("Found 2 occurrences of 'foo'"));
        assert!(message.contains("1: foo = 1\n3: foo = 3"), "{message}");
        assert_eq!(read(&path), "foo = 1\nbar = 2\nfoo = 3\n");

        let err = run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn str_replace_ambiguous_multiline_needle_lists_start_lines() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "a\nb\nx\na\nb\n");
        let tool = EditTool::new();
        let err = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "a\nb", "new_str": "z"}),
        )
        .await
        .unwrap_err();
        match err {
            ToolError::AmbiguousMatch {
                occurrences,
                ref lines,
                ..
            } => {
                assert_eq!(occurrences, 2);
                assert_eq!(lines, &vec![(1, "a".to_string()), (4, "a".to_string())]);
            }
            other => panic!("expected ambiguous match, got {other:?}"),
        }
        assert_eq!(read(&path), "a\nb\nx\na\nb\n");
    }

    #[test]
    fn matching_lines_reports_each_occurrence() {
        assert_eq!(
            matching_lines("foo foo\nbar\n  foo", "foo"),
            vec![
                (1, "foo foo".to_string()),
                (1, "foo foo".to_string()),
                (3, "  foo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn str_replace_requires_non_empty_old_str() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "abc");
        let tool = EditTool::new();
        let err = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "", "new_str": "x"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "a"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(read(&path), "abc");
    }

    #[tokio::test]
    async fn insert_accepts_bounds_and_rejects_outside() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "a\nb\nc");
        let tool = EditTool::new();

        run(
            &tool,
            serde_json::json!({"command": "insert", "path": path, "insert_line": 0, "new_str": "top"}),
        )
        .await
        .expect("prepend");
        assert_eq!(read(&path), "top\na\nb\nc");

        run(
            &tool,
            serde_json::json!({"command": "insert", "path": path, "insert_line": 4, "new_str": "end"}),
        )
        .await
        .expect("append");
        assert_eq!(read(&path), "top\na\nb\nc\nend");

        for bad in [6, -1] {
            let err = run(
                &tool,
                serde_json::json!({"command": "insert", "path": path, "insert_line": bad, "new_str": "x"}),
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "insert_line {bad}");
            assert!(err.to_string().contains("File has 5 lines"));
        }
        assert_eq!(read(&path), "top\na\nb\nc\nend");
    }

    #[tokio::test]
    async fn insert_expands_tabs_and_shows_numbered_snippet() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "1\n2\n3\n4\n5\n6\n7\n8");
        let tool = EditTool::new();
        let out = run(
            &tool,
            serde_json::json!({"command": "insert", "path": path, "insert_line": 5, "new_str": "\tnew"}),
        )
        .await
        .expect("insert");
        assert_eq!(read(&path), "1\n2\n3\n4\n5\n        new\n6\n7\n8");
        assert!(out.contains("     3\t3\n"));
        assert!(out.contains("     6\t        new\n"));
        assert!(out.contains("     9\t8"));
        assert!(!out.contains("\t2\n"));
    }

    #[tokio::test]
    async fn undo_restores_in_reverse_order_until_history_is_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "v0");
        let tool = EditTool::new();

        for (old, new) in [("v0", "v1"), ("v1", "v2")] {
            run(
                &tool,
                serde_json::json!({"command": "str_replace", "path": path, "old_str": old, "new_str": new}),
            )
            .await
            .expect("replace");
        }
        assert_eq!(read(&path), "v2");

        run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .expect("first undo");
        assert_eq!(read(&path), "v1");
        run(&tool, serde_json::json!({"command": "undo_edit", "path": path}))
            .await
            .expect("second undo via alias");
        assert_eq!(read(&path), "v0");

        let err = run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("No edit history"));
    }

    #[tokio::test]
    async fn mixed_edits_undo_in_reverse_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "one\ntwo");
        let tool = EditTool::new();

        run(
            &tool,
            serde_json::json!({"command": "str_replace", "path": path, "old_str": "two", "new_str": "2"}),
        )
        .await
        .expect("replace");
        run(
            &tool,
            serde_json::json!({"command": "insert", "path": path, "insert_line": 1, "new_str": "mid"}),
        )
        .await
        .expect("insert");
        assert_eq!(read(&path), "one\nmid\n2");

        run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .expect("undo insert");
        assert_eq!(read(&path), "one\n2");
        run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .expect("undo replace");
        assert_eq!(read(&path), "one\ntwo");

        let err = run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(read(&path), "one\ntwo");
    }

    #[tokio::test]
    async fn view_whole_file_and_ranges() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "one\ntwo\tx\nthree\nfour");
        let tool = EditTool::new();

        let out = run(&tool, serde_json::json!({"command": "view", "path": path}))
            .await
            .expect("view");
        assert_eq!(
            out,
            format!(
                "Here's the content of {}:\n     1\tone\n     2\ttwo     x\n     3\tthree\n     4\tfour\n",
                path.display()
            )
        );

        let out = run(
            &tool,
            serde_json::json!({"command": "view", "path": path, "view_range": [2, 3]}),
        )
        .await
        .expect("range");
        assert!(out.starts_with(&format!("Here's the content of lines 2-3 of {}", path.display())));
        assert!(!out.contains("one"));
        assert!(!out.contains("four"));

        let out = run(
            &tool,
            serde_json::json!({"command": "view", "path": path, "view_range": [3, -1]}),
        )
        .await
        .expect("open range");
        assert!(out.contains("lines 3-4 of"));
        assert!(out.contains("     4\tfour"));

        let out = run(
            &tool,
            serde_json::json!({"command": "view", "path": path, "view_range": [2, 99]}),
        )
        .await
        .expect("clamped");
        assert!(out.contains("lines 2-4 of"));
    }

    #[tokio::test]
    async fn view_range_errors_are_validation() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write(dir.path(), "f.txt", "a\nb\nc");
        let tool = EditTool::new();
        for range in [
            serde_json::json!([1]),
            serde_json::json!([3, 2]),
            serde_json::json!([0, 2]),
            serde_json::json!([7, -1]),
        ] {
            let err = run(
                &tool,
                serde_json::json!({"command": "view", "path": path, "view_range": range}),
            )
            .await
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{range}");
        }
    }

    #[tokio::test]
    async fn view_empty_file_and_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let empty = write(dir.path(), "empty.txt", "");
        write(dir.path(), ".hidden", "x");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let tool = EditTool::new();

        let out = run(&tool, serde_json::json!({"command": "view", "path": empty}))
            .await
            .expect("view empty");
        assert_eq!(out, format!("File {} is empty", empty.display()));

        let out = run(&tool, serde_json::json!({"command": "view", "path": dir.path()}))
            .await
            .expect("view dir");
        assert!(out.ends_with(":\nempty.txt\nsub/\n"), "{out}");
        assert!(!out.contains(".hidden"));
    }

    #[tokio::test]
    async fn path_policy_is_checked_before_side_effects() {
        let dir = tempfile::tempdir().expect("temp dir");
        let existing = write(dir.path(), "f.txt", "keep");
        let tool = EditTool::new();

        let err = run(
            &tool,
            serde_json::json!({"command": "view", "path": "relative/file.txt"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Maybe you meant"));
        assert!(err.to_string().contains("relative/file.txt?"));

        let err = run(
            &tool,
            serde_json::json!({"command": "create", "path": existing, "file_text": "new"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(read(&existing), "keep");

        let missing = dir.path().join("missing.txt");
        let err = run(&tool, serde_json::json!({"command": "view", "path": missing}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = run(
            &tool,
            serde_json::json!({"command": "insert", "path": dir.path(), "insert_line": 0, "new_str": "x"}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("is a directory"));
    }

    #[tokio::test]
    async fn create_requires_file_text_and_is_not_undoable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("new.txt");
        let tool = EditTool::new();

        let err = run(&tool, serde_json::json!({"command": "create", "path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!path.exists());

        run(
            &tool,
            serde_json::json!({"command": "create", "path": path, "file_text": "hello"}),
        )
        .await
        .expect("create");
        let err = run(&tool, serde_json::json!({"command": "undo", "path": path}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(read(&path), "hello");
    }

    #[tokio::test]
    async fn unknown_command_is_invalid_arguments() {
        let tool = EditTool::new();
        let err = run(&tool, serde_json::json!({"command": "delete", "path": "/tmp/x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Invalid arguments"));
    }

    #[test]
    fn expand_tabs_aligns_to_eight_columns() {
        assert_eq!(expand_tabs("\tx"), "        x");
        assert_eq!(expand_tabs("abc\tx"), "abc     x");
        assert_eq!(expand_tabs("a\n\tb"), "a\n        b");
    }

    #[test]
    fn editor_metadata_is_stable() {
        let tool = EditTool::default();
        assert_eq!(tool.name(), "str_replace_editor");
        assert_eq!(tool.api_type(), "text_editor_20241022");
        assert_eq!(tool.options.snippet_lines, 3);
        assert_eq!(tool.parameters_schema()["required"][0], "command");
    }
}
