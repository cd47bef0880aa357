//! `read_file_range`: read a clipped slice of one document

use super::{blocking, ParamKind, ParamSpec, Tool, ToolArgs, ToolContext, ToolError};
use crate::sandbox::RangeRequest;
use async_trait::async_trait;
use serde_json::Value;

pub struct ReadFileRangeTool;

#[async_trait]
impl Tool for ReadFileRangeTool {
    fn name(&self) -> &'static str {
        "read_file_range"
    }

    fn description(&self) -> String {
        "Read part of a document. Address either by 1-indexed lines \
         (`start_line`, `end_line`) or by bytes (`start_byte`, `length`), not both. \
         Ranges past the end of the file are clipped. One read returns at most 64 KiB; \
         `truncated` is set when the range was cut short, so continue from `end_line + 1`. \
         Use the `byte_range` or `line` of a file_search match to read the surrounding passage."
            .to_string()
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("path", ParamKind::String, "Document path relative to the corpus root"),
            ParamSpec::optional("start_line", ParamKind::Integer, "First line, 1-indexed"),
            ParamSpec::optional("end_line", ParamKind::Integer, "Last line, inclusive"),
            ParamSpec::optional("start_byte", ParamKind::Integer, "First byte offset"),
            ParamSpec::optional("length", ParamKind::Integer, "Number of bytes to read"),
        ]
    }

    async fn run(&self, args: ToolArgs, ctx: ToolContext) -> Result<Value, ToolError> {
        let path = args.str("path").unwrap_or_default().to_string();
        let range = RangeRequest {
            start_line: args.int("start_line"),
            end_line: args.int("end_line"),
            start_byte: args.int("start_byte"),
            length: args.int("length"),
        };
        let sandbox = ctx.sandbox.clone();

        let slice = blocking(move || sandbox.read_file_range(&path, range)).await?;
        serde_json::to_value(slice).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::test_support::{args, context};
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_lines() {
        let (_dir, ctx) = context();
        let result = ReadFileRangeTool
            .run(
                args(json!({"path": "gesetze/bgb/543.md", "start_line": 3, "end_line": 3})),
                ctx,
            )
            .await
            .unwrap();
        assert_eq!(result["path"], "gesetze/bgb/543.md");
        assert_eq!(result["start_line"], 3);
        assert_eq!(result["end_line"], 3);
        assert!(result["text"].as_str().unwrap().contains("fristlos kündigen"));
    }

    #[tokio::test]
    async fn test_passwd_is_violation() {
        let (_dir, ctx) = context();
        let err = ReadFileRangeTool
            .run(args(json!({"path": "../../etc/passwd"})), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SandboxViolation);
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let (_dir, ctx) = context();
        let err = ReadFileRangeTool
            .run(args(json!({"path": "notes.pdf"})), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }
}
