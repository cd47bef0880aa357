//! `file_search`: boolean search across the corpus

use super::{blocking, ParamKind, ParamSpec, Tool, ToolArgs, ToolContext, ToolError};
use crate::sandbox::{SearchRequest, DEFAULT_CONTEXT_LINES, DEFAULT_MAX_RESULTS};
use async_trait::async_trait;
use serde_json::{json, Value};

const MAX_RESULTS_CAP: usize = 500;
const MAX_CONTEXT_LINES: usize = 20;

pub struct FileSearchTool;

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &'static str {
        "file_search"
    }

    fn description(&self) -> String {
        "Search document lines with a boolean query. Terms juxtaposed are ANDed; \
         combine with AND, OR, NOT and parentheses; quote exact phrases, e.g. \
         `(Kündigung OR kündigen) AND \"berechtigtes Interesse\" NOT Gewerbe`. \
         Matching is substring-based and case-insensitive unless `case_sensitive` is set. \
         Results are ordered by path, then line."
            .to_string()
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("query", ParamKind::String, "Boolean query"),
            ParamSpec::optional(
                "glob",
                ParamKind::String,
                "Restrict to matching relative paths, e.g. `gesetze/**`",
            ),
            ParamSpec::optional("max_results", ParamKind::Integer, "Maximum matches returned")
                .with_default(json!(DEFAULT_MAX_RESULTS)),
            ParamSpec::optional(
                "context_lines",
                ParamKind::Integer,
                "Lines of context before and after each match",
            )
            .with_default(json!(DEFAULT_CONTEXT_LINES)),
            ParamSpec::optional("case_sensitive", ParamKind::Boolean, "Match case exactly")
                .with_default(json!(false)),
        ]
    }

    async fn run(&self, args: ToolArgs, ctx: ToolContext) -> Result<Value, ToolError> {
        let mut request = SearchRequest::new(args.str("query").unwrap_or_default());
        request.glob = args.str("glob").map(str::to_string);
        if let Some(max_results) = args.bounded("max_results", 1, MAX_RESULTS_CAP) {
            request.max_results = max_results;
        }
        if let Some(context_lines) = args.bounded("context_lines", 0, MAX_CONTEXT_LINES) {
            request.context_lines = context_lines;
        }
        request.case_sensitive = args.bool("case_sensitive").unwrap_or(false);
        let sandbox = ctx.sandbox.clone();

        let matches = blocking(move || sandbox.file_search(&request)).await?;
        Ok(json!({ "matches": matches }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::test_support::{args, context};

    #[tokio::test]
    async fn test_search_shape() {
        let (_dir, ctx) = context();
        let result = FileSearchTool
            .run(
                args(json!({"query": "Vermieter NOT ordentliche", "context_lines": 0})),
                ctx,
            )
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["file"], "gesetze/bgb/573.md");
        assert_eq!(matches[0]["line"], 3);
        assert_eq!(matches[0]["context"], json!([]));
        assert_eq!(matches[0]["byte_range"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_max_results_clamped_to_one() {
        let (_dir, ctx) = context();
        let result = FileSearchTool
            .run(args(json!({"query": "BGB", "max_results": 0})), ctx)
            .await
            .unwrap();
        assert_eq!(result["matches"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_syntax_error_kind() {
        let (_dir, ctx) = context();
        let err = FileSearchTool
            .run(args(json!({"query": "Miete AND"})), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuerySyntaxError);
        assert!(err.to_string().contains("offset 8"));
    }
}
