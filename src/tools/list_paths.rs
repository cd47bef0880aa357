//! `list_paths`: enumerate documents under the root

use super::{blocking, ParamKind, ParamSpec, Tool, ToolArgs, ToolContext, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Upper bound on listed paths returned to the model
const MAX_LISTED: usize = 500;

pub struct ListPathsTool;

#[async_trait]
impl Tool for ListPathsTool {
    fn name(&self) -> &'static str {
        "list_paths"
    }

    fn description(&self) -> String {
        "List document paths (relative to the corpus root) in lexicographic order. \
         Use `prefix` to restrict to a directory such as `gesetze/bgb` and `glob` to \
         filter names, e.g. `**/*.md`."
            .to_string()
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("prefix", ParamKind::String, "Directory or path prefix"),
            ParamSpec::optional("glob", ParamKind::String, "Glob filter on relative paths"),
        ]
    }

    async fn run(&self, args: ToolArgs, ctx: ToolContext) -> Result<Value, ToolError> {
        let prefix = args.str("prefix").map(str::to_string);
        let glob = args.str("glob").map(str::to_string);
        let sandbox = ctx.sandbox.clone();

        let mut paths =
            blocking(move || sandbox.list_paths(prefix.as_deref(), glob.as_deref())).await?;

        let total = paths.len();
        paths.truncate(MAX_LISTED);
        let mut result = json!({ "paths": paths });
        if total > MAX_LISTED {
            result["truncated_from"] = json!(total);
        }
        Ok(result)
    }
}
