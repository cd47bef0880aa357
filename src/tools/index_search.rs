//! `index_search`: relevance-ranked lookup in an Elasticsearch-compatible index
//!
//! Only available when `LEGAL_INDEX_URL` is configured. Hits carry the
//! `file_path` of the indexed document, so the agent can follow up with
//! `read_file_range` inside the sandbox.

use super::{ParamKind, ParamSpec, Tool, ToolArgs, ToolContext, ToolError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_RESULTS: usize = 10;
const MAX_RESULTS_CAP: usize = 50;
const SNIPPET_FRAGMENT_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected index response: {0}")]
    Malformed(String),
}

/// Restricts hits to statutes or court decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Gesetz,
    Urteil,
}

impl DocumentType {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gesetz" | "gesetze" => Some(DocumentType::Gesetz),
            "urteil" | "urteile" => Some(DocumentType::Urteil),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            DocumentType::Gesetz => "gesetz",
            DocumentType::Urteil => "urteil",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHit {
    pub file_path: String,
    pub title: String,
    pub document_type: Option<String>,
    pub score: f64,
    pub snippet: String,
}

/// Thin HTTP client over the `_search` endpoint
pub struct IndexClient {
    client: Client,
    base_url: String,
    indices: String,
}

impl IndexClient {
    pub fn new(base_url: &str, indices: &[String], timeout: Duration) -> Result<Self, IndexError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            indices: indices.join(","),
        })
    }

    pub async fn search(
        &self,
        query: &str,
        document_type: Option<DocumentType>,
        max_results: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let url = format!("{}/{}/_search", self.base_url, self.indices);
        let body = build_request(query, document_type, max_results);
        tracing::debug!(url = %url, "Querying search index");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        parse_hits(&payload)
    }
}

fn build_request(query: &str, document_type: Option<DocumentType>, max_results: usize) -> Value {
    let must = json!({
        "multi_match": {
            "query": query,
            "fields": ["title^2", "content"],
        }
    });
    let filter: Vec<Value> = document_type
        .map(|t| json!({"term": {"document_type": t.as_str()}}))
        .into_iter()
        .collect();

    json!({
        "size": max_results,
        "_source": ["file_path", "title", "document_type"],
        "query": {
            "bool": {
                "must": [must],
                "filter": filter,
            }
        },
        "highlight": {
            "fields": {
                "content": {
                    "fragment_size": SNIPPET_FRAGMENT_CHARS,
                    "number_of_fragments": 1,
                }
            }
        },
    })
}

fn parse_hits(payload: &Value) -> Result<Vec<IndexHit>, IndexError> {
    let hits = payload
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Malformed("missing hits.hits".to_string()))?;

    Ok(hits
        .iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?;
            let file_path = source.get("file_path")?.as_str()?.to_string();
            let snippet = hit
                .pointer("/highlight/content/0")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(IndexHit {
                title: source
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(&file_path)
                    .to_string(),
                document_type: source
                    .get("document_type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
                file_path,
                snippet,
            })
        })
        .collect())
}

pub struct IndexSearchTool;

#[async_trait]
impl Tool for IndexSearchTool {
    fn name(&self) -> &'static str {
        "index_search"
    }

    fn description(&self) -> String {
        "Relevance-ranked full-text search over the indexed statutes and court decisions. \
         Good for finding candidate documents by topic; follow up with read_file_range on \
         the returned `file_path`. `document_type` is `gesetz` or `urteil`."
            .to_string()
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("query", ParamKind::String, "Free-text query"),
            ParamSpec::optional(
                "document_type",
                ParamKind::String,
                "Restrict to `gesetz` or `urteil`",
            ),
            ParamSpec::optional("max_results", ParamKind::Integer, "Maximum hits returned")
                .with_default(json!(DEFAULT_MAX_RESULTS)),
        ]
    }

    async fn run(&self, args: ToolArgs, ctx: ToolContext) -> Result<Value, ToolError> {
        let Some(index) = ctx.index.as_ref() else {
            return Err(ToolError::Failed("no search index configured".to_string()));
        };
        let query = args.str("query").unwrap_or_default();
        let document_type = match args.str("document_type") {
            None => None,
            Some(raw) => Some(DocumentType::parse(raw).ok_or_else(|| {
                ToolError::Failed(format!(
                    "unknown document_type {raw:?}; expected gesetz or urteil"
                ))
            })?),
        };
        let max_results = args
            .bounded("max_results", 1, MAX_RESULTS_CAP)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let hits = index.search(query, document_type, max_results).await?;
        Ok(json!({ "hits": hits }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::test_support::{args, context};

    #[test]
    fn test_request_body() {
        let body = build_request("Eigenbedarf", Some(DocumentType::Urteil), 5);
        assert_eq!(body["size"], 5);
        assert_eq!(
            body["query"]["bool"]["must"][0]["multi_match"]["query"],
            "Eigenbedarf"
        );
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["document_type"],
            "urteil"
        );

        let unfiltered = build_request("Eigenbedarf", None, 10);
        assert_eq!(unfiltered["query"]["bool"]["filter"], json!([]));
    }

    #[test]
    fn test_parse_hits() {
        let payload = json!({
            "hits": {
                "hits": [
                    {
                        "_score": 3.5,
                        "_source": {
                            "file_path": "gesetze/bgb/573.md",
                            "title": "§ 573 BGB",
                            "document_type": "gesetz"
                        },
                        "highlight": {"content": ["<em>berechtigtes</em> Interesse"]}
                    },
                    {"_score": 1.0, "_source": {"title": "no path"}},
                    {
                        "_score": 0.5,
                        "_source": {"file_path": "urteile/2023/viii_zr_1.txt"}
                    }
                ]
            }
        });
        let hits = parse_hits(&payload).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "§ 573 BGB");
        assert_eq!(hits[0].document_type.as_deref(), Some("gesetz"));
        assert!(hits[0].snippet.contains("Interesse"));
        assert_eq!(hits[1].title, "urteile/2023/viii_zr_1.txt");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_hits(&json!({"error": "boom"})),
            Err(IndexError::Malformed(_))
        ));
    }

    #[test]
    fn test_document_type_aliases() {
        assert_eq!(DocumentType::parse("Gesetze"), Some(DocumentType::Gesetz));
        assert_eq!(DocumentType::parse("urteil"), Some(DocumentType::Urteil));
        assert_eq!(DocumentType::parse("kommentar"), None);
    }

    #[tokio::test]
    async fn test_without_index_fails() {
        let (_dir, ctx) = context();
        let err = IndexSearchTool
            .run(args(json!({"query": "Miete"})), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
    }

    #[tokio::test]
    async fn test_unreachable_index_is_tool_error() {
        let (_dir, mut ctx) = context();
        let client = IndexClient::new(
            "http://127.0.0.1:9",
            &["legal_gesetze".to_string()],
            Duration::from_secs(2),
        )
        .unwrap();
        ctx.index = Some(std::sync::Arc::new(client));
        let err = IndexSearchTool
            .run(args(json!({"query": "Miete"})), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Index(IndexError::Request(_))));
    }
}
