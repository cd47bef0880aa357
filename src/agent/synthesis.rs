//! Evidence digest for runs that end without a model answer
//!
//! Built only from successful tool results already in the conversation. No
//! model is consulted, so the digest never contains content that was not
//! actually retrieved from the corpus or the index.

use super::state::Outcome;
use serde_json::Value;
use std::fmt::Write;

const MAX_ITEMS: usize = 10;
const EXCERPT_CHARS: usize = 240;
const LISTED_PATHS: usize = 5;

/// Render a labeled digest of `evidence` for a run that ended in `outcome`.
pub fn synthesize(outcome: Outcome, evidence: &[Value]) -> String {
    let mut items: Vec<String> = Vec::new();
    for item in evidence.iter().flat_map(describe) {
        if !items.contains(&item) {
            items.push(item);
        }
    }

    let mut out = format!(
        "HINWEIS: Keine abschließende Antwort ({}). ",
        reason(outcome)
    );
    if items.is_empty() {
        out.push_str("Bis zum Abbruch wurden keine Belegstellen gefunden.");
        return out;
    }

    out.push_str("Bisher gefundene Belegstellen:\n");
    for item in items.iter().take(MAX_ITEMS) {
        let _ = writeln!(out, "- {item}");
    }
    if items.len() > MAX_ITEMS {
        let _ = writeln!(out, "({} weitere ausgelassen)", items.len() - MAX_ITEMS);
    }
    out.trim_end().to_string()
}

fn reason(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::FinalAnswer => "abgeschlossen",
        Outcome::StepLimitExceeded => "maximale Anzahl von Rechercheschritten erreicht",
        Outcome::Timeout => "Zeitlimit überschritten",
        Outcome::Cancelled => "Anfrage abgebrochen",
        Outcome::Error => "Fehler beim Sprachmodell-Anbieter",
    }
}

/// One line per piece of evidence in a tool payload
fn describe(value: &Value) -> Vec<String> {
    let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    if let Some(matches) = value.get("matches").and_then(Value::as_array) {
        return matches
            .iter()
            .map(|m| {
                let line = m.get("line").and_then(Value::as_u64).unwrap_or(0);
                format!("{}:{line}: {}", str_at(m, "file"), excerpt(&str_at(m, "text")))
            })
            .collect();
    }

    if let Some(hits) = value.get("hits").and_then(Value::as_array) {
        return hits
            .iter()
            .map(|h| {
                format!(
                    "{} ({}): {}",
                    str_at(h, "file_path"),
                    str_at(h, "title"),
                    excerpt(&str_at(h, "snippet"))
                )
            })
            .collect();
    }

    if let Some(path) = value.get("path").and_then(Value::as_str) {
        let start = value.get("start_line").and_then(Value::as_u64).unwrap_or(0);
        let end = value.get("end_line").and_then(Value::as_u64).unwrap_or(0);
        return vec![format!(
            "{path} Z. {start}-{end}: {}",
            excerpt(&str_at(value, "text"))
        )];
    }

    if let Some(paths) = value.get("paths").and_then(Value::as_array) {
        let names: Vec<&str> = paths.iter().filter_map(Value::as_str).collect();
        if names.is_empty() {
            return Vec::new();
        }
        let mut line = format!(
            "Gesichtete Dokumente: {}",
            names.iter().take(LISTED_PATHS).copied().collect::<Vec<_>>().join(", ")
        );
        if names.len() > LISTED_PATHS {
            let _ = write!(line, " (+{} weitere)", names.len() - LISTED_PATHS);
        }
        return vec![line];
    }

    Vec::new()
}

/// Whitespace-collapsed, char-bounded excerpt
fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_evidence() {
        let digest = synthesize(Outcome::Timeout, &[]);
        assert!(digest.starts_with("HINWEIS"));
        assert!(digest.contains("Zeitlimit"));
        assert!(digest.contains("keine Belegstellen"));
    }

    #[test]
    fn test_matches_and_reads() {
        let evidence = vec![
            json!({"matches": [
                {"file": "gesetze/bgb/573.md", "line": 3, "text": "Der Vermieter kann nur kündigen,\n wenn er ein berechtigtes Interesse hat.", "context": [], "byte_range": [0, 10]}
            ]}),
            json!({"path": "gesetze/bgb/543.md", "text": "Außerordentliche fristlose Kündigung", "start_line": 1, "end_line": 4}),
        ];
        let digest = synthesize(Outcome::StepLimitExceeded, &evidence);
        assert!(digest.contains("Rechercheschritten"));
        assert!(digest.contains(
            "- gesetze/bgb/573.md:3: Der Vermieter kann nur kündigen, wenn er ein berechtigtes Interesse hat."
        ));
        assert!(digest.contains("- gesetze/bgb/543.md Z. 1-4: Außerordentliche fristlose Kündigung"));
    }

    #[test]
    fn test_duplicates_dropped_and_capped() {
        let matches: Vec<Value> = (1..=15)
            .map(|i| json!({"file": "a.md", "line": i, "text": "Miete"}))
            .collect();
        let evidence = vec![json!({ "matches": matches }), json!({ "matches": matches })];
        let digest = synthesize(Outcome::StepLimitExceeded, &evidence);
        assert_eq!(digest.lines().filter(|l| l.starts_with("- ")).count(), MAX_ITEMS);
        assert!(digest.ends_with("(5 weitere ausgelassen)"));
    }

    #[test]
    fn test_paths_and_hits() {
        let evidence = vec![
            json!({"paths": ["a.md", "b.md", "c.md", "d.md", "e.md", "f.md"]}),
            json!({"hits": [{"file_path": "urteile/x.md", "title": "VIII ZR 1/23", "snippet": "Eigenbedarf", "score": 1.0}]}),
        ];
        let digest = synthesize(Outcome::Cancelled, &evidence);
        assert!(digest.contains("Gesichtete Dokumente: a.md, b.md, c.md, d.md, e.md (+1 weitere)"));
        assert!(digest.contains("urteile/x.md (VIII ZR 1/23): Eigenbedarf"));
    }

    #[test]
    fn test_excerpt_bounded() {
        let long = "ü".repeat(1000);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }
}
