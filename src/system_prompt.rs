//! System prompt for the legal research agent
//!
//! A fixed role description followed by a catalog of the tools that are
//! actually registered, so the prompt never advertises a tool the dispatcher
//! would reject.

use crate::llm::ToolDefinition;
use std::fmt::Write;

/// Base system prompt establishing the agent's role
const BASE_PROMPT: &str = r"Du bist ein Recherche-Agent für deutsches Recht. Ziel: Beantworte die Nutzerfrage ausschließlich mithilfe der bereitgestellten Werkzeuge und der darin gefundenen Textstellen.

Richtlinien:
- Überlege zuerst, welche Gesetze, Vorschriften oder Verfahren relevant sein könnten, und leite passende Suchbegriffe ab.
- Der Korpus enthält Gesetze und Urteile in mehreren Unterordnern. Nutze list_paths, um dich zu orientieren.
- Verwende file_search für Fundstellen. Bei Gesetzen verknüpfe Vollname und Abkürzung mit OR, z.B. (Bürgerliches Gesetzbuch OR BGB).
- Lies relevante Stellen mit read_file_range nach, bevor du sie zitierst.
- Reichen die Ergebnisse nicht aus, erweitere die Suche mit verwandten Begriffen, exakten Phrasen oder weiteren Dateien.
- Ein Werkzeugfehler ist kein Abbruchgrund: lies die Fehlermeldung und korrigiere den Aufruf.
- Wenn die Belege ausreichen, antworte knapp mit kurzer Textstelle und Zitation (Pfad + Zeilennummer).
- Erfinde keine Fundstellen. Was nicht belegt ist, kennzeichne als nicht gefunden.
- Antworte immer auf Deutsch.";

/// Boolean query syntax understood by `file_search`
const QUERY_SYNTAX: &str = r#"Suchsyntax für file_search:
- Wörter nebeneinander bedeuten AND: `Vermieter Kündigung`
- `OR` verknüpft Alternativen: `Mietminderung OR Minderung`
- `NOT` schließt aus: `Kündigung NOT fristlos`
- Anführungszeichen suchen exakte Phrasen: `"berechtigtes Interesse"`
- Klammern gruppieren: `(BGB OR "Bürgerliches Gesetzbuch") AND Eigenbedarf`
- Jede Zeile eines Dokuments wird einzeln geprüft; Groß-/Kleinschreibung wird ignoriert, sofern case_sensitive nicht gesetzt ist."#;

/// Build the full system prompt for the given tool set
pub fn build_system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if !tools.is_empty() {
        prompt.push_str("\n\nVerfügbare Werkzeuge:\n");
        for (i, tool) in tools.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "{}) {}: {} Argumente: {}",
                i + 1,
                tool.name,
                first_line(&tool.description),
                argument_summary(&tool.input_schema)
            );
        }
    }

    if tools.iter().any(|t| t.name == "file_search") {
        prompt.push('\n');
        prompt.push_str(QUERY_SYNTAX);
    }

    prompt
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

/// `{query, glob?, max_results?}` from a JSON schema
fn argument_summary(schema: &serde_json::Value) -> String {
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
        .unwrap_or_default();
    let names: Vec<String> = schema["properties"]
        .as_object()
        .map(|props| {
            props
                .keys()
                .map(|name| {
                    if required.contains(&name.as_str()) {
                        name.clone()
                    } else {
                        format!("{name}?")
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    format!("{{{}}}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_catalog_lists_registered_tools() {
        let prompt = build_system_prompt(&ToolRegistry::standard(false).definitions());
        assert!(prompt.starts_with("Du bist ein Recherche-Agent"));
        assert!(prompt.contains("1) list_paths:"));
        assert!(prompt.contains("3) file_search:"));
        assert!(prompt.contains("max_results?"));
        assert!(!prompt.contains("query?"));
        assert!(!prompt.contains("index_search"));
        assert!(prompt.contains("Suchsyntax"));
    }

    #[test]
    fn test_index_tool_listed_when_enabled() {
        let prompt = build_system_prompt(&ToolRegistry::standard(true).definitions());
        assert!(prompt.contains("4) index_search:"));
    }

    #[test]
    fn test_no_tools() {
        let prompt = build_system_prompt(&[]);
        assert_eq!(prompt, BASE_PROMPT);
    }
}
