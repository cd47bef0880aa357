//! Line-level evaluation of a parsed query

use super::SearchQuery;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLine {
    pub line: usize,
    pub text: String,
}

/// One satisfying line of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub file: String,
    pub line: usize,
    pub text: String,
    pub context: Vec<ContextLine>,
    /// Byte offsets into the decoded document text
    pub byte_range: [usize; 2],
}

enum Node {
    Leaf(usize),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

struct Leaf {
    regex: Regex,
    /// Not under an odd number of NOTs; only these locate the reported span
    positive: bool,
}

/// A query compiled to one regex per leaf.
pub struct QueryMatcher {
    root: Node,
    leaves: Vec<Leaf>,
}

impl QueryMatcher {
    pub fn compile(query: &SearchQuery, case_sensitive: bool) -> Result<Self, regex::Error> {
        let mut leaves = Vec::new();
        let root = compile_node(query, case_sensitive, true, &mut leaves)?;
        Ok(Self { root, leaves })
    }

    /// Returns the span to report if the line satisfies the query.
    pub fn match_line(&self, line: &str) -> Option<Range<usize>> {
        let hits: Vec<Option<Range<usize>>> = self
            .leaves
            .iter()
            .map(|leaf| leaf.regex.find(line).map(|m| m.range()))
            .collect();

        if !eval(&self.root, &hits) {
            return None;
        }

        let first_positive = self
            .leaves
            .iter()
            .zip(&hits)
            .filter(|(leaf, _)| leaf.positive)
            .filter_map(|(_, hit)| hit.clone())
            .min_by_key(|range| range.start);

        Some(first_positive.unwrap_or(0..line.len()))
    }

    /// Evaluate every non-blank line of `text`, stopping once `limit` matches
    /// have been collected.
    pub fn search_text(
        &self,
        file: &str,
        text: &str,
        context_lines: usize,
        limit: usize,
    ) -> Vec<Match> {
        let lines = split_lines(text);
        let mut matches = Vec::new();

        for (idx, &(offset, line)) in lines.iter().enumerate() {
            if matches.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let Some(span) = self.match_line(line) else {
                continue;
            };

            let before = idx.saturating_sub(context_lines);
            let after = (idx + context_lines).min(lines.len() - 1);
            let context = (before..=after)
                .filter(|&i| i != idx)
                .map(|i| ContextLine {
                    line: i + 1,
                    text: lines[i].1.to_string(),
                })
                .collect();

            matches.push(Match {
                file: file.to_string(),
                line: idx + 1,
                text: line.to_string(),
                context,
                byte_range: [offset + span.start, offset + span.end],
            });
        }

        matches
    }
}

fn compile_node(
    query: &SearchQuery,
    case_sensitive: bool,
    positive: bool,
    leaves: &mut Vec<Leaf>,
) -> Result<Node, regex::Error> {
    let pattern = match query {
        SearchQuery::Term(word) => regex::escape(word),
        SearchQuery::Phrase(words) => words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"\s+"),
        SearchQuery::And(items) => {
            return items
                .iter()
                .map(|q| compile_node(q, case_sensitive, positive, leaves))
                .collect::<Result<_, _>>()
                .map(Node::And);
        }
        SearchQuery::Or(items) => {
            return items
                .iter()
                .map(|q| compile_node(q, case_sensitive, positive, leaves))
                .collect::<Result<_, _>>()
                .map(Node::Or);
        }
        SearchQuery::Not(inner) => {
            let node = compile_node(inner, case_sensitive, !positive, leaves)?;
            return Ok(Node::Not(Box::new(node)));
        }
    };

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()?;
    leaves.push(Leaf { regex, positive });
    Ok(Node::Leaf(leaves.len() - 1))
}

fn eval(node: &Node, hits: &[Option<Range<usize>>]) -> bool {
    match node {
        Node::Leaf(idx) => hits[*idx].is_some(),
        Node::And(items) => items.iter().all(|n| eval(n, hits)),
        Node::Or(items) => items.iter().any(|n| eval(n, hits)),
        Node::Not(inner) => !eval(inner, hits),
    }
}

/// Split into (byte offset, line without terminator) pairs.
fn split_lines(text: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push((offset, line));
        offset += raw.len();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::parse;

    fn matcher(q: &str) -> QueryMatcher {
        QueryMatcher::compile(&parse(q).unwrap(), false).unwrap()
    }

    #[test]
    fn test_grouped_or_and_fixture() {
        let m = matcher("(a OR b) AND c");
        let found = m.search_text("doc.txt", "a x\nb c\na c\n", 0, 50);
        let lines: Vec<usize> = found.iter().map(|f| f.line).collect();
        // "a x" has no c; "b c" and "a c" each hold c plus one side of the OR
        assert!(lines.contains(&3));
        assert!(!lines.contains(&1));
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_line_three_matches_and_line_one_does_not() {
        let m = matcher("(a OR b) AND c");
        assert!(m.match_line("a c").is_some());
        assert!(m.match_line("a x").is_none());
        assert!(m.match_line("x c").is_none());
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let m = matcher("kündigung");
        assert!(m.match_line("Fristlose KÜNDIGUNG des Mietvertrags").is_some());

        let strict = QueryMatcher::compile(&parse("kündigung").unwrap(), true).unwrap();
        assert!(strict.match_line("Fristlose Kündigung").is_none());
    }

    #[test]
    fn test_phrase_tolerates_whitespace_runs() {
        let m = matcher("\"§ 573 BGB\"");
        assert!(m.match_line("gemäß §  573\tBGB kann").is_some());
        assert!(m.match_line("§ 573 Abs. 2 BGB").is_none());
    }

    #[test]
    fn test_not_excludes_lines() {
        let m = matcher("Miete NOT Pacht");
        assert!(m.match_line("Die Miete ist fällig").is_some());
        assert!(m.match_line("Miete und Pacht").is_none());
    }

    #[test]
    fn test_byte_range_points_at_first_positive_term() {
        let m = matcher("Pacht OR Miete");
        let found = m.search_text("d.md", "Zeile eins\nDie Miete, die Pacht\n", 0, 10);
        assert_eq!(found.len(), 1);
        // second line starts at byte 11; "Miete" starts 4 bytes in
        assert_eq!(found[0].byte_range, [15, 20]);
    }

    #[test]
    fn test_pure_negation_spans_whole_line() {
        let m = matcher("NOT zzz");
        let found = m.search_text("d.md", "abc\n", 0, 10);
        assert_eq!(found[0].byte_range, [0, 3]);
    }

    #[test]
    fn test_context_clipped_at_file_boundaries() {
        let m = matcher("target");
        let text = "target first\ntwo\nthree\nfour\ntarget last";
        let found = m.search_text("f.txt", text, 2, 10);
        assert_eq!(found.len(), 2);

        let first: Vec<usize> = found[0].context.iter().map(|c| c.line).collect();
        assert_eq!(first, vec![2, 3]);
        let last: Vec<usize> = found[1].context.iter().map(|c| c.line).collect();
        assert_eq!(last, vec![3, 4]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let m = matcher("NOT x");
        let found = m.search_text("f.txt", "a\n\n  \nb\n", 0, 10);
        let lines: Vec<usize> = found.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![1, 4]);
    }

    #[test]
    fn test_crlf_lines() {
        let m = matcher("b");
        let found = m.search_text("f.txt", "a\r\nb\r\n", 0, 10);
        assert_eq!(found[0].text, "b");
        assert_eq!(found[0].byte_range, [3, 4]);
    }

    #[test]
    fn test_limit_stops_early() {
        let m = matcher("x");
        let found = m.search_text("f.txt", "x\nx\nx\n", 0, 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].line, 2);
    }
}
