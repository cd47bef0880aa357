//! Property-based tests for the query engine

use super::*;
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_filter("keywords are not terms", |w| {
        !matches!(w.as_str(), "and" | "or" | "not")
    })
}

fn arb_query() -> impl Strategy<Value = SearchQuery> {
    let leaf = prop_oneof![
        3 => arb_word().prop_map(SearchQuery::Term),
        1 => proptest::collection::vec(arb_word(), 1..3).prop_map(SearchQuery::Phrase),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 2..4).prop_map(SearchQuery::And),
            proptest::collection::vec(inner.clone(), 2..4).prop_map(SearchQuery::Or),
            inner.prop_map(|q| SearchQuery::Not(Box::new(q))),
        ]
    })
}

/// Reference semantics: plain lowercase substring containment.
fn reference_eval(query: &SearchQuery, line: &str) -> bool {
    let line = line.to_lowercase();
    match query {
        SearchQuery::Term(w) => line.contains(&w.to_lowercase()),
        SearchQuery::Phrase(words) => line.contains(&words.join(" ").to_lowercase()),
        SearchQuery::And(items) => items.iter().all(|q| reference_eval(q, &line)),
        SearchQuery::Or(items) => items.iter().any(|q| reference_eval(q, &line)),
        SearchQuery::Not(inner) => !reference_eval(inner, &line),
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn parse_never_panics(input in "\\PC{0,40}") {
        let _ = parse(&input);
    }

    #[test]
    fn error_offset_within_input(input in "[a-c ()\"]{0,20}|(AND|OR|NOT| |a|\\(|\\)){0,10}") {
        if let Err(err) = parse(&input) {
            let len = input.chars().count();
            prop_assert!(err.offset < len.max(1));
        }
    }

    #[test]
    fn display_round_trips(query in arb_query()) {
        let rendered = query.to_string();
        prop_assert_eq!(parse(&rendered).unwrap(), query);
    }

    #[test]
    fn matcher_agrees_with_reference(
        query in arb_query(),
        // single spaces keep phrase semantics identical to plain containment
        words in proptest::collection::vec("[a-z]{1,4}", 0..8),
    ) {
        let line = words.join(" ");
        let matcher = QueryMatcher::compile(&query, false).unwrap();
        prop_assert_eq!(matcher.match_line(&line).is_some(), reference_eval(&query, &line));
    }

    #[test]
    fn search_is_ordered_bounded_and_repeatable(
        lines in proptest::collection::vec("[ab ]{0,6}", 0..30),
        limit in 1usize..10,
        context in 0usize..3,
    ) {
        let text = lines.join("\n");
        let matcher = QueryMatcher::compile(&parse("a OR b").unwrap(), false).unwrap();
        let first = matcher.search_text("f.txt", &text, context, limit);
        let second = matcher.search_text("f.txt", &text, context, limit);

        prop_assert!(first.len() <= limit);
        prop_assert!(first.windows(2).all(|w| w[0].line < w[1].line));
        prop_assert_eq!(&first, &second);
        for m in &first {
            prop_assert!(m.line >= 1);
            prop_assert!(m.byte_range[0] <= m.byte_range[1]);
            prop_assert!(m.byte_range[1] <= text.len());
            prop_assert!(m.context.len() <= 2 * context);
        }
    }
}
