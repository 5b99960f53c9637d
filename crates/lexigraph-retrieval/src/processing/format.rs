//! Display formatting.
//!
//! The formatting chain never mutates the processed collection. It works
//! on [`DisplayResult`]s, a display view derived from the collection with
//! statements rendered to strings, so the internal scoring representation
//! and the display representation can diverge without re-querying.

use serde::{Deserialize, Serialize};

use lexigraph_core::config::{RetrievalConfig, SourceFormatter};
use lexigraph_core::model::{SearchQuery, SearchResultCollection, Source, SourceInfo};

/// A topic rendered for display: its label plus statement strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayTopic {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
}

/// A search result rendered for display.
///
/// Single-topic results are flattened by [`SimplifySingleTopicResults`]:
/// the topic label moves to `topic` and its statements to `statements`.
/// The simplified form deserializes back into a
/// [`lexigraph_core::model::SearchResult`], so either view round-trips
/// through the same field names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayResult {
    pub source: SourceInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<DisplayTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Derive the display view: statements become strings, everything else
/// carries over.
pub fn to_display(collection: &SearchResultCollection, include_facts: bool) -> Vec<DisplayResult> {
    collection
        .results
        .iter()
        .map(|result| DisplayResult {
            source: result.source.clone(),
            topics: result
                .topics
                .iter()
                .map(|topic| DisplayTopic {
                    topic: topic.value.clone(),
                    statements: topic
                        .statements
                        .iter()
                        .map(|statement| {
                            if include_facts {
                                statement
                                    .statement_str
                                    .clone()
                                    .unwrap_or_else(|| statement.value.clone())
                            } else {
                                statement.value.clone()
                            }
                        })
                        .collect(),
                })
                .collect(),
            topic: None,
            statements: result.statements.clone(),
            score: result.score,
        })
        .collect()
}

/// One formatting stage over the display view.
pub trait FormatProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn format(&self, results: Vec<DisplayResult>, query: &SearchQuery) -> Vec<DisplayResult>;
}

/// Flattens results with exactly one topic: the label moves to `topic`,
/// the statements to the result itself. Multi-topic results are left
/// untouched.
pub struct SimplifySingleTopicResults;

impl FormatProcessor for SimplifySingleTopicResults {
    fn name(&self) -> &'static str {
        "SimplifySingleTopicResults"
    }

    fn format(&self, mut results: Vec<DisplayResult>, _query: &SearchQuery) -> Vec<DisplayResult> {
        for result in &mut results {
            if result.topics.len() == 1 {
                let topic = result.topics.remove(0);
                result.topic = Some(topic.topic);
                result.statements.extend(topic.statements);
            }
        }
        results
    }
}

/// Renders each source as a display label.
///
/// Without a configured formatter, the longest metadata value leads and
/// the rest follow in parentheses; a source without metadata falls back
/// to its id.
pub struct FormatSources {
    formatter: Option<SourceFormatter>,
}

impl FormatSources {
    pub fn new(formatter: Option<SourceFormatter>) -> Self {
        Self { formatter }
    }

    fn default_label(source: &Source) -> String {
        if source.metadata.is_empty() {
            return source.source_id.clone();
        }
        let mut values: Vec<&String> = source.metadata.values().collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        if values.len() == 1 {
            values[0].clone()
        } else {
            let rest: Vec<&str> = values[1..].iter().map(|v| v.as_str()).collect();
            format!("{} ({})", values[0], rest.join(", "))
        }
    }

    fn label(&self, source: &SourceInfo) -> String {
        let SourceInfo::Source(source) = source else {
            return source.key().to_string();
        };
        match &self.formatter {
            None => Self::default_label(source),
            Some(SourceFormatter::Template(template)) => {
                let mut label = template.clone();
                for (key, value) in &source.metadata {
                    label = label.replace(&format!("{{{key}}}"), value);
                }
                label
            }
            Some(SourceFormatter::Keys(keys)) => keys
                .iter()
                .find_map(|key| source.metadata.get(key))
                .cloned()
                .unwrap_or_else(|| Self::default_label(source)),
        }
    }
}

impl FormatProcessor for FormatSources {
    fn name(&self) -> &'static str {
        "FormatSources"
    }

    fn format(&self, mut results: Vec<DisplayResult>, _query: &SearchQuery) -> Vec<DisplayResult> {
        for result in &mut results {
            result.source = SourceInfo::Label(self.label(&result.source));
        }
        results
    }
}

/// The formatting chain: derives the display view and runs each
/// formatting stage in order.
pub struct FormattingPipeline {
    include_facts: bool,
    processors: Vec<Box<dyn FormatProcessor>>,
}

impl FormattingPipeline {
    pub fn new(include_facts: bool, processors: Vec<Box<dyn FormatProcessor>>) -> Self {
        Self {
            include_facts,
            processors,
        }
    }

    /// The stock chain: simplify single-topic results, then format
    /// sources.
    pub fn with_defaults(config: &RetrievalConfig) -> Self {
        Self::new(
            config.include_facts,
            vec![
                Box::new(SimplifySingleTopicResults),
                Box::new(FormatSources::new(config.source_formatter.clone())),
            ],
        )
    }

    pub fn run(&self, collection: &SearchResultCollection, query: &SearchQuery) -> Vec<DisplayResult> {
        let mut results = to_display(collection, self.include_facts);
        for processor in &self.processors {
            results = processor.format(results, query);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use lexigraph_core::model::SearchResult;
    use std::collections::BTreeMap;

    fn display_input() -> SearchResultCollection {
        let mut s = statement("s1", "Alice reviewed invoice 42", 1.0);
        s.statement_str = Some("Alice reviewed invoice 42 (details: in Q1)".to_string());
        collection(vec![result("src1", vec![topic("Invoicing", vec![s])], None)])
    }

    #[test]
    fn display_view_renders_statement_values_by_default() {
        let display = to_display(&display_input(), false);
        assert_eq!(display[0].topics[0].statements[0], "Alice reviewed invoice 42");
    }

    #[test]
    fn display_view_renders_statement_strs_with_facts() {
        let display = to_display(&display_input(), true);
        assert_eq!(
            display[0].topics[0].statements[0],
            "Alice reviewed invoice 42 (details: in Q1)"
        );
    }

    #[test]
    fn single_topic_results_are_simplified() {
        let display = SimplifySingleTopicResults.format(
            to_display(&display_input(), false),
            &SearchQuery::new("q"),
        );
        assert!(display[0].topics.is_empty());
        assert_eq!(display[0].topic.as_deref(), Some("Invoicing"));
        assert_eq!(display[0].statements.len(), 1);
    }

    #[test]
    fn multi_topic_results_are_left_alone() {
        let input = collection(vec![result(
            "src1",
            vec![
                topic("A", vec![statement("s1", "a", 1.0)]),
                topic("B", vec![statement("s2", "b", 1.0)]),
            ],
            None,
        )]);
        let display =
            SimplifySingleTopicResults.format(to_display(&input, false), &SearchQuery::new("q"));
        assert_eq!(display[0].topics.len(), 2);
        assert!(display[0].topic.is_none());
    }

    fn source_with(metadata: &[(&str, &str)]) -> SourceInfo {
        Source {
            source_id: "src1".to_string(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
        .into()
    }

    #[test]
    fn default_source_label_leads_with_the_longest_value() {
        let formatter = FormatSources::new(None);
        let label = formatter.label(&source_with(&[
            ("year", "2024"),
            ("title", "Annual Financial Report"),
        ]));
        assert_eq!(label, "Annual Financial Report (2024)");
    }

    #[test]
    fn template_formatter_substitutes_metadata() {
        let formatter = FormatSources::new(Some(SourceFormatter::Template(
            "{title}, {year}".to_string(),
        )));
        let label = formatter.label(&source_with(&[("title", "Ledger"), ("year", "2024")]));
        assert_eq!(label, "Ledger, 2024");
    }

    #[test]
    fn key_formatter_takes_the_first_present_key() {
        let formatter =
            FormatSources::new(Some(SourceFormatter::Keys(vec![
                "missing".to_string(),
                "title".to_string(),
            ])));
        let label = formatter.label(&source_with(&[("title", "Ledger")]));
        assert_eq!(label, "Ledger");
    }

    #[test]
    fn metadataless_source_falls_back_to_its_id() {
        let formatter = FormatSources::new(None);
        let label = formatter.label(&source_with(&[]));
        assert_eq!(label, "src1");
    }

    #[test]
    fn pipeline_produces_an_independent_display_view() {
        let config = RetrievalConfig::default();
        let pipeline = FormattingPipeline::with_defaults(&config);
        let input = display_input();

        let display = pipeline.run(&input, &SearchQuery::new("q"));

        // The display view is simplified and labelled...
        assert!(matches!(display[0].source, SourceInfo::Label(_)));
        assert_eq!(display[0].topic.as_deref(), Some("Invoicing"));
        // ...while the processed collection is untouched.
        assert_eq!(input.results[0].topics.len(), 1);
        assert!(matches!(input.results[0].source, SourceInfo::Source(_)));
    }

    #[test]
    fn simplified_display_round_trips_as_a_search_result() {
        let config = RetrievalConfig::default();
        let pipeline = FormattingPipeline::with_defaults(&config);
        let display = pipeline.run(&display_input(), &SearchQuery::new("q"));

        let json = serde_json::to_value(&display[0]).unwrap();
        let back: SearchResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.topic.as_deref(), Some("Invoicing"));
        assert_eq!(back.statements, vec!["Alice reviewed invoice 42"]);
        assert_eq!(back.source.key(), "Title src1");
    }
}
