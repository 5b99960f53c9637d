//! Configuration for the retrieval engine.
//!
//! All components receive an explicit [`RetrievalConfig`] value at
//! construction time; there is no ambient global configuration. The struct
//! is serde-deserializable so it can be loaded from TOML files or
//! environment variables, and `validate()` is called after any load.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// Statement reranking strategy applied by the processing pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerStrategy {
    /// No reranking; statements keep their retrieval scores.
    None,
    /// TF-IDF-style n-gram overlap against query tokens and entity contexts.
    #[default]
    Tfidf,
    /// Cross-encoder reranker model scored against the query.
    Model,
}

/// How a source is rendered for display by the formatting pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormatter {
    /// Substitute `{key}` placeholders from the source metadata.
    Template(String),
    /// First present metadata key wins.
    Keys(Vec<String>),
}

/// Entity-context expansion settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityContextConfig {
    /// Maximum seed entities admitted into context building.
    #[serde(default = "default_ec_num_entities")]
    pub num_entities: usize,
    /// Upper admission bound for neighbour scores, as a multiple of the
    /// top seed entity's score.
    #[serde(default = "default_ec_max_score_factor")]
    pub max_score_factor: f64,
    /// Lower admission bound for neighbour scores, as a multiple of the
    /// top seed entity's score.
    #[serde(default = "default_ec_min_score_factor")]
    pub min_score_factor: f64,
    /// Number of contexts folded into the reranking query.
    #[serde(default = "default_ec_max_contexts")]
    pub max_contexts: usize,
    /// Cap on the number of context paths materialized per query.
    #[serde(default = "default_ec_max_context_paths")]
    pub max_context_paths: usize,
}

fn default_ec_num_entities() -> usize {
    5
}
fn default_ec_max_score_factor() -> f64 {
    3.0
}
fn default_ec_min_score_factor() -> f64 {
    0.25
}
fn default_ec_max_contexts() -> usize {
    2
}
fn default_ec_max_context_paths() -> usize {
    10
}

impl Default for EntityContextConfig {
    fn default() -> Self {
        Self {
            num_entities: default_ec_num_entities(),
            max_score_factor: default_ec_max_score_factor(),
            min_score_factor: default_ec_min_score_factor(),
            max_contexts: default_ec_max_contexts(),
            max_context_paths: default_ec_max_context_paths(),
        }
    }
}

/// Beam-search settings shared by both beam retriever variants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BeamSearchConfig {
    /// Maximum expansion depth from any seed statement.
    #[serde(default = "default_beam_max_depth")]
    pub max_depth: usize,
    /// Maximum number of emitted results per search.
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
}

fn default_beam_max_depth() -> usize {
    3
}
fn default_beam_width() -> usize {
    10
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            max_depth: default_beam_max_depth(),
            beam_width: default_beam_width(),
        }
    }
}

/// Bounded-retry settings for transient backend failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: usize,
    /// Base wait between attempts; each retry waits this long plus jitter.
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Hard cap on a single wait.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_max_attempts() -> usize {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Main retrieval configuration.
///
/// Field defaults mirror the behaviour of a stock deployment; every field
/// can be overridden from a TOML file via [`RetrievalConfig::from_file`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Top up resolved entities with graph neighbours when fewer than
    /// `max_keywords` entities resolve.
    #[serde(default = "default_true")]
    pub expand_entities: bool,
    /// Include fact strings in statement display strings.
    #[serde(default)]
    pub include_facts: bool,
    /// Split multipart queries into subqueries before composite search.
    #[serde(default)]
    pub derive_subqueries: bool,
    /// Statement reranking strategy.
    #[serde(default)]
    pub reranker: RerankerStrategy,
    /// Cap on statements considered by the reranker.
    #[serde(default = "default_max_statements")]
    pub max_statements: usize,
    /// Cap on search results after sorting.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    /// Cap on statements retained per topic.
    #[serde(default = "default_max_statements_per_topic")]
    pub max_statements_per_topic: usize,
    /// Cap on keywords extracted from a query.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    /// Cap on subqueries produced by query decomposition.
    #[serde(default = "default_max_subqueries")]
    pub max_subqueries: usize,
    /// Intermediate statement limit inside traversal queries.
    #[serde(default = "default_intermediate_limit")]
    pub intermediate_limit: usize,
    /// Result limit per traversal query.
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
    /// Top-k for vector similarity seeding.
    #[serde(default = "default_vss_top_k")]
    pub vss_top_k: usize,
    /// Over-fetch multiplier used to diversify vector hits across sources.
    #[serde(default = "default_vss_diversity_factor")]
    pub vss_diversity_factor: usize,
    /// Results below this score are pruned.
    #[serde(default = "default_results_pruning_threshold")]
    pub results_pruning_threshold: f64,
    /// Statements scoring below `max_score * factor` are pruned.
    #[serde(default = "default_statement_pruning_factor")]
    pub statement_pruning_factor: f64,
    /// Worker bound for parallel fan-out stages.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Optional display formatter for sources.
    #[serde(default)]
    pub source_formatter: Option<SourceFormatter>,
    /// Entity-context expansion settings.
    #[serde(default)]
    pub entity_context: EntityContextConfig,
    /// Beam-search settings.
    #[serde(default)]
    pub beam: BeamSearchConfig,
    /// Retry settings for transient backend failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_true() -> bool {
    true
}
fn default_max_statements() -> usize {
    100
}
fn default_max_search_results() -> usize {
    5
}
fn default_max_statements_per_topic() -> usize {
    10
}
fn default_max_keywords() -> usize {
    10
}
fn default_max_subqueries() -> usize {
    2
}
fn default_intermediate_limit() -> usize {
    50
}
fn default_query_limit() -> usize {
    10
}
fn default_vss_top_k() -> usize {
    10
}
fn default_vss_diversity_factor() -> usize {
    5
}
fn default_results_pruning_threshold() -> f64 {
    0.08
}
fn default_statement_pruning_factor() -> f64 {
    0.1
}
fn default_num_workers() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            expand_entities: true,
            include_facts: false,
            derive_subqueries: false,
            reranker: RerankerStrategy::default(),
            max_statements: default_max_statements(),
            max_search_results: default_max_search_results(),
            max_statements_per_topic: default_max_statements_per_topic(),
            max_keywords: default_max_keywords(),
            max_subqueries: default_max_subqueries(),
            intermediate_limit: default_intermediate_limit(),
            query_limit: default_query_limit(),
            vss_top_k: default_vss_top_k(),
            vss_diversity_factor: default_vss_diversity_factor(),
            results_pruning_threshold: default_results_pruning_threshold(),
            statement_pruning_factor: default_statement_pruning_factor(),
            num_workers: default_num_workers(),
            source_formatter: None,
            entity_context: EntityContextConfig::default(),
            beam: BeamSearchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from files and environment.
    ///
    /// Sources, in order:
    /// 1. `config/default.toml`
    /// 2. `config/{LEXIGRAPH_ENV}.toml`
    /// 3. Environment variables with the `LEXIGRAPH_` prefix
    pub fn load() -> CoreResult<Self> {
        let env = std::env::var("LEXIGRAPH_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(config::Environment::with_prefix("LEXIGRAPH").separator("__"));

        let cfg: RetrievalConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a single TOML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        let cfg: RetrievalConfig = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("failed to parse config file: {e}")))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> CoreResult<()> {
        if self.num_workers == 0 {
            return Err(CoreError::Config("num_workers must be greater than 0".into()));
        }
        if self.beam.beam_width == 0 {
            return Err(CoreError::Config("beam.beam_width must be greater than 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config("retry.max_attempts must be greater than 0".into()));
        }
        if self.entity_context.min_score_factor > self.entity_context.max_score_factor {
            return Err(CoreError::Config(
                "entity_context.min_score_factor must not exceed max_score_factor".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.statement_pruning_factor) {
            return Err(CoreError::Config(
                "statement_pruning_factor must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
