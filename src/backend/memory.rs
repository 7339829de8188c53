//! In-memory reference backend.
//!
//! Keeps a corpus of interactions in memory and answers time-series and
//! frequency-distribution requests over it. This allows running the engine
//! end-to-end without a remote analytics service.

use crate::analysis::{AnalysisParameters, AnalysisSpec, Interval};
use crate::backend::filter::{lookup, scalar_text, Filter};
use crate::backend::{AnalysisBackend, BackendError, BackendRequest};
use crate::result::{AnalysisResult, ResultRecord};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

/// Start of the week-aligned epoch (1970-01-05 was a Monday).
const MONDAY_OFFSET_SECONDS: i64 = 4 * 86_400;

/// A single piece of content in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub created_at: DateTime<Utc>,
    pub author_id: String,
    /// Document fields addressed by filters and targets, e.g. `fb.content`.
    pub fields: Value,
}

impl Interaction {
    pub fn new(created_at: DateTime<Utc>, author_id: impl Into<String>, fields: Value) -> Self {
        Interaction {
            created_at,
            author_id: author_id.into(),
            fields,
        }
    }

    /// Text of the scalar field at `path`, if any.
    pub fn field_text(&self, path: &str) -> Option<String> {
        lookup(&self.fields, path).and_then(scalar_text)
    }
}

/// Configuration for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Buckets and frequency entries with fewer unique authors are withheld
    /// and listed in the result's `redacted` set (default: 0, nothing withheld).
    pub min_audience: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        MemoryBackendConfig { min_audience: 0 }
    }
}

#[derive(Default)]
struct Tally {
    interactions: u64,
    authors: HashSet<String>,
}

impl Tally {
    fn add(&mut self, interaction: &Interaction) {
        self.interactions += 1;
        self.authors.insert(interaction.author_id.clone());
    }

    fn unique_authors(&self) -> u64 {
        self.authors.len() as u64
    }
}

/// In-memory backend implementation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    corpus: Vec<Interaction>,
    config: MemoryBackendConfig,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend over the given corpus.
    pub fn with_corpus(corpus: Vec<Interaction>) -> Self {
        InMemoryBackend {
            corpus,
            config: MemoryBackendConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MemoryBackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds an interaction to the corpus.
    pub fn add_interaction(&mut self, interaction: Interaction) {
        self.corpus.push(interaction);
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Interactions matching the request's filter and the parent context.
    fn select<'a>(
        &'a self,
        spec: &AnalysisSpec,
        context: Option<&AnalysisResult>,
    ) -> Result<Vec<&'a Interaction>, BackendError> {
        let filter = spec.filter.as_deref().map(Filter::parse).transpose()?;
        let narrowing = context.map(ContextNarrowing::from_result);

        Ok(self
            .corpus
            .iter()
            .filter(|item| filter.as_ref().map_or(true, |f| f.matches(&item.fields)))
            .filter(|item| narrowing.as_ref().map_or(true, |n| n.admits(item)))
            .collect())
    }

    fn time_series(
        &self,
        selected: &[&Interaction],
        interval: Interval,
        span: u32,
    ) -> (Vec<ResultRecord>, BTreeSet<String>) {
        let mut buckets: BTreeMap<i64, Tally> = BTreeMap::new();
        for item in selected {
            buckets
                .entry(bucket_start(item.created_at, interval, span))
                .or_default()
                .add(item);
        }

        let mut redacted = BTreeSet::new();
        let mut records = Vec::with_capacity(buckets.len());
        for (timestamp, tally) in buckets {
            if tally.unique_authors() < self.config.min_audience {
                redacted.insert(timestamp.to_string());
                continue;
            }
            records.push(ResultRecord::Bucket {
                timestamp,
                interactions: tally.interactions,
                unique_authors: tally.unique_authors(),
            });
        }
        (records, redacted)
    }

    fn frequency_distribution(
        &self,
        selected: &[&Interaction],
        target: &str,
        threshold: u32,
    ) -> (Vec<ResultRecord>, BTreeSet<String>) {
        let mut tallies: HashMap<String, Tally> = HashMap::new();
        for item in selected {
            if let Some(value) = item.field_text(target) {
                tallies.entry(value).or_default().add(item);
            }
        }

        let mut redacted = BTreeSet::new();
        let mut entries: Vec<(String, Tally)> = Vec::with_capacity(tallies.len());
        for (key, tally) in tallies {
            if tally.unique_authors() < self.config.min_audience {
                redacted.insert(key);
            } else {
                entries.push((key, tally));
            }
        }

        entries.sort_by(|a, b| {
            b.1.interactions
                .cmp(&a.1.interactions)
                .then_with(|| a.0.cmp(&b.0))
        });
        entries.truncate(threshold as usize);

        let records = entries
            .into_iter()
            .map(|(key, tally)| ResultRecord::Frequency {
                interactions: tally.interactions,
                unique_authors: tally.unique_authors(),
                key,
            })
            .collect();
        (records, redacted)
    }
}

#[async_trait]
impl AnalysisBackend for InMemoryBackend {
    async fn analyze(&self, request: BackendRequest<'_>) -> Result<AnalysisResult, BackendError> {
        let spec = request.spec;
        let selected = self.select(spec, request.context)?;
        debug!(
            analysis = %spec.analysis_type,
            filter = ?spec.filter,
            chained = request.context.is_some(),
            matched = selected.len(),
            "InMemoryBackend: selected interactions"
        );

        let (results, redacted) = match &spec.parameters {
            AnalysisParameters::TimeSeries { interval, span } => {
                // Compiled specs never carry a zero span; direct callers can.
                if *span == 0 {
                    return Err(BackendError::InvalidRequest(
                        "span must be at least 1".to_string(),
                    ));
                }
                self.time_series(&selected, *interval, *span)
            }
            AnalysisParameters::FreqDist { target, threshold } => {
                self.frequency_distribution(&selected, target, *threshold)
            }
        };
        trace!(
            records = results.len(),
            redacted = redacted.len(),
            "InMemoryBackend: analysis complete"
        );

        Ok(AnalysisResult {
            analysis_type: spec.analysis_type,
            parameters: spec.parameters.clone(),
            results,
            redacted,
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Restriction a parent result imposes on its chained child.
enum ContextNarrowing {
    /// Only interactions whose `target` value is one of the parent's keys.
    Keys { target: String, keys: HashSet<String> },
    /// Only interactions falling into one of the parent's buckets.
    Buckets {
        interval: Interval,
        span: u32,
        starts: HashSet<i64>,
    },
}

impl ContextNarrowing {
    fn from_result(parent: &AnalysisResult) -> Self {
        match &parent.parameters {
            AnalysisParameters::FreqDist { target, .. } => ContextNarrowing::Keys {
                target: target.clone(),
                keys: parent.keys().map(str::to_string).collect(),
            },
            AnalysisParameters::TimeSeries { interval, span } => ContextNarrowing::Buckets {
                interval: *interval,
                span: *span,
                starts: parent
                    .results
                    .iter()
                    .filter_map(ResultRecord::timestamp)
                    .collect(),
            },
        }
    }

    fn admits(&self, item: &Interaction) -> bool {
        match self {
            ContextNarrowing::Keys { target, keys } => item
                .field_text(target)
                .map_or(false, |value| keys.contains(&value)),
            ContextNarrowing::Buckets {
                interval,
                span,
                starts,
            } => starts.contains(&bucket_start(item.created_at, *interval, *span)),
        }
    }
}

/// Start of the `span × interval` bucket containing `at`, in Unix seconds.
///
/// Weeks start on Monday; months are calendar months counted from year 0.
pub fn bucket_start(at: DateTime<Utc>, interval: Interval, span: u32) -> i64 {
    let span = i64::from(span.max(1));
    match interval.fixed_seconds() {
        Some(width) => {
            let width = width * span;
            let offset = if interval == Interval::Week {
                MONDAY_OFFSET_SECONDS
            } else {
                0
            };
            (at.timestamp() - offset).div_euclid(width) * width + offset
        }
        None => {
            let month_index = i64::from(at.year()) * 12 + i64::from(at.month0());
            let start = month_index.div_euclid(span) * span;
            let year = start.div_euclid(12) as i32;
            let month = start.rem_euclid(12) as u32 + 1;
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                .single()
                .map_or(at.timestamp(), |dt| dt.timestamp())
        }
    }
}

/// Deterministic demo corpus: 120 interactions over 25 days from
/// 2024-01-01, 40 authors, content mentioning ford, honda or toyota, and
/// author demographics under `fb.parent.author`. Male authors outnumber
/// female authors 3 to 2.
pub fn sample_corpus() -> Vec<Interaction> {
    const BRANDS: [&str; 3] = ["ford", "honda", "toyota"];
    const AGES: [&str; 4] = ["18-24", "25-34", "35-44", "45-54"];

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    (0..120usize)
        .map(|i| {
            let gender = if i % 5 < 3 { "male" } else { "female" };
            let brand = BRANDS[i % BRANDS.len()];
            Interaction::new(
                start + Duration::hours(5 * i as i64),
                format!("author-{}", i % 40),
                json!({
                    "fb": {
                        "content": format!("Thinking about a new {} this year", brand),
                        "parent": {
                            "author": {
                                "gender": gender,
                                "age": AGES[(i / 5) % AGES.len()],
                            }
                        }
                    }
                }),
            )
        })
        .collect()
}
