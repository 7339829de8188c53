//! Backend results and the merged responses handed back to callers.

use crate::analysis::{AnalysisParameters, AnalysisType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One record of an analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultRecord {
    /// Time-series bucket; `timestamp` is the bucket start in Unix seconds.
    Bucket {
        timestamp: i64,
        interactions: u64,
        unique_authors: u64,
    },
    /// Frequency-distribution entry.
    Frequency {
        key: String,
        interactions: u64,
        unique_authors: u64,
    },
}

impl ResultRecord {
    pub fn key(&self) -> Option<&str> {
        match self {
            ResultRecord::Frequency { key, .. } => Some(key),
            ResultRecord::Bucket { .. } => None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            ResultRecord::Bucket { timestamp, .. } => Some(*timestamp),
            ResultRecord::Frequency { .. } => None,
        }
    }

    pub fn interactions(&self) -> u64 {
        match self {
            ResultRecord::Bucket { interactions, .. }
            | ResultRecord::Frequency { interactions, .. } => *interactions,
        }
    }

    pub fn unique_authors(&self) -> u64 {
        match self {
            ResultRecord::Bucket { unique_authors, .. }
            | ResultRecord::Frequency { unique_authors, .. } => *unique_authors,
        }
    }
}

/// Raw output of the backend for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_type: AnalysisType,
    pub parameters: AnalysisParameters,
    pub results: Vec<ResultRecord>,
    /// Keys (frequency values or bucket timestamps) withheld by the backend.
    #[serde(default)]
    pub redacted: BTreeSet<String>,
}

impl AnalysisResult {
    pub fn new(parameters: AnalysisParameters, results: Vec<ResultRecord>) -> Self {
        AnalysisResult {
            analysis_type: parameters.analysis_type(),
            parameters,
            results,
            redacted: BTreeSet::new(),
        }
    }

    /// Keys of frequency entries, in result order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(ResultRecord::key)
    }
}

/// Caller-visible envelope for one analysis (`data.analysis`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: AnalysisResult,
    /// Results of chained follow-up analyses, keyed by merge key. Only
    /// populated when a chain head is the sole analysis of its task.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chained: BTreeMap<String, AnalysisResponse>,
}

impl From<AnalysisResult> for AnalysisResponse {
    fn from(analysis: AnalysisResult) -> Self {
        AnalysisResponse {
            analysis,
            chained: BTreeMap::new(),
        }
    }
}

/// Result of one top-level task after merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergedResponse {
    /// A lone analysis surfaces its own shape.
    Single(AnalysisResponse),
    /// Sibling analyses keyed by name or filter.
    Keyed(BTreeMap<String, AnalysisResponse>),
}

impl MergedResponse {
    /// The surfaced analysis of a single-analysis response.
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match self {
            MergedResponse::Single(response) => Some(&response.analysis),
            MergedResponse::Keyed(_) => None,
        }
    }

    /// Looks up a keyed sibling, or a chained follow-up of a single response.
    pub fn get(&self, key: &str) -> Option<&AnalysisResponse> {
        match self {
            MergedResponse::Single(response) => response.chained.get(key),
            MergedResponse::Keyed(map) => map.get(key),
        }
    }

    /// Keys at the top level of a keyed response.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            MergedResponse::Single(_) => Vec::new(),
            MergedResponse::Keyed(map) => map.keys().map(String::as_str).collect(),
        }
    }
}
