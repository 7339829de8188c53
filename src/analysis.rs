//! Analysis requests as the engine sees them once a configuration has been
//! compiled: the analysis type, the caller's name and filter, and the
//! analysis-specific parameters.

use serde::{Deserialize, Serialize};

/// Analysis types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalysisType {
    #[serde(rename = "timeSeries")]
    TimeSeries,
    #[serde(rename = "freqDist")]
    FreqDist,
}

impl AnalysisType {
    /// All analysis types in their canonical order.
    pub const ALL: [AnalysisType; 2] = [AnalysisType::TimeSeries, AnalysisType::FreqDist];

    /// Resolves a configuration key such as `"timeSeries"`.
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "timeSeries" => Some(AnalysisType::TimeSeries),
            "freqDist" => Some(AnalysisType::FreqDist),
            _ => None,
        }
    }

    /// Key used in configuration documents and on the wire.
    pub fn config_key(&self) -> &'static str {
        match self {
            AnalysisType::TimeSeries => "timeSeries",
            AnalysisType::FreqDist => "freqDist",
        }
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_key())
    }
}

/// Bucket unit for time-series analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::Minute,
        Interval::Hour,
        Interval::Day,
        Interval::Week,
        Interval::Month,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(Interval::Minute),
            "hour" => Some(Interval::Hour),
            "day" => Some(Interval::Day),
            "week" => Some(Interval::Week),
            "month" => Some(Interval::Month),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }

    /// Length in seconds for fixed-width intervals. Months are calendar-aligned
    /// and have no fixed width.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Interval::Minute => Some(60),
            Interval::Hour => Some(3_600),
            Interval::Day => Some(86_400),
            Interval::Week => Some(604_800),
            Interval::Month => None,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis-specific parameters.
///
/// Serialized untagged so that an echoed `parameters` object carries exactly
/// the keys of its analysis type (`interval`/`span` or `target`/`threshold`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisParameters {
    TimeSeries { interval: Interval, span: u32 },
    FreqDist { target: String, threshold: u32 },
}

impl AnalysisParameters {
    pub fn analysis_type(&self) -> AnalysisType {
        match self {
            AnalysisParameters::TimeSeries { .. } => AnalysisType::TimeSeries,
            AnalysisParameters::FreqDist { .. } => AnalysisType::FreqDist,
        }
    }

    /// Target field of a frequency distribution.
    pub fn target(&self) -> Option<&str> {
        match self {
            AnalysisParameters::FreqDist { target, .. } => Some(target),
            AnalysisParameters::TimeSeries { .. } => None,
        }
    }
}

/// One leaf analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisSpec {
    pub analysis_type: AnalysisType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub parameters: AnalysisParameters,
}

impl AnalysisSpec {
    pub fn new(parameters: AnalysisParameters) -> Self {
        AnalysisSpec {
            analysis_type: parameters.analysis_type(),
            name: None,
            filter: None,
            parameters,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// The caller-supplied identifier used for merging: `name`, else `filter`.
    pub fn explicit_key(&self) -> Option<&str> {
        self.name.as_deref().or(self.filter.as_deref())
    }
}
