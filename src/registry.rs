use crate::analysis::{AnalysisParameters, AnalysisType, Interval};
use crate::error::ValidationError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

fn require<'a>(
    spec: &'a Map<String, Value>,
    field: &str,
    position: &str,
) -> Result<&'a Value, ValidationError> {
    spec.get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| ValidationError::MissingField {
            position: position.to_string(),
            field: field.to_string(),
        })
}

fn invalid(position: &str, field: &str, expected: &str) -> ValidationError {
    ValidationError::InvalidField {
        position: position.to_string(),
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

fn require_positive_u32(
    spec: &Map<String, Value>,
    field: &str,
    position: &str,
) -> Result<u32, ValidationError> {
    require(spec, field, position)?
        .as_u64()
        .filter(|n| *n >= 1)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(position, field, "a positive integer"))
}

fn require_non_empty_str<'a>(
    spec: &'a Map<String, Value>,
    field: &str,
    position: &str,
) -> Result<&'a str, ValidationError> {
    require(spec, field, position)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(position, field, "a non-empty string"))
}

/// Description of one analysis parameter, as listed by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: &'static str,
    pub description: &'static str,
}

/// How a configuration spec is validated into parameters for one analysis type.
pub trait AnalysisDefinition: Send + Sync {
    /// Analysis type that this definition satisfies.
    fn analysis_type(&self) -> AnalysisType;

    /// Human-readable summary.
    fn description(&self) -> &'static str;

    /// Required parameters, in documentation order.
    fn parameters(&self) -> &'static [ParameterInfo];

    /// Validates the analysis-specific fields of a spec object.
    fn parse_parameters(
        &self,
        spec: &Map<String, Value>,
        position: &str,
    ) -> Result<AnalysisParameters, ValidationError>;

    /// Whether `field` is one of this definition's parameters.
    fn accepts_field(&self, field: &str) -> bool {
        self.parameters().iter().any(|p| p.name == field)
    }
}

/// Registry of analysis definitions consulted by the task compiler.
pub struct AnalysisRegistry {
    definitions: HashMap<AnalysisType, Box<dyn AnalysisDefinition>>,
}

impl std::fmt::Debug for AnalysisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRegistry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AnalysisRegistry {
    /// Creates a new registry populated with the built-in analyses.
    pub fn new() -> Self {
        let mut definitions: HashMap<AnalysisType, Box<dyn AnalysisDefinition>> = HashMap::new();
        definitions.insert(AnalysisType::TimeSeries, Box::new(TimeSeriesDefinition));
        definitions.insert(AnalysisType::FreqDist, Box::new(FreqDistDefinition));
        AnalysisRegistry { definitions }
    }

    /// Returns the definition associated with an analysis type.
    pub fn definition(&self, analysis: AnalysisType) -> Option<&dyn AnalysisDefinition> {
        self.definitions.get(&analysis).map(|boxed| boxed.as_ref())
    }

    /// Definitions in canonical analysis-type order.
    pub fn definitions(&self) -> Vec<&dyn AnalysisDefinition> {
        AnalysisType::ALL
            .iter()
            .filter_map(|analysis| self.definition(*analysis))
            .collect()
    }
}

impl Default for AnalysisRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct TimeSeriesDefinition;

impl AnalysisDefinition for TimeSeriesDefinition {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::TimeSeries
    }

    fn description(&self) -> &'static str {
        "Interaction counts bucketed over time"
    }

    fn parameters(&self) -> &'static [ParameterInfo] {
        const PARAMETERS: &[ParameterInfo] = &[
            ParameterInfo {
                name: "interval",
                param_type: "string",
                description: "Bucket unit: minute, hour, day, week or month",
            },
            ParameterInfo {
                name: "span",
                param_type: "integer",
                description: "Number of intervals per bucket",
            },
        ];
        PARAMETERS
    }

    fn parse_parameters(
        &self,
        spec: &Map<String, Value>,
        position: &str,
    ) -> Result<AnalysisParameters, ValidationError> {
        let interval = require(spec, "interval", position)?
            .as_str()
            .and_then(Interval::parse)
            .ok_or_else(|| invalid(position, "interval", "one of minute, hour, day, week, month"))?;
        let span = require_positive_u32(spec, "span", position)?;

        Ok(AnalysisParameters::TimeSeries { interval, span })
    }
}

struct FreqDistDefinition;

impl AnalysisDefinition for FreqDistDefinition {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::FreqDist
    }

    fn description(&self) -> &'static str {
        "Most frequent values of a target field"
    }

    fn parameters(&self) -> &'static [ParameterInfo] {
        const PARAMETERS: &[ParameterInfo] = &[
            ParameterInfo {
                name: "target",
                param_type: "string",
                description: "Field path whose values are counted",
            },
            ParameterInfo {
                name: "threshold",
                param_type: "integer",
                description: "Maximum number of values returned",
            },
        ];
        PARAMETERS
    }

    fn parse_parameters(
        &self,
        spec: &Map<String, Value>,
        position: &str,
    ) -> Result<AnalysisParameters, ValidationError> {
        let target = require_non_empty_str(spec, "target", position)?.to_string();
        let threshold = require_positive_u32(spec, "threshold", position)?;

        Ok(AnalysisParameters::FreqDist { target, threshold })
    }
}
