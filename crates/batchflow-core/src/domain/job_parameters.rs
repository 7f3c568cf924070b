//! Job parameters and the canonical job key

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    /// The value
    pub value: Value,
    /// Whether the value contributes to the job instance identity
    pub identifying: bool,
}

impl JobParameter {
    /// Identifying parameter
    pub fn identifying(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            identifying: true,
        }
    }

    /// Non-identifying parameter
    pub fn non_identifying(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            identifying: false,
        }
    }

    fn canonical_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Named parameters of a job run.
///
/// Two parameter sets with the same identifying entries denote the same job
/// instance regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with(mut self, key: impl Into<String>, parameter: JobParameter) -> Self {
        self.parameters.insert(key.into(), parameter);
        self
    }

    /// Add an identifying string parameter
    pub fn with_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(key, JobParameter::identifying(Value::String(value.into())))
    }

    /// Add an identifying integer parameter
    pub fn with_long(self, key: impl Into<String>, value: i64) -> Self {
        self.with(key, JobParameter::identifying(value))
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.parameters.get(key)
    }

    /// String value of a parameter
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|p| p.value.as_str())
    }

    /// Integer value of a parameter
    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(|p| p.value.as_i64())
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when there are no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Identifying parameters only
    pub fn identifying(&self) -> impl Iterator<Item = (&str, &JobParameter)> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.identifying)
            .map(|(k, p)| (k.as_str(), p))
    }

    /// Canonical key of the identifying parameters: the md5 hex digest of
    /// the `key=value;` pairs in key order.
    pub fn job_key(&self) -> String {
        let mut buffer = String::new();
        for (key, parameter) in self.identifying() {
            buffer.push_str(key);
            buffer.push('=');
            buffer.push_str(&parameter.canonical_value());
            buffer.push(';');
        }
        format!("{:x}", md5::compute(buffer.as_bytes()))
    }
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, parameter)) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, parameter.canonical_value())?;
        }
        f.write_str("}")
    }
}
