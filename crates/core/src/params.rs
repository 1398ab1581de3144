//! Parameter specifications and their resolver.
//!
//! A parameter value in configuration is one of three things:
//!
//! - a plain value, passed through unchanged (`Static`);
//! - `"macro:NAME"`, invoking a registered macro (`Macro`);
//! - `"step:NAME"`, reading an earlier task's output from the Step Store
//!   (`Step`).
//!
//! The prefix is recognized exactly once, at deserialization; from then on
//! the parameter is an explicit tagged union and every resolution path is
//! an exhaustive match. Resolution is eager and total: either every key in a
//! parameter dictionary resolves or the call fails as a whole — downstream
//! code never sees a half-resolved map.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResolveError;
use crate::macros::MacroRegistry;
use crate::record::{RecordValue, StreamData};
use crate::store::StepStore;

/// Prefix marking a macro reference in configuration.
const MACRO_PREFIX: &str = "macro:";
/// Prefix marking a step-output reference in configuration.
const STEP_PREFIX: &str = "step:";

// ---------------------------------------------------------------------------
// ParamSpec
// ---------------------------------------------------------------------------

/// A single parameter value as declared in configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    /// A literal value, resolved to itself.
    Static(Value),
    /// A reference to a registered macro, resolved by invoking it.
    Macro(String),
    /// A reference to an earlier task's output, resolved from the Step
    /// Store.
    Step(String),
}

impl ParamSpec {
    /// Classify a raw configuration value into a spec.
    ///
    /// Only strings can carry a `macro:`/`step:` prefix; every other value
    /// is static.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(s) = &value {
            if let Some(name) = s.strip_prefix(MACRO_PREFIX) {
                return Self::Macro(name.to_string());
            }
            if let Some(name) = s.strip_prefix(STEP_PREFIX) {
                return Self::Step(name.to_string());
            }
        }
        Self::Static(value)
    }
}

impl FromStr for ParamSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_value(Value::String(s.to_string())))
    }
}

impl<'de> Deserialize<'de> for ParamSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

impl Serialize for ParamSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Static(v) => v.serialize(serializer),
            Self::Macro(name) => serializer.serialize_str(&format!("{MACRO_PREFIX}{name}")),
            Self::Step(name) => serializer.serialize_str(&format!("{STEP_PREFIX}{name}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve a parameter dictionary to plain values.
///
/// The first failing key aborts the whole call; a partially resolved map is
/// never returned.
pub fn resolve_params(
    params: &BTreeMap<String, ParamSpec>,
    macros: &MacroRegistry,
    store: &StepStore,
) -> Result<BTreeMap<String, Value>, ResolveError> {
    let mut resolved = BTreeMap::new();
    for (key, spec) in params {
        resolved.insert(key.clone(), resolve_one(spec, macros, store)?);
    }
    Ok(resolved)
}

/// Resolve a single spec to a plain value.
fn resolve_one(
    spec: &ParamSpec,
    macros: &MacroRegistry,
    store: &StepStore,
) -> Result<Value, ResolveError> {
    match spec {
        ParamSpec::Static(value) => Ok(value.clone()),
        ParamSpec::Macro(name) => macros.invoke(name),
        ParamSpec::Step(name) => {
            let record = store
                .get(name)
                .ok_or_else(|| ResolveError::StepNotFound(name.clone()))?;
            record_to_value(name, record)
        }
    }
}

/// Convert a stored record into a parameter value.
///
/// Tabular, byte-buffer, and file-path records are not parameter-shaped;
/// referencing one from a parameter spec is a format mismatch, distinct
/// from the record never having been produced.
fn record_to_value(name: &str, record: &StreamData) -> Result<Value, ResolveError> {
    match &record.value {
        RecordValue::Text(s) => Ok(Value::String(s.clone())),
        RecordValue::Int(i) => Ok(Value::from(*i)),
        RecordValue::List(items) => Ok(Value::Array(items.clone())),
        RecordValue::Json(v) => Ok(v.clone()),
        RecordValue::Table(_) | RecordValue::Bytes(_) | RecordValue::FilePath(_) => {
            Err(ResolveError::FormatMismatch {
                name: name.to_string(),
                expected: "a parameter-shaped value (text, int, list, or json)",
                actual: record.format(),
            })
        }
    }
}

/// Resolve an email recipients spec to a list of addresses.
///
/// Accepted shapes: a single address, a comma-separated address string, a
/// literal array of addresses, or a `step:` reference whose record format
/// must be a list of strings.
pub fn resolve_recipients(
    spec: &ParamSpec,
    macros: &MacroRegistry,
    store: &StepStore,
) -> Result<Vec<String>, ResolveError> {
    match spec {
        ParamSpec::Static(value) => value_to_recipients(value),
        ParamSpec::Macro(name) => {
            let value = macros.invoke(name)?;
            value_to_recipients(&value)
        }
        ParamSpec::Step(name) => {
            let record = store
                .get(name)
                .ok_or_else(|| ResolveError::StepNotFound(name.clone()))?;
            let items = record.as_list().ok_or_else(|| ResolveError::FormatMismatch {
                name: name.clone(),
                expected: "list",
                actual: record.format(),
            })?;
            let mut recipients = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        recipients.push(s.trim().to_string())
                    }
                    _ => {
                        return Err(ResolveError::FormatMismatch {
                            name: name.clone(),
                            expected: "a list of address strings",
                            actual: record.format(),
                        })
                    }
                }
            }
            non_empty(recipients, "recipients")
        }
    }
}

/// Parse a literal recipients value: one address, a comma-separated string,
/// or an array of address strings.
fn value_to_recipients(value: &Value) -> Result<Vec<String>, ResolveError> {
    let mismatch = |actual: &Value| ResolveError::FormatMismatch {
        name: "recipients".to_string(),
        expected: "an address string or list of address strings",
        actual: match actual {
            Value::Array(_) => crate::record::DataFormat::List,
            Value::String(_) => crate::record::DataFormat::Text,
            _ => crate::record::DataFormat::Json,
        },
    };

    match value {
        Value::String(s) => {
            let recipients: Vec<String> = s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect();
            non_empty(recipients, "recipients")
        }
        Value::Array(items) => {
            let mut recipients = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        recipients.push(s.trim().to_string())
                    }
                    _ => return Err(mismatch(value)),
                }
            }
            non_empty(recipients, "recipients")
        }
        other => Err(mismatch(other)),
    }
}

fn non_empty(recipients: Vec<String>, name: &str) -> Result<Vec<String>, ResolveError> {
    if recipients.is_empty() {
        return Err(ResolveError::FormatMismatch {
            name: name.to_string(),
            expected: "at least one address",
            actual: crate::record::DataFormat::List,
        });
    }
    Ok(recipients)
}
