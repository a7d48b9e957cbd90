//! Wire-level types shared by the cubeflow worker and client.
//!
//! The invocation protocol is deliberately small: a program name, an ordered
//! map of named arguments (scalars or ordered sequences), and the set of
//! argument names whose value is a remote URL the worker should fetch before
//! running the program.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single named argument value as understood by the orchestration layers.
///
/// Scalars map 1:1 onto the wrapped executables' `key=value` interface.
/// Sequences are serialized by the worker into a newline-delimited list-file
/// because the executables only accept scalar arguments. Remote refs are
/// fetched by the worker into a temporary artifact before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Scalar(String),
    Sequence(Vec<String>),
    RemoteRef(String),
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Scalar(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Scalar(value.to_string())
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        ArgValue::Sequence(values)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(values: Vec<&str>) -> Self {
        ArgValue::Sequence(values.into_iter().map(str::to_string).collect())
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Scalar(value.to_string())
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Scalar(value.to_string())
    }
}

/// On-the-wire argument value: `string | string[]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Scalar(String),
    Sequence(Vec<String>),
}

/// A command invocation as posted to the worker's `/commands` endpoint.
///
/// Argument order is preserved: the wrapped executables receive arguments in
/// the order the caller added them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub program: String,
    pub args: IndexMap<String, WireValue>,
    /// Names of arguments whose scalar value is a remote URL to pre-fetch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<String>,
}

impl InvocationRequest {
    /// Builds the wire form from typed argument values, splitting remote
    /// refs into the `remotes` set.
    pub fn new(program: impl Into<String>, args: IndexMap<String, ArgValue>) -> Self {
        let mut wire_args = IndexMap::with_capacity(args.len());
        let mut remotes = Vec::new();

        for (name, value) in args {
            let wire = match value {
                ArgValue::Scalar(v) => WireValue::Scalar(v),
                ArgValue::Sequence(vs) => WireValue::Sequence(vs),
                ArgValue::RemoteRef(url) => {
                    remotes.push(name.clone());
                    WireValue::Scalar(url)
                }
            };
            wire_args.insert(name, wire);
        }

        Self {
            program: program.into(),
            args: wire_args,
            remotes,
        }
    }

    /// Folds the `remotes` set back into typed argument values.
    pub fn arg_values(&self) -> IndexMap<String, ArgValue> {
        self.args
            .iter()
            .map(|(name, wire)| {
                let value = match wire {
                    WireValue::Scalar(v) if self.remotes.iter().any(|r| r == name) => {
                        ArgValue::RemoteRef(v.clone())
                    }
                    WireValue::Scalar(v) => ArgValue::Scalar(v.clone()),
                    WireValue::Sequence(vs) => ArgValue::Sequence(vs.clone()),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// The `{message}` body used by every non-file worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
