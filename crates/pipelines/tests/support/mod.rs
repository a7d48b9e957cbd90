//! In-memory stand-in for a worker, used by the workflow tests.
//!
//! It tracks the artifact store as a name -> label map and simulates just
//! enough of each wrapped program to exercise the orchestration logic:
//! outputs come into existence, labels propagate from the primary input, and
//! consumed inputs must still exist at dispatch time. Deleting a missing
//! artifact fails, so double-deletes and premature deletes surface as test
//! failures.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use cubeflow_client::{ClientError, FileUpload, WorkerApi};
use cubeflow_proto::{InvocationRequest, WireValue};
use serde_json::{json, Value};

const PROGRAMS: &[&str] = &[
    "hi2isis",
    "spiceinit",
    "hical",
    "cubenorm",
    "histitch",
    "autoregtemplate",
    "hijitreg",
    "slither",
    "ratio",
    "lowpass",
    "fx",
    "enlarge",
    "reduce",
    "crop",
    "editlab",
    "maptemplate",
    "cam2map",
    "equalizer",
    "noseam",
    "cubeit",
];

#[derive(Default)]
struct State {
    artifacts: BTreeMap<String, Value>,
    url_labels: BTreeMap<String, Value>,
    invocations: Vec<InvocationRequest>,
    fail_on: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct FakeWorker {
    state: Mutex<State>,
}

/// A minimal cube label with the fields the workflows read.
pub fn cube_label(samples: u32, lines: u32, summing: u32) -> Value {
    json!({
        "IsisCube": {
            "Core": {
                "Dimensions": {
                    "Samples": samples.to_string(),
                    "Lines": lines.to_string(),
                    "Bands": "1",
                }
            },
            "Instrument": {
                "SpacecraftName": "MARS RECONNAISSANCE ORBITER",
                "Summing": summing.to_string(),
            }
        }
    })
}

fn server_error(status: u16, message: impl Into<String>) -> ClientError {
    ClientError::Server {
        status,
        message: message.into(),
    }
}

/// Band selections like `mosaic.cub+2` refer to the base artifact.
fn strip_band(name: &str) -> &str {
    match name.split_once('+') {
        Some((base, _)) => base,
        None => name,
    }
}

fn scalar<'r>(request: &'r InvocationRequest, name: &str) -> &'r str {
    match request.args.get(name) {
        Some(WireValue::Scalar(v)) => v,
        other => panic!("{}: expected scalar arg {name:?}, got {other:?}", request.program),
    }
}

fn sequence<'r>(request: &'r InvocationRequest, name: &str) -> &'r [String] {
    match request.args.get(name) {
        Some(WireValue::Sequence(vs)) => vs,
        other => panic!("{}: expected sequence arg {name:?}, got {other:?}", request.program),
    }
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an artifact, as if previously uploaded.
    pub fn put(&self, name: &str, label: Value) {
        self.state
            .lock()
            .unwrap()
            .artifacts
            .insert(name.to_string(), label);
    }

    /// Registers the label a remote fetch of `url` would produce.
    pub fn put_url_label(&self, url: &str, label: Value) {
        self.state
            .lock()
            .unwrap()
            .url_labels
            .insert(url.to_string(), label);
    }

    /// Makes every invocation of `program` fail with `diagnostic`.
    pub fn fail_on(&self, program: &str, diagnostic: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_on
            .insert(program.to_string(), diagnostic.to_string());
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.state.lock().unwrap().artifacts.keys().cloned().collect()
    }

    pub fn invocations(&self) -> Vec<InvocationRequest> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn invocations_of(&self, program: &str) -> Vec<InvocationRequest> {
        self.invocations()
            .into_iter()
            .filter(|r| r.program == program)
            .collect()
    }
}

impl State {
    fn require(&self, program: &str, name: &str) {
        assert!(
            self.artifacts.contains_key(strip_band(name)),
            "{program}: input {name:?} does not exist in the workspace"
        );
    }

    fn label_of(&self, program: &str, name: &str) -> Value {
        self.require(program, name);
        self.artifacts[strip_band(name)].clone()
    }
}

#[async_trait]
impl WorkerApi for FakeWorker {
    async fn invoke(&self, request: InvocationRequest) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.invocations.push(request.clone());

        let program = request.program.as_str();
        if !PROGRAMS.contains(&program) {
            return Err(server_error(404, format!("Unknown program: {program}")));
        }
        if let Some(diagnostic) = state.fail_on.get(program) {
            return Err(server_error(500, diagnostic.clone()));
        }

        match program {
            "hi2isis" => {
                let from = scalar(&request, "from");
                let label = if request.remotes.iter().any(|r| r == "from") {
                    state
                        .url_labels
                        .get(from)
                        .unwrap_or_else(|| panic!("no label seeded for url {from:?}"))
                        .clone()
                } else {
                    state.label_of(program, from)
                };
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "spiceinit" => {
                state.require(program, scalar(&request, "from"));
            }
            "hical" | "cubenorm" | "enlarge" | "reduce" | "crop" | "lowpass" | "cam2map" => {
                // single from -> to, extra args are parameters or existing
                // artifacts checked below
                if program == "cam2map" {
                    state.require(program, scalar(&request, "map"));
                }
                let label = state.label_of(program, scalar(&request, "from"));
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "histitch" => {
                state.require(program, scalar(&request, "from2"));
                let label = state.label_of(program, scalar(&request, "from1"));
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "autoregtemplate" => {
                state
                    .artifacts
                    .insert(scalar(&request, "topvl").into(), json!({}));
            }
            "hijitreg" => {
                state.require(program, scalar(&request, "from"));
                state.require(program, scalar(&request, "match"));
                state.require(program, scalar(&request, "regdef"));
                state
                    .artifacts
                    .insert(scalar(&request, "cnetfile").into(), json!({}));
            }
            "slither" => {
                state.require(program, scalar(&request, "control"));
                let label = state.label_of(program, scalar(&request, "from"));
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "ratio" => {
                state.require(program, scalar(&request, "denominator"));
                let label = state.label_of(program, scalar(&request, "numerator"));
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "fx" => {
                if request.args.contains_key("f2") {
                    state.require(program, scalar(&request, "f2"));
                }
                let label = state.label_of(program, scalar(&request, "f1"));
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            "editlab" => {
                let from = scalar(&request, "from").to_string();
                state.require(program, &from);
                let group = scalar(&request, "grpname").to_string();
                let keyword = scalar(&request, "keyword").to_string();
                let value = scalar(&request, "value").to_string();
                let label = state.artifacts.get_mut(&from).unwrap();
                label["IsisCube"][group.as_str()][keyword.as_str()] = Value::String(value);
            }
            "maptemplate" => {
                state
                    .artifacts
                    .insert(scalar(&request, "map").into(), json!({}));
            }
            "equalizer" => {
                for held in sequence(&request, "holdlist") {
                    state.require(program, held);
                }
                let inputs = sequence(&request, "fromlist").to_vec();
                let outputs = sequence(&request, "tolist").to_vec();
                assert_eq!(inputs.len(), outputs.len(), "equalizer list length mismatch");
                for (input, output) in inputs.iter().zip(outputs) {
                    let label = state.label_of(program, input);
                    state.artifacts.insert(output, label);
                }
            }
            "noseam" | "cubeit" => {
                let inputs = sequence(&request, "fromlist").to_vec();
                assert!(!inputs.is_empty(), "{program}: empty fromlist");
                for input in &inputs[1..] {
                    state.require(program, input);
                }
                let label = state.label_of(program, &inputs[0]);
                state.artifacts.insert(scalar(&request, "to").into(), label);
            }
            _ => unreachable!("allow-listed program without a simulation"),
        }

        Ok(())
    }

    async fn upload(&self, files: &[FileUpload]) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        for file in files {
            state.artifacts.insert(file.name.clone(), json!({}));
        }
        Ok(())
    }

    async fn put_from_url(&self, url: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        let label = state.url_labels.get(url).cloned().unwrap_or(json!({}));
        state.artifacts.insert(name.to_string(), label);
        Ok(())
    }

    async fn download(&self, name: &str, _dest: &Path) -> Result<(), ClientError> {
        let state = self.state.lock().unwrap();
        if state.artifacts.contains_key(strip_band(name)) {
            Ok(())
        } else {
            Err(server_error(404, "File not found"))
        }
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        match state.artifacts.remove(name) {
            Some(_) => Ok(()),
            None => Err(server_error(404, "File not found")),
        }
    }

    async fn label(&self, name: &str) -> Result<Value, ClientError> {
        let state = self.state.lock().unwrap();
        state
            .artifacts
            .get(strip_band(name))
            .cloned()
            .ok_or_else(|| server_error(404, "File not found"))
    }
}
