//! Parser for the nested key/value text labels carried at the head of cube
//! artifacts.
//!
//! The grammar is the subset the processing programs actually emit:
//! `Object = Name` / `Group = Name` open a nested block, `Key = Value` assigns
//! a leaf (values keep their raw string form, surrounding quotes stripped),
//! `End_Object` / `End_Group` close the current block and `End` terminates the
//! label. Everything after `End` (typically binary pixel data) is ignored.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("unbalanced End_Object/End_Group")]
    Unbalanced,

    #[error("no label structure found")]
    NotALabel,
}

pub fn parse_label(text: &str) -> Result<Value, LabelError> {
    let mut root = Map::new();
    let mut stack: Vec<(String, Map<String, Value>)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("/*") {
            continue;
        }
        if line == "End" {
            break;
        }
        if line == "End_Object" || line == "End_Group" {
            let (name, block) = stack.pop().ok_or(LabelError::Unbalanced)?;
            let parent = stack.last_mut().map(|(_, m)| m).unwrap_or(&mut root);
            parent.insert(name, Value::Object(block));
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if key == "Object" || key == "Group" {
                stack.push((value.to_string(), Map::new()));
            } else {
                let target = stack.last_mut().map(|(_, m)| m).unwrap_or(&mut root);
                target.insert(key.to_string(), Value::String(value.to_string()));
            }
            continue;
        }

        // First line that is neither structure nor assignment: not label text.
        break;
    }

    if !stack.is_empty() {
        return Err(LabelError::Unbalanced);
    }
    if root.is_empty() {
        return Err(LabelError::NotALabel);
    }
    Ok(Value::Object(root))
}
