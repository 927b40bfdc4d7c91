use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::principal::Principal;
use crate::utils::lookup_path;

use super::SubjectHook;

/// A subject hook backed by a fixed table, declared in configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HookConfig {
    pub key: String,

    /// Path of the lookup value in the argument bag. When missing at the top
    /// level it is also looked up under `input`.
    #[serde(default = "HookConfig::default_arg")]
    pub arg: String,

    /// Path of the attribute compared against the lookup value.
    #[serde(default = "HookConfig::default_field")]
    pub field: String,

    #[serde(default)]
    pub subjects: Vec<Value>,
}

impl HookConfig {
    pub fn default_arg() -> String {
        String::from("id")
    }

    pub fn default_field() -> String {
        String::from("id")
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            bail!("hook key cannot be empty");
        }
        if self.arg.is_empty() {
            bail!("arg of hook '{}' cannot be empty", self.key);
        }
        if self.field.is_empty() {
            bail!("field of hook '{}' cannot be empty", self.key);
        }
        for subject in self.subjects.iter() {
            if !subject.is_object() {
                bail!("subjects of hook '{}' must be tables", self.key);
            }
        }
        Ok(())
    }
}

pub struct TableHook {
    arg: String,
    field: String,
    subjects: Vec<Value>,
}

impl TableHook {
    pub fn new(cfg: &HookConfig) -> Self {
        Self {
            arg: cfg.arg.clone(),
            field: cfg.field.clone(),
            subjects: cfg.subjects.clone(),
        }
    }

    fn lookup_arg<'a>(&self, args: &'a Value) -> Option<&'a Value> {
        lookup_path(args, &self.arg).or_else(|| lookup_path(args, &format!("input.{}", self.arg)))
    }
}

#[async_trait]
impl SubjectHook for TableHook {
    async fn run(&self, args: &Value, _principal: Option<&Principal>) -> Result<Option<Value>> {
        let key = match self.lookup_arg(args) {
            Some(key) => key,
            None => return Ok(None),
        };

        let subject = self.subjects.iter().find(|subject| {
            lookup_path(subject, &self.field)
                .map(|value| same_key(value, key))
                .unwrap_or(false)
        });
        Ok(subject.cloned())
    }
}

/// Path parameters arrive as strings, so `"7"` matches the number `7`.
fn same_key(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            n.to_string() == *s
        }
        _ => a == b,
    }
}
