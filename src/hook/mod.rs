mod table;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GuardError;
use crate::principal::Principal;

pub use table::{HookConfig, TableHook};

/// Resolves the subject instance an operation acts on.
///
/// `args` is the argument bag of the invocation. Returning `Ok(None)` means
/// the subject does not exist, which denies the operation. Errors are I/O
/// failures and fail the invocation.
#[async_trait]
pub trait SubjectHook: Send + Sync {
    async fn run(&self, args: &Value, principal: Option<&Principal>) -> Result<Option<Value>>;
}

/// How a hook key is looked up in a [`HookRegistry`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookLookup {
    /// Search the registry, then its parents.
    #[serde(rename = "lenient")]
    #[default]
    Lenient,

    /// Search only the registry itself.
    #[serde(rename = "strict")]
    Strict,
}

/// Subject hooks by stable key.
///
/// Populated at startup and shared read-only afterwards. A registry may have a
/// parent (e.g. process-wide hooks shared by several guards), which is only
/// consulted with [`HookLookup::Lenient`].
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn SubjectHook>>,
    parent: Option<Arc<HookRegistry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<HookRegistry>) -> Self {
        Self {
            hooks: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn register(&mut self, key: &str, hook: Arc<dyn SubjectHook>) -> Result<(), GuardError> {
        if self.hooks.contains_key(key) {
            return Err(GuardError::DuplicateHook(key.to_string()));
        }
        self.hooks.insert(key.to_string(), hook);
        Ok(())
    }

    pub fn resolve(&self, key: &str, lookup: HookLookup) -> Result<Arc<dyn SubjectHook>, GuardError> {
        if let Some(hook) = self.hooks.get(key) {
            return Ok(hook.clone());
        }

        match (lookup, self.parent.as_ref()) {
            (HookLookup::Lenient, Some(parent)) => parent.resolve(key, lookup),
            _ => Err(GuardError::HookNotRegistered(key.to_string())),
        }
    }

    pub fn contains(&self, key: &str, lookup: HookLookup) -> bool {
        self.resolve(key, lookup).is_ok()
    }

    /// Keys registered directly on this registry, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        keys.sort();
        keys
    }
}
