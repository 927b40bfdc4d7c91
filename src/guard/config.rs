use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::ability::config::PolicyConfig;
use crate::config::{expandenv, CommonConfig, PathSet};
use crate::hook::{HookConfig, HookLookup};
use crate::metadata::OperationConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GuardConfig {
    /// Request header carrying a JSON-encoded principal, for callers whose
    /// authentication layer did not set one already.
    #[serde(default = "GuardConfig::default_principal_header")]
    pub principal_header: String,

    /// Key of the principal in RPC contexts.
    #[serde(default = "GuardConfig::default_principal_field")]
    pub principal_field: String,

    #[serde(default)]
    pub hook_lookup: HookLookup,

    #[serde(default = "GuardConfig::default_attach_subject")]
    pub attach_subject: bool,

    #[serde(default)]
    pub operations: Vec<OperationConfig>,

    #[serde(default = "PolicyConfig::default")]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

impl CommonConfig for GuardConfig {
    fn default() -> Self {
        Self {
            principal_header: Self::default_principal_header(),
            principal_field: Self::default_principal_field(),
            hook_lookup: HookLookup::default(),
            attach_subject: Self::default_attach_subject(),
            operations: vec![],
            policy: PolicyConfig::default(),
            hooks: vec![],
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        self.principal_header = expandenv("principal_header", &self.principal_header)?;
        if self.principal_header.trim().is_empty() {
            bail!("principal_header cannot be empty");
        }
        self.principal_field = expandenv("principal_field", &self.principal_field)?;
        if self.principal_field.trim().is_empty() {
            bail!("principal_field cannot be empty");
        }

        let mut hook_keys = HashSet::new();
        for hook in self.hooks.iter() {
            hook.validate().context("validate hook")?;
            if !hook_keys.insert(hook.key.as_str()) {
                bail!("hook '{}' is defined more than once", hook.key);
            }
        }

        let mut names = HashSet::new();
        for op in self.operations.iter() {
            if op.name.is_empty() {
                bail!("operation name cannot be empty");
            }
            if !names.insert(op.name.as_str()) {
                bail!("operation '{}' is defined more than once", op.name);
            }
            if op.acl.action.is_empty() || op.acl.subject.is_empty() {
                bail!("action and subject of operation '{}' cannot be empty", op.name);
            }
            if let Some(ref key) = op.acl.hook {
                if !hook_keys.contains(key.as_str()) {
                    // May be registered in code
                    warn!(
                        "Hook '{key}' of operation '{}' is not defined in config",
                        op.name
                    );
                }
            }
        }

        self.policy.complete(ps).context("validate policy")?;

        Ok(())
    }
}

impl GuardConfig {
    pub fn default_principal_header() -> String {
        String::from("x-principal")
    }

    pub fn default_principal_field() -> String {
        String::from("auth")
    }

    pub fn default_attach_subject() -> bool {
        true
    }
}
