use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::ability::config::PolicyRuleDefinition;
use crate::ability::factory::{
    AbilityFactory, ChainRuleDefinition, RuleDefinition, UnionRuleDefinition,
};
use crate::config::{CommonConfig, PathSet};
use crate::hook::{HookRegistry, SubjectHook, TableHook};
use crate::metadata::MetadataTable;
use crate::principal::chain::ChainExtractor;
use crate::principal::{FieldExtractor, HeaderExtractor, UnionExtractor};

use super::config::GuardConfig;
use super::{AclGuard, GuardOptions};

/// Builds an [`AclGuard`] from configuration, plus whatever the application
/// registers in code: rule definitions appended after the configured policy,
/// subject hooks, and a parent hook registry.
pub struct GuardFactory {
    cfg: GuardConfig,
    definitions: Vec<Arc<dyn RuleDefinition>>,
    hooks: Vec<(String, Arc<dyn SubjectHook>)>,
    parent_hooks: Option<Arc<HookRegistry>>,
}

impl GuardFactory {
    pub fn new(cfg: GuardConfig) -> Self {
        Self {
            cfg,
            definitions: vec![],
            hooks: vec![],
            parent_hooks: None,
        }
    }

    pub fn load(ps: &PathSet) -> Result<Self> {
        let cfg = ps
            .load_config("guard", GuardConfig::default)
            .context("load guard config")?;
        Ok(Self::new(cfg))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn with_rule_definition(&mut self, definition: Arc<dyn RuleDefinition>) -> &mut Self {
        self.definitions.push(definition);
        self
    }

    pub fn with_hook(&mut self, key: &str, hook: Arc<dyn SubjectHook>) -> &mut Self {
        self.hooks.push((key.to_string(), hook));
        self
    }

    pub fn with_parent_hooks(&mut self, parent: Arc<HookRegistry>) -> &mut Self {
        self.parent_hooks = Some(parent);
        self
    }

    pub fn build_metadata(&self) -> Result<MetadataTable> {
        let mut builder = MetadataTable::builder();
        for op in self.cfg.operations.iter() {
            builder
                .register(&op.name, op.acl.clone())
                .context("register operation metadata")?;
        }
        Ok(builder.build())
    }

    pub fn build_hooks(&self) -> Result<HookRegistry> {
        let mut registry = match self.parent_hooks {
            Some(ref parent) => HookRegistry::with_parent(parent.clone()),
            None => HookRegistry::new(),
        };

        for cfg in self.cfg.hooks.iter() {
            let hook = TableHook::new(cfg);
            registry
                .register(&cfg.key, Arc::new(hook))
                .context("register config hook")?;
        }
        for (key, hook) in self.hooks.iter() {
            registry
                .register(key, hook.clone())
                .context("register hook")?;
        }

        Ok(registry)
    }

    /// The principal set by an authentication layer wins over the header.
    pub fn build_extractor(&self) -> ChainExtractor {
        ChainExtractor::new(vec![
            UnionExtractor::Field(FieldExtractor::new(&self.cfg.principal_field)),
            UnionExtractor::Header(HeaderExtractor::new(&self.cfg.principal_header)),
        ])
    }

    pub fn build_ability_factory(&self) -> AbilityFactory {
        let mut definitions = Vec::with_capacity(self.definitions.len() + 1);
        let policy = PolicyRuleDefinition::new(self.cfg.policy.clone());
        definitions.push(UnionRuleDefinition::Policy(policy));
        for definition in self.definitions.iter() {
            definitions.push(UnionRuleDefinition::Custom(definition.clone()));
        }

        AbilityFactory::new(Arc::new(ChainRuleDefinition::new(definitions)))
    }

    pub fn build_options(&self) -> GuardOptions {
        GuardOptions {
            hook_lookup: self.cfg.hook_lookup,
            attach_subject: self.cfg.attach_subject,
        }
    }

    pub fn build_guard(&self) -> Result<AclGuard> {
        let metadata = self.build_metadata()?;
        let hooks = self.build_hooks()?;
        info!(
            "Build acl guard with {} operations and {} hooks",
            metadata.len(),
            hooks.keys().len()
        );

        let guard = AclGuard::new(
            Arc::new(metadata),
            self.build_ability_factory(),
            Arc::new(hooks),
            Arc::new(self.build_extractor()),
            self.build_options(),
        );
        guard.verify().context("verify subject hooks")?;
        Ok(guard)
    }
}
