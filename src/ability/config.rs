use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{CommonConfig, PathSet};
use crate::principal::Principal;

use super::factory::RuleDefinition;
use super::{Conditions, Rule, RuleBuilder, ALL, MANAGE};

/// Prefix of a condition value that is replaced by a principal attribute,
/// e.g. `"${principal.id}"`.
const TEMPLATE_PREFIX: &str = "${principal.";

/// A rule as written in configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleConfig {
    pub action: String,

    pub subject: String,

    /// Query document restricting the rule to matching subject instances.
    /// String values of the form `${principal.<path>}` are replaced by the
    /// principal attribute at build time, or `null` when it has none.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Map<String, Value>>,

    /// Forbid instead of permit.
    #[serde(default)]
    pub inverted: bool,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoleConfig {
    pub name: String,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Declarative policy: which rules each kind of caller receives.
///
/// Rules are appended in this order: `anonymous` (only for callers without a
/// principal), otherwise `authenticated` followed by every role the principal
/// holds, in the order the roles are declared here. Later rules take
/// precedence.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolicyConfig {
    /// Rules for callers without a principal. Defaults to empty, which denies
    /// anonymous callers everything that has acl metadata.
    #[serde(default = "PolicyConfig::default_rules")]
    pub anonymous: Vec<RuleConfig>,

    /// Rules for every caller with a principal.
    #[serde(default = "PolicyConfig::default_rules")]
    pub authenticated: Vec<RuleConfig>,

    /// Rules granted by principal roles (read from the principal `roles` list).
    #[serde(default = "PolicyConfig::default_roles")]
    pub roles: Vec<RoleConfig>,
}

impl CommonConfig for PolicyConfig {
    fn default() -> Self {
        Self {
            anonymous: Self::default_rules(),
            authenticated: Self::default_rules(),
            roles: Self::default_roles(),
        }
    }

    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        for rule in self.anonymous.iter() {
            validate_rule(rule).context("validate anonymous rule")?;
            if !rule.inverted && rule.action == MANAGE && rule.subject == ALL {
                warn!("Anonymous callers can manage everything, this is dangerous");
            }
        }
        for rule in self.authenticated.iter() {
            validate_rule(rule).context("validate authenticated rule")?;
        }

        let mut names = HashSet::new();
        for role in self.roles.iter() {
            if role.name.is_empty() {
                bail!("role name cannot be empty");
            }
            if !names.insert(role.name.as_str()) {
                bail!("role '{}' is defined more than once", role.name);
            }
            for rule in role.rules.iter() {
                validate_rule(rule).with_context(|| format!("validate rule of role '{}'", role.name))?;
            }
        }

        Ok(())
    }
}

impl PolicyConfig {
    pub fn default_rules() -> Vec<RuleConfig> {
        vec![]
    }

    pub fn default_roles() -> Vec<RoleConfig> {
        vec![]
    }
}

fn validate_rule(rule: &RuleConfig) -> Result<()> {
    if rule.action.trim().is_empty() {
        bail!("rule action cannot be empty");
    }
    if rule.subject.trim().is_empty() {
        bail!("rule subject cannot be empty");
    }
    if let Some(ref conditions) = rule.conditions {
        // Templates render to null here, which only checks the shape
        let rendered = render(&Value::Object(conditions.clone()), None);
        Conditions::from_query(&rendered).with_context(|| {
            format!("invalid conditions for '{} {}'", rule.action, rule.subject)
        })?;
    }
    Ok(())
}

/// Replaces `${principal.<path>}` strings with principal attributes.
///
/// A template given as the whole operand of `$in`/`$nin` always renders to a
/// list: a missing attribute becomes `[]` and a scalar becomes `[scalar]`.
fn render(value: &Value, principal: Option<&Principal>) -> Value {
    match value {
        Value::String(s) => match template_path(s) {
            Some(path) => principal
                .and_then(|p| p.get(path))
                .cloned()
                .unwrap_or(Value::Null),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, principal)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let rendered = match (k.as_str(), v) {
                        ("$in" | "$nin", Value::String(_)) => render_list(v, principal),
                        _ => render(v, principal),
                    };
                    (k.clone(), rendered)
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn render_list(value: &Value, principal: Option<&Principal>) -> Value {
    match render(value, principal) {
        Value::Null => Value::Array(vec![]),
        Value::Array(items) => Value::Array(items),
        other => Value::Array(vec![other]),
    }
}

fn template_path(s: &str) -> Option<&str> {
    s.strip_prefix(TEMPLATE_PREFIX)?.strip_suffix('}')
}

/// Defines rules from a [`PolicyConfig`].
pub struct PolicyRuleDefinition {
    policy: PolicyConfig,
}

impl PolicyRuleDefinition {
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }

    fn push_rule(
        builder: &mut RuleBuilder,
        cfg: &RuleConfig,
        principal: Option<&Principal>,
    ) -> Result<()> {
        let rule = builder.push(Rule::new(&cfg.action, &cfg.subject, cfg.inverted));
        if let Some(ref conditions) = cfg.conditions {
            let rendered = render(&Value::Object(conditions.clone()), principal);
            rule.when(Conditions::from_query(&rendered)?);
        }
        if let Some(ref reason) = cfg.reason {
            rule.because(reason.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RuleDefinition for PolicyRuleDefinition {
    async fn define_rules(
        &self,
        builder: &mut RuleBuilder,
        principal: Option<&Principal>,
    ) -> Result<()> {
        let principal = match principal {
            Some(principal) => principal,
            None => {
                for rule in self.policy.anonymous.iter() {
                    Self::push_rule(builder, rule, None)?;
                }
                return Ok(());
            }
        };

        for rule in self.policy.authenticated.iter() {
            Self::push_rule(builder, rule, Some(principal))?;
        }

        let held = principal.roles();
        for role in self.policy.roles.iter() {
            if !held.contains(&role.name.as_str()) {
                continue;
            }
            debug!("Apply rules of role '{}'", role.name);
            for rule in role.rules.iter() {
                Self::push_rule(builder, rule, Some(principal))?;
            }
        }

        Ok(())
    }
}
