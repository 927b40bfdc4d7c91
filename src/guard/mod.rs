pub mod config;
pub mod factory;

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;

use crate::ability::factory::AbilityFactory;
use crate::ability::{Ability, Resource, Subject};
use crate::context::{Adapted, Invocation};
use crate::error::GuardError;
use crate::hook::{HookLookup, HookRegistry};
use crate::metadata::MetadataTable;
use crate::principal::chain::ChainExtractor;
use crate::principal::Principal;

/// Why an invocation was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The invocation arrived on a transport the guard cannot read.
    UnknownTransport,
    /// The subject hook found nothing to act on.
    SubjectNotFound,
    /// The ability does not permit the action. Carries the reason of the
    /// forbidding rule, if it has one.
    Forbidden(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny(DenyReason::UnknownTransport) => write!(f, "deny: unknown transport"),
            Decision::Deny(DenyReason::SubjectNotFound) => write!(f, "deny: subject not found"),
            Decision::Deny(DenyReason::Forbidden(Some(reason))) => write!(f, "deny: {reason}"),
            Decision::Deny(DenyReason::Forbidden(None)) => write!(f, "deny: access denied"),
        }
    }
}

/// The outcome of one guard pass, plus everything it computed on the way.
///
/// Callers on transports without an attach target (RPC) thread these values
/// to their handlers explicitly.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub decision: Decision,
    pub principal: Option<Principal>,
    pub ability: Option<Ability>,
    pub subject: Option<Resource>,
}

impl Authorization {
    fn unchecked() -> Self {
        Self {
            decision: Decision::Allow,
            principal: None,
            ability: None,
            subject: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOptions {
    pub hook_lookup: HookLookup,

    /// Attach the resolved subject to the attach target under its type name.
    pub attach_subject: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            hook_lookup: HookLookup::Lenient,
            attach_subject: true,
        }
    }
}

impl GuardOptions {
    /// Hooks must be registered on the guard's own registry, and resolved
    /// subjects are never attached.
    pub fn strict() -> Self {
        Self {
            hook_lookup: HookLookup::Strict,
            attach_subject: false,
        }
    }
}

/// Decides, per invocation, whether an operation may run.
///
/// The guard only holds read-only state built at startup, so one instance is
/// shared by all concurrent invocations.
pub struct AclGuard {
    metadata: Arc<MetadataTable>,
    abilities: AbilityFactory,
    hooks: Arc<HookRegistry>,
    extractor: Arc<ChainExtractor>,
    options: GuardOptions,
}

impl AclGuard {
    pub fn new(
        metadata: Arc<MetadataTable>,
        abilities: AbilityFactory,
        hooks: Arc<HookRegistry>,
        extractor: Arc<ChainExtractor>,
        options: GuardOptions,
    ) -> Self {
        Self {
            metadata,
            abilities,
            hooks,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> GuardOptions {
        self.options
    }

    /// Checks that every hook named by the metadata can be resolved, so a
    /// wiring mistake surfaces at startup instead of on the first request.
    pub fn verify(&self) -> Result<(), GuardError> {
        for (operation, meta) in self.metadata.iter() {
            if let Some(ref key) = meta.hook {
                if !self.hooks.contains(key, self.options.hook_lookup) {
                    warn!("Operation '{operation}' refers to unknown subject hook '{key}'");
                    return Err(GuardError::HookNotRegistered(key.clone()));
                }
            }
        }
        Ok(())
    }

    pub async fn can_activate(
        &self,
        operation: &str,
        invocation: Invocation<'_>,
    ) -> Result<bool, GuardError> {
        let auth = self.authorize(operation, invocation).await?;
        Ok(auth.decision.is_allowed())
    }

    pub async fn authorize(
        &self,
        operation: &str,
        invocation: Invocation<'_>,
    ) -> Result<Authorization, GuardError> {
        let meta = match self.metadata.get(operation) {
            Some(meta) => meta,
            None => {
                debug!("No acl metadata for operation '{operation}', allow");
                return Ok(Authorization::unchecked());
            }
        };

        let Adapted {
            kind,
            carrier,
            args,
            mut target,
        } = invocation.adapt();
        let carrier = match carrier {
            Some(carrier) => carrier,
            None => {
                warn!("Cannot authorize operation '{operation}' on {kind} transport, deny");
                return Ok(Authorization {
                    decision: Decision::Deny(DenyReason::UnknownTransport),
                    ..Authorization::unchecked()
                });
            }
        };

        let principal = self.extractor.principal(&carrier)?;
        let ability = self.abilities.build(principal.as_ref()).await?;
        debug!(
            "Authorize operation '{operation}' on {kind} transport: {} {}",
            meta.action, meta.subject
        );

        if let Some(target) = target.as_deref_mut() {
            target.attach_auth(principal.clone(), ability.clone());
        }

        let key = match meta.hook {
            Some(ref key) => key,
            None => {
                let decision = decide(&ability, &meta.action, Subject::Type(&meta.subject));
                log_decision(operation, &decision);
                return Ok(Authorization {
                    decision,
                    principal,
                    ability: Some(ability),
                    subject: None,
                });
            }
        };

        let hook = self.hooks.resolve(key, self.options.hook_lookup)?;
        let args = args.unwrap_or(Value::Null);
        let attrs = hook
            .run(&args, principal.as_ref())
            .await
            .map_err(|source| GuardError::Hook {
                key: key.clone(),
                source,
            })?;
        let attrs = match attrs {
            Some(attrs) => attrs,
            None => {
                let decision = Decision::Deny(DenyReason::SubjectNotFound);
                log_decision(operation, &decision);
                return Ok(Authorization {
                    decision,
                    principal,
                    ability: Some(ability),
                    subject: None,
                });
            }
        };

        let subject = Resource::new(meta.subject.as_str(), attrs);
        if self.options.attach_subject {
            if let Some(target) = target {
                target.attach_subject(subject.clone());
            }
        }

        let decision = decide(&ability, &meta.action, Subject::Instance(&subject));
        log_decision(operation, &decision);
        Ok(Authorization {
            decision,
            principal,
            ability: Some(ability),
            subject: Some(subject),
        })
    }
}

fn decide(ability: &Ability, action: &str, subject: Subject<'_>) -> Decision {
    match ability.relevant_rule(action, subject) {
        Some(rule) if !rule.inverted() => Decision::Allow,
        Some(rule) => Decision::Deny(DenyReason::Forbidden(rule.reason().map(String::from))),
        None => Decision::Deny(DenyReason::Forbidden(None)),
    }
}

fn log_decision(operation: &str, decision: &Decision) {
    match decision {
        Decision::Allow => debug!("Operation '{operation}': {decision}"),
        Decision::Deny(_) => info!("Operation '{operation}': {decision}"),
    }
}
