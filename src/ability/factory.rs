use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::error::GuardError;
use crate::principal::Principal;

use super::config::PolicyRuleDefinition;
use super::{Ability, RuleBuilder};

/// Deployment-specific policy: appends the rules a principal receives.
///
/// Called once per request. An absent principal is an anonymous caller.
#[async_trait]
pub trait RuleDefinition: Send + Sync {
    async fn define_rules(
        &self,
        builder: &mut RuleBuilder,
        principal: Option<&Principal>,
    ) -> Result<()>;
}

/// Adapts a plain function into a [`RuleDefinition`].
pub struct FnRuleDefinition<F> {
    func: F,
}

impl<F> FnRuleDefinition<F>
where
    F: Fn(&mut RuleBuilder, Option<&Principal>) -> Result<()> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> RuleDefinition for FnRuleDefinition<F>
where
    F: Fn(&mut RuleBuilder, Option<&Principal>) -> Result<()> + Send + Sync,
{
    async fn define_rules(
        &self,
        builder: &mut RuleBuilder,
        principal: Option<&Principal>,
    ) -> Result<()> {
        (self.func)(builder, principal)
    }
}

pub enum UnionRuleDefinition {
    Policy(PolicyRuleDefinition),
    Custom(Arc<dyn RuleDefinition>),
}

#[async_trait]
impl RuleDefinition for UnionRuleDefinition {
    async fn define_rules(
        &self,
        builder: &mut RuleBuilder,
        principal: Option<&Principal>,
    ) -> Result<()> {
        match self {
            UnionRuleDefinition::Policy(d) => d.define_rules(builder, principal).await,
            UnionRuleDefinition::Custom(d) => d.define_rules(builder, principal).await,
        }
    }
}

/// Runs several definitions into the same builder, in order.
pub struct ChainRuleDefinition {
    definitions: Vec<UnionRuleDefinition>,
}

impl ChainRuleDefinition {
    pub fn new(definitions: Vec<UnionRuleDefinition>) -> Self {
        Self { definitions }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[async_trait]
impl RuleDefinition for ChainRuleDefinition {
    async fn define_rules(
        &self,
        builder: &mut RuleBuilder,
        principal: Option<&Principal>,
    ) -> Result<()> {
        for definition in self.definitions.iter() {
            definition.define_rules(builder, principal).await?;
        }
        Ok(())
    }
}

/// Builds a fresh [`Ability`] per request from a [`RuleDefinition`].
///
/// Nothing is cached: rules may depend on request-time state.
#[derive(Clone)]
pub struct AbilityFactory {
    definition: Arc<dyn RuleDefinition>,
}

impl AbilityFactory {
    pub fn new(definition: Arc<dyn RuleDefinition>) -> Self {
        Self { definition }
    }

    pub async fn build(&self, principal: Option<&Principal>) -> Result<Ability, GuardError> {
        let mut builder = RuleBuilder::new();
        self.definition
            .define_rules(&mut builder, principal)
            .await
            .map_err(GuardError::RuleDefinition)?;

        let ability = builder.build();
        debug!(
            "Built ability with {} rules for {}",
            ability.rules().len(),
            match principal.and_then(Principal::id) {
                Some(id) => format!("principal '{id}'"),
                None if principal.is_some() => String::from("principal without id"),
                None => String::from("anonymous caller"),
            }
        );
        Ok(ability)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use serde_json::json;

    use crate::ability::config::PolicyConfig;
    use crate::ability::{Conditions, Resource};

    use super::*;

    fn owner_rules(builder: &mut RuleBuilder, principal: Option<&Principal>) -> Result<()> {
        if let Some(id) = principal.and_then(Principal::id) {
            builder
                .can("read", "Document")
                .when(Conditions::new().eq("ownerId", id));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_build_is_fresh_per_call() {
        let factory = AbilityFactory::new(Arc::new(FnRuleDefinition::new(owner_rules)));
        let principal = Principal::from_value(json!({"id": "u1"})).unwrap();

        let first = factory.build(Some(&principal)).await.unwrap();
        let second = factory.build(Some(&principal)).await.unwrap();

        // Distinct instances with the same decisions
        assert!(!std::ptr::eq(first.rules().as_ptr(), second.rules().as_ptr()));
        let doc = Resource::new("Document", json!({"ownerId": "u1"}));
        let other = Resource::new("Document", json!({"ownerId": "u2"}));
        assert_eq!(first.can("read", &doc), second.can("read", &doc));
        assert_eq!(first.can("read", &other), second.can("read", &other));
        assert!(first.can("read", &doc));

        let anonymous = factory.build(None).await.unwrap();
        assert!(anonymous.is_empty());
    }

    #[tokio::test]
    async fn test_definition_failure() {
        let factory = AbilityFactory::new(Arc::new(FnRuleDefinition::new(
            |_: &mut RuleBuilder, _: Option<&Principal>| bail!("role service unavailable"),
        )));
        let err = factory.build(None).await.unwrap_err();
        assert!(matches!(err, GuardError::RuleDefinition(_)));
        assert!(err.to_string().contains("role service unavailable"));
    }

    #[tokio::test]
    async fn test_chain() {
        let policy: PolicyConfig = toml::from_str(
            r#"authenticated = [{ action = "delete", subject = "Document", inverted = true }]"#,
        )
        .unwrap();
        let chain = ChainRuleDefinition::new(vec![
            UnionRuleDefinition::Custom(Arc::new(FnRuleDefinition::new(
                |builder: &mut RuleBuilder, _: Option<&Principal>| {
                    builder.can("manage", "Document");
                    Ok(())
                },
            ))),
            UnionRuleDefinition::Policy(PolicyRuleDefinition::new(policy)),
        ]);
        assert_eq!(chain.len(), 2);

        let factory = AbilityFactory::new(Arc::new(chain));
        let principal = Principal::from_value(json!({"id": "u1"})).unwrap();
        let ability = factory.build(Some(&principal)).await.unwrap();
        assert_eq!(ability.rules().len(), 2);
        assert!(ability.can("update", "Document"));
        assert!(!ability.can("delete", "Document"));
    }
}
