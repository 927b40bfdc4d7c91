mod condition;
mod rule;

pub mod config;
pub mod factory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::lookup_path;

pub use condition::{Condition, Conditions, Predicate};
pub use rule::{Rule, RuleBuilder, ALL, CREATE, DELETE, MANAGE, READ, UPDATE};

/// A concrete subject instance, tagged with its subject type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    kind: String,
    attrs: Value,
}

impl Resource {
    pub fn new(kind: impl Into<String>, attrs: Value) -> Self {
        Self {
            kind: kind.into(),
            attrs,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn attrs(&self) -> &Value {
        &self.attrs
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.attrs, path)
    }
}

/// What an action is checked against: a bare subject type, or an instance.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Type(&'a str),
    Instance(&'a Resource),
}

impl Subject<'_> {
    pub fn kind(&self) -> &str {
        match self {
            Subject::Type(kind) => kind,
            Subject::Instance(resource) => resource.kind(),
        }
    }
}

impl<'a> From<&'a str> for Subject<'a> {
    fn from(kind: &'a str) -> Self {
        Subject::Type(kind)
    }
}

impl<'a> From<&'a String> for Subject<'a> {
    fn from(kind: &'a String) -> Self {
        Subject::Type(kind)
    }
}

impl<'a> From<&'a Resource> for Subject<'a> {
    fn from(resource: &'a Resource) -> Self {
        Subject::Instance(resource)
    }
}

/// The frozen permission set of one principal for one request.
///
/// Rules are evaluated from last to first; the first applicable rule decides,
/// so a later rule always overrides an earlier one.
#[derive(Debug, Clone)]
pub struct Ability {
    rules: Arc<[Rule]>,
}

impl Ability {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    pub fn can<'s>(&self, action: &str, subject: impl Into<Subject<'s>>) -> bool {
        match self.relevant_rule(action, subject) {
            Some(rule) => !rule.inverted(),
            None => false,
        }
    }

    pub fn cannot<'s>(&self, action: &str, subject: impl Into<Subject<'s>>) -> bool {
        !self.can(action, subject)
    }

    /// The rule that decides `action` on `subject`, if any applies.
    pub fn relevant_rule<'s>(&self, action: &str, subject: impl Into<Subject<'s>>) -> Option<&Rule> {
        let subject = subject.into();
        self.rules
            .iter()
            .rev()
            .filter(|rule| rule.matches_action(action))
            .filter(|rule| rule.matches_subject_type(subject.kind()))
            .find(|rule| rule.matches_conditions(&subject))
    }

    /// Every rule that mentions `action` on `kind`, highest priority first.
    pub fn rules_for(&self, action: &str, kind: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .rev()
            .filter(|rule| rule.matches_action(action) && rule.matches_subject_type(kind))
            .collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
