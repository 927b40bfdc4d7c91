use std::fmt;

use serde_json::Value;

use super::condition::{Condition, Conditions};
use super::{Ability, Subject};

/// Action that stands for every action.
pub const MANAGE: &str = "manage";

pub const CREATE: &str = "create";
pub const READ: &str = "read";
pub const UPDATE: &str = "update";
pub const DELETE: &str = "delete";

/// Subject type that stands for every subject type.
pub const ALL: &str = "all";

/// One permission entry: `action` on `subject`, optionally restricted by
/// conditions. Inverted rules forbid instead of permit.
#[derive(Debug, Clone)]
pub struct Rule {
    action: String,
    subject: String,
    conditions: Option<Conditions>,
    inverted: bool,
    reason: Option<String>,
}

impl Rule {
    pub fn new(action: &str, subject: &str, inverted: bool) -> Self {
        Self {
            action: action.to_string(),
            subject: subject.to_string(),
            conditions: None,
            inverted,
            reason: None,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Restricts the rule to subject instances matching `conditions`.
    pub fn when(&mut self, conditions: Conditions) -> &mut Self {
        self.conditions = if conditions.is_empty() {
            None
        } else {
            Some(conditions)
        };
        self
    }

    /// Message reported when this rule is the one that denies access.
    pub fn because(&mut self, reason: impl Into<String>) -> &mut Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether the rule covers `action`, directly or through `manage`.
    pub fn matches_action(&self, action: &str) -> bool {
        self.action == action || self.action == MANAGE
    }

    pub fn matches_subject_type(&self, kind: &str) -> bool {
        self.subject == kind || self.subject == ALL
    }

    /// Checking against a bare subject type cannot evaluate conditions: a
    /// conditional permit still applies (some instance may be allowed), a
    /// conditional forbid does not (some instance may escape it).
    pub(crate) fn matches_conditions(&self, subject: &Subject<'_>) -> bool {
        let conditions = match self.conditions {
            Some(ref conditions) => conditions,
            None => return true,
        };

        match subject {
            Subject::Type(_) => !self.inverted,
            Subject::Instance(resource) => conditions.matches(resource.attrs()),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.inverted { "cannot" } else { "can" };
        write!(f, "{verb} {} {}", self.action, self.subject)?;

        if let Some(ref conditions) = self.conditions {
            let mut parts: Vec<String> = conditions
                .fields()
                .iter()
                .map(|(field, condition)| format_condition(field, condition))
                .collect();
            if conditions.has_predicate() {
                parts.push(String::from("<predicate>"));
            }
            write!(f, " where {}", parts.join(" and "))?;
        }

        if let Some(ref reason) = self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

fn format_condition(field: &str, condition: &Condition) -> String {
    let list = |values: &[Value]| {
        let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        format!("[{}]", items.join(", "))
    };
    match condition {
        Condition::Eq(v) => format!("{field} = {v}"),
        Condition::Ne(v) => format!("{field} != {v}"),
        Condition::In(vs) => format!("{field} in {}", list(vs)),
        Condition::Nin(vs) => format!("{field} not in {}", list(vs)),
        Condition::Gt(v) => format!("{field} > {v}"),
        Condition::Gte(v) => format!("{field} >= {v}"),
        Condition::Lt(v) => format!("{field} < {v}"),
        Condition::Lte(v) => format!("{field} <= {v}"),
        Condition::Exists(true) => format!("{field} exists"),
        Condition::Exists(false) => format!("{field} missing"),
    }
}

/// Accumulates rules while a rule definition runs. Frozen into an
/// [`Ability`] by [`RuleBuilder::build`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    rules: Vec<Rule>,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can(&mut self, action: &str, subject: &str) -> &mut Rule {
        self.push(Rule::new(action, subject, false))
    }

    pub fn cannot(&mut self, action: &str, subject: &str) -> &mut Rule {
        self.push(Rule::new(action, subject, true))
    }

    pub fn push(&mut self, rule: Rule) -> &mut Rule {
        self.rules.push(rule);
        let idx = self.rules.len() - 1;
        &mut self.rules[idx]
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn build(self) -> Ability {
        Ability::new(self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let mut builder = RuleBuilder::new();
        builder
            .can("read", "Document")
            .when(Conditions::new().eq("ownerId", "u1"));
        builder
            .cannot("delete", "Document")
            .because("documents are append only");
        builder.can("update", "Document").when(Conditions::new());

        let rules = builder.rules();
        assert_eq!(rules.len(), 3);
        assert!(!rules[0].inverted());
        assert!(rules[0].conditions().is_some());
        assert!(rules[1].inverted());
        assert_eq!(rules[1].reason(), Some("documents are append only"));
        // Empty conditions are the same as none
        assert!(rules[2].conditions().is_none());
    }

    #[test]
    fn test_crud_actions() {
        let mut builder = RuleBuilder::new();
        builder.can(READ, "Document");
        builder.can(CREATE, "Document");
        builder.cannot(DELETE, "Document");
        let ability = builder.build();

        assert!(ability.can("read", "Document"));
        assert!(ability.can(CREATE, "Document"));
        assert!(!ability.can(UPDATE, "Document"));
        assert!(!ability.can(DELETE, "Document"));

        // The wildcard covers every named action
        let mut builder = RuleBuilder::new();
        builder.can(MANAGE, ALL);
        let ability = builder.build();
        for action in [CREATE, READ, UPDATE, DELETE] {
            assert!(ability.can(action, "Document"), "{action}");
        }
    }

    #[test]
    fn test_rule_display() {
        let mut rule = Rule::new("read", "Document", false);
        rule.when(Conditions::new().eq("ownerId", "u1").is_in("status", ["draft"]));
        assert_eq!(
            rule.to_string(),
            r#"can read Document where ownerId = "u1" and status in ["draft"]"#
        );

        let mut rule = Rule::new("delete", "all", true);
        rule.because("read only");
        assert_eq!(rule.to_string(), "cannot delete all (read only)");

        let mut rule = Rule::new("read", "Document", false);
        rule.when(Conditions::new().matching(|_| true));
        assert_eq!(rule.to_string(), "can read Document where <predicate>");
    }

    #[test]
    fn test_rule_matching() {
        let rule = Rule::new(MANAGE, ALL, false);
        assert!(rule.matches_action("read"));
        assert!(rule.matches_subject_type("Document"));

        let rule = Rule::new("read", "Document", false);
        assert!(!rule.matches_action("update"));
        assert!(!rule.matches_subject_type("Article"));
    }
}
