use std::collections::HashMap;

use crate::ability::{Ability, Resource};
use crate::principal::Principal;

/// Per-request values the guard exposes to downstream handlers: the caller
/// (`auth`), its ability, and each resolved subject under its type name.
#[derive(Debug, Default, Clone)]
pub struct Attachments {
    auth: Option<Principal>,
    ability: Option<Ability>,
    subjects: HashMap<String, Resource>,
}

impl Attachments {
    pub fn auth(&self) -> Option<&Principal> {
        self.auth.as_ref()
    }

    pub fn ability(&self) -> Option<&Ability> {
        self.ability.as_ref()
    }

    pub fn subject(&self, kind: &str) -> Option<&Resource> {
        self.subjects.get(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.auth.is_none() && self.ability.is_none() && self.subjects.is_empty()
    }

    /// Starts a new request on this target. Anything left by an earlier
    /// request on the same carrier (a long lived socket client) is dropped.
    pub(crate) fn attach_auth(&mut self, auth: Option<Principal>, ability: Ability) {
        *self = Self {
            auth,
            ability: Some(ability),
            subjects: HashMap::new(),
        };
    }

    pub(crate) fn attach_subject(&mut self, subject: Resource) {
        self.subjects.insert(subject.kind().to_string(), subject);
    }
}
