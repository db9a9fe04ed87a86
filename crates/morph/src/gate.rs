//! Access gate implementations.

use std::collections::{HashMap, HashSet};

use morph_api::CrudAction;
use morph_core::AccessGate;

/// Permits everything. Useful for tests and trusted internal callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn permits(&self, _role: &str, _action: CrudAction) -> bool {
        true
    }
}

/// Static role -> permitted actions table. Unknown roles are denied.
#[derive(Debug, Default, Clone)]
pub struct RoleTable {
    roles: HashMap<String, HashSet<CrudAction>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(
        mut self,
        role: impl Into<String>,
        actions: impl IntoIterator<Item = CrudAction>,
    ) -> Self {
        self.roles.entry(role.into()).or_default().extend(actions);
        self
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

impl AccessGate for RoleTable {
    fn permits(&self, role: &str, action: CrudAction) -> bool {
        self.roles
            .get(role)
            .is_some_and(|actions| actions.contains(&action))
    }
}
