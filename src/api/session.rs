use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Read-only user/group/view context supplied by the auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SessionContext {
    pub user: Option<String>,
    pub group: Option<String>,
    pub groups: Vec<String>,
    pub view: Option<String>,
    pub admin: bool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if !self.groups.contains(&group) {
            self.groups.push(group.clone());
        }
        self.group = Some(group);
        self
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.group.as_deref() == Some(group) || self.groups.iter().any(|g| g == group)
    }

    pub fn in_view(&self, view: &str) -> bool {
        self.view.as_deref() == Some(view)
    }
}
