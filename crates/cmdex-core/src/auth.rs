//! Authentication and authorization checks consulted by the authorization
//! interceptor before a command executes.

use std::collections::HashSet;
use std::fmt;

/// Identity on whose behalf a command runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authentication {
    user_id: Option<String>,
    group_ids: Vec<String>,
}

impl Authentication {
    /// No authenticated user (system or internal calls); authorization is not checked
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            group_ids: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_ids = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn group_ids(&self) -> &[String] {
        &self.group_ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Task,
    User,
}

/// Permission a command declares it needs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub action: Action,
    pub resource: Resource,
    pub resource_id: String,
}

impl Permission {
    pub fn update(resource: Resource, resource_id: impl Into<String>) -> Self {
        Self {
            action: Action::Update,
            resource,
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} {}",
            self.action, self.resource, self.resource_id
        )
    }
}

/// Decides whether an authenticated principal holds a permission
pub trait AuthorizationCheck: Send + Sync {
    fn is_authorized(&self, authentication: &Authentication, permission: &Permission) -> bool;
}

/// Grants everything (authorization disabled)
pub struct AllowAllAuthorization;

impl AuthorizationCheck for AllowAllAuthorization {
    fn is_authorized(&self, _: &Authentication, _: &Permission) -> bool {
        true
    }
}

/// Grants nothing (for tests that verify rejection stops all writes)
pub struct DenyAllAuthorization;

impl AuthorizationCheck for DenyAllAuthorization {
    fn is_authorized(&self, _: &Authentication, _: &Permission) -> bool {
        false
    }
}

/// Explicit grants for users and groups; `*` as resource id matches any id
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: HashSet<(Grantee, Action, Resource, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Grantee {
    User(String),
    Group(String),
}

impl GrantTable {
    pub const ANY: &'static str = "*";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_user(
        mut self,
        user_id: impl Into<String>,
        action: Action,
        resource: Resource,
        resource_id: impl Into<String>,
    ) -> Self {
        self.grants.insert((
            Grantee::User(user_id.into()),
            action,
            resource,
            resource_id.into(),
        ));
        self
    }

    pub fn grant_group(
        mut self,
        group_id: impl Into<String>,
        action: Action,
        resource: Resource,
        resource_id: impl Into<String>,
    ) -> Self {
        self.grants.insert((
            Grantee::Group(group_id.into()),
            action,
            resource,
            resource_id.into(),
        ));
        self
    }

    fn holds(&self, grantee: Grantee, permission: &Permission) -> bool {
        [permission.resource_id.as_str(), Self::ANY]
            .into_iter()
            .any(|id| {
                self.grants.contains(&(
                    grantee.clone(),
                    permission.action,
                    permission.resource,
                    id.to_string(),
                ))
            })
    }
}

impl AuthorizationCheck for GrantTable {
    fn is_authorized(&self, authentication: &Authentication, permission: &Permission) -> bool {
        let by_user = authentication
            .user_id()
            .is_some_and(|user| self.holds(Grantee::User(user.to_string()), permission));
        by_user
            || authentication
                .group_ids()
                .iter()
                .any(|group| self.holds(Grantee::Group(group.clone()), permission))
    }
}
