//! Identity-link command family
//!
//! One command type covers every link mutation. What differs between "set
//! owner", "add candidate group" and a consumer-defined link type is data,
//! captured in a [`LinkSpec`]: the link type (and with it the cardinality),
//! the principal kind, add or remove, and how the audit entry is built.

use std::fmt;

use crate::auth::{Permission, Resource};
use crate::command::Command;
use crate::context::CommandContext;
use crate::errors::{EngineError, Result};
use crate::model::{
    AuditEntry, Cardinality, IdentityLink, LinkType, OperationType, Principal, PrincipalKind, Task,
};
use crate::session::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkAction {
    Add,
    /// Singular types: unset. Plural types: remove the matching link.
    Remove,
}

/// What a link command changed, handed to [`LinkSpec::audit`]
#[derive(Debug, Clone)]
pub struct LinkChange<'a> {
    pub spec: &'a LinkSpec,
    pub target_id: &'a str,
    /// Principal id of the replaced (singular) or removed (plural) link
    pub old_value: Option<String>,
    /// Principal id of the added link
    pub new_value: Option<String>,
}

/// Configuration record of one identity-link operation
#[derive(Clone)]
pub struct LinkSpec {
    /// Command name used in logs and errors
    pub name: &'static str,
    pub link_type: LinkType,
    pub principal_kind: PrincipalKind,
    pub action: LinkAction,
    pub operation_type: OperationType,
    pub audit: fn(&LinkChange<'_>) -> AuditEntry,
}

/// Generic audit entry: the target task, the link property and old/new principal ids
pub fn audit_entry(change: &LinkChange<'_>) -> AuditEntry {
    AuditEntry {
        operation_type: change.spec.operation_type,
        entity_type: Task::ENTITY_TYPE.to_string(),
        entity_id: change.target_id.to_string(),
        property: change.spec.link_type.audit_property(change.spec.principal_kind),
        old_value: change.old_value.clone(),
        new_value: change.new_value.clone(),
    }
}

impl LinkSpec {
    pub const SET_OWNER: LinkSpec = LinkSpec::builtin(
        "SetOwner",
        LinkType::OWNER,
        PrincipalKind::User,
        LinkAction::Add,
        OperationType::SetOwner,
    );
    pub const CLEAR_OWNER: LinkSpec = LinkSpec::builtin(
        "ClearOwner",
        LinkType::OWNER,
        PrincipalKind::User,
        LinkAction::Remove,
        OperationType::SetOwner,
    );
    pub const SET_ASSIGNEE: LinkSpec = LinkSpec::builtin(
        "SetAssignee",
        LinkType::ASSIGNEE,
        PrincipalKind::User,
        LinkAction::Add,
        OperationType::Assign,
    );
    pub const CLEAR_ASSIGNEE: LinkSpec = LinkSpec::builtin(
        "ClearAssignee",
        LinkType::ASSIGNEE,
        PrincipalKind::User,
        LinkAction::Remove,
        OperationType::Assign,
    );
    pub const ADD_CANDIDATE_USER: LinkSpec = LinkSpec::builtin(
        "AddCandidateUser",
        LinkType::CANDIDATE,
        PrincipalKind::User,
        LinkAction::Add,
        OperationType::AddUserLink,
    );
    pub const DELETE_CANDIDATE_USER: LinkSpec = LinkSpec::builtin(
        "DeleteCandidateUser",
        LinkType::CANDIDATE,
        PrincipalKind::User,
        LinkAction::Remove,
        OperationType::DeleteUserLink,
    );
    pub const ADD_CANDIDATE_GROUP: LinkSpec = LinkSpec::builtin(
        "AddCandidateGroup",
        LinkType::CANDIDATE,
        PrincipalKind::Group,
        LinkAction::Add,
        OperationType::AddGroupLink,
    );
    pub const DELETE_CANDIDATE_GROUP: LinkSpec = LinkSpec::builtin(
        "DeleteCandidateGroup",
        LinkType::CANDIDATE,
        PrincipalKind::Group,
        LinkAction::Remove,
        OperationType::DeleteGroupLink,
    );

    const fn builtin(
        name: &'static str,
        link_type: LinkType,
        principal_kind: PrincipalKind,
        action: LinkAction,
        operation_type: OperationType,
    ) -> Self {
        Self {
            name,
            link_type,
            principal_kind,
            action,
            operation_type,
            audit: audit_entry,
        }
    }

    /// Spec for a consumer-defined link type, audited generically
    pub fn new(
        name: &'static str,
        link_type: LinkType,
        principal_kind: PrincipalKind,
        action: LinkAction,
        operation_type: OperationType,
    ) -> Self {
        Self::builtin(name, link_type, principal_kind, action, operation_type)
    }

    pub fn with_audit(mut self, audit: fn(&LinkChange<'_>) -> AuditEntry) -> Self {
        self.audit = audit;
        self
    }

    /// Whether this operation names a principal
    ///
    /// Unsetting a singular link does not; everything else does.
    pub fn requires_principal(&self) -> bool {
        !(self.action == LinkAction::Remove && self.link_type.is_singular())
    }

    fn principal_field(&self) -> &'static str {
        match self.principal_kind {
            PrincipalKind::User => "userId",
            PrincipalKind::Group => "groupId",
        }
    }
}

impl fmt::Debug for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSpec")
            .field("name", &self.name)
            .field("link_type", &self.link_type)
            .field("principal_kind", &self.principal_kind)
            .field("action", &self.action)
            .field("operation_type", &self.operation_type)
            .finish_non_exhaustive()
    }
}

/// Add or remove one identity link of a task, and audit the change
#[derive(Debug, Clone)]
pub struct IdentityLinkCommand {
    target_id: String,
    principal_id: Option<String>,
    spec: LinkSpec,
}

impl IdentityLinkCommand {
    pub fn new(target_id: impl Into<String>, principal_id: Option<String>, spec: LinkSpec) -> Self {
        Self {
            target_id: target_id.into(),
            principal_id,
            spec,
        }
    }

    pub fn set_owner(task_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(user_id.into()), LinkSpec::SET_OWNER)
    }

    pub fn clear_owner(task_id: impl Into<String>) -> Self {
        Self::new(task_id, None, LinkSpec::CLEAR_OWNER)
    }

    pub fn set_assignee(task_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(user_id.into()), LinkSpec::SET_ASSIGNEE)
    }

    pub fn clear_assignee(task_id: impl Into<String>) -> Self {
        Self::new(task_id, None, LinkSpec::CLEAR_ASSIGNEE)
    }

    pub fn add_candidate_user(task_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(user_id.into()), LinkSpec::ADD_CANDIDATE_USER)
    }

    pub fn delete_candidate_user(task_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(user_id.into()), LinkSpec::DELETE_CANDIDATE_USER)
    }

    pub fn add_candidate_group(task_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(group_id.into()), LinkSpec::ADD_CANDIDATE_GROUP)
    }

    pub fn delete_candidate_group(task_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self::new(task_id, Some(group_id.into()), LinkSpec::DELETE_CANDIDATE_GROUP)
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn spec(&self) -> &LinkSpec {
        &self.spec
    }

    fn validate(&self) -> Result<Option<Principal>> {
        if self.target_id.is_empty() {
            return Err(EngineError::validation("taskId", "must not be empty"));
        }
        if !self.spec.requires_principal() {
            return Ok(None);
        }
        match self.principal_id.as_deref() {
            None | Some("") => Err(EngineError::validation(
                self.spec.principal_field(),
                "must not be empty",
            )),
            Some(id) => Ok(Some(Principal {
                kind: self.spec.principal_kind,
                id: id.to_string(),
            })),
        }
    }

    fn delete(&self, ctx: &mut CommandContext, link: &IdentityLink) {
        ctx.register(Mutation::DeleteIdentityLink {
            link_id: link.id.clone(),
            target_id: self.target_id.clone(),
        });
    }

    fn insert(&self, ctx: &mut CommandContext, principal: Principal) {
        ctx.register(Mutation::InsertIdentityLink(IdentityLink::new(
            self.target_id.clone(),
            self.spec.link_type.clone(),
            principal,
        )));
    }
}

impl Command for IdentityLinkCommand {
    type Output = ();

    fn name(&self) -> &'static str {
        self.spec.name
    }

    fn permission(&self) -> Option<Permission> {
        Some(Permission::update(Resource::Task, self.target_id.clone()))
    }

    fn execute(&self, ctx: &mut CommandContext) -> Result<()> {
        let principal = self.validate()?;
        let task = ctx
            .task(&self.target_id)?
            .ok_or_else(|| EngineError::not_found(Task::ENTITY_TYPE, self.target_id.as_str()))?;

        ctx.register(Mutation::TouchTask {
            task_id: task.id.clone(),
            revision: task.revision,
        });

        let existing: Vec<IdentityLink> = ctx
            .identity_links(&self.target_id)?
            .into_iter()
            .filter(|link| link.is_of_type(&self.spec.link_type))
            .collect();

        let (old_value, new_value) = match (self.spec.link_type.cardinality(), principal) {
            (Cardinality::Singular, principal) => {
                let old_value = existing.first().map(|link| link.principal.id.clone());
                for link in &existing {
                    self.delete(ctx, link);
                }
                let new_value = principal.map(|principal| {
                    let id = principal.id.clone();
                    self.insert(ctx, principal);
                    id
                });
                (old_value, new_value)
            }
            (Cardinality::Plural, Some(principal)) => {
                let matching = existing.iter().find(|link| link.principal == principal);
                match (self.spec.action, matching) {
                    (LinkAction::Add, None) => {
                        let id = principal.id.clone();
                        self.insert(ctx, principal);
                        (None, Some(id))
                    }
                    (LinkAction::Add, Some(_)) => (None, Some(principal.id)),
                    (LinkAction::Remove, Some(link)) => {
                        self.delete(ctx, link);
                        (Some(principal.id), None)
                    }
                    (LinkAction::Remove, None) => (Some(principal.id), None),
                }
            }
            (Cardinality::Plural, None) => {
                return Err(EngineError::internal("plural link operation without principal"));
            }
        };

        let change = LinkChange {
            spec: &self.spec,
            target_id: &self.target_id,
            old_value,
            new_value,
        };
        ctx.log_operation((self.spec.audit)(&change));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Authentication;
    use crate::executor::CommandExecutor;
    use crate::session::InMemoryRegistry;
    use std::sync::Arc;

    fn setup() -> (InMemoryRegistry, CommandExecutor) {
        let registry = InMemoryRegistry::new();
        registry.insert_task(Task::new("T1", "Review")).unwrap();
        let executor = CommandExecutor::builder(Arc::new(registry.clone()))
            .build()
            .unwrap();
        (registry, executor)
    }

    #[test]
    fn test_requires_principal() {
        assert!(LinkSpec::SET_OWNER.requires_principal());
        assert!(!LinkSpec::CLEAR_OWNER.requires_principal());
        assert!(LinkSpec::DELETE_CANDIDATE_GROUP.requires_principal());
    }

    #[test]
    fn test_empty_target_is_rejected() {
        let (registry, executor) = setup();
        let err = executor
            .execute(&Authentication::anonymous(), &IdentityLinkCommand::set_owner("", "alice"))
            .unwrap_err();
        assert_eq!(err, EngineError::validation("taskId", "must not be empty"));
        assert!(registry.audit_log().unwrap().is_empty());
    }

    #[test]
    fn test_missing_principal_names_the_principal_field() {
        let (_, executor) = setup();
        let cmd = IdentityLinkCommand::new("T1", None, LinkSpec::ADD_CANDIDATE_GROUP);
        let err = executor.execute(&Authentication::anonymous(), &cmd).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "groupId"));

        let cmd = IdentityLinkCommand::set_assignee("T1", "");
        let err = executor.execute(&Authentication::anonymous(), &cmd).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "userId"));
    }

    #[test]
    fn test_set_owner_replaces_and_audits_old_value() {
        let (registry, executor) = setup();
        let auth = Authentication::user("admin");

        executor.execute(&auth, &IdentityLinkCommand::set_owner("T1", "alice")).unwrap();
        executor.execute(&auth, &IdentityLinkCommand::set_owner("T1", "bob")).unwrap();

        let links = registry.identity_links("T1").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].principal, Principal::user("bob"));

        let audit = registry.audit_log().unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].property, "owner");
        assert_eq!(audit[1].old_value.as_deref(), Some("alice"));
        assert_eq!(audit[1].new_value.as_deref(), Some("bob"));
        assert_eq!(audit[1].actor_id.as_deref(), Some("admin"));
    }

    #[test]
    fn test_clear_assignee_without_assignee_is_audited() {
        let (registry, executor) = setup();
        executor
            .execute(&Authentication::anonymous(), &IdentityLinkCommand::clear_assignee("T1"))
            .unwrap();

        let audit = registry.audit_log().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].operation_type, OperationType::Assign);
        assert_eq!(audit[0].old_value, None);
        assert_eq!(audit[0].new_value, None);
    }

    #[test]
    fn test_candidate_user_and_group_with_same_id_are_distinct() {
        let (registry, executor) = setup();
        let auth = Authentication::anonymous();
        executor.execute(&auth, &IdentityLinkCommand::add_candidate_user("T1", "sales")).unwrap();
        executor.execute(&auth, &IdentityLinkCommand::add_candidate_group("T1", "sales")).unwrap();
        executor.execute(&auth, &IdentityLinkCommand::add_candidate_group("T1", "sales")).unwrap();

        let links = registry.identity_links("T1").unwrap();
        assert_eq!(links.len(), 2);

        let properties: Vec<String> = registry
            .audit_log()
            .unwrap()
            .into_iter()
            .map(|r| r.property)
            .collect();
        assert_eq!(properties, vec!["candidateUser", "candidateGroup", "candidateGroup"]);
    }

    #[test]
    fn test_custom_audit_builder_is_used() {
        fn label(change: &LinkChange<'_>) -> AuditEntry {
            let mut entry = audit_entry(change);
            entry.property = "reviewer".to_string();
            entry
        }
        let (registry, executor) = setup();
        let spec = LinkSpec::new(
            "SetReviewer",
            LinkType::custom("reviewer", Cardinality::Singular),
            PrincipalKind::User,
            LinkAction::Add,
            OperationType::Assign,
        )
        .with_audit(label);

        let cmd = IdentityLinkCommand::new("T1", Some("carol".to_string()), spec);
        assert_eq!(cmd.name(), "SetReviewer");
        executor.execute(&Authentication::anonymous(), &cmd).unwrap();

        assert_eq!(registry.audit_log().unwrap()[0].property, "reviewer");
    }
}
