use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// How many links of one type a target may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one link per target (replace/unset semantics)
    Singular,
    /// Any number of links per target
    Plural,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Singular => "singular",
            Cardinality::Plural => "plural",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "singular" => Some(Cardinality::Singular),
            "plural" => Some(Cardinality::Plural),
            _ => None,
        }
    }
}

/// Identity link type vocabulary
///
/// The built-in types cover task ownership and candidacy; consumers add their
/// own with [`LinkType::custom`] without touching the command family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkType {
    name: Cow<'static, str>,
    cardinality: Cardinality,
}

impl LinkType {
    pub const OWNER: LinkType = LinkType::builtin("owner", Cardinality::Singular);
    pub const ASSIGNEE: LinkType = LinkType::builtin("assignee", Cardinality::Singular);
    /// Candidate users and candidate groups share this type and differ by principal kind
    pub const CANDIDATE: LinkType = LinkType::builtin("candidate", Cardinality::Plural);

    const fn builtin(name: &'static str, cardinality: Cardinality) -> Self {
        Self {
            name: Cow::Borrowed(name),
            cardinality,
        }
    }

    pub fn custom(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            cardinality,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_singular(&self) -> bool {
        self.cardinality == Cardinality::Singular
    }

    /// Audit property name for a change of this link type
    ///
    /// Singular types use their own name (`owner`); plural types are qualified
    /// by principal kind (`candidateUser`, `candidateGroup`).
    pub fn audit_property(&self, kind: PrincipalKind) -> String {
        match self.cardinality {
            Cardinality::Singular => self.name.to_string(),
            Cardinality::Plural => format!("{}{}", self.name, kind.title()),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Group => "group",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            PrincipalKind::User => "User",
            PrincipalKind::Group => "Group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(PrincipalKind::User),
            "group" => Some(PrincipalKind::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub id: String,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            id: id.into(),
        }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Group,
            id: id.into(),
        }
    }
}

/// Typed relation between a principal and a target entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    pub id: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub principal: Principal,
}

impl IdentityLink {
    pub fn new(target_id: impl Into<String>, link_type: LinkType, principal: Principal) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            target_id: target_id.into(),
            link_type,
            principal,
        }
    }

    pub fn is_of_type(&self, link_type: &LinkType) -> bool {
        &self.link_type == link_type
    }
}
