use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organisational roles that take part in the requisition workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProjectManager,
    Purchaser,
    DeptManager,
    GeneralManager,
}

impl Role {
    pub const ALL: [Role; 4] =
        [Role::ProjectManager, Role::Purchaser, Role::DeptManager, Role::GeneralManager];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectManager => "project_manager",
            Self::Purchaser => "purchaser",
            Self::DeptManager => "dept_manager",
            Self::GeneralManager => "general_manager",
        }
    }

    /// Project managers raise requisitions but never see supplier pricing.
    pub fn can_view_prices(&self) -> bool {
        !matches!(self, Self::ProjectManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}` (expected project_manager|purchaser|dept_manager|general_manager)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project_manager" => Ok(Self::ProjectManager),
            "purchaser" => Ok(Self::Purchaser),
            "dept_manager" => Ok(Self::DeptManager),
            "general_manager" => Ok(Self::GeneralManager),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated caller. Passed explicitly into every authorization check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub managed_projects: Vec<ProjectId>,
}

impl Actor {
    pub fn new(user_id: i64, name: impl Into<String>, role: Role) -> Self {
        Self { user_id: UserId(user_id), name: name.into(), role, managed_projects: Vec::new() }
    }

    pub fn managing(mut self, projects: impl IntoIterator<Item = i64>) -> Self {
        self.managed_projects.extend(projects.into_iter().map(ProjectId));
        self
    }

    pub fn manages(&self, project_id: ProjectId) -> bool {
        self.managed_projects.contains(&project_id)
    }

    /// Project managers are scoped to the projects they run; every other role sees all projects.
    pub fn can_access_project(&self, project_id: ProjectId) -> bool {
        self.role != Role::ProjectManager || self.manages(project_id)
    }

    pub fn label(&self) -> String {
        format!("{}#{} ({})", self.name, self.user_id, self.role)
    }
}
