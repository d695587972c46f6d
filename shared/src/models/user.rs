//! Users, roles and permissions

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::types::ParseEnumError;

/// Platform roles issued by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    Manager,
    FieldOfficer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::FieldOfficer => "FIELD_OFFICER",
        }
    }

    /// Whether this role may perform `action` on `resource`
    pub fn can(&self, resource: Resource, action: Action) -> bool {
        match self {
            UserRole::SuperAdmin | UserRole::Manager => true,
            UserRole::FieldOfficer => match (resource, action) {
                (Resource::Analytics, _) => false,
                (_, Action::View) => true,
                (Resource::Measurement | Resource::Loss, Action::Create) => true,
                _ => false,
            },
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(UserRole::SuperAdmin),
            "MANAGER" => Ok(UserRole::Manager),
            "FIELD_OFFICER" => Ok(UserRole::FieldOfficer),
            _ => Err(ParseEnumError::new("user role", s)),
        }
    }
}

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Species,
    Zone,
    Bed,
    Batch,
    StageTransition,
    Loss,
    Measurement,
    Task,
    Analytics,
}

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

/// The authenticated caller of a domain operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn can(&self, resource: Resource, action: Action) -> bool {
        self.role.can(resource, action)
    }
}
