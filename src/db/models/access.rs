//! Role, module and invite models for access management.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status given to every new invite
pub const INVITE_STATUS_PENDING: &str = "Pendente";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// Role together with the number of users assigned to it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleWithMembers {
    pub id: i64,
    pub name: String,
    pub members: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Invite row joined with its (optional) role
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InviteWithRole {
    pub id: i64,
    pub email: String,
    pub status: String,
    pub created_at: String,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: i64,
    pub email: String,
    pub role_id: Option<i64>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModuleToggleRequest {
    /// Read loosely; any truthy value enables the module
    #[serde(default)]
    pub enabled: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub email: Option<String>,
    /// Accepts a number or a numeric string; anything else means "no role"
    #[serde(default)]
    pub role_id: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InviteStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}
