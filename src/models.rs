//! Database row types and their response projections.
//!
//! Rows derive `sqlx::FromRow` and mirror the migration schema. Anything
//! returned to a client is either a dedicated projection (users never leave
//! with their password hash) or a row type with no sensitive fields.

use serde::Serialize;
use sqlx::FromRow;

#[derive(FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub password: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub profile_completed: bool,
    pub reset_code: Option<String>,
    pub reset_code_expiry: Option<i64>,
    pub profile_photo: Option<String>,
    pub auth_method: String,
    pub device_id: Option<String>,
    pub push_token: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Sanitized user projection. The only user shape that crosses the HTTP
/// boundary.
#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub profile_completed: bool,
    pub profile_photo: Option<String>,
    pub auth_method: String,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            status: user.status,
            email_verified: user.email_verified,
            is_active: user.is_active,
            profile_completed: user.profile_completed,
            profile_photo: user.profile_photo,
            auth_method: user.auth_method,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Officer extension record joined with its user row.
#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OfficerView {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub badge_number: Option<String>,
    pub rank: Option<String>,
    pub department: String,
    pub years_of_service: Option<i64>,
    pub assigned_cases: i64,
    pub resolved_cases: i64,
    pub is_available: bool,
    pub is_active: bool,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub case_number: String,
    pub incident_type: String,
    pub incident_date: String,
    pub incident_time: String,
    pub incident_location: String,
    pub narrative: String,
    pub complainant_name: Option<String>,
    pub complainant_contact: Option<String>,
    pub complainant_address: Option<String>,
    pub complainant_email: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_officer: Option<String>,
    pub assigned_officer_id: Option<i64>,
    pub filed_by: Option<String>,
    pub filed_by_id: Option<i64>,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Suspect {
    pub id: i64,
    pub report_id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    pub id: i64,
    pub report_id: i64,
    pub name: String,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub statement: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: i64,
    pub report_id: i64,
    pub evidence_type: String,
    pub description: String,
    pub location_found: Option<String>,
    pub photo_url: Option<String>,
    pub collected_by: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Hearing {
    pub id: i64,
    pub report_id: i64,
    pub hearing_date: String,
    pub hearing_time: String,
    pub location: String,
    pub purpose: Option<String>,
    pub presider: Option<String>,
    pub attendees: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub id: i64,
    pub report_id: i64,
    pub resolution_date: String,
    pub resolution_type: String,
    pub description: Option<String>,
    pub outcome: Option<String>,
    pub approved_by: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub related_report_id: Option<i64>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    pub report_id: i64,
    pub changed_by: i64,
    pub action: String,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginLog {
    pub id: i64,
    pub user_id: i64,
    pub ip_address: Option<String>,
    pub device: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

#[derive(FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub id: i64,
    pub severity: String,
    pub message: String,
    pub endpoint: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: String,
}
