use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Created the cabinet and administers its subscription.
    Founder,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Invited, not yet joined. Does not occupy a seat.
    Pending,
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct CabinetMember {
    pub id: Uuid,
    pub cabinet_id: Uuid,
    /// Empty while the invitation is pending.
    pub user_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl CabinetMember {
    pub fn is_founder(&self) -> bool {
        self.role == MemberRole::Founder
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    /// Name used in emails, falling back to the address.
    pub fn greeting_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}
