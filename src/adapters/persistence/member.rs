use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::cabinet::MemberRepo,
    domain::entities::member::{CabinetMember, MemberRole, MemberStatus},
};

const SELECT_COLS: &str =
    "id, cabinet_id, user_id, email, display_name, role, status, created_at";

fn row_to_member(row: sqlx::postgres::PgRow) -> CabinetMember {
    CabinetMember {
        id: row.get("id"),
        cabinet_id: row.get("cabinet_id"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: row.get("role"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl MemberRepo for PostgresPersistence {
    async fn get_membership(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<CabinetMember>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cabinet_members WHERE cabinet_id = $1 AND user_id = $2",
            SELECT_COLS
        ))
        .bind(cabinet_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_member))
    }

    async fn count_active(&self, cabinet_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cabinet_members WHERE cabinet_id = $1 AND status = $2",
        )
        .bind(cabinet_id)
        .bind(MemberStatus::Active)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(count)
    }

    async fn find_founder(&self, cabinet_id: Uuid) -> AppResult<Option<CabinetMember>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cabinet_members WHERE cabinet_id = $1 AND role = $2 \
             ORDER BY created_at LIMIT 1",
            SELECT_COLS
        ))
        .bind(cabinet_id)
        .bind(MemberRole::Founder)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_member))
    }

    async fn find_cabinet_id_by_email(&self, email: &str) -> AppResult<Option<Uuid>> {
        let cabinet_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT cabinet_id FROM cabinet_members WHERE lower(email) = lower($1) \
             ORDER BY created_at LIMIT 1",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(cabinet_id)
    }
}
