use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::cabinet::{CabinetRepo, PlanUpdate},
    domain::entities::cabinet::{Cabinet, SubscriptionState},
};

const SELECT_COLS: &str = "id, name, siret, address, tier, billing_period, max_members, \
    subscription_status, stripe_customer_id, stripe_subscription_id, \
    stripe_subscription_item_id, subscription_started_at, current_period_end, \
    commitment_end_date, version, created_at, updated_at";

fn row_to_cabinet(row: sqlx::postgres::PgRow) -> Cabinet {
    Cabinet {
        id: row.get("id"),
        name: row.get("name"),
        siret: row.get("siret"),
        address: row.get("address"),
        subscription: SubscriptionState {
            tier: row.get("tier"),
            billing_period: row.get("billing_period"),
            seats: row.get("max_members"),
            status: row.get("subscription_status"),
            stripe_customer_id: row.get("stripe_customer_id"),
            stripe_subscription_id: row.get("stripe_subscription_id"),
            stripe_subscription_item_id: row.get("stripe_subscription_item_id"),
            started_at: row.get("subscription_started_at"),
            current_period_end: row.get("current_period_end"),
            commitment_end_date: row.get("commitment_end_date"),
        },
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CabinetRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Cabinet>> {
        let row = sqlx::query(&format!("SELECT {} FROM cabinets WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_cabinet))
    }

    async fn find_by_stripe_customer(&self, customer_id: &str) -> AppResult<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cabinets WHERE stripe_customer_id = $1 ORDER BY updated_at DESC LIMIT 1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_cabinet))
    }

    async fn find_by_stripe_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cabinets WHERE stripe_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_cabinet))
    }

    async fn save_subscription_state(
        &self,
        id: Uuid,
        state: &SubscriptionState,
    ) -> AppResult<Cabinet> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE cabinets SET
                tier = $2,
                billing_period = $3,
                max_members = $4,
                subscription_status = $5,
                stripe_customer_id = $6,
                stripe_subscription_id = $7,
                stripe_subscription_item_id = $8,
                subscription_started_at = $9,
                current_period_end = $10,
                commitment_end_date = $11,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(state.tier)
        .bind(state.billing_period)
        .bind(state.seats)
        .bind(state.status)
        .bind(&state.stripe_customer_id)
        .bind(&state.stripe_subscription_id)
        .bind(&state.stripe_subscription_item_id)
        .bind(state.started_at)
        .bind(state.current_period_end)
        .bind(state.commitment_end_date)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_cabinet(row))
    }

    async fn update_seats(
        &self,
        id: Uuid,
        seats: i32,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE cabinets SET max_members = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $3
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(seats)
        .bind(expected_version)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_cabinet))
    }

    async fn update_plan(
        &self,
        id: Uuid,
        change: &PlanUpdate,
        expected_version: i64,
    ) -> AppResult<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE cabinets SET
                tier = $2,
                billing_period = $3,
                max_members = $4,
                stripe_subscription_item_id = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $6
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(change.tier)
        .bind(change.billing_period)
        .bind(change.seats)
        .bind(&change.stripe_subscription_item_id)
        .bind(expected_version)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_cabinet))
    }
}
