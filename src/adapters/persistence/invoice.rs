use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::cabinet::InvoiceRepo,
    domain::entities::invoice::{Invoice, ProviderInvoice},
};

const SELECT_COLS: &str = "id, cabinet_id, stripe_invoice_id, amount_cents, currency, status, \
    hosted_invoice_url, invoice_pdf_url, period_start, period_end, created_at";

fn row_to_invoice(row: sqlx::postgres::PgRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        cabinet_id: row.get("cabinet_id"),
        stripe_invoice_id: row.get("stripe_invoice_id"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        hosted_invoice_url: row.get("hosted_invoice_url"),
        invoice_pdf_url: row.get("invoice_pdf_url"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn insert_if_absent(
        &self,
        cabinet_id: Uuid,
        invoice: &ProviderInvoice,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                cabinet_id, stripe_invoice_id, amount_cents, currency, status,
                hosted_invoice_url, invoice_pdf_url, period_start, period_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (stripe_invoice_id) DO NOTHING
            "#,
        )
        .bind(cabinet_id)
        .bind(&invoice.stripe_invoice_id)
        .bind(invoice.amount_cents)
        .bind(&invoice.currency)
        .bind(&invoice.status)
        .bind(&invoice.hosted_invoice_url)
        .bind(&invoice.invoice_pdf_url)
        .bind(invoice.period_start)
        .bind(invoice.period_end)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_confirmation_sent(&self, stripe_invoice_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET confirmation_sent_at = NOW()
            WHERE stripe_invoice_id = $1 AND confirmation_sent_at IS NULL
            "#,
        )
        .bind(stripe_invoice_id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_cabinet(&self, cabinet_id: Uuid) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE cabinet_id = $1 ORDER BY created_at DESC",
            SELECT_COLS
        ))
        .bind(cabinet_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_invoice).collect())
    }
}
