use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A paid billing cycle, stored for display and audit. Rows are unique on
/// `stripe_invoice_id` and never updated after insertion.
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub cabinet_id: Uuid,
    pub stripe_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Invoice data as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInvoice {
    pub stripe_invoice_id: String,
    pub customer_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf_url: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

impl ProviderInvoice {
    /// Amount formatted for humans, e.g. `"138.00 EUR"`.
    pub fn display_amount(&self) -> String {
        format!(
            "{}.{:02} {}",
            self.amount_cents / 100,
            (self.amount_cents % 100).abs(),
            self.currency.to_uppercase()
        )
    }
}
