use url::Url;

use crate::domain::entities::{
    billing_period::BillingPeriod, invoice::ProviderInvoice, subscription_tier::SubscriptionTier,
};

const BRAND_NAME: &str = "Cabinet";

fn origin_label(app_origin: &str) -> String {
    Url::parse(app_origin)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| app_origin.to_string())
}

pub fn primary_button(url: &str, label: &str) -> String {
    format!(
        r#"<a href="{url}" style="display:inline-block;padding:12px 18px;background-color:#111827;color:#ffffff;text-decoration:none;border-radius:8px;font-weight:600;">{label}</a>"#
    )
}

fn period_label(period: BillingPeriod) -> &'static str {
    match period {
        BillingPeriod::Monthly => "mensuel",
        BillingPeriod::Yearly => "annuel",
    }
}

pub struct PaymentConfirmation<'a> {
    pub recipient_name: &'a str,
    pub cabinet_name: &'a str,
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub seats: i32,
    pub invoice: &'a ProviderInvoice,
}

/// Sent to the cabinet founder once the first subscription payment clears.
pub fn payment_confirmation_email(
    app_origin: &str,
    confirmation: &PaymentConfirmation<'_>,
) -> (String, String) {
    let subject = format!(
        "Confirmation de votre abonnement {}",
        confirmation.tier.display_name()
    );
    let headline = "Merci pour votre abonnement";
    let lead = format!(
        "Bonjour {}, le paiement de l'abonnement de <strong>{}</strong> a bien été reçu.",
        confirmation.recipient_name, confirmation.cabinet_name
    );

    let invoice_link = confirmation
        .invoice
        .hosted_invoice_url
        .as_deref()
        .map(|url| primary_button(url, "Voir la facture"))
        .unwrap_or_default();

    let body = format!(
        r#"<table style="margin:12px 0;font-size:14px;color:#374151;">
  <tr><td style="padding:2px 12px 2px 0;">Formule</td><td><strong>{tier}</strong> ({period})</td></tr>
  <tr><td style="padding:2px 12px 2px 0;">Utilisateurs</td><td>{seats}</td></tr>
  <tr><td style="padding:2px 12px 2px 0;">Montant</td><td>{amount}</td></tr>
</table>
{invoice_link}"#,
        tier = confirmation.tier.display_name(),
        period = period_label(confirmation.billing_period),
        seats = confirmation.seats,
        amount = confirmation.invoice.display_amount(),
    );
    let reason = "vous avez souscrit un abonnement";

    let html = wrap_email(app_origin, headline, &lead, &body, reason);
    (subject, html)
}

pub fn wrap_email(
    app_origin: &str,
    headline: &str,
    lead: &str,
    body_html: &str,
    reason: &str,
) -> String {
    let origin = origin_label(app_origin);

    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
  <body style="background:#f8fafc;margin:0;padding:24px;font-family:Arial,Helvetica,sans-serif;">
    <div style="max-width:560px;margin:0 auto;background:#ffffff;border:1px solid #e5e7eb;border-radius:12px;padding:24px;">
      <div style="font-size:12px;letter-spacing:0.08em;text-transform:uppercase;color:#6b7280;">{brand} - {origin}</div>
      <h1 style="margin:12px 0 8px;font-size:22px;color:#111827;">{headline}</h1>
      <p style="margin:0 0 12px;font-size:15px;color:#111827;line-height:1.6;">{lead}</p>
      {body_html}
      <div style="margin-top:20px;padding-top:16px;border-top:1px solid #e5e7eb;">
        <p style="margin:0;font-size:13px;color:#4b5563;">Vous recevez cet email car {reason}.</p>
      </div>
    </div>
  </body>
</html>
"#,
        brand = BRAND_NAME,
    )
}
