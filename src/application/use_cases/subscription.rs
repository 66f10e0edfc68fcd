//! Founder-initiated subscription changes: cancellation at period end and
//! switching plan. Both go through the provider first; the webhook that
//! follows converges anything the local write does not cover.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::{
    ports::payment_provider::{PaymentProviderPort, PlanChange},
    use_cases::{
        cabinet::{CabinetRepo, MemberRepo, PlanUpdate, load_for_founder, validate_seat_count},
        seats::concurrent_change,
    },
};
use crate::domain::{
    entities::{
        billing_period::BillingPeriod, subscription_status::SubscriptionStatus,
        subscription_tier::SubscriptionTier,
    },
    price_catalog::PriceCatalog,
};

const COMMITMENT_MONTH_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    /// When the subscription ends, as reported by the provider.
    pub cancel_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChangeRequest {
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChangeResult {
    pub tier: SubscriptionTier,
    pub billing_period: BillingPeriod,
    pub seats: i32,
}

#[derive(Clone)]
pub struct SubscriptionUseCases {
    cabinets: Arc<dyn CabinetRepo>,
    members: Arc<dyn MemberRepo>,
    provider: Arc<dyn PaymentProviderPort>,
    catalog: Arc<PriceCatalog>,
}

impl SubscriptionUseCases {
    pub fn new(
        cabinets: Arc<dyn CabinetRepo>,
        members: Arc<dyn MemberRepo>,
        provider: Arc<dyn PaymentProviderPort>,
        catalog: Arc<PriceCatalog>,
    ) -> Self {
        Self {
            cabinets,
            members,
            provider,
            catalog,
        }
    }

    /// Cancel at the end of the current period, once the commitment is over.
    #[instrument(skip(self))]
    pub async fn cancel(&self, cabinet_id: Uuid, user_id: Uuid) -> AppResult<Cancellation> {
        let (cabinet, _) =
            load_for_founder(&*self.cabinets, &*self.members, cabinet_id, user_id).await?;
        let subscription = &cabinet.subscription;

        let subscription_id = subscription
            .stripe_subscription_id
            .as_deref()
            .filter(|_| subscription.status != Some(SubscriptionStatus::Canceled))
            .ok_or_else(|| AppError::InvalidInput("No subscription to cancel".into()))?;

        let now = Utc::now();
        if let Some(commitment_end) = subscription.commitment_end_date {
            if now < commitment_end {
                let remaining_months = remaining_commitment_months(commitment_end, now);
                tracing::info!(
                    cabinet_id = %cabinet.id,
                    commitment_end = %commitment_end,
                    remaining_months,
                    "Cancellation refused during commitment"
                );
                return Err(AppError::CommitmentNotCompleted {
                    commitment_end,
                    remaining_months,
                });
            }
        }

        let cancel_at = self
            .provider
            .cancel_at_period_end(
                subscription_id,
                &format!("cancel_{}_{}", cabinet.id, subscription_id),
            )
            .await?;

        tracing::info!(
            cabinet_id = %cabinet.id,
            subscription_id,
            cancel_at = ?cancel_at,
            "Subscription set to cancel at period end"
        );

        Ok(Cancellation { cancel_at })
    }

    /// Move the subscription to another tier, period or quantity.
    #[instrument(skip(self, request), fields(tier = %request.tier, quantity = request.quantity))]
    pub async fn change_plan(
        &self,
        cabinet_id: Uuid,
        user_id: Uuid,
        request: PlanChangeRequest,
    ) -> AppResult<PlanChangeResult> {
        let (cabinet, _) =
            load_for_founder(&*self.cabinets, &*self.members, cabinet_id, user_id).await?;
        let subscription = &cabinet.subscription;

        if !subscription.is_active() {
            return Err(AppError::InvalidInput(
                "The plan can only be changed on an active subscription".into(),
            ));
        }
        let (Some(subscription_id), Some(item_id)) = (
            subscription.stripe_subscription_id.clone(),
            subscription.stripe_subscription_item_id.clone(),
        ) else {
            return Err(AppError::InvalidInput(
                "Subscription has no line item to update".into(),
            ));
        };

        validate_seat_count(&*self.members, cabinet.id, request.tier, request.quantity).await?;

        if request.tier == subscription.tier
            && request.billing_period == subscription.billing_period
            && request.quantity == subscription.seats
        {
            return Ok(PlanChangeResult {
                tier: subscription.tier,
                billing_period: subscription.billing_period,
                seats: subscription.seats,
            });
        }

        let price_id = self
            .catalog
            .price_for(request.tier, request.billing_period)
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "No price configured for the {} {} plan",
                    request.tier, request.billing_period
                ))
            })?
            .to_string();

        let updated = self
            .provider
            .change_plan(&PlanChange {
                subscription_id,
                subscription_item_id: item_id.clone(),
                idempotency_key: format!(
                    "plan_{}_{}_{}_{}",
                    cabinet.id, cabinet.version, price_id, request.quantity
                ),
                price_id,
                quantity: request.quantity,
            })
            .await
            .inspect_err(|e| {
                tracing::error!(cabinet_id = %cabinet.id, error = %e, "Provider rejected plan change");
            })?;

        let snapshot = &updated.snapshot;
        let update = PlanUpdate {
            tier: snapshot.tier(&self.catalog),
            billing_period: snapshot
                .billing_period(&self.catalog)
                .unwrap_or(request.billing_period),
            seats: snapshot
                .quantity
                .filter(|q| *q > 0)
                .unwrap_or(request.quantity),
            stripe_subscription_item_id: snapshot.item_id.clone().unwrap_or(item_id),
        };

        let saved = self
            .cabinets
            .update_plan(cabinet.id, &update, cabinet.version)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    cabinet_id = %cabinet.id,
                    "Cabinet changed during plan change, leaving it to the webhook"
                );
                concurrent_change()
            })?;

        tracing::info!(
            cabinet_id = %saved.id,
            from = %subscription.tier,
            to = %saved.subscription.tier,
            seats = saved.subscription.seats,
            "Plan changed"
        );

        Ok(PlanChangeResult {
            tier: saved.subscription.tier,
            billing_period: saved.subscription.billing_period,
            seats: saved.subscription.seats,
        })
    }
}

/// Started 30-day months left until `commitment_end`.
pub fn remaining_commitment_months(commitment_end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (commitment_end - now).num_seconds().max(0);
    (secs + COMMITMENT_MONTH_SECS - 1) / COMMITMENT_MONTH_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::domain::entities::{
        cabinet::Cabinet,
        member::{CabinetMember, MemberRole},
    };
    use crate::test_utils::*;

    struct Fixture {
        cabinet: Cabinet,
        founder: CabinetMember,
        member: CabinetMember,
        cabinets: Arc<InMemoryCabinetRepo>,
        provider: Arc<FakePaymentProvider>,
        use_cases: SubscriptionUseCases,
    }

    fn fixture(cabinet: Cabinet) -> Fixture {
        let founder = create_test_member(cabinet.id, |m| m.role = MemberRole::Founder);
        let member = create_test_member(cabinet.id, |_| {});
        let cabinets = Arc::new(InMemoryCabinetRepo::with_cabinets(vec![cabinet.clone()]));
        let provider = Arc::new(
            FakePaymentProvider::new().with_subscription(create_test_subscription(
                "price_pro_monthly",
                cabinet.subscription.seats,
                |s| s.snapshot.current_period_end = Some(Utc::now() + Duration::days(12)),
            )),
        );
        let use_cases = SubscriptionUseCases::new(
            cabinets.clone(),
            Arc::new(InMemoryMemberRepo::with_members(vec![
                founder.clone(),
                member.clone(),
            ])),
            provider.clone(),
            Arc::new(test_price_catalog()),
        );

        Fixture {
            cabinet,
            founder,
            member,
            cabinets,
            provider,
            use_cases,
        }
    }

    fn committed_until(end: DateTime<Utc>) -> Cabinet {
        create_active_cabinet(SubscriptionTier::Professionnel, 4, |c| {
            c.subscription.commitment_end_date = Some(end)
        })
    }

    #[test]
    fn test_remaining_months_round_up() {
        let now = Utc::now();
        assert_eq!(remaining_commitment_months(now + Duration::days(1), now), 1);
        assert_eq!(remaining_commitment_months(now + Duration::days(30), now), 1);
        assert_eq!(remaining_commitment_months(now + Duration::days(31), now), 2);
        assert_eq!(remaining_commitment_months(now + Duration::days(150), now), 5);
        assert_eq!(remaining_commitment_months(now - Duration::days(3), now), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_commitment_is_refused() {
        let end = Utc::now() + Duration::days(95);
        let f = fixture(committed_until(end));

        let err = f
            .use_cases
            .cancel(f.cabinet.id, f.founder.user_id.unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::CommitmentNotCompleted { commitment_end, remaining_months: 4 }
                if commitment_end == end
        ));
        assert!(f.provider.cancellations().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_commitment_schedules_period_end() {
        let f = fixture(committed_until(Utc::now() - Duration::days(1)));

        let cancellation = f
            .use_cases
            .cancel(f.cabinet.id, f.founder.user_id.unwrap())
            .await
            .unwrap();

        assert!(cancellation.cancel_at.is_some());
        assert_eq!(f.provider.cancellations(), vec!["sub_test".to_string()]);
        // Status follows with the subscription webhook.
        let stored = f.cabinets.get(f.cabinet.id).unwrap();
        assert_eq!(stored.subscription, f.cabinet.subscription);
    }

    #[tokio::test]
    async fn test_only_founder_can_cancel() {
        let f = fixture(committed_until(Utc::now() - Duration::days(1)));

        let err = f
            .use_cases
            .cancel(f.cabinet.id, f.member.user_id.unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden));
        assert!(f.provider.cancellations().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_without_subscription_is_invalid() {
        let f = fixture(create_test_cabinet(|_| {}));

        let err = f
            .use_cases
            .cancel(f.cabinet.id, f.founder.user_id.unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_plan_change_updates_provider_then_cabinet() {
        let f = fixture(create_active_cabinet(SubscriptionTier::Professionnel, 4, |_| {}));

        let result = f
            .use_cases
            .change_plan(
                f.cabinet.id,
                f.founder.user_id.unwrap(),
                PlanChangeRequest {
                    tier: SubscriptionTier::CabinetPlus,
                    billing_period: BillingPeriod::Yearly,
                    quantity: 12,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            PlanChangeResult {
                tier: SubscriptionTier::CabinetPlus,
                billing_period: BillingPeriod::Yearly,
                seats: 12,
            }
        );

        let changes = f.provider.plan_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].subscription_id, "sub_test");
        assert_eq!(changes[0].subscription_item_id, "si_test");
        assert_eq!(changes[0].price_id, "price_plus_yearly");
        assert_eq!(changes[0].quantity, 12);

        let stored = f.cabinets.get(f.cabinet.id).unwrap();
        assert_eq!(stored.subscription.tier, SubscriptionTier::CabinetPlus);
        assert_eq!(stored.subscription.billing_period, BillingPeriod::Yearly);
        assert_eq!(stored.subscription.seats, 12);
        assert_eq!(stored.version, f.cabinet.version + 1);
    }

    #[tokio::test]
    async fn test_plan_change_checks_new_tier_range_and_floor() {
        let f = fixture(create_active_cabinet(SubscriptionTier::Professionnel, 4, |_| {}));
        let user = f.founder.user_id.unwrap();

        let err = f
            .use_cases
            .change_plan(
                f.cabinet.id,
                user,
                PlanChangeRequest {
                    tier: SubscriptionTier::Essentiel,
                    billing_period: BillingPeriod::Monthly,
                    quantity: 1,
                },
            )
            .await
            .unwrap_err();
        // Two active members do not fit a single-seat plan.
        assert!(matches!(err, AppError::SeatsBelowActiveMembers { active: 2, .. }));

        let err = f
            .use_cases
            .change_plan(
                f.cabinet.id,
                user,
                PlanChangeRequest {
                    tier: SubscriptionTier::Professionnel,
                    billing_period: BillingPeriod::Yearly,
                    quantity: 11,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SeatsOutOfRange { requested: 11, .. }));

        assert!(f.provider.plan_changes().is_empty());
    }

    #[tokio::test]
    async fn test_plan_change_by_member_is_forbidden() {
        let f = fixture(create_active_cabinet(SubscriptionTier::Professionnel, 4, |_| {}));

        let err = f
            .use_cases
            .change_plan(
                f.cabinet.id,
                f.member.user_id.unwrap(),
                PlanChangeRequest {
                    tier: SubscriptionTier::CabinetPlus,
                    billing_period: BillingPeriod::Monthly,
                    quantity: 12,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden));
        assert!(f.provider.plan_changes().is_empty());
    }

    #[tokio::test]
    async fn test_plan_change_racing_a_write_is_a_conflict() {
        let f = fixture(create_active_cabinet(SubscriptionTier::Professionnel, 4, |_| {}));
        f.cabinets.simulate_concurrent_write();

        let err = f
            .use_cases
            .change_plan(
                f.cabinet.id,
                f.founder.user_id.unwrap(),
                PlanChangeRequest {
                    tier: SubscriptionTier::CabinetPlus,
                    billing_period: BillingPeriod::Monthly,
                    quantity: 12,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let stored = f.cabinets.get(f.cabinet.id).unwrap();
        assert_eq!(stored.subscription.tier, SubscriptionTier::Professionnel);
    }
}
