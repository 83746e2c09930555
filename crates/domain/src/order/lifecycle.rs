//! Post-placement lifecycle: payment and shipment updates, tracking and
//! customer cancellation.
//!
//! Raw status values may be set in any order. The rules here only add the
//! derived consequences (timestamps, tracking advancing the shipment) and
//! the guards on customer cancellation.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OrderStatus, PaymentStatus, ShipmentStatus};
use order_store::{LifecycleFields, Order, OrderStore};
use serde::{Deserialize, Serialize};

use super::service::OrderService;
use crate::error::OrderError;

/// A partial update of an order's lifecycle fields. Absent fields are left
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdate {
    pub payment_status: Option<PaymentStatus>,
    pub shipment_status: Option<ShipmentStatus>,
    pub order_status: Option<OrderStatus>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

impl StatusUpdate {
    pub fn is_empty(&self) -> bool {
        *self == StatusUpdate::default()
    }

    pub fn payment(status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(status),
            ..Default::default()
        }
    }

    pub fn shipment(status: ShipmentStatus) -> Self {
        Self {
            shipment_status: Some(status),
            ..Default::default()
        }
    }

    pub fn tracking(carrier: impl Into<String>, tracking_number: impl Into<String>) -> Self {
        Self {
            carrier: Some(carrier.into()),
            tracking_number: Some(tracking_number.into()),
            ..Default::default()
        }
    }
}

fn non_blank(field: &str, value: &Option<String>) -> Result<Option<String>, OrderError> {
    match value.as_deref().map(str::trim) {
        None => Ok(None),
        Some("") => Err(OrderError::Validation(format!("{field} must not be blank"))),
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Computes the lifecycle fields after `update`.
///
/// Pure apart from `now`, which stamps timestamps that were neither given
/// nor already set.
pub fn apply_update(
    current: &LifecycleFields,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> Result<LifecycleFields, OrderError> {
    if update.is_empty() {
        return Err(OrderError::Validation(
            "status update must set at least one field".to_string(),
        ));
    }

    let carrier = non_blank("carrier", &update.carrier)?;
    let tracking_number = non_blank("tracking_number", &update.tracking_number)?;

    let mut next = current.clone();
    if let Some(status) = update.payment_status {
        next.payment_status = status;
    }
    if let Some(status) = update.shipment_status {
        next.shipment_status = status;
    }
    if let Some(status) = update.order_status {
        next.order_status = status;
    }
    if let Some(at) = update.paid_at {
        next.paid_at = Some(at);
    }
    if let Some(at) = update.shipped_at {
        next.shipped_at = Some(at);
    }
    if let Some(at) = update.delivered_at {
        next.delivered_at = Some(at);
    }
    if carrier.is_some() {
        next.carrier = carrier;
    }
    if tracking_number.is_some() {
        next.tracking_number = tracking_number;
    }

    // Tracking info advances a preparing shipment unless the caller chose
    // the shipment status themselves.
    if update.shipment_status.is_none()
        && next.shipment_status == ShipmentStatus::Preparing
        && next.carrier.is_some()
        && next.tracking_number.is_some()
    {
        next.shipment_status = ShipmentStatus::Shipped;
    }

    if next.payment_status == PaymentStatus::Paid && next.paid_at.is_none() {
        next.paid_at = Some(now);
    }
    if next.shipment_status == ShipmentStatus::Shipped && next.shipped_at.is_none() {
        next.shipped_at = Some(now);
    }
    if next.shipment_status == ShipmentStatus::Delivered && next.delivered_at.is_none() {
        next.delivered_at = Some(now);
    }

    Ok(next)
}

fn is_cancelled(order: &Order) -> bool {
    order.lifecycle.order_status == OrderStatus::Cancelled
        || order.lifecycle.shipment_status == ShipmentStatus::Cancelled
}

impl<S: OrderStore> OrderService<S> {
    /// Applies a partial status update.
    ///
    /// Fails with a conflict if the order changed since it was read.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, OrderError> {
        if update.is_empty() {
            return Err(OrderError::Validation(
                "status update must set at least one field".to_string(),
            ));
        }

        let order = self.get_order(order_id).await?;
        let next = apply_update(&order.lifecycle, &update, self.clock.now())?;
        self.write_lifecycle(&order, next).await
    }

    /// Records carrier and tracking number, moving a preparing shipment to
    /// shipped.
    #[tracing::instrument(skip(self))]
    pub async fn attach_tracking(
        &self,
        order_id: OrderId,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Order, OrderError> {
        let update = StatusUpdate::tracking(carrier, tracking_number);
        non_blank("carrier", &update.carrier)?;
        non_blank("tracking_number", &update.tracking_number)?;

        let order = self.get_order(order_id).await?;
        if is_cancelled(&order) {
            return Err(OrderError::InvalidTransition(format!(
                "order {} is cancelled and cannot be shipped",
                order.code
            )));
        }

        let next = apply_update(&order.lifecycle, &update, self.clock.now())?;
        self.write_lifecycle(&order, next).await
    }

    /// Cancels an order on behalf of its customer.
    ///
    /// Paid orders and already cancelled orders cannot be cancelled here.
    /// Stock is not returned.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(order_id).await?;

        // Someone else's order looks the same as a missing one.
        if order.customer_id != customer_id {
            return Err(OrderError::not_found("Order", order_id));
        }
        if order.lifecycle.payment_status == PaymentStatus::Paid {
            return Err(OrderError::InvalidTransition(format!(
                "order {} is already paid",
                order.code
            )));
        }
        if order.lifecycle.order_status == OrderStatus::Cancelled {
            return Err(OrderError::InvalidTransition(format!(
                "order {} is already cancelled",
                order.code
            )));
        }

        let mut next = order.lifecycle.clone();
        next.order_status = OrderStatus::Cancelled;
        next.shipment_status = ShipmentStatus::Cancelled;
        self.write_lifecycle(&order, next).await
    }

    async fn write_lifecycle(&self, order: &Order, next: LifecycleFields) -> Result<Order, OrderError> {
        let updated = self
            .store
            .update_lifecycle(order.id, order.version, &next)
            .await?;

        metrics::counter!("order_status_updates_total").increment(1);
        tracing::info!(
            order_code = %updated.code,
            payment_status = %updated.lifecycle.payment_status,
            shipment_status = %updated.lifecycle.shipment_status,
            order_status = %updated.lifecycle.order_status,
            version = %updated.version,
            "order lifecycle updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn empty_update_is_rejected() {
        let result = apply_update(&LifecycleFields::default(), &StatusUpdate::default(), at(9));
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[test]
    fn paid_stamps_now_once() {
        let paid = apply_update(
            &LifecycleFields::default(),
            &StatusUpdate::payment(PaymentStatus::Paid),
            at(9),
        )
        .unwrap();
        assert_eq!(paid.paid_at, Some(at(9)));

        let again = apply_update(&paid, &StatusUpdate::payment(PaymentStatus::Paid), at(10)).unwrap();
        assert_eq!(again.paid_at, Some(at(9)));
    }

    #[test]
    fn explicit_timestamp_wins() {
        let update = StatusUpdate {
            payment_status: Some(PaymentStatus::Paid),
            paid_at: Some(at(3)),
            ..Default::default()
        };
        let next = apply_update(&LifecycleFields::default(), &update, at(9)).unwrap();
        assert_eq!(next.paid_at, Some(at(3)));
    }

    #[test]
    fn shipped_and_delivered_stamp() {
        let shipped = apply_update(
            &LifecycleFields::default(),
            &StatusUpdate::shipment(ShipmentStatus::Shipped),
            at(9),
        )
        .unwrap();
        assert_eq!(shipped.shipped_at, Some(at(9)));
        assert_eq!(shipped.delivered_at, None);

        let delivered = apply_update(
            &shipped,
            &StatusUpdate::shipment(ShipmentStatus::Delivered),
            at(12),
        )
        .unwrap();
        assert_eq!(delivered.shipped_at, Some(at(9)));
        assert_eq!(delivered.delivered_at, Some(at(12)));
    }

    #[test]
    fn tracking_advances_preparing_shipment() {
        let next = apply_update(
            &LifecycleFields::default(),
            &StatusUpdate::tracking("DHL", "JD0001"),
            at(9),
        )
        .unwrap();
        assert_eq!(next.shipment_status, ShipmentStatus::Shipped);
        assert_eq!(next.shipped_at, Some(at(9)));
        assert_eq!(next.carrier.as_deref(), Some("DHL"));
    }

    #[test]
    fn explicit_shipment_status_beats_tracking_advance() {
        let update = StatusUpdate {
            shipment_status: Some(ShipmentStatus::Preparing),
            ..StatusUpdate::tracking("DHL", "JD0001")
        };
        let next = apply_update(&LifecycleFields::default(), &update, at(9)).unwrap();
        assert_eq!(next.shipment_status, ShipmentStatus::Preparing);
        assert_eq!(next.shipped_at, None);
    }

    #[test]
    fn tracking_number_alone_does_not_advance() {
        let update = StatusUpdate {
            tracking_number: Some("JD0001".into()),
            ..Default::default()
        };
        let next = apply_update(&LifecycleFields::default(), &update, at(9)).unwrap();
        assert_eq!(next.shipment_status, ShipmentStatus::Preparing);
    }

    #[test]
    fn in_transit_is_not_moved_back() {
        let current = LifecycleFields {
            shipment_status: ShipmentStatus::InTransit,
            ..Default::default()
        };
        let next = apply_update(&current, &StatusUpdate::tracking("DHL", "JD0001"), at(9)).unwrap();
        assert_eq!(next.shipment_status, ShipmentStatus::InTransit);
    }

    #[test]
    fn blank_tracking_fields_are_rejected() {
        let result = apply_update(
            &LifecycleFields::default(),
            &StatusUpdate::tracking("  ", "JD0001"),
            at(9),
        );
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }
}
