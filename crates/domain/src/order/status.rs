//! Customer-facing summary status.

use common::{PaymentStatus, ShipmentStatus};
use serde::{Deserialize, Serialize};

/// Read-only status shown to customers, derived from the payment and
/// shipment axes. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    Cancelled,
    Delivered,
    Shipped,
    PendingPayment,
    Processing,
}

impl DerivedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedStatus::Cancelled => "cancelled",
            DerivedStatus::Delivered => "delivered",
            DerivedStatus::Shipped => "shipped",
            DerivedStatus::PendingPayment => "pending_payment",
            DerivedStatus::Processing => "processing",
        }
    }
}

impl std::fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precedence: cancelled, delivered, shipped, pending payment, processing.
pub fn derive_status(payment: PaymentStatus, shipment: ShipmentStatus) -> DerivedStatus {
    use PaymentStatus as P;
    use ShipmentStatus as S;

    match (payment, shipment) {
        (_, S::Cancelled) | (P::Rejected | P::Refunded, _) => DerivedStatus::Cancelled,
        (_, S::Delivered) => DerivedStatus::Delivered,
        (_, S::Shipped | S::InTransit) => DerivedStatus::Shipped,
        (P::Pending, _) => DerivedStatus::PendingPayment,
        _ => DerivedStatus::Processing,
    }
}
