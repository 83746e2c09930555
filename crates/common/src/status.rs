//! Status axes and method enums persisted as lowercase text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Returns the stored text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Payment axis. Set by an external payment actor.
    PaymentStatus as "payment status" {
        Pending => "pending",
        Paid => "paid",
        Rejected => "rejected",
        Refunded => "refunded",
    }
}

text_enum! {
    /// Shipment axis.
    ShipmentStatus as "shipment status" {
        Preparing => "preparing",
        Shipped => "shipped",
        InTransit => "in_transit",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Order axis. Placed orders start `Confirmed`; drafts never reach storage.
    OrderStatus as "order status" {
        Confirmed => "confirmed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    PaymentMethod as "payment method" {
        BankTransfer => "bank_transfer",
        CreditCard => "credit_card",
        CashOnDelivery => "cash_on_delivery",
        EWallet => "e_wallet",
    }
}

text_enum! {
    ShipmentMethod as "shipment method" {
        Standard => "standard",
        Express => "express",
        Pickup => "pickup",
    }
}

impl ShipmentStatus {
    /// Position along the forward shipping path. `Cancelled` is off the path.
    fn progress(&self) -> Option<u8> {
        match self {
            ShipmentStatus::Preparing => Some(0),
            ShipmentStatus::Shipped => Some(1),
            ShipmentStatus::InTransit => Some(2),
            ShipmentStatus::Delivered => Some(3),
            ShipmentStatus::Cancelled => None,
        }
    }

    /// Returns true if `self` has reached `other` on the forward path.
    pub fn is_at_or_beyond(&self, other: ShipmentStatus) -> bool {
        match (self.progress(), other.progress()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl Default for ShipmentStatus {
    fn default() -> Self {
        ShipmentStatus::Preparing
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Confirmed
    }
}
