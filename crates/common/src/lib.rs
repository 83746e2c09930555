//! Shared vocabulary for the order engine.
//!
//! Identifiers, money and the three order status axes are used by the
//! store, the domain layer and the HTTP surface alike, so they live here.

mod money;
mod status;
mod types;

pub use money::Money;
pub use status::{
    OrderStatus, ParseStatusError, PaymentMethod, PaymentStatus, ShipmentMethod, ShipmentStatus,
};
pub use types::{AddressId, CustomerId, OrderId, ProductId};
