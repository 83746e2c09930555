use common::{Money, ShipmentMethod};

/// Flat shipping cost of a method, in minor units.
pub fn shipping_cost(method: ShipmentMethod) -> Money {
    match method {
        ShipmentMethod::Standard => Money::from_minor(490),
        ShipmentMethod::Express => Money::from_minor(990),
        ShipmentMethod::Pickup => Money::zero(),
    }
}

/// Whether orders with this method must carry a delivery address.
pub fn requires_address(method: ShipmentMethod) -> bool {
    !matches!(method, ShipmentMethod::Pickup)
}
