//! Orders: placement, codes, lifecycle and listings.

pub mod code;
mod lifecycle;
mod placement;
mod query;
mod service;
pub mod shipping;
mod status;

pub use code::{InvalidOrderCode, OrderCode, next_code, validate_prefix};
pub use lifecycle::{StatusUpdate, apply_update};
pub use placement::{CheckoutCart, MAX_NOTE_LENGTH, OrderLineRequest, PlaceOrder};
pub use query::{
    DEFAULT_PER_PAGE, MAX_PER_PAGE, OrderFilter, OrderPage, Pagination, parse_sort_direction,
    parse_sort_field,
};
pub use service::OrderService;
pub use shipping::{requires_address, shipping_cost};
pub use status::{DerivedStatus, derive_status};
