//! External collaborators consumed by the order service.

pub mod address;
pub mod notification;

pub use address::{Address, AddressBook, InMemoryAddressBook};
pub use notification::{
    InMemoryNotificationSender, LoggingNotificationSender, NotificationError, NotificationSender,
    OrderSummary,
};
