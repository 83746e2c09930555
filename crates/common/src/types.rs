use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Surrogate identifier of a persisted order.
    OrderId
);

numeric_id!(
    /// Identifier of a customer, issued by the external account system.
    CustomerId
);

numeric_id!(
    /// Identifier of a product and of its stock ledger row.
    ///
    /// Ordering matters: stock rows are always locked in ascending
    /// `ProductId` order.
    ProductId
);

numeric_id!(
    /// Identifier of an address held by the external address book.
    AddressId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_ids_order_numerically() {
        let mut ids = vec![ProductId::new(30), ProductId::new(2), ProductId::new(11)];
        ids.sort();
        assert_eq!(
            ids,
            vec![ProductId::new(2), ProductId::new(11), ProductId::new(30)]
        );
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&OrderId::new(42)).unwrap();
        assert_eq!(json, "42");

        let id: CustomerId = serde_json::from_str("7").unwrap();
        assert_eq!(id.as_i64(), 7);
    }

    #[test]
    fn id_display_is_raw_value() {
        assert_eq!(AddressId::new(5).to_string(), "5");
    }
}
