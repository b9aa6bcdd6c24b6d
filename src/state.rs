//! System State

use crate::{products::Product, sales::SaleRecord, users::User};

/// Everything that is persisted.
///
/// Carts travel inside each customer's account; the codec writes them to a
/// section of their own and reattaches them on decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemState {
    /// Products in catalog order
    pub products: Vec<Product>,

    /// Users in registration order
    pub users: Vec<User>,

    /// Sale records in the order they were added
    pub sales: Vec<SaleRecord>,
}

impl SystemState {
    /// Whether there is nothing to persist
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.users.is_empty() && self.sales.is_empty()
    }
}
