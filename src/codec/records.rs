//! Persisted Records
//!
//! Flat, serde-friendly shapes of each section's entries. Field names follow
//! the short keys used in the data file.

use std::collections::BTreeMap;

use jiff::civil::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    products::{Product, ProductId},
    sales::{SaleRecord, TransactionId},
    users::{Role, User, UserId},
};

/// Role tag of a user record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleRecord {
    /// Administrator
    Admin,

    /// Customer
    Customer,
}

/// Entry of the `users` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Role tag
    pub role: RoleRecord,

    /// User id
    pub id: UserId,

    /// Username
    #[serde(rename = "user")]
    pub username: String,

    /// Password
    #[serde(rename = "pass")]
    pub password: String,

    /// Balance, zero for administrators
    #[serde(rename = "bal", default)]
    pub balance: Decimal,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            role: match user.role {
                Role::Admin => RoleRecord::Admin,
                Role::Customer(_) => RoleRecord::Customer,
            },
            id: user.id.clone(),
            username: user.username.clone(),
            password: user.password.clone(),
            balance: user.balance(),
        }
    }
}

/// Entry of the `products` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product id
    pub id: ProductId,

    /// Product name
    pub name: String,

    /// Category
    #[serde(rename = "cat", default)]
    pub category: String,

    /// Unit price
    pub price: Decimal,

    /// Units in stock
    #[serde(deserialize_with = "lenient::integer")]
    pub stock: u32,

    /// Description
    #[serde(rename = "desc", default)]
    pub description: String,

    /// Image path
    #[serde(rename = "img", default)]
    pub image_path: String,

    /// Scores keyed by customer id
    #[serde(default)]
    pub ratings: BTreeMap<String, i64>,
}

impl From<&Product> for ProductRecord {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.price(),
            stock: product.stock(),
            description: product.description.clone(),
            image_path: product.image_path.clone(),
            ratings: product
                .ratings()
                .iter()
                .map(|(customer, rating)| (customer.to_string(), i64::from(rating.value())))
                .collect(),
        }
    }
}

/// Entry of the `sales` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecordEntry {
    /// Transaction id
    #[serde(rename = "tid")]
    pub transaction_id: TransactionId,

    /// Buyer's username
    #[serde(rename = "user")]
    pub customer_username: String,

    /// Product name
    #[serde(rename = "prod")]
    pub product_name: String,

    /// Units sold
    #[serde(rename = "qty", deserialize_with = "lenient::integer")]
    pub quantity: u32,

    /// Amount paid
    #[serde(rename = "amt")]
    pub amount_paid: Decimal,

    /// Local date and time of the sale
    pub date: DateTime,
}

impl From<&SaleRecord> for SaleRecordEntry {
    fn from(record: &SaleRecord) -> Self {
        Self {
            transaction_id: record.transaction_id().clone(),
            customer_username: record.customer_username().to_string(),
            product_name: record.product_name().to_string(),
            quantity: record.quantity(),
            amount_paid: record.amount_paid(),
            date: record.timestamp(),
        }
    }
}

/// Entry of the `carts` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRecord {
    /// Owner of the cart
    #[serde(rename = "userId")]
    pub user_id: UserId,

    /// Cart lines in order
    #[serde(default)]
    pub items: Vec<CartLineRecord>,
}

impl CartRecord {
    /// The cart section entry for a user; `None` for administrators.
    pub fn for_user(user: &User) -> Option<Self> {
        let account = user.account()?;

        Some(Self {
            user_id: user.id.clone(),
            items: account
                .cart
                .items()
                .iter()
                .map(|line| CartLineRecord {
                    product_id: line.product_id().clone(),
                    quantity: i64::from(line.quantity()),
                })
                .collect(),
        })
    }
}

/// A line inside a cart entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineRecord {
    /// Product id
    #[serde(rename = "pid")]
    pub product_id: ProductId,

    /// Units
    #[serde(rename = "qty", deserialize_with = "lenient::integer")]
    pub quantity: i64,
}

/// Integers that may have been written quoted.
mod lenient {
    use std::fmt::Display;

    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntegerOrText {
        Integer(i64),
        Text(String),
    }

    pub(super) fn integer<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i64>,
        T::Error: Display,
    {
        let value = match IntegerOrText::deserialize(deserializer)? {
            IntegerOrText::Integer(value) => value,
            IntegerOrText::Text(text) => text.trim().parse::<i64>().map_err(D::Error::custom)?,
        };

        T::try_from(value).map_err(|err| D::Error::custom(format!("{value}: {err}")))
    }
}
