//! Emporium prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    accounts::{AccountDirectory, AccountError},
    cart::{Cart, CartError, CartItem, ProductLookup},
    catalog::{Catalog, ProductKey},
    codec::{CodecError, Decoded, Diagnostic, Section, decode, encode},
    config::{AdminSeed, ConfigError, StoreConfig},
    ids::TypedId,
    products::{Product, ProductError, ProductId, Rating, RatingError},
    receipt::CheckoutReceipt,
    sales::{SaleRecord, SalesLedger, TransactionId},
    state::SystemState,
    storage::{FileStorage, MemoryStorage, StateStorage, StorageError},
    store::{CheckoutError, Store, StoreError},
    users::{CustomerAccount, Role, User, UserId},
};
