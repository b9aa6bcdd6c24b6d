//! Emporium
//!
//! Emporium is the state engine of a small shop: a product catalog with
//! customer ratings, customer accounts with balances and carts, stock-checked
//! checkout and a sales ledger, all persisted to a single YAML document.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod ids;
pub mod prelude;
pub mod products;
pub mod receipt;
pub mod sales;
pub mod state;
pub mod storage;
pub mod store;
pub mod users;
