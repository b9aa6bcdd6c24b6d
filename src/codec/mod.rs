//! State Codec
//!
//! Encodes a [`SystemState`] as a single YAML document with four sections
//! (`users`, `products`, `sales`, `carts`) and rebuilds it again.
//!
//! Decoding is tolerant: each record is decoded on its own, so a malformed
//! record is skipped without disturbing its neighbours, and references that
//! cannot be resolved are dropped. Both are reported as [`Diagnostic`]s.
//! Reconstruction runs in dependency order:
//!
//! 1. users,
//! 2. products, with their ratings resolved against the users,
//! 3. sales,
//! 4. carts, buffered and resolved once every user and product exists.

use std::fmt::{Display, Formatter, Result as FmtResult};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_norway::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cart::{CartError, ProductLookup},
    codec::records::{
        CartRecord, ProductRecord, RoleRecord, SaleRecordEntry, UserRecord,
    },
    products::{Product, ProductId, Rating},
    sales::SaleRecord,
    state::SystemState,
    users::{User, UserId},
};

pub mod records;

/// Errors that stop a whole document from being encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not a readable state document.
    #[error("failed to parse state document: {0}")]
    Parse(#[source] serde_norway::Error),

    /// The state could not be written out.
    #[error("failed to encode state document: {0}")]
    Encode(#[source] serde_norway::Error),
}

/// Section of the state document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// `users`
    Users,

    /// `products`
    Products,

    /// `sales`
    Sales,

    /// `carts`
    Carts,
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Section::Users => "users",
            Section::Products => "products",
            Section::Sales => "sales",
            Section::Carts => "carts",
        })
    }
}

/// Something skipped while decoding. None of these stop the load.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Diagnostic {
    /// A record could not be decoded and was skipped.
    #[error("{section}[{index}] skipped: {reason}")]
    MalformedRecord {
        /// Section holding the record
        section: Section,
        /// Position of the record within the section
        index: usize,
        /// Why it was rejected
        reason: String,
    },

    /// A section is not a list and was ignored.
    #[error("{section} is not a list, section ignored")]
    MalformedSection {
        /// The ignored section
        section: Section,
    },

    /// A rating names a customer that does not exist.
    #[error("rating of product {product} by unknown customer {customer} dropped")]
    UnresolvedRatingCustomer {
        /// Rated product
        product: ProductId,
        /// Customer id as written
        customer: String,
    },

    /// A rating score is out of range.
    #[error("rating {score} of product {product} by {customer} dropped")]
    InvalidRating {
        /// Rated product
        product: ProductId,
        /// Customer id as written
        customer: String,
        /// Score as written
        score: i64,
    },

    /// A cart belongs to a user that does not exist or is not a customer.
    #[error("cart of unknown customer {user} dropped")]
    UnresolvedCartOwner {
        /// Owner id as written
        user: UserId,
    },

    /// A cart line names a product that does not exist.
    #[error("cart line of {user} for unknown product {product} dropped")]
    UnresolvedCartProduct {
        /// Cart owner
        user: UserId,
        /// Product id as written
        product: ProductId,
    },

    /// A cart line has a bad quantity or repeats a product.
    #[error("cart line of {user} for product {product} dropped: {reason}")]
    RejectedCartLine {
        /// Cart owner
        user: UserId,
        /// Product on the line
        product: ProductId,
        /// Why the cart refused it
        reason: CartError,
    },
}

/// Result of decoding a state document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// The rebuilt state
    pub state: SystemState,

    /// Everything that was skipped on the way
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct Document {
    users: Vec<UserRecord>,
    products: Vec<ProductRecord>,
    sales: Vec<SaleRecordEntry>,
    carts: Vec<CartRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    users: Option<Value>,

    #[serde(default)]
    products: Option<Value>,

    #[serde(default)]
    sales: Option<Value>,

    #[serde(default)]
    carts: Option<Value>,
}

/// Encode the state as a YAML document.
///
/// The output depends only on the state, so equal states encode to identical text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(state: &SystemState) -> Result<String, CodecError> {
    let document = Document {
        users: state.users.iter().map(UserRecord::from).collect(),
        products: state.products.iter().map(ProductRecord::from).collect(),
        sales: state.sales.iter().map(SaleRecordEntry::from).collect(),
        carts: state.users.iter().filter_map(CartRecord::for_user).collect(),
    };

    serde_norway::to_string(&document).map_err(CodecError::Encode)
}

/// Decode a state document. Blank text decodes to an empty state.
///
/// # Errors
///
/// Returns [`CodecError::Parse`] if the text is not a state document at all.
/// Problems confined to single records are reported in [`Decoded::diagnostics`] instead.
pub fn decode(text: &str) -> Result<Decoded, CodecError> {
    if text.trim().is_empty() {
        return Ok(Decoded::default());
    }

    let raw = serde_norway::from_str::<Option<RawDocument>>(text)
        .map_err(CodecError::Parse)?
        .unwrap_or_default();

    let mut decoder = Decoder::default();

    let users = decoder.section(Section::Users, raw.users);
    let users = decoder.users(users);

    let products = decoder.section(Section::Products, raw.products);
    let products = decoder.products(products, &users);

    let sales = decoder.section(Section::Sales, raw.sales);
    let sales = decoder.sales(sales);

    let carts = decoder.section(Section::Carts, raw.carts);
    let carts = decoder.buffer_carts(carts);

    let mut state = SystemState {
        products,
        users,
        sales,
    };

    decoder.resolve_carts(&mut state, carts);

    debug!(
        users = state.users.len(),
        products = state.products.len(),
        sales = state.sales.len(),
        diagnostics = decoder.diagnostics.len(),
        "decoded state document"
    );

    Ok(Decoded {
        state,
        diagnostics: decoder.diagnostics,
    })
}

#[derive(Debug, Default)]
struct Decoder {
    diagnostics: Vec<Diagnostic>,
}

impl Decoder {
    fn report(&mut self, diagnostic: Diagnostic) {
        warn!(%diagnostic, "state document entry skipped");

        self.diagnostics.push(diagnostic);
    }

    fn malformed(&mut self, section: Section, index: usize, reason: impl ToString) {
        self.report(Diagnostic::MalformedRecord {
            section,
            index,
            reason: reason.to_string(),
        });
    }

    /// Entries of a section. A missing or null section is empty; anything
    /// other than a sequence is reported and treated as empty.
    fn section(&mut self, section: Section, value: Option<Value>) -> Vec<Value> {
        match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries,
            Some(_other) => {
                self.report(Diagnostic::MalformedSection { section });
                Vec::new()
            }
        }
    }

    fn records<T: for<'de> Deserialize<'de>>(
        &mut self,
        section: Section,
        values: Vec<Value>,
    ) -> Vec<(usize, T)> {
        values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_norway::from_value::<T>(value) {
                Ok(record) => Some((index, record)),
                Err(err) => {
                    self.malformed(section, index, err);
                    None
                }
            })
            .collect()
    }

    fn users(&mut self, values: Vec<Value>) -> Vec<User> {
        let mut users: Vec<User> = Vec::with_capacity(values.len());

        for (index, record) in self.records::<UserRecord>(Section::Users, values) {
            if record.id.is_blank() {
                self.malformed(Section::Users, index, "blank user id");
                continue;
            }

            if users.iter().any(|user| user.id == record.id) {
                self.malformed(Section::Users, index, format!("duplicate user id {}", record.id));
                continue;
            }

            if users.iter().any(|user| user.has_username(&record.username)) {
                self.malformed(
                    Section::Users,
                    index,
                    format!("duplicate username {:?}", record.username),
                );
                continue;
            }

            if record.balance < Decimal::ZERO {
                self.malformed(
                    Section::Users,
                    index,
                    format!("negative balance {}", record.balance),
                );
                continue;
            }

            users.push(match record.role {
                RoleRecord::Admin => User::admin(record.id, record.username, record.password),
                RoleRecord::Customer => User::customer(
                    record.id,
                    record.username,
                    record.password,
                    record.balance,
                ),
            });
        }

        users
    }

    fn products(&mut self, values: Vec<Value>, users: &[User]) -> Vec<Product> {
        let mut products: Vec<Product> = Vec::with_capacity(values.len());

        for (index, record) in self.records::<ProductRecord>(Section::Products, values) {
            if products.iter().any(|product| product.id == record.id) {
                self.malformed(
                    Section::Products,
                    index,
                    format!("duplicate product id {}", record.id),
                );
                continue;
            }

            let ratings = record.ratings;

            let product = Product::new(
                record.id,
                record.name,
                record.category,
                record.price,
                record.stock,
            )
            .map(|product| {
                product
                    .with_description(record.description)
                    .with_image_path(record.image_path)
            });

            let mut product = match product {
                Ok(product) => product,
                Err(err) => {
                    self.malformed(Section::Products, index, err);
                    continue;
                }
            };

            for (customer, score) in ratings {
                self.attach_rating(&mut product, users, customer, score);
            }

            products.push(product);
        }

        products
    }

    fn attach_rating(&mut self, product: &mut Product, users: &[User], customer: String, score: i64) {
        let customer_id = UserId::new(customer);

        let is_customer = users
            .iter()
            .any(|user| user.id == customer_id && !user.is_admin());

        if !is_customer {
            self.report(Diagnostic::UnresolvedRatingCustomer {
                product: product.id.clone(),
                customer: customer_id.into_string(),
            });
            return;
        }

        match Rating::new(score) {
            Ok(rating) => {
                product.rate(customer_id, rating);
            }
            Err(_err) => self.report(Diagnostic::InvalidRating {
                product: product.id.clone(),
                customer: customer_id.into_string(),
                score,
            }),
        }
    }

    fn sales(&mut self, values: Vec<Value>) -> Vec<SaleRecord> {
        let mut sales = Vec::with_capacity(values.len());

        for (index, record) in self.records::<SaleRecordEntry>(Section::Sales, values) {
            if record.amount_paid < Decimal::ZERO {
                self.malformed(
                    Section::Sales,
                    index,
                    format!("negative amount {}", record.amount_paid),
                );
                continue;
            }

            sales.push(SaleRecord::new(
                record.transaction_id,
                record.customer_username,
                record.product_name,
                record.quantity,
                record.amount_paid,
                record.date,
            ));
        }

        sales
    }

    fn buffer_carts(&mut self, values: Vec<Value>) -> Vec<CartRecord> {
        self.records::<CartRecord>(Section::Carts, values)
            .into_iter()
            .map(|(_index, record)| record)
            .collect()
    }

    fn resolve_carts(&mut self, state: &mut SystemState, carts: Vec<CartRecord>) {
        let SystemState {
            products, users, ..
        } = state;

        for cart in carts {
            let Some(account) = users
                .iter_mut()
                .find(|user| user.id == cart.user_id)
                .and_then(User::account_mut)
            else {
                self.report(Diagnostic::UnresolvedCartOwner { user: cart.user_id });
                continue;
            };

            for line in cart.items {
                if products.product(&line.product_id).is_none() {
                    self.report(Diagnostic::UnresolvedCartProduct {
                        user: cart.user_id.clone(),
                        product: line.product_id,
                    });
                    continue;
                }

                if let Err(reason) = account
                    .cart
                    .restore_line(line.product_id.clone(), line.quantity)
                {
                    self.report(Diagnostic::RejectedCartLine {
                        user: cart.user_id.clone(),
                        product: line.product_id,
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use testresult::TestResult;

    use crate::sales::TransactionId;

    use super::*;

    fn sample_state() -> TestResult<SystemState> {
        let mut mug = Product::new("p1", "Mug", "Kitchen", Decimal::new(899, 2), 5)?
            .with_description("Holds \"coffee\", {mostly}")
            .with_image_path("images/mug.png");
        let lamp = Product::new("p2", "Lamp", "Office", Decimal::new(2499, 2), 2)?;

        mug.rate(UserId::new("c1"), Rating::new(4)?);
        mug.rate(UserId::new("c2"), Rating::new(2)?);

        let products = vec![mug, lamp];

        let mut alice = User::customer("c1", "alice", "wonder", Decimal::new(10050, 2));
        let bob = User::customer("c2", "bob", "builder", Decimal::ZERO);

        if let Some(account) = alice.account_mut() {
            account.cart.add_product(&products, &ProductId::new("p2"), 2)?;
            account.cart.add_product(&products, &ProductId::new("p1"), 1)?;
        }

        Ok(SystemState {
            products,
            users: vec![User::admin("a1", "admin", "admin"), alice, bob],
            sales: vec![SaleRecord::new(
                TransactionId::new("T1"),
                "bob",
                "Mug",
                2,
                Decimal::new(1798, 2),
                date(2024, 1, 1).at(10, 0, 0, 0),
            )],
        })
    }

    #[test]
    fn round_trip_preserves_everything() -> TestResult {
        let state = sample_state()?;
        let decoded = decode(&encode(&state)?)?;

        assert_eq!(decoded.state, state);
        assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);

        Ok(())
    }

    #[test]
    fn encoding_is_deterministic() -> TestResult {
        let state = sample_state()?;

        assert_eq!(encode(&state)?, encode(&state.clone())?);

        Ok(())
    }

    #[test]
    fn encoded_sections_appear_in_order() -> TestResult {
        let text = encode(&sample_state()?)?;

        let positions: Vec<Option<usize>> = ["users:", "products:", "sales:", "carts:"]
            .iter()
            .map(|section| text.find(section))
            .collect();

        assert!(positions.iter().all(Option::is_some), "{text}");
        assert!(positions.windows(2).all(|pair| pair.first() < pair.get(1)));

        Ok(())
    }

    #[test]
    fn blank_text_is_an_empty_state() -> TestResult {
        assert_eq!(decode("")?, Decoded::default());
        assert_eq!(decode("  \n")?, Decoded::default());

        Ok(())
    }

    #[test]
    fn unreadable_document_is_an_error() {
        assert!(matches!(decode("users: [unterminated"), Err(CodecError::Parse(_))));
    }

    #[test]
    fn malformed_records_are_skipped_individually() -> TestResult {
        let text = "\
users:
- {role: CUSTOMER, id: c1, user: alice, pass: pw, bal: '5.00'}
- {role: WIZARD, id: c2, user: merlin, pass: pw, bal: '0'}
products:
- {id: p1, name: Mug, cat: Kitchen, price: 'cheap', stock: 1}
- {id: p2, name: Lamp, cat: Office, price: '3.50', stock: '4'}
- {id: p3, name: Vase, cat: Home, price: '-1.00', stock: 4}
sales:
- {tid: T1, user: alice, prod: Lamp, qty: 1, amt: '3.50', date: 'yesterday'}
- {tid: T2, user: alice, prod: Lamp, qty: 1, amt: '3.50', date: '2024-01-01T10:00:00'}
";

        let decoded = decode(text)?;

        assert_eq!(decoded.state.users.len(), 1);
        assert_eq!(decoded.state.products.len(), 1);
        assert_eq!(decoded.state.products.first().map(Product::stock), Some(4));
        assert_eq!(decoded.state.sales.len(), 1);
        assert_eq!(decoded.diagnostics.len(), 4);
        assert!(decoded.diagnostics.iter().all(|diagnostic| matches!(
            diagnostic,
            Diagnostic::MalformedRecord { .. }
        )));

        Ok(())
    }

    #[test]
    fn duplicate_ids_keep_the_first_record() -> TestResult {
        let text = "\
users:
- {role: CUSTOMER, id: c1, user: alice, pass: pw, bal: '5.00'}
- {role: CUSTOMER, id: c1, user: alicia, pass: pw, bal: '9.00'}
- {role: CUSTOMER, id: c2, user: ALICE, pass: pw, bal: '9.00'}
products:
- {id: p1, name: Mug, price: '1.00', stock: 1}
- {id: p1, name: Cup, price: '2.00', stock: 1}
";

        let decoded = decode(text)?;

        assert_eq!(decoded.state.users.len(), 1);
        assert_eq!(decoded.state.products.len(), 1);
        assert_eq!(decoded.state.products.first().map(|p| p.name.as_str()), Some("Mug"));
        assert_eq!(decoded.diagnostics.len(), 3);

        Ok(())
    }

    #[test]
    fn ratings_by_unknown_customers_are_dropped() -> TestResult {
        let text = "\
users:
- {role: CUSTOMER, id: c1, user: alice, pass: pw, bal: '0'}
- {role: ADMIN, id: a1, user: root, pass: pw}
products:
- id: p1
  name: Mug
  price: '1.00'
  stock: 1
  ratings: {c1: 5, ghost: 3, a1: 4, c1x: 2}
- id: p2
  name: Cup
  price: '1.00'
  stock: 1
  ratings: {c1: 9}
";

        let decoded = decode(text)?;
        let mug = decoded.state.products.first();
        let cup = decoded.state.products.get(1);

        assert_eq!(mug.map(Product::rating_count), Some(1));
        assert_eq!(
            mug.and_then(|p| p.rating_by(&UserId::new("c1"))),
            Some(Rating::new(5)?)
        );
        assert_eq!(cup.map(Product::rating_count), Some(0));

        let unresolved = decoded
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnresolvedRatingCustomer { .. }))
            .count();

        assert_eq!(unresolved, 3);
        assert!(decoded.diagnostics.contains(&Diagnostic::InvalidRating {
            product: ProductId::new("p2"),
            customer: "c1".to_string(),
            score: 9,
        }));

        Ok(())
    }

    #[test]
    fn carts_resolve_after_products_regardless_of_order() -> TestResult {
        let text = "\
carts:
- userId: c1
  items:
  - {pid: p9, qty: 1}
  - {pid: p1, qty: '2'}
  - {pid: p2, qty: 5}
  - {pid: p1, qty: 1}
- userId: ghost
  items: [{pid: p1, qty: 1}]
- userId: a1
  items: []
users:
- {role: CUSTOMER, id: c1, user: alice, pass: pw, bal: '0'}
- {role: ADMIN, id: a1, user: root, pass: pw}
products:
- {id: p1, name: Mug, price: '1.00', stock: 3}
- {id: p2, name: Cup, price: '1.00', stock: 4}
";

        let decoded = decode(text)?;
        let cart = decoded
            .state
            .users
            .first()
            .and_then(User::account)
            .map(|account| account.cart.clone())
            .unwrap_or_default();

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.quantity_of(&ProductId::new("p1")), 2);
        assert_eq!(cart.quantity_of(&ProductId::new("p2")), 5);

        assert!(decoded.diagnostics.contains(&Diagnostic::UnresolvedCartProduct {
            user: UserId::new("c1"),
            product: ProductId::new("p9"),
        }));
        assert!(decoded.diagnostics.contains(&Diagnostic::RejectedCartLine {
            user: UserId::new("c1"),
            product: ProductId::new("p1"),
            reason: CartError::DuplicateLine(ProductId::new("p1")),
        }));
        assert!(decoded.diagnostics.contains(&Diagnostic::UnresolvedCartOwner {
            user: UserId::new("ghost"),
        }));
        assert!(decoded.diagnostics.contains(&Diagnostic::UnresolvedCartOwner {
            user: UserId::new("a1"),
        }));

        Ok(())
    }

    #[test]
    fn carts_above_current_stock_survive_a_round_trip() -> TestResult {
        let mut state = sample_state()?;
        let lamp = ProductId::new("p2");

        if let Some(product) = state.products.iter_mut().find(|product| product.id == lamp) {
            product.set_stock(1);
        }

        let decoded = decode(&encode(&state)?)?;

        assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
        assert_eq!(decoded.state, state);

        let alice = decoded.state.users.get(1).and_then(User::account).ok_or("alice")?;

        assert_eq!(alice.cart.quantity_of(&lamp), 2);
        assert!(!alice.cart.validate_stock(&decoded.state.products));

        Ok(())
    }

    #[test]
    fn null_and_odd_sections_do_not_sink_the_document() -> TestResult {
        let text = "\
users:
products: {id: p1, name: Mug, price: '1.00', stock: 1}
sales: []
carts: []
";

        let decoded = decode(text)?;

        assert!(decoded.state.is_empty());
        assert_eq!(
            decoded.diagnostics,
            [Diagnostic::MalformedSection {
                section: Section::Products,
            }]
        );

        let text = "\
users: ~
products:
- {id: p1, name: Mug, price: '1.00', stock: 1}
";

        let decoded = decode(text)?;

        assert_eq!(decoded.state.products.len(), 1);
        assert!(decoded.diagnostics.is_empty());

        Ok(())
    }

    #[test]
    fn legacy_json_layout_is_readable() -> TestResult {
        let text = r#"{
  "products": [
    {"id":"p1", "name":"Mug", "cat":"Kitchen", "price":"8.99", "stock":5, "rating":0.0, "img":"mug.png"}
  ],
  "users": [
    {"role":"ADMIN", "id":"a1", "user":"admin", "pass":"admin", "bal":"0"},
    {"role":"CUSTOMER", "id":"c1", "user":"alice", "pass":"pw", "bal":"12.50"}
  ],
  "sales": [
    {"tid":"T18C", "user":"alice", "prod":"Mug", "qty":1, "amt":"8.99", "date":"2024-01-01T10:00:00"}
  ],
  "carts": [
    {"userId":"c1", "items":[{"pid":"p1", "qty":2}]}
  ]
}"#;

        let decoded = decode(text)?;

        assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
        assert_eq!(decoded.state.users.len(), 2);
        assert_eq!(
            decoded.state.users.get(1).map(User::balance),
            Some(Decimal::new(1250, 2))
        );
        assert_eq!(
            decoded.state.products.first().map(|p| p.image_path.as_str()),
            Some("mug.png")
        );
        assert_eq!(decoded.state.sales.len(), 1);
        assert_eq!(
            decoded
                .state
                .users
                .get(1)
                .and_then(User::account)
                .map(|account| account.cart.quantity_of(&ProductId::new("p1"))),
            Some(2)
        );

        Ok(())
    }
}
