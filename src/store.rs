//! Store
//!
//! Owns the catalog, the account directory and the sales ledger, and writes
//! the whole state back to storage after every successful mutation.

use jiff::Zoned;
use rust_decimal::Decimal;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{Span, debug, error, info, warn};

use crate::{
    accounts::{AccountDirectory, AccountError},
    cart::{Cart, CartError, line_amount},
    catalog::Catalog,
    codec::{self, CodecError, Decoded, Diagnostic},
    config::{AdminSeed, StoreConfig},
    products::{Product, ProductId, Rating, RatingError},
    receipt::CheckoutReceipt,
    sales::{SaleRecord, SalesLedger, TransactionId},
    state::SystemState,
    storage::{FileStorage, StateStorage, StorageError},
    users::{CustomerAccount, User, UserId},
};

/// Reasons a checkout is refused. Nothing has changed when one is returned.
#[derive(Debug, Error, PartialEq)]
pub enum CheckoutError {
    /// Nobody is logged in.
    #[error("nobody is logged in")]
    NotLoggedIn,

    /// The current user is not a customer.
    #[error("only customers can check out")]
    NotACustomer,

    /// There is nothing to buy.
    #[error("the cart is empty")]
    EmptyCart,

    /// The cart costs more than the customer holds.
    #[error("balance {balance} does not cover total {total}")]
    InsufficientBalance {
        /// Customer balance
        balance: Decimal,
        /// Cart total
        total: Decimal,
    },

    /// A cart line no longer fits current stock.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs a logged-in user.
    #[error("nobody is logged in")]
    NotLoggedIn,

    /// The operation is only open to customers.
    #[error("the current user is not a customer")]
    NotACustomer,

    /// No product has this id.
    #[error("product {0} not found")]
    UnknownProduct(ProductId),

    /// Checkout was refused.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// A cart change was refused.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// An account change was refused.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// A rating was out of range.
    #[error(transparent)]
    Rating(#[from] RatingError),

    /// The state could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The state could not be written. The in-memory change stands.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The shop's state, persisted through `S`.
#[derive(Debug)]
pub struct Store<S = FileStorage> {
    storage: S,
    catalog: Catalog,
    accounts: AccountDirectory,
    ledger: SalesLedger,
    diagnostics: Vec<Diagnostic>,
}

impl Store<FileStorage> {
    /// Open the state file named by `config`, seeding its administrator if needed.
    ///
    /// An unreadable state file is moved aside and the store starts empty.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if an administrator had to be seeded and could
    /// not be added or saved.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut store = Self::with_storage(FileStorage::new(&config.data_path));

        if let Some(seed) = &config.admin {
            store.seed_admin(seed)?;
        }

        Ok(store)
    }
}

impl<S: StateStorage> Store<S> {
    /// Create a store over `storage` and load whatever it holds.
    pub fn with_storage(storage: S) -> Self {
        let mut store = Self {
            storage,
            catalog: Catalog::new(),
            accounts: AccountDirectory::new(),
            ledger: SalesLedger::new(),
            diagnostics: Vec::new(),
        };

        store.load();

        store
    }

    /// Replace the in-memory state with the stored one and log everyone out.
    ///
    /// Missing state loads as empty. Unreadable state is logged, moved aside
    /// so a later save cannot overwrite it, and replaced by an empty state.
    #[tracing::instrument(name = "store.load", skip(self))]
    pub fn load(&mut self) {
        let decoded = match self.storage.load() {
            Ok(None) => {
                info!("no saved state, starting empty");

                Decoded::default()
            }
            Ok(Some(text)) => match codec::decode(&text) {
                Ok(decoded) => decoded,
                Err(err) => {
                    error!(%err, "saved state is unreadable, starting empty");

                    self.quarantine();

                    Decoded::default()
                }
            },
            Err(err) => {
                error!(%err, "failed to read saved state, starting empty");

                self.quarantine();

                Decoded::default()
            }
        };

        let Decoded { state, diagnostics } = decoded;
        let SystemState {
            products,
            users,
            sales,
        } = state;

        self.catalog = Catalog::with_products(products);
        self.accounts = AccountDirectory::with_users(users);
        self.ledger = SalesLedger::with_records(sales);
        self.diagnostics = diagnostics;

        info!(
            products = self.catalog.len(),
            users = self.accounts.len(),
            sales = self.ledger.len(),
            diagnostics = self.diagnostics.len(),
            "state loaded"
        );
    }

    /// Encode the current state and write it to storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] or [`StoreError::Storage`]. The in-memory
    /// state is left as it is.
    #[tracing::instrument(name = "store.save", skip(self), err)]
    pub fn save(&mut self) -> Result<(), StoreError> {
        let text = codec::encode(&self.snapshot())?;

        self.storage.save(&text)?;

        info!(bytes = text.len(), "state saved");

        Ok(())
    }

    /// Add an administrator if the state has none. Returns whether one was added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Account`] if the name is taken by a customer, or a
    /// persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.seed_admin", skip(self, seed), fields(username = %seed.username), err)]
    pub fn seed_admin(&mut self, seed: &AdminSeed) -> Result<bool, StoreError> {
        if self.accounts.users().iter().any(User::is_admin) {
            return Ok(false);
        }

        let admin = User::admin(UserId::generate(), &seed.username, &seed.password);
        let admin_id = admin.id.clone();

        self.accounts.add_admin(admin)?;
        self.save()?;

        info!(user_id = %admin_id, "seeded administrator");

        Ok(true)
    }

    /// Add a product. Returns `false` if its id is empty or already used.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.add_product", skip(self, product), fields(product_id = %product.id), err)]
    pub fn add_product(&mut self, product: Product) -> Result<bool, StoreError> {
        if !self.catalog.add(product) {
            return Ok(false);
        }

        self.save()?;

        Ok(true)
    }

    /// Replace a product's editable fields. Returns `false` if its id is unknown.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.update_product", skip(self, product), fields(product_id = %product.id), err)]
    pub fn update_product(&mut self, product: Product) -> Result<bool, StoreError> {
        if !self.catalog.update(product) {
            return Ok(false);
        }

        self.save()?;

        Ok(true)
    }

    /// Remove a product from the catalog and from every cart. Returns `false` if its id is unknown.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.remove_product", skip(self), err)]
    pub fn remove_product(&mut self, product_id: &ProductId) -> Result<bool, StoreError> {
        if !self.catalog.remove(product_id) {
            return Ok(false);
        }

        self.accounts.purge_from_carts(product_id);
        self.save()?;

        Ok(true)
    }

    /// Record the current customer's score for a product, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoggedIn`], [`StoreError::NotACustomer`],
    /// [`StoreError::Rating`] for a score outside 1..=5, [`StoreError::UnknownProduct`],
    /// or a persistence error.
    #[tracing::instrument(name = "store.rate_product", skip(self), err)]
    pub fn rate_product(&mut self, product_id: &ProductId, score: i64) -> Result<(), StoreError> {
        let user = self.accounts.current_user().ok_or(StoreError::NotLoggedIn)?;

        if user.is_admin() {
            return Err(StoreError::NotACustomer);
        }

        let customer = user.id.clone();
        let rating = Rating::new(score)?;

        if !self.catalog.rate(product_id, customer, rating) {
            return Err(StoreError::UnknownProduct(product_id.clone()));
        }

        self.save()
    }

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Account`] if the name is taken, ignoring case, or a
    /// persistence error.
    #[tracing::instrument(name = "store.register", skip(self, password), err)]
    pub fn register(&mut self, username: &str, password: &str) -> Result<UserId, StoreError> {
        let user_id = self.accounts.register(username, password)?;

        self.save()?;

        info!(%user_id, "registered customer");

        Ok(user_id)
    }

    /// Log in on an exact match of username and password.
    #[tracing::instrument(name = "store.login", skip(self, password))]
    pub fn login(&mut self, username: &str, password: &str) -> bool {
        let logged_in = self.accounts.login(username, password);

        if logged_in {
            info!("logged in");
        } else {
            debug!("login refused");
        }

        logged_in
    }

    /// End the current session.
    pub fn logout(&mut self) {
        self.accounts.logout();
    }

    /// Add funds to the current customer. Returns whether the deposit applied.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.deposit_balance", skip(self), err)]
    pub fn deposit_balance(&mut self, amount: Decimal) -> Result<bool, StoreError> {
        if !self.accounts.deposit_balance(amount) {
            return Ok(false);
        }

        self.save()?;

        Ok(true)
    }

    /// Add units of a product to the current customer's cart.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoggedIn`], [`StoreError::NotACustomer`],
    /// [`StoreError::Cart`] if the cart refuses the line, or a persistence error.
    #[tracing::instrument(name = "store.add_to_cart", skip(self), err)]
    pub fn add_to_cart(&mut self, product_id: &ProductId, quantity: i64) -> Result<(), StoreError> {
        let account = current_customer(&mut self.accounts)?;

        account.cart.add_product(&self.catalog, product_id, quantity)?;

        self.save()
    }

    /// Set the quantity of a line in the current customer's cart; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoggedIn`], [`StoreError::NotACustomer`],
    /// [`StoreError::Cart`] if the quantity exceeds stock, or a persistence error.
    #[tracing::instrument(name = "store.update_cart_quantity", skip(self), err)]
    pub fn update_cart_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<(), StoreError> {
        let account = current_customer(&mut self.accounts)?;

        account
            .cart
            .update_quantity(&self.catalog, product_id, quantity)?;

        self.save()
    }

    /// Drop a product from the current customer's cart. Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoggedIn`], [`StoreError::NotACustomer`], or a
    /// persistence error.
    #[tracing::instrument(name = "store.remove_from_cart", skip(self), err)]
    pub fn remove_from_cart(&mut self, product_id: &ProductId) -> Result<bool, StoreError> {
        let account = current_customer(&mut self.accounts)?;
        let before = account.cart.len();

        account.cart.remove_product(product_id);

        if account.cart.len() == before {
            return Ok(false);
        }

        self.save()?;

        Ok(true)
    }

    /// Buy everything in the current customer's cart.
    ///
    /// Takes stock, debits the balance and records one sale per line under a
    /// single transaction id, then saves once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Checkout`] if the checkout is refused, in which
    /// case nothing has changed. Returns a persistence error if the completed
    /// checkout could not be saved; the purchase still stands in memory.
    #[tracing::instrument(
        name = "store.checkout",
        skip(self),
        fields(
            user_id = tracing::field::Empty,
            transaction_id = tracing::field::Empty
        ),
        err
    )]
    pub fn checkout(&mut self) -> Result<CheckoutReceipt, StoreError> {
        let user = self
            .accounts
            .current_user()
            .ok_or(CheckoutError::NotLoggedIn)?;

        let account = user.account().ok_or(CheckoutError::NotACustomer)?;

        if account.cart.is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }

        let total = account
            .cart
            .calculate_total(&self.catalog)
            .map_err(CheckoutError::from)?;
        let balance = account.balance();

        if balance < total {
            return Err(CheckoutError::InsufficientBalance { balance, total }.into());
        }

        let transaction_id = TransactionId::issue();
        let timestamp = Zoned::now().datetime();

        let mut records: SmallVec<[SaleRecord; 8]> = SmallVec::with_capacity(account.cart.len());

        for line in account.cart.items() {
            let product = self
                .catalog
                .get(line.product_id())
                .ok_or_else(|| CartError::NullProduct(line.product_id().clone()))
                .map_err(CheckoutError::from)?;

            let amount = line_amount(product, line.quantity())
                .ok_or(CheckoutError::Cart(CartError::TotalOverflow))?;

            records.push(SaleRecord::new(
                transaction_id.clone(),
                user.username.as_str(),
                product.name.as_str(),
                line.quantity(),
                amount,
                timestamp,
            ));
        }

        let user_id = user.id.clone();

        let span = Span::current();

        span.record("user_id", tracing::field::display(&user_id));
        span.record("transaction_id", tracing::field::display(&transaction_id));

        let account = self
            .accounts
            .customer_mut(&user_id)
            .ok_or(CheckoutError::NotACustomer)?;

        account
            .cart
            .checkout(&mut self.catalog)
            .map_err(CheckoutError::from)?;

        let debited = account.debit(total);

        debug_assert!(debited, "balance was checked before the cart was consumed");

        let remaining_balance = account.balance();

        for record in &records {
            self.ledger.add_sale(record.clone());
        }

        info!(%total, lines = records.len(), "checkout complete");

        self.save()?;

        Ok(CheckoutReceipt::new(
            transaction_id,
            records,
            total,
            remaining_balance,
        ))
    }

    /// Append a sale record.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    pub fn add_sale(&mut self, record: SaleRecord) -> Result<(), StoreError> {
        self.ledger.add_sale(record);

        self.save()
    }

    /// Delete every record of a transaction. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the state could not be saved.
    #[tracing::instrument(name = "store.delete_sale_record", skip(self), err)]
    pub fn delete_sale_record(&mut self, transaction_id: &TransactionId) -> Result<usize, StoreError> {
        let removed = self.ledger.delete_record(transaction_id);

        if removed > 0 {
            self.save()?;
        }

        Ok(removed)
    }

    /// Products
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Users and the current session
    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    /// Sale records
    pub fn ledger(&self) -> &SalesLedger {
        &self.ledger
    }

    /// Problems found in the stored state at the last load
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Cart of the current customer
    pub fn current_cart(&self) -> Option<&Cart> {
        self.accounts
            .current_user()
            .and_then(User::account)
            .map(|account| &account.cart)
    }

    /// Total of the current customer's cart at current prices.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotLoggedIn`], [`StoreError::NotACustomer`], or
    /// [`StoreError::Cart`] if the total overflows.
    pub fn current_cart_total(&self) -> Result<Decimal, StoreError> {
        let user = self
            .accounts
            .current_user()
            .ok_or(StoreError::NotLoggedIn)?;

        let account = user.account().ok_or(StoreError::NotACustomer)?;

        Ok(account.cart.calculate_total(&self.catalog)?)
    }

    /// A copy of everything that is persisted
    pub fn snapshot(&self) -> SystemState {
        SystemState {
            products: self.catalog.all(),
            users: self.accounts.users().to_vec(),
            sales: self.ledger.records().to_vec(),
        }
    }

    fn quarantine(&mut self) {
        match self.storage.quarantine() {
            Ok(Some(path)) => warn!(path = %path.display(), "moved unreadable state aside"),
            Ok(None) => {}
            Err(err) => error!(%err, "failed to move unreadable state aside"),
        }
    }
}

fn current_customer(accounts: &mut AccountDirectory) -> Result<&mut CustomerAccount, StoreError> {
    let user_id = accounts.current_id().cloned().ok_or(StoreError::NotLoggedIn)?;

    accounts
        .customer_mut(&user_id)
        .ok_or(StoreError::NotACustomer)
}
