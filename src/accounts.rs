//! Accounts

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    products::ProductId,
    users::{CustomerAccount, User, UserId},
};

/// Errors raised by the account directory.
#[derive(Debug, Error, PartialEq)]
pub enum AccountError {
    /// Another user already has this name, ignoring case.
    #[error("username {0:?} is already taken")]
    DuplicateUsername(String),

    /// Another user already has this id.
    #[error("user id {0} is already taken")]
    DuplicateId(UserId),
}

/// In-memory user repository with the current login session.
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    users: Vec<User>,
    current: Option<UserId>,
}

impl AccountDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory from already-validated users, nobody logged in.
    pub fn with_users(users: impl Into<Vec<User>>) -> Self {
        Self {
            users: users.into(),
            current: None,
        }
    }

    /// Register a new customer with a fresh id and zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::DuplicateUsername`] if the name is taken, ignoring case.
    pub fn register(&mut self, username: &str, password: &str) -> Result<UserId, AccountError> {
        self.ensure_username_free(username)?;

        let id = UserId::generate();

        self.users
            .push(User::customer(id.clone(), username, password, Decimal::ZERO));

        Ok(id)
    }

    /// Add an administrator.
    ///
    /// # Errors
    ///
    /// Returns an [`AccountError`] if the id or username is taken.
    pub fn add_admin(&mut self, admin: User) -> Result<(), AccountError> {
        self.ensure_username_free(&admin.username)?;

        if self.get(&admin.id).is_some() {
            return Err(AccountError::DuplicateId(admin.id));
        }

        self.users.push(admin);

        Ok(())
    }

    /// Log in on an exact, case-sensitive match of username and password.
    ///
    /// A failed attempt leaves the current session as it was.
    pub fn login(&mut self, username: &str, password: &str) -> bool {
        let found = self
            .users
            .iter()
            .find(|user| user.username == username && user.password == password);

        match found {
            Some(user) => {
                self.current = Some(user.id.clone());
                true
            }
            None => false,
        }
    }

    /// End the current session.
    pub fn logout(&mut self) {
        self.current = None;
    }

    /// The logged-in user
    pub fn current_user(&self) -> Option<&User> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    /// Id of the logged-in user
    pub fn current_id(&self) -> Option<&UserId> {
        self.current.as_ref()
    }

    /// Add funds to the logged-in customer's balance.
    ///
    /// Ignored when the amount is not positive, nobody is logged in, or the
    /// current user is not a customer. Returns whether the deposit applied.
    pub fn deposit_balance(&mut self, amount: Decimal) -> bool {
        let Some(id) = self.current.clone() else {
            return false;
        };

        self.customer_mut(&id)
            .is_some_and(|account| account.deposit(amount))
    }

    /// Look up a user by id.
    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|user| user.id == *id)
    }

    /// Look up a user by name, ignoring case.
    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|user| user.has_username(username))
    }

    /// The account of a customer, `None` for unknown users and administrators.
    pub fn customer_mut(&mut self, id: &UserId) -> Option<&mut CustomerAccount> {
        self.users
            .iter_mut()
            .find(|user| user.id == *id)
            .and_then(User::account_mut)
    }

    /// Drop a product from every customer's cart.
    pub fn purge_from_carts(&mut self, product_id: &ProductId) {
        for account in self.users.iter_mut().filter_map(User::account_mut) {
            account.cart.remove_product(product_id);
        }
    }

    /// All users in registration order
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether there are no users
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn ensure_username_free(&self, username: &str) -> Result<(), AccountError> {
        if self.find_by_username(username).is_some() {
            return Err(AccountError::DuplicateUsername(username.to_string()));
        }

        Ok(())
    }
}
