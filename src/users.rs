//! Users

use rust_decimal::Decimal;

use crate::{cart::Cart, ids::TypedId};

/// User Id
pub type UserId = TypedId<User>;

/// What a user is allowed to do, with the state only customers carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    /// Manages the catalog and reviews sales
    Admin,

    /// Shops, holds a balance and a cart
    Customer(CustomerAccount),
}

/// Balance and cart of a customer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomerAccount {
    balance: Decimal,

    /// The customer's cart
    pub cart: Cart,
}

impl CustomerAccount {
    /// Create an account with the given opening balance and an empty cart.
    ///
    /// Negative balances are clamped to zero.
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance: balance.max(Decimal::ZERO),
            cart: Cart::new(),
        }
    }

    /// Current balance
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Add funds. Returns whether the deposit applied.
    ///
    /// Non-positive amounts, and amounts that would overflow the balance, are ignored.
    pub fn deposit(&mut self, amount: Decimal) -> bool {
        if amount <= Decimal::ZERO {
            return false;
        }

        let Some(balance) = self.balance.checked_add(amount) else {
            return false;
        };

        self.balance = balance;

        true
    }

    /// Take `amount` from the balance, refusing (and changing nothing) if the balance would go negative.
    pub(crate) fn debit(&mut self, amount: Decimal) -> bool {
        if amount > self.balance {
            return false;
        }

        self.balance -= amount;

        true
    }
}

/// User
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Stable unique id
    pub id: UserId,

    /// Login name, unique ignoring case
    pub username: String,

    /// Password, stored and compared as given
    pub password: String,

    /// Role and role-specific state
    pub role: Role,
}

impl User {
    /// Create an administrator.
    pub fn admin(
        id: impl Into<UserId>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            password: password.into(),
            role: Role::Admin,
        }
    }

    /// Create a customer with an empty cart.
    pub fn customer(
        id: impl Into<UserId>,
        username: impl Into<String>,
        password: impl Into<String>,
        balance: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            password: password.into(),
            role: Role::Customer(CustomerAccount::new(balance)),
        }
    }

    /// Whether this user is an administrator
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// The customer account, if this user is a customer.
    pub fn account(&self) -> Option<&CustomerAccount> {
        match &self.role {
            Role::Customer(account) => Some(account),
            Role::Admin => None,
        }
    }

    /// Mutable customer account, if this user is a customer.
    pub fn account_mut(&mut self) -> Option<&mut CustomerAccount> {
        match &mut self.role {
            Role::Customer(account) => Some(account),
            Role::Admin => None,
        }
    }

    /// Balance for customers, zero for administrators.
    pub fn balance(&self) -> Decimal {
        self.account()
            .map_or(Decimal::ZERO, CustomerAccount::balance)
    }

    /// Whether `username` names this user, ignoring case.
    pub fn has_username(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.to_lowercase()
    }
}
