//! Products

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{ids::TypedId, users::UserId};

/// Product Id
pub type ProductId = TypedId<Product>;

/// Errors raised when building or editing a product.
#[derive(Debug, Error, PartialEq)]
pub enum ProductError {
    /// Products must have a non-blank id.
    #[error("product id must not be empty")]
    EmptyId,

    /// Prices cannot be negative.
    #[error("price {0} is negative")]
    NegativePrice(Decimal),
}

/// Errors raised when building a rating.
#[derive(Debug, Error, PartialEq)]
pub enum RatingError {
    /// Scores run from 1 to 5 inclusive.
    #[error("rating {0} is outside 1..=5")]
    OutOfRange(i64),
}

/// A customer's score for a product, between 1 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    /// Lowest allowed score
    pub const MIN: u8 = 1;

    /// Highest allowed score
    pub const MAX: u8 = 5;

    /// Create a rating, rejecting scores outside `1..=5`.
    ///
    /// # Errors
    ///
    /// Returns [`RatingError::OutOfRange`] for any other score.
    pub fn new(score: i64) -> Result<Self, RatingError> {
        u8::try_from(score)
            .ok()
            .filter(|score| (Self::MIN..=Self::MAX).contains(score))
            .map(Self)
            .ok_or(RatingError::OutOfRange(score))
    }

    /// The score
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Product
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// Product id
    pub id: ProductId,

    /// Product name
    pub name: String,

    /// Product category
    pub category: String,

    /// Free-text description
    pub description: String,

    /// Path of the product image, managed by the host application
    pub image_path: String,

    price: Decimal,
    stock: u32,
    ratings: BTreeMap<UserId, Rating>,
}

impl Product {
    /// Create a product with no description, image or ratings.
    ///
    /// # Errors
    ///
    /// Returns a [`ProductError`] if the id is blank or the price is negative.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Decimal,
        stock: u32,
    ) -> Result<Self, ProductError> {
        let id = id.into();

        if id.is_blank() {
            return Err(ProductError::EmptyId);
        }

        if price.is_sign_negative() && !price.is_zero() {
            return Err(ProductError::NegativePrice(price));
        }

        Ok(Self {
            id,
            name: name.into(),
            category: category.into(),
            description: String::new(),
            image_path: String::new(),
            price,
            stock,
            ratings: BTreeMap::new(),
        })
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the image path.
    #[must_use]
    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = image_path.into();
        self
    }

    /// Unit price
    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Change the unit price.
    ///
    /// # Errors
    ///
    /// Returns [`ProductError::NegativePrice`] and leaves the price unchanged if `price` is negative.
    pub fn set_price(&mut self, price: Decimal) -> Result<(), ProductError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(ProductError::NegativePrice(price));
        }

        self.price = price;

        Ok(())
    }

    /// Units in stock
    pub fn stock(&self) -> u32 {
        self.stock
    }

    /// Overwrite the units in stock.
    pub fn set_stock(&mut self, stock: u32) {
        self.stock = stock;
    }

    /// Remove `quantity` units from stock, returning `false` (and changing nothing) if there are not enough.
    pub(crate) fn take_stock(&mut self, quantity: u32) -> bool {
        match self.stock.checked_sub(quantity) {
            Some(remaining) => {
                self.stock = remaining;
                true
            }
            None => false,
        }
    }

    /// Record `customer`'s rating, replacing any earlier rating from them.
    ///
    /// Returns the rating that was replaced.
    pub fn rate(&mut self, customer: UserId, rating: Rating) -> Option<Rating> {
        self.ratings.insert(customer, rating)
    }

    /// The rating left by `customer`, if any.
    pub fn rating_by(&self, customer: &UserId) -> Option<Rating> {
        self.ratings.get(customer).copied()
    }

    /// All ratings keyed by customer
    pub fn ratings(&self) -> &BTreeMap<UserId, Rating> {
        &self.ratings
    }

    /// Number of customers who rated the product
    pub fn rating_count(&self) -> usize {
        self.ratings.len()
    }

    /// Mean of all ratings, or `0.0` if nobody has rated the product.
    pub fn average_rating(&self) -> f64 {
        let Ok(count) = u32::try_from(self.ratings.len()) else {
            return 0.0;
        };

        if count == 0 {
            return 0.0;
        }

        let sum: u32 = self
            .ratings
            .values()
            .map(|rating| u32::from(rating.value()))
            .sum();

        f64::from(sum) / f64::from(count)
    }

    /// Replace the admin-editable fields with those of `other`, keeping id and ratings.
    pub(crate) fn apply_edit(&mut self, other: Product) {
        self.name = other.name;
        self.category = other.category;
        self.description = other.description;
        self.image_path = other.image_path;
        self.price = other.price;
        self.stock = other.stock;
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn product() -> Result<Product, ProductError> {
        Product::new("p1", "Kettle", "Kitchen", Decimal::new(2499, 2), 4)
    }

    #[test]
    fn new_rejects_blank_id() {
        let result = Product::new(" ", "Kettle", "Kitchen", Decimal::ONE, 1);

        assert_eq!(result, Err(ProductError::EmptyId));
    }

    #[test]
    fn new_rejects_negative_price() {
        let result = Product::new("p1", "Kettle", "Kitchen", Decimal::new(-1, 2), 1);

        assert_eq!(result, Err(ProductError::NegativePrice(Decimal::new(-1, 2))));
    }

    #[test]
    fn free_products_are_allowed() -> TestResult {
        let product = Product::new("p1", "Sticker", "Misc", Decimal::ZERO, 1)?;

        assert_eq!(product.price(), Decimal::ZERO);

        Ok(())
    }

    #[test]
    fn set_price_keeps_old_price_on_error() -> TestResult {
        let mut product = product()?;

        assert!(product.set_price(Decimal::NEGATIVE_ONE).is_err());
        assert_eq!(product.price(), Decimal::new(2499, 2));

        Ok(())
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert!(Rating::new(-3).is_err());
        assert_eq!(Rating::new(1).map(Rating::value), Ok(1));
        assert_eq!(Rating::new(5).map(Rating::value), Ok(5));
    }

    #[test]
    fn average_of_no_ratings_is_zero() -> TestResult {
        let product = product()?;

        assert!(product.average_rating().abs() < f64::EPSILON);

        Ok(())
    }

    #[test]
    fn average_tracks_the_mean_of_all_ratings() -> TestResult {
        let mut product = product()?;

        product.rate(UserId::new("a"), Rating::new(4)?);
        product.rate(UserId::new("b"), Rating::new(2)?);

        assert!((product.average_rating() - 3.0).abs() < 1e-9);

        product.rate(UserId::new("c"), Rating::new(5)?);

        assert!((product.average_rating() - 3.666_666_7).abs() < 1e-4);

        Ok(())
    }

    #[test]
    fn re_rating_replaces_the_previous_score() -> TestResult {
        let mut product = product()?;
        let customer = UserId::new("a");

        assert_eq!(product.rate(customer.clone(), Rating::new(1)?), None);
        assert_eq!(
            product.rate(customer.clone(), Rating::new(5)?),
            Some(Rating::new(1)?)
        );

        assert_eq!(product.rating_count(), 1);
        assert_eq!(product.rating_by(&customer), Some(Rating::new(5)?));
        assert!((product.average_rating() - 5.0).abs() < 1e-9);

        Ok(())
    }

    #[test]
    fn take_stock_refuses_to_go_negative() -> TestResult {
        let mut product = product()?;

        assert!(!product.take_stock(5));
        assert_eq!(product.stock(), 4);
        assert!(product.take_stock(4));
        assert_eq!(product.stock(), 0);

        Ok(())
    }

    #[test]
    fn apply_edit_keeps_ratings() -> TestResult {
        let mut product = product()?;

        product.rate(UserId::new("a"), Rating::new(3)?);

        let edit = Product::new("p1", "Steel Kettle", "Kitchen", Decimal::new(2999, 2), 9)?;

        product.apply_edit(edit);

        assert_eq!(product.name, "Steel Kettle");
        assert_eq!(product.price(), Decimal::new(2999, 2));
        assert_eq!(product.stock(), 9);
        assert_eq!(product.rating_count(), 1);

        Ok(())
    }
}
