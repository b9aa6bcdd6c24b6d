//! Cart

use rust_decimal::Decimal;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    catalog::Catalog,
    products::{Product, ProductId},
};

/// Errors raised by cart mutations and checkout.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CartError {
    /// Quantities added to a cart must be positive.
    #[error("quantity must be greater than zero, got {0}")]
    InvalidQuantity(i64),

    /// The product does not exist (any more).
    #[error("product {0} does not exist")]
    NullProduct(ProductId),

    /// Not enough units in stock for the requested quantity.
    #[error("only {available} of product {product} in stock, {requested} requested")]
    InsufficientStock {
        /// Product that ran short
        product: ProductId,
        /// Quantity the line would have needed
        requested: u64,
        /// Units currently in stock
        available: u32,
    },

    /// A restored line's quantity does not fit a cart line.
    #[error("quantity {0} is too large for a cart line")]
    QuantityTooLarge(i64),

    /// A restored cart names the same product twice.
    #[error("product {0} appears on more than one line")]
    DuplicateLine(ProductId),

    /// The cart total does not fit in a decimal.
    #[error("cart total overflows")]
    TotalOverflow,
}

/// Read access to current product state.
///
/// Carts only hold product ids, so every stock or price check goes through a lookup.
pub trait ProductLookup {
    /// Find a product by id.
    fn product(&self, id: &ProductId) -> Option<&Product>;
}

impl ProductLookup for [Product] {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.iter().find(|product| product.id == *id)
    }
}

impl ProductLookup for Vec<Product> {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.as_slice().product(id)
    }
}

/// A line in a cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    product_id: ProductId,
    quantity: u32,
}

impl CartItem {
    /// The product on this line
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Units on this line, always at least one
    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Cart
///
/// Lines are kept in the order they were first added and are unique by product.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cart {
    items: SmallVec<[CartItem; 8]>,
}

impl Cart {
    /// Create an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `quantity` is not positive,
    /// [`CartError::NullProduct`] if the product cannot be found, and
    /// [`CartError::InsufficientStock`] if the line's combined quantity would
    /// exceed current stock. The cart is unchanged on error.
    pub fn add_product<L: ProductLookup + ?Sized>(
        &mut self,
        lookup: &L,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let product = lookup
            .product(product_id)
            .ok_or_else(|| CartError::NullProduct(product_id.clone()))?;

        let combined = u64::from(self.quantity_of(product_id)) + quantity.unsigned_abs();
        let quantity = fit_stock(product, combined)?;

        match self.line_mut(product_id) {
            Some(line) => line.quantity = quantity,
            None => self.items.push(CartItem {
                product_id: product_id.clone(),
                quantity,
            }),
        }

        Ok(())
    }

    /// Set the quantity of an existing line. Zero or less removes the line.
    ///
    /// Products not in the cart are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InsufficientStock`] if `quantity` exceeds current
    /// stock, or [`CartError::NullProduct`] if the product no longer exists.
    /// The cart is unchanged on error.
    pub fn update_quantity<L: ProductLookup + ?Sized>(
        &mut self,
        lookup: &L,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_product(product_id);
            return Ok(());
        }

        if self.line_mut(product_id).is_none() {
            return Ok(());
        }

        let product = lookup
            .product(product_id)
            .ok_or_else(|| CartError::NullProduct(product_id.clone()))?;

        let quantity = fit_stock(product, quantity.unsigned_abs())?;

        if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }

        Ok(())
    }

    /// Remove the line for a product. Absent products are ignored.
    pub fn remove_product(&mut self, product_id: &ProductId) {
        self.items.retain(|line| line.product_id != *product_id);
    }

    /// Remove a line. Absent lines are ignored.
    pub fn remove(&mut self, item: &CartItem) {
        self.items.retain(|line| line != item);
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of price × quantity over all lines, at current prices.
    ///
    /// Lines whose product no longer exists contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::TotalOverflow`] if the total cannot be represented.
    pub fn calculate_total<L: ProductLookup + ?Sized>(
        &self,
        lookup: &L,
    ) -> Result<Decimal, CartError> {
        self.items.iter().try_fold(Decimal::ZERO, |total, line| {
            let Some(product) = lookup.product(&line.product_id) else {
                return Ok(total);
            };

            line_amount(product, line.quantity)
                .and_then(|amount| total.checked_add(amount))
                .ok_or(CartError::TotalOverflow)
        })
    }

    /// Put back a line exactly as it was saved.
    ///
    /// Stock is not consulted: it may have dropped since the line was added, and
    /// checkout revalidates every line anyway.
    pub(crate) fn restore_line(
        &mut self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CartError> {
        if quantity <= 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let quantity =
            u32::try_from(quantity).map_err(|_err| CartError::QuantityTooLarge(quantity))?;

        if self.line_mut(&product_id).is_some() {
            return Err(CartError::DuplicateLine(product_id));
        }

        self.items.push(CartItem {
            product_id,
            quantity,
        });

        Ok(())
    }

    /// Whether every line still fits within current stock.
    pub fn validate_stock<L: ProductLookup + ?Sized>(&self, lookup: &L) -> bool {
        self.check_stock(lookup).is_ok()
    }

    /// Check every line against current stock, reporting the first that does not fit.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NullProduct`] or [`CartError::InsufficientStock`] for the first failing line.
    pub fn check_stock<L: ProductLookup + ?Sized>(&self, lookup: &L) -> Result<(), CartError> {
        self.items.iter().try_for_each(|line| {
            let product = lookup
                .product(&line.product_id)
                .ok_or_else(|| CartError::NullProduct(line.product_id.clone()))?;

            fit_stock(product, u64::from(line.quantity)).map(|_quantity| ())
        })
    }

    /// Take every line out of stock and empty the cart.
    ///
    /// All lines are revalidated first; nothing changes unless all of them fit.
    ///
    /// # Errors
    ///
    /// Returns the first failing line's [`CartError`], leaving the catalog and cart untouched.
    pub fn checkout(&mut self, catalog: &mut Catalog) -> Result<(), CartError> {
        self.check_stock(&*catalog)?;

        for line in &self.items {
            if let Some(product) = catalog.get_mut(&line.product_id) {
                let taken = product.take_stock(line.quantity);

                debug_assert!(taken, "stock was validated before checkout");
            }
        }

        self.items.clear();

        Ok(())
    }

    /// Units of a product in the cart, zero if absent.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .find(|line| line.product_id == *product_id)
            .map_or(0, CartItem::quantity)
    }

    /// Lines in the cart
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn line_mut(&mut self, product_id: &ProductId) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|line| line.product_id == *product_id)
    }
}

/// Price × quantity of one line, `None` on overflow.
pub(crate) fn line_amount(product: &Product, quantity: u32) -> Option<Decimal> {
    product.price().checked_mul(Decimal::from(quantity))
}

fn fit_stock(product: &Product, requested: u64) -> Result<u32, CartError> {
    let insufficient = || CartError::InsufficientStock {
        product: product.id.clone(),
        requested,
        available: product.stock(),
    };

    if requested > u64::from(product.stock()) {
        return Err(insufficient());
    }

    u32::try_from(requested).map_err(|_err| insufficient())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn products() -> Result<Vec<Product>, crate::products::ProductError> {
        Ok(vec![
            Product::new("p1", "Mug", "Kitchen", Decimal::new(1000, 2), 2)?,
            Product::new("p2", "Plate", "Kitchen", Decimal::new(333, 2), 10)?,
        ])
    }

    fn catalog() -> Result<Catalog, crate::products::ProductError> {
        let mut catalog = Catalog::new();

        for product in products()? {
            catalog.add(product);
        }

        Ok(catalog)
    }

    #[test]
    fn add_rejects_non_positive_quantity() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();

        assert_eq!(
            cart.add_product(&products, &ProductId::new("p1"), 0),
            Err(CartError::InvalidQuantity(0))
        );
        assert_eq!(
            cart.add_product(&products, &ProductId::new("p1"), -2),
            Err(CartError::InvalidQuantity(-2))
        );
        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn add_rejects_unknown_product() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();

        assert_eq!(
            cart.add_product(&products, &ProductId::new("nope"), 1),
            Err(CartError::NullProduct(ProductId::new("nope")))
        );

        Ok(())
    }

    #[test]
    fn add_merges_lines_and_checks_combined_quantity() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.add_product(&products, &mug, 2)?;

        let result = cart.add_product(&products, &mug, 1);

        assert_eq!(
            result,
            Err(CartError::InsufficientStock {
                product: mug.clone(),
                requested: 3,
                available: 2,
            })
        );
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.quantity_of(&mug), 2);

        Ok(())
    }

    #[test]
    fn add_keeps_insertion_order() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();

        cart.add_product(&products, &ProductId::new("p2"), 1)?;
        cart.add_product(&products, &ProductId::new("p1"), 1)?;
        cart.add_product(&products, &ProductId::new("p2"), 1)?;

        let ids: Vec<&str> = cart.items().iter().map(|line| line.product_id().as_str()).collect();

        assert_eq!(ids, ["p2", "p1"]);
        assert_eq!(cart.quantity_of(&ProductId::new("p2")), 2);

        Ok(())
    }

    #[test]
    fn update_quantity_validates_against_stock() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();
        let plate = ProductId::new("p2");

        cart.add_product(&products, &plate, 1)?;
        cart.update_quantity(&products, &plate, 10)?;

        assert_eq!(cart.quantity_of(&plate), 10);
        assert!(matches!(
            cart.update_quantity(&products, &plate, 11),
            Err(CartError::InsufficientStock { requested: 11, .. })
        ));
        assert_eq!(cart.quantity_of(&plate), 10);

        Ok(())
    }

    #[test]
    fn update_quantity_to_zero_removes_line() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();
        let plate = ProductId::new("p2");

        cart.add_product(&products, &plate, 3)?;
        cart.update_quantity(&products, &plate, 0)?;

        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn update_quantity_of_absent_line_is_a_no_op() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();

        cart.update_quantity(&products, &ProductId::new("p1"), 1)?;

        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn removal_is_idempotent() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.add_product(&products, &mug, 1)?;
        cart.add_product(&products, &ProductId::new("p2"), 1)?;

        cart.remove_product(&mug);
        cart.remove_product(&mug);

        assert_eq!(cart.len(), 1);

        let remaining = cart.items().to_vec();

        for line in &remaining {
            cart.remove(line);
            cart.remove(line);
        }

        assert!(cart.is_empty());

        Ok(())
    }

    #[test]
    fn total_is_exact() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();

        cart.add_product(&products, &ProductId::new("p2"), 3)?;
        cart.add_product(&products, &ProductId::new("p1"), 1)?;

        assert_eq!(cart.calculate_total(&products)?, Decimal::new(1999, 2));

        Ok(())
    }

    #[test]
    fn empty_cart_totals_zero() -> TestResult {
        let products = products()?;

        assert_eq!(Cart::new().calculate_total(&products)?, Decimal::ZERO);

        Ok(())
    }

    #[test]
    fn total_overflow_is_an_error() -> TestResult {
        let products = vec![Product::new("p1", "Vault", "Safes", Decimal::MAX, 5)?];
        let mut cart = Cart::new();

        cart.add_product(&products, &ProductId::new("p1"), 2)?;

        assert_eq!(cart.calculate_total(&products), Err(CartError::TotalOverflow));

        Ok(())
    }

    #[test]
    fn restored_lines_ignore_current_stock() -> TestResult {
        let products = products()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.restore_line(mug.clone(), 5)?;

        assert_eq!(cart.quantity_of(&mug), 5);
        assert!(!cart.validate_stock(&products));

        Ok(())
    }

    #[test]
    fn restore_rejects_bad_quantities_and_duplicates() {
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        assert_eq!(
            cart.restore_line(mug.clone(), 0),
            Err(CartError::InvalidQuantity(0))
        );
        assert_eq!(
            cart.restore_line(mug.clone(), i64::from(u32::MAX) + 1),
            Err(CartError::QuantityTooLarge(i64::from(u32::MAX) + 1))
        );
        assert_eq!(cart.restore_line(mug.clone(), 1), Ok(()));
        assert_eq!(
            cart.restore_line(mug.clone(), 1),
            Err(CartError::DuplicateLine(mug))
        );
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn validate_stock_sees_stock_changes() -> TestResult {
        let mut catalog = catalog()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.add_product(&catalog, &mug, 2)?;

        assert!(cart.validate_stock(&catalog));

        if let Some(product) = catalog.get_mut(&mug) {
            product.set_stock(1);
        }

        assert!(!cart.validate_stock(&catalog));

        Ok(())
    }

    #[test]
    fn checkout_takes_stock_and_empties_cart() -> TestResult {
        let mut catalog = catalog()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.add_product(&catalog, &mug, 2)?;

        assert!(cart.add_product(&catalog, &mug, 1).is_err());

        cart.checkout(&mut catalog)?;

        assert!(cart.is_empty());
        assert_eq!(catalog.get(&mug).map(Product::stock), Some(0));

        Ok(())
    }

    #[test]
    fn failed_checkout_changes_nothing() -> TestResult {
        let mut catalog = catalog()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");
        let plate = ProductId::new("p2");

        cart.add_product(&catalog, &plate, 4)?;
        cart.add_product(&catalog, &mug, 2)?;

        if let Some(product) = catalog.get_mut(&mug) {
            product.set_stock(1);
        }

        let before = cart.clone();

        assert!(matches!(
            cart.checkout(&mut catalog),
            Err(CartError::InsufficientStock { available: 1, .. })
        ));
        assert_eq!(cart, before);
        assert_eq!(catalog.get(&plate).map(Product::stock), Some(10));
        assert_eq!(catalog.get(&mug).map(Product::stock), Some(1));

        Ok(())
    }

    #[test]
    fn checkout_fails_when_a_product_was_removed() -> TestResult {
        let mut catalog = catalog()?;
        let mut cart = Cart::new();
        let mug = ProductId::new("p1");

        cart.add_product(&catalog, &mug, 1)?;
        catalog.remove(&mug);

        assert_eq!(
            cart.checkout(&mut catalog),
            Err(CartError::NullProduct(mug))
        );
        assert_eq!(cart.len(), 1);

        Ok(())
    }
}
