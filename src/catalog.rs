//! Catalog

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};

use crate::{
    cart::ProductLookup,
    products::{Product, ProductId, Rating},
    users::UserId,
};

new_key_type! {
    /// Product Key
    pub struct ProductKey;
}

/// In-memory product repository.
///
/// Products are kept in insertion order. Every list returned from the catalog
/// is a copy; mutation only happens through the catalog's own methods.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: SlotMap<ProductKey, Product>,
    keys: FxHashMap<ProductId, ProductKey>,
    order: Vec<ProductKey>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from products in order, skipping repeated ids.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let mut catalog = Self::new();

        for product in products {
            catalog.add(product);
        }

        catalog
    }

    /// Add a product. Returns `false` if the id is blank or already taken.
    pub fn add(&mut self, product: Product) -> bool {
        if product.id.is_blank() || self.keys.contains_key(&product.id) {
            return false;
        }

        let id = product.id.clone();
        let key = self.products.insert(product);

        self.keys.insert(id, key);
        self.order.push(key);

        true
    }

    /// Replace a product's details, keeping its position and ratings.
    ///
    /// Returns `false` if no product has that id.
    pub fn update(&mut self, product: Product) -> bool {
        match self.get_mut(&product.id) {
            Some(existing) => {
                existing.apply_edit(product);
                true
            }
            None => false,
        }
    }

    /// Remove a product. Returns `false` if no product has that id.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        let Some(key) = self.keys.remove(id) else {
            return false;
        };

        self.products.remove(key);
        self.order.retain(|candidate| *candidate != key);

        true
    }

    /// Look up a product.
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.keys
            .get(id)
            .and_then(|key| self.products.get(*key))
    }

    pub(crate) fn get_mut(&mut self, id: &ProductId) -> Option<&mut Product> {
        let key = self.keys.get(id)?;

        self.products.get_mut(*key)
    }

    /// Record a customer's rating of a product. Returns `false` if the product does not exist.
    pub fn rate(&mut self, id: &ProductId, customer: UserId, rating: Rating) -> bool {
        match self.get_mut(id) {
            Some(product) => {
                product.rate(customer, rating);
                true
            }
            None => false,
        }
    }

    /// Iterate over products in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.order
            .iter()
            .filter_map(|key| self.products.get(*key))
    }

    /// Copies of all products in insertion order
    pub fn all(&self) -> Vec<Product> {
        self.iter().cloned().collect()
    }

    /// Products whose name contains `query`, ignoring case. A blank query returns everything.
    pub fn search_by_name(&self, query: &str) -> Vec<Product> {
        if query.trim().is_empty() {
            return self.all();
        }

        let query = query.to_lowercase();

        self.iter()
            .filter(|product| product.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Products in `category`, ignoring case. A blank category or `All` returns everything.
    pub fn filter_by_category(&self, category: &str) -> Vec<Product> {
        if category.trim().is_empty() || category.eq_ignore_ascii_case("all") {
            return self.all();
        }

        let category = fold_case(category);

        self.iter()
            .filter(|product| fold_case(&product.category) == category)
            .cloned()
            .collect()
    }

    /// Products ordered by price. Equal prices keep catalog order.
    pub fn sort_by_price(&self, ascending: bool) -> Vec<Product> {
        let mut products = self.all();

        if ascending {
            products.sort_by_key(Product::price);
        } else {
            products.sort_by(|a, b| b.price().cmp(&a.price()));
        }

        products
    }

    /// Distinct categories in the order they first appear
    pub fn categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut categories: Vec<String> = Vec::new();

        for product in self.iter() {
            let folded = fold_case(&product.category);

            if !seen.contains(&folded) {
                seen.push(folded);
                categories.push(product.category.clone());
            }
        }

        categories
    }

    /// Number of products
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the catalog has no products
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Case folding shared by category listing and filtering.
fn fold_case(category: &str) -> String {
    category.to_lowercase()
}

impl ProductLookup for Catalog {
    fn product(&self, id: &ProductId) -> Option<&Product> {
        self.get(id)
    }
}
