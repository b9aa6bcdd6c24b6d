//! Sales

use jiff::civil::DateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ids::TypedId;

/// Marker for transaction ids
#[derive(Debug)]
pub enum Transaction {}

/// Transaction Id, shared by every record of one checkout
pub type TransactionId = TypedId<Transaction>;

impl TransactionId {
    /// Generate a fresh transaction id, e.g. `T0192F3A4...`.
    pub fn issue() -> Self {
        Self::new(format!("T{}", Uuid::now_v7().simple()).to_uppercase())
    }
}

/// One product line of a completed transaction.
///
/// The amount is the price × quantity at the moment of sale and is never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    transaction_id: TransactionId,
    customer_username: String,
    product_name: String,
    quantity: u32,
    amount_paid: Decimal,
    timestamp: DateTime,
}

impl SaleRecord {
    /// Create a sale record.
    pub fn new(
        transaction_id: TransactionId,
        customer_username: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        amount_paid: Decimal,
        timestamp: DateTime,
    ) -> Self {
        Self {
            transaction_id,
            customer_username: customer_username.into(),
            product_name: product_name.into(),
            quantity,
            amount_paid,
            timestamp,
        }
    }

    /// Transaction this line belongs to
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Buyer's username at the time of sale
    pub fn customer_username(&self) -> &str {
        &self.customer_username
    }

    /// Product name at the time of sale
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Units sold
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Amount paid for the line
    pub fn amount_paid(&self) -> Decimal {
        self.amount_paid
    }

    /// When the sale happened
    pub fn timestamp(&self) -> DateTime {
        self.timestamp
    }
}

/// Append-only log of sale records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesLedger {
    records: Vec<SaleRecord>,
}

impl SalesLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger holding `records` in order.
    pub fn with_records(records: impl Into<Vec<SaleRecord>>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Append a record.
    pub fn add_sale(&mut self, record: SaleRecord) {
        self.records.push(record);
    }

    /// Remove every record of a transaction, returning how many were removed.
    pub fn delete_record(&mut self, transaction_id: &TransactionId) -> usize {
        let before = self.records.len();

        self.records
            .retain(|record| record.transaction_id != *transaction_id);

        before - self.records.len()
    }

    /// Sum of the amounts paid over all records, capped at [`Decimal::MAX`]
    pub fn total_revenue(&self) -> Decimal {
        self.records
            .iter()
            .map(SaleRecord::amount_paid)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// The records of one transaction, in order.
    pub fn transaction(&self, transaction_id: &TransactionId) -> Vec<&SaleRecord> {
        self.records
            .iter()
            .filter(|record| record.transaction_id == *transaction_id)
            .collect()
    }

    /// A customer's purchase history, matching the username exactly.
    pub fn for_customer(&self, username: &str) -> Vec<&SaleRecord> {
        self.records
            .iter()
            .filter(|record| record.customer_username == username)
            .collect()
    }

    /// All records in the order they were added
    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
