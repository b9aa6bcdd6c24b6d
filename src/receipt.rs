//! Receipt

use rust_decimal::Decimal;
use smallvec::SmallVec;

use crate::sales::{SaleRecord, TransactionId};

/// Final receipt for a completed checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    /// Transaction shared by every line
    transaction_id: TransactionId,

    /// One sale record per cart line, in cart order
    records: SmallVec<[SaleRecord; 8]>,

    /// Total amount charged
    total: Decimal,

    /// Customer balance after the charge
    remaining_balance: Decimal,
}

impl CheckoutReceipt {
    /// Create a new receipt with the given details.
    pub fn new(
        transaction_id: TransactionId,
        records: SmallVec<[SaleRecord; 8]>,
        total: Decimal,
        remaining_balance: Decimal,
    ) -> Self {
        Self {
            transaction_id,
            records,
            total,
            remaining_balance,
        }
    }

    /// Transaction id
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Sale records written by the checkout
    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }

    /// Total amount charged
    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Customer balance after the charge
    pub fn remaining_balance(&self) -> Decimal {
        self.remaining_balance
    }

    /// Units bought across every line
    pub fn units(&self) -> u64 {
        self.records
            .iter()
            .map(|record| u64::from(record.quantity()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use smallvec::smallvec;

    use super::*;

    fn record(tid: &TransactionId, product: &str, quantity: u32, paid: i64) -> SaleRecord {
        SaleRecord::new(
            tid.clone(),
            "alice",
            product,
            quantity,
            Decimal::new(paid, 2),
            date(2024, 1, 1).at(10, 0, 0, 0),
        )
    }

    #[test]
    fn accessors_return_values_from_constructor() {
        let tid = TransactionId::issue();
        let receipt = CheckoutReceipt::new(
            tid.clone(),
            smallvec![record(&tid, "Mug", 2, 1000), record(&tid, "Pen", 1, 150)],
            Decimal::new(1150, 2),
            Decimal::new(850, 2),
        );

        assert_eq!(receipt.transaction_id(), &tid);
        assert_eq!(receipt.records().len(), 2);
        assert_eq!(receipt.total(), Decimal::new(1150, 2));
        assert_eq!(receipt.remaining_balance(), Decimal::new(850, 2));
    }

    #[test]
    fn units_sum_every_line() {
        let tid = TransactionId::issue();
        let receipt = CheckoutReceipt::new(
            tid.clone(),
            smallvec![record(&tid, "Mug", 2, 1000), record(&tid, "Pen", 3, 450)],
            Decimal::new(1450, 2),
            Decimal::ZERO,
        );

        assert_eq!(receipt.units(), 5);
    }
}
