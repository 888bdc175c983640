// Entity Models
//
// Customer 1:N Order, Customer 1:N Transaction, Order 1:N Transaction.
// Customers are identified by their POS code, orders by the POS order
// number, transactions by a UUID assigned on creation.

pub mod customer;
pub mod order;
pub mod transaction;

pub use customer::{Customer, CustomerProfile, CustomerSummary};
pub use order::{Order, OrderFilter, OrderWithCustomer, ORDER_STATUSES, ORDER_STATUS_DELIVERED};
pub use transaction::{
    ManualTransaction, PaymentStatus, Transaction, TransactionSource, TransactionType,
    CATEGORY_GARMENT_RETURN, CATEGORY_SALES, EXPENSE_CATEGORIES, INCOME_CATEGORIES,
};
