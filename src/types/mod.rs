//! Type definitions for the fraud classifier

pub mod transaction;

pub use transaction::Transaction;
