//! coursedesk-core — Domain model, question engine, reporting and the data
//! access contract.
//!
//! This crate holds the records a course is made of, the pure logic computed
//! over them, and the [`traits::DataProvider`] seam every backend implements.

pub mod error;
pub mod filter;
pub mod gradebook;
pub mod import;
pub mod model;
pub mod question;
pub mod reporting;
pub mod session;
pub mod traits;
