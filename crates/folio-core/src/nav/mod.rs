//! Ordering, grouping and visibility of listings.
//!
//! Everything here is pure: functions take entries by reference and return
//! new collections (or sort a caller-owned slice in place).

pub mod filter;
pub mod group;
pub mod sort;
