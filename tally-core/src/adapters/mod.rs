//! Adapter implementations
//!
//! DuckDB backs the relational store: accounts, balances and the audit trail.

pub mod duckdb;
