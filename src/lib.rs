//! Tech Pulse - A topic-based news feed aggregator
//!
//! This crate fetches RSS and Atom feeds for a set of topics concurrently,
//! deduplicates and orders the articles by recency, caches the merged result
//! and serves it page by page over a small JSON HTTP endpoint.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod pagination;
pub mod parser;
pub mod routes;
pub mod topics;
