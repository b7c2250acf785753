//! Parcel Watch — mailbox-driven delivery-tracking ingestion.
//!
//! Watches a JMAP mailbox for new messages, filters out everything that
//! is not a shipment notification, extracts structured tracking data via
//! an external service, resolves the carrier against a cached vocabulary,
//! and files each delivery with the downstream tracker exactly once.

pub mod carriers;
pub mod classify;
pub mod config;
pub mod error;
pub mod extraction;
pub mod jmap;
pub mod pipeline;
pub mod store;
pub mod submit;
