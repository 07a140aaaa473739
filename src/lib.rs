//! Bulk email campaign dispatch through a transactional provider.
//!
//! The pipeline: `contacts` ingests and validates a tabular recipient source,
//! `schedule` resolves a human-entered send time into the provider's
//! timestamp format, `personalize` renders the fixed token vocabulary per
//! recipient, and `dispatch` turns the lot into bounded-concurrency,
//! rate-limit-aware provider calls via `email_client`, collecting one
//! `SendResult` per valid recipient. `reports` persists the outcome.

pub mod configuration;
pub mod contacts;
pub mod dispatch;
pub mod domain;
pub mod email_client;
pub mod personalize;
pub mod reports;
pub mod schedule;
pub mod telemetry;
