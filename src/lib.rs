//! Invitrack - invite attribution tracker for group-chat communities
//!
//! This library keeps a per-community snapshot of invite usage counters,
//! works out which invite brought in each new member, and maintains a
//! durable per-inviter ledger of attributed joins.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod invite;
pub mod ledger;
pub mod notice;
pub mod snapshot_store;
pub mod source;
pub mod tracker;
