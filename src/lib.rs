//! Core protocol library for the tea lorry tracking apps.
//!
//! Drivers publish position and presence into an ephemeral live tree;
//! admin and user clients reconcile those streams into a LIVE / ONLINE /
//! OFFLINE status per vehicle and read scoped message fan-out from the
//! catalog. The stores here stand at the managed-backend boundary and keep
//! its semantics: whole-subtree subscriptions, last-write-wins node writes,
//! and disconnect-triggered cleanup.

pub mod admin;
pub mod config;
pub mod error;
pub mod models;
pub mod publisher;
pub mod reconciler;
pub mod relay;
pub mod store;
