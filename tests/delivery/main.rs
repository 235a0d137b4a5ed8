//! End-to-end tests of the secure-delivery flow over on-disk stores.

#![cfg(feature = "sqlite")]

mod concurrency;
mod helpers;
mod maintenance;
mod pipeline;
