//! Registry behaviour under concurrency, faults and multiple nodes.
//!
//! Every test runs against the in-memory store. Nodes are simulated by
//! registries sharing one store and one in-process invalidation bus.

mod cluster;
mod common;
mod concurrency;
mod failures;
