//! Reef Core
//!
//! Resource lifecycle engine shared by every provider: a schema-driven
//! attribute model, a differ that turns desired configuration into a plan,
//! a lifecycle driver that maps host intents onto provider handlers, and
//! the supporting machinery (waiter, retry policy, pagination, data lists).

pub mod composite;
pub mod datalist;
pub mod differ;
pub mod interpreter;
pub mod pagination;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod waiter;
