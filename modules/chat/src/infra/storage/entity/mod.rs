//! SeaORM entities plus the queries the repositories run against them.
//!
//! Query helpers are generic over [`sea_orm::ConnectionTrait`] so they work on
//! the guarded transaction as well as on a bare connection.

pub mod conversation;
pub mod message;
pub mod user;
