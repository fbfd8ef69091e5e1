//! angle-core - Core library for Angle
//!
//! Shared models, the HTTP/RPC session, realtime auction channels, optimistic
//! image uploads and the listing wizard used by every Angle client.

pub mod bidding;
pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod rpc;
pub mod session;
pub mod uploads;
pub mod util;
pub mod validation;
pub mod wizard;

pub use error::{Error, Result};
pub use models::{Amount, Bid, Image, ImageOwner, ItemId};
