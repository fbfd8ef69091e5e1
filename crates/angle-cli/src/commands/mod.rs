pub mod bid;
pub mod common;
pub mod completions;
pub mod config;
pub mod images;
pub mod listing;
pub mod orders;
pub mod payments;
pub mod wallet;
pub mod watch;
