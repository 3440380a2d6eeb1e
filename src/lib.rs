//! A small self-hosted blocklist server.
//!
//! One browser bookmarklet click sends the current page to `/block`; the
//! server reduces it to a blocklist entry and persists it in a plain text
//! file, which it then serves in plain, hosts and Adblock renderings.

pub mod api;
pub mod config;
pub mod error;
pub mod init;
pub mod store;
