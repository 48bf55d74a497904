//! # Digxe Reward Bot
//!
//! Keeps every configured account mining around the clock: resolve each
//! account's claim deadline, claim the moment it passes, restart the cycle.
//! The `withdraw` side moves the claimed balance to the player's wallet and
//! can fall back to an on-chain transaction when the server asks for one.

pub mod api;
pub mod config;
pub mod countdown;
pub mod credentials;
pub mod deadline;
pub mod error;
pub mod evidence;
pub mod scheduler;
pub mod session;
pub mod time_source;
pub mod wallet;
pub mod withdrawal;
