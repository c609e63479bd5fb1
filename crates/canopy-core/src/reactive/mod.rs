#![forbid(unsafe_code)]

//! Push-based change notification for the session stores.

pub mod observable;

pub use observable::{Observable, Subscription};
