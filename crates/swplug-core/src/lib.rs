//! Core types, host contract, config, and errors for swplug.

pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod request;
pub mod scope;
pub mod urls;
