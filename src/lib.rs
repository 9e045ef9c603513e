// Library exports for the gmail-reader crate
// This allows tests and the command-line front end to use the modules

pub mod auth;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod parser;
pub mod transport;

pub use client::{GmailClient, Message, MessageRow};
pub use error::{GmailError, GmailResult};
