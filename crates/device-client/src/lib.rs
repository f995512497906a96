//! HTTP transport for otapush devices.
//!
//! [`HttpDevice`] implements the updater's `DeviceConnection` on top of
//! `reqwest`. The [`simple`] module holds the one-shot multipart upload
//! used for payloads that do not go through a resumable session.

pub mod client;
pub mod simple;

pub use client::{ClientError, HttpDevice};
pub use simple::{SimpleTarget, simple_upload};
