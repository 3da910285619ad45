//! HTTP plumbing shared by the remote calendar and OAuth clients

pub mod client;

pub use client::{HttpClient, HttpClientBuilder, RetryPolicy};
