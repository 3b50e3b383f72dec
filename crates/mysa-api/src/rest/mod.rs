// Mysa REST API
//
// Read-only account endpoints under `https://app-prod.mysa.cloud`,
// authorized with the raw Cognito id token.

pub mod client;
pub mod models;

pub use client::RestClient;
