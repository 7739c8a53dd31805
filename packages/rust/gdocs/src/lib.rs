//! Google Docs publishing: token lookup, Markdown to Docs requests, and a
//! small REST client.

pub mod auth;
pub mod client;
pub mod requests;

pub use auth::AccessToken;
pub use client::{DEFAULT_BASE_URL, DocsClient};
pub use requests::{chunk_text, markdown_to_requests};
