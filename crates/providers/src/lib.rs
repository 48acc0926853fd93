//! Completion backends for ragstream.
//!
//! All backends implement the `ragstream_core::Provider` trait.
//! The factory builds the configured backend from a [`ragstream_config::RagConfig`].

pub mod factory;
pub mod openai_compat;
mod sse;

pub use factory::{build_from_config, default_capabilities};
pub use openai_compat::OpenAiCompatProvider;
