//! LLM provider implementations for DefiBot.
//!
//! All providers implement the `defibot_core::Provider` trait.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, default_base_url};
