//! Provider Module
//!
//! The generative text API the pool hands keys to.

pub mod gemini;
pub mod rate_limit;

use crate::error::Result;
use futures::future::BoxFuture;

pub use gemini::GeminiProvider;
pub use rate_limit::{is_rate_limit_error, is_rate_limit_message};

/// A text generation backend addressed with a per-call key
pub trait Provider: Send + Sync {
    /// Generate a reply for `prompt` with `model`, authenticating with `secret`
    fn generate<'a>(
        &'a self,
        secret: &'a str,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Minimal live call used before a key is admitted or re-enabled
    fn probe<'a>(&'a self, secret: &'a str) -> BoxFuture<'a, bool>;
}
