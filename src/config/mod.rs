//! Configuration Module
//!
//! Handles settings loading and validation.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    ChatConfig, GenerationConfig, PoolConfig, ProviderConfig, Settings, TelegramConfig,
};
