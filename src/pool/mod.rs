//! Pool Module
//!
//! Provider key pooling with health tracking, failover and cooldown recovery.

pub mod credential;
pub mod manager;
pub mod shared;

pub use credential::{mask_secret, Credential, CredentialState};
pub use manager::{CredentialView, KeyPool, Lease, PoolOutcome, PoolStats};
pub use shared::SharedPool;
