//! Cache lifecycle and inspection tools.

pub mod activate;
pub mod install;
pub mod keys;

pub use activate::{CacheActivateParams, activate_impl};
pub use install::{CacheInstallParams, install_impl};
pub use keys::{CacheKeysParams, keys_impl};
