//! Platform configuration: types and the environment loader.

mod loader;
mod types;

pub use loader::load_from_env;
pub use types::{AmpConfig, Mode};
