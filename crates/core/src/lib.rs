pub mod config;
pub mod credential;
pub mod error;
pub mod inference;

pub use config::Config;
pub use credential::Credential;
pub use error::*;
pub use inference::InferenceConfig;
