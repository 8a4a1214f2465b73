//! Publishing to X (Twitter).
//!
//! This crate provides:
//! - `Publisher` trait for the outbound posting capability
//! - `XPublisher`, the X API v2 implementation
//! - `split_post` and `post_with_continuation` for over-long messages

pub mod split;
pub mod thread;
pub mod traits;
pub mod x;

pub use split::{split_post, SplitPost, POST_LIMIT};
pub use thread::{post_with_continuation, PublishOutcome};
pub use traits::{PublishError, PublishResponse, Publisher};
pub use x::XPublisher;
