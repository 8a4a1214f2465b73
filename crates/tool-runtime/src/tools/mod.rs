//! Built-in tool implementations for the recursive tool loop.

pub mod post_x;

pub use post_x::PostXTool;
