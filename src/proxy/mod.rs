//! Host-to-widget mutation messages and their dispatch.

pub mod dispatch;
pub mod message;
#[cfg(feature = "tokio-runtime")]
pub mod session;

pub use message::Mutation;
