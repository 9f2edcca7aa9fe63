pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{HttpInferenceClient, InferenceConfig, InferenceService};
pub use error::InferenceError;
pub use mock::MockInferenceService;
pub use types::{AudioContext, Difficulty, ImagePayload};
