//! Concrete research collaborators backed by Google Gemini.

pub mod agents;
pub mod gemini;

pub use agents::{
    GeminiFinalizer, GeminiQueryGenerator, GeminiReflector, GeminiSearcher, build_collaborators,
};
pub use gemini::{GeminiClient, resolve_api_key};
