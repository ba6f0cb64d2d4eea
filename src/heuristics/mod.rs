//! Cheap deterministic text analysis that runs without the LLM.

pub mod category_hints;
pub mod tokens;

pub use category_hints::*;
pub use tokens::*;
