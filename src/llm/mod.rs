pub mod client;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod validation;

pub use client::*;
pub use prompts::*;
pub use response::*;
pub use retry::*;
pub use validation::*;
