pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod render;

pub use aggregate::*;
pub use batch::*;
pub use classify::*;
pub use render::*;
