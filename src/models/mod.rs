pub mod category;
pub mod checkpoint;
pub mod insight;
pub mod report;
pub mod summary;
pub mod transcript;

pub use category::*;
pub use checkpoint::*;
pub use insight::*;
pub use report::*;
pub use summary::*;
pub use transcript::*;
