// Application layer - the balance engine and its policies.

pub mod engine;
pub mod error;
pub mod locks;
pub mod retry;

pub use engine::*;
pub use error::*;
pub use locks::*;
pub use retry::*;
