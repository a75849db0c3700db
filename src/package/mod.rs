//! Package containers and asset resolution.

mod container;
mod format;
mod native;
mod resolver;

pub use container::*;
pub use format::*;
pub use native::*;
pub use resolver::*;
