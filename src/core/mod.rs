pub mod entry;
pub mod names;
pub mod volume;

pub use entry::*;
pub use volume::*;
