#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod ops;
pub mod query;
pub mod scan;
pub mod stats;

pub use error::{IndexError, Result};
pub use index::SessionIndex;
