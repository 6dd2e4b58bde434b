pub mod catalog;
pub mod session;
pub mod store;
pub mod trie;

pub use catalog::{Catalog, Placement};
pub use session::{ListFilter, SessionIndex};
pub use store::EntryStore;
pub use trie::Trie;
