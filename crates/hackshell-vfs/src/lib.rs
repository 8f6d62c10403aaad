//! Virtual filesystem for hackshell.
//!
//! A machine is a JSON record holding a directory tree plus metadata. File
//! bodies live outside the record in a content store and are referenced from
//! the tree by relative paths. [`MachineFs`] is the transactional accessor
//! commands use: it loads a record, mutates it and flushes it back through a
//! [`MachineStore`].

pub mod fs;
pub mod journal;
pub mod key;
pub mod machine;
pub mod memory;
pub mod node;
pub mod password;
pub mod path;
pub mod store;

pub use fs::MachineFs;
pub use journal::{Journal, LogCategory};
pub use machine::{Machine, MachineMeta, UserRecord};
pub use memory::MemoryStore;
pub use node::{Directory, FileTree, Node};
pub use store::{DiskStore, MachineStore};
