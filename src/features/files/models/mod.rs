mod file;

pub use file::{File, FileUpdate, NewFile};
