#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resilient file operations for the bndl bootstrapper
//!
//! Installers lose races constantly: antivirus scanners hold freshly
//! written files, indexers walk directories mid-move, a reboot is pending
//! with deletes queued behind it. This crate wraps the plain filesystem
//! calls with bounded retry, typed failure causes, and the journal that
//! remembers deletes which could not happen yet.

pub mod inspect;
pub mod ops;
pub mod paths;
pub mod pending;
pub mod retry;
pub mod temp;
pub mod text;

pub use inspect::{executable_architecture, file_version};
pub use ops::{
    atomic_write, copy_file, delete_file, file_size, move_file, read_bytes, read_until,
    same_file, write_bytes,
};
pub use paths::{
    add_suffix, change_extension, modified_time, set_modified_time, strip_extension, touch,
};
pub use pending::{DrainReport, PathState, PendingDeleteJournal};
pub use retry::{retry, RetryPolicy};
pub use temp::create_temp_file;
pub use text::{read_text, write_text, TextEncoding};
