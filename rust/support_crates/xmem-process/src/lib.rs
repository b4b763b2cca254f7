//! Raw access to the memory of another process.
//!
//! This is the only layer of xmem that talks to the operating system. Each
//! function maps to a single system call, returns `std::io::Result` and never
//! retries: the caller decides what a failure means.

#[cfg_attr(target_os = "linux", path = "process_linux.rs")]
#[cfg_attr(windows, path = "process_win.rs")]
#[cfg_attr(not(any(target_os = "linux", windows)), path = "process_fallback.rs")]
pub mod process;

pub use process::{ProcessHandle, allocate, free, get_page_size, read, write};
