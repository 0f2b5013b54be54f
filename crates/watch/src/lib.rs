//! The Watcher Set: a debounced filesystem-event watcher over git control
//! directories, and a periodic reconciler loop.

pub mod fs_watch;
pub mod reconciler;

pub use fs_watch::{FsWatchSet, WatchError};
