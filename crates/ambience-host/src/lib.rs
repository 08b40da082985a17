//! Concrete storage backends and surface hosts.
//!
//! Storage: [`SharedStorage`] hands out in-process views over one key space;
//! [`FileStore`] keeps one JSON document per key in a directory shared by
//! processes. Hosts: [`HeadlessHost`] records frames, [`TerminalHost`] draws
//! them as text.

mod file;
mod headless;
mod memory;
mod terminal;

pub use file::FileStore;
pub use headless::HeadlessHost;
pub use memory::{MemoryStore, SharedStorage};
pub use terminal::{render_frame, TerminalHost};

#[inline]
fn box_err<E: std::error::Error + Send + Sync + 'static>(
    e: E,
) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(e)
}
