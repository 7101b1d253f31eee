//! Rendering worker for a split-process document viewer
//!
//! The control side speaks a framed command protocol over a byte channel;
//! this side paginates the open document into a continuous strip, renders
//! pages into pixel buffers addressed by opaque handles, and multiplexes a
//! fixed pool of GPU texture slots across them for the display actor.

pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod protocol;
pub mod render;
pub mod source;
pub mod texture;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use cache::{PageSet, RenderHandle, RenderedPage, SharedCache};
pub use error::Fault;
pub use layout::{LayoutTable, PageLayout};
pub use source::DocumentSource;
pub use texture::{GraphicsBackend, SlotAllocator};
pub use worker::Dispatcher;
