//! Command dispatcher: the worker side of the control channel
//!
//! One thread, one loop: read a frame, decode a command, execute it,
//! write the response frames. Commands run strictly sequentially; a render
//! completes fully before the next frame is read. Any fault propagates out
//! of [`Dispatcher::run`] and the process dies at the binary's top-level
//! boundary; the control side treats worker death as the failure signal.

use std::io::{Read, Write};

use log::{debug, info};

use crate::cache::SharedCache;
use crate::error::Fault;
use crate::layout::LayoutTable;
use crate::protocol::{read_frame_opt, write_frame, Command, Response};
use crate::render::render_page;
use crate::source::DocumentSource;

/// The worker's whole mutable state: the open document, the current layout
/// table, the target geometry, and the shared page cache. Constructed at
/// startup, mutated by every command, torn down on process exit.
pub struct Dispatcher<R, W, S> {
    reader: R,
    writer: W,
    cache: SharedCache,
    source: Option<S>,
    layouts: LayoutTable,
    target_width: i32,
    target_height: i32,
    scroll_hint: i64,
}

impl<R: Read, W: Write, S: DocumentSource> Dispatcher<R, W, S> {
    #[must_use]
    pub fn new(reader: R, writer: W, cache: SharedCache) -> Self {
        Self {
            reader,
            writer,
            cache,
            source: None,
            layouts: LayoutTable::default(),
            target_width: 0,
            target_height: 0,
            scroll_hint: 0,
        }
    }

    /// Run the command loop until the peer closes the channel between
    /// frames (clean end) or a fault occurs.
    pub fn run(&mut self) -> Result<(), Fault> {
        info!("command loop started");
        while let Some(payload) = read_frame_opt(&mut self.reader)? {
            let command = Command::parse(&payload)?;
            self.execute(command)?;
        }
        info!("control side closed the channel");
        Ok(())
    }

    /// Execute one command and write its responses.
    pub fn execute(&mut self, command: Command) -> Result<(), Fault> {
        match command {
            Command::Open { path } => {
                if self.source.is_some() {
                    info!("replacing open document with {}", path.display());
                    self.source = None;
                    self.layouts = LayoutTable::default();
                }

                let source = S::open(&path, None, true)?;
                let page_count = source.page_count();
                self.source = Some(source);
                self.respond(Response::PageCount(page_count))
            }

            Command::Free { handle } => self.cache.free(handle),

            Command::Layout { position } => {
                // Reserved scroll-position hint; retained for the slot
                // policies that will want it, no response today.
                self.scroll_hint = position;
                debug!("scroll hint {position}");
                Ok(())
            }

            Command::Geometry { width, height } => {
                self.target_height = height;
                if width != self.target_width {
                    self.target_width = width;
                    // Every resident texture was rendered for the old
                    // width; drop residency so the next upload refreshes.
                    self.cache.lock().clear_all_slots();
                }

                let (layouts, page_count) = {
                    let source = self
                        .source
                        .as_ref()
                        .ok_or_else(|| Fault::protocol("geometry before open"))?;
                    (
                        LayoutTable::compute(source, self.target_width)?,
                        source.page_count(),
                    )
                };
                self.layouts = layouts;

                // Bottom-most buckets first: descending layout-index order.
                for entry in self.layouts.entries().iter().rev() {
                    let line = Response::LayoutEntry {
                        page: entry.page_num,
                        width: entry.width,
                        height: entry.height,
                    };
                    write_frame(&mut self.writer, line.encode().as_bytes())?;
                }
                self.respond(Response::PageCount(page_count))?;
                self.respond(Response::TotalHeight(self.layouts.total_height()))
            }

            Command::Render {
                page, layout_index, ..
            } => {
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| Fault::protocol("render before open"))?;
                let handle = render_page(source, &self.layouts, page, layout_index, &self.cache)?;

                // Echoes the current target geometry, not the page's pixel
                // dimensions; the control side already has those from `l`.
                self.respond(Response::Rendered {
                    page,
                    width: self.target_width,
                    height: self.target_height,
                    handle,
                })
            }
        }
    }

    fn respond(&mut self, response: Response) -> Result<(), Fault> {
        write_frame(&mut self.writer, response.encode().as_bytes())
    }

    #[must_use]
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// The response writer; lets an in-memory session recover its output.
    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }

    #[must_use]
    pub fn scroll_hint(&self) -> i64 {
        self.scroll_hint
    }
}
