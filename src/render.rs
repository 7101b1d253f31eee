//! Render pipeline: (page, layout index) to a cached pixel buffer

use std::time::Instant;

use log::debug;

use crate::cache::{RenderHandle, RenderedPage, SharedCache};
use crate::error::Fault;
use crate::layout::{CHANNELS, LayoutTable};
use crate::source::DocumentSource;

/// Rasterize one page against a layout entry and insert the result into the
/// shared cache. Every successful call mints exactly one new handle, valid
/// until explicitly freed.
pub fn render_page<S: DocumentSource>(
    source: &S,
    layouts: &LayoutTable,
    page_num: usize,
    layout_index: usize,
    cache: &SharedCache,
) -> Result<RenderHandle, Fault> {
    // Pending document mutations must land before rasterization.
    source.flush();

    let layout = layouts
        .get(layout_index)
        .ok_or_else(|| Fault::protocol(format!("layout index {layout_index} out of range")))?;

    let width = layout.width;
    let height = layout.height;
    let mut pixels = vec![0xFFu8; width as usize * height as usize * CHANNELS];

    let start = Instant::now();
    source.render_into(page_num, layout.ctm, layout.bbox, &mut pixels)?;
    debug!(
        "render: page {page_num} as {width}x{height} ({:?})",
        start.elapsed()
    );

    let handle = cache.insert(RenderedPage {
        page_num,
        layout_index,
        width,
        height,
        pixels,
        slot: 0,
    });
    Ok(handle)
}
