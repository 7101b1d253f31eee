//! Pagination of a document into a continuous vertical strip
//!
//! For a target display width, every page gets a device transform mapping
//! document space onto a pixel box of that width, and the boxes stack into
//! one scrollable strip. Runs of consecutive pages with identical geometry
//! collapse into a single layout bucket: the strip accounts their heights
//! but the table stores one entry, which keeps the table and the protocol
//! chatter small for scanned books and slide decks.

use std::time::Instant;

use log::debug;

use crate::error::Fault;
use crate::geometry::{IDENTITY, IRect, Matrix, Rect};
use crate::source::DocumentSource;

/// Fixed channel count of every rendered pixel box.
pub const CHANNELS: usize = 4;

/// One geometry bucket: the pixel box and device transform shared by one or
/// more consecutive source pages.
#[derive(Clone, Copy, Debug)]
pub struct PageLayout {
    /// First source page of the bucket (0-based).
    pub page_num: usize,
    /// Pixel bounding box after the device transform.
    pub bbox: IRect,
    /// Document space to pixel box: rotation, uniform scale, vertical flip.
    pub ctm: Matrix,
    pub width: i32,
    pub height: i32,
}

/// The layout table for one target width. Stable once computed; replaced
/// wholesale when the width changes.
#[derive(Clone, Debug, Default)]
pub struct LayoutTable {
    entries: Vec<PageLayout>,
    total_height: i64,
}

impl LayoutTable {
    /// Paginate every page of `source` for `target_width`.
    pub fn compute<S: DocumentSource>(source: &S, target_width: i32) -> Result<Self, Fault> {
        let start = Instant::now();
        let mut entries: Vec<PageLayout> = Vec::new();
        let mut total_height: i64 = 0;
        let mut prev: Option<(Rect, i32)> = None;

        for page_num in 0..source.page_count() {
            let (raw_box, rotation) = source.page_bounds(page_num)?;

            // A page repeating the previous page's exact box and rotation
            // joins its bucket: the strip grows, the table does not.
            if let Some(entry) = entries.last() {
                if prev == Some((raw_box, rotation)) {
                    total_height += i64::from(entry.height);
                    continue;
                }
            }
            prev = Some((raw_box, rotation));

            let page_box = raw_box.normalized();
            let entry = Self::layout_page(page_num, page_box, rotation, target_width)?;
            total_height += i64::from(entry.height);
            entries.push(entry);
        }

        debug!(
            "layout: {} buckets, strip height {} at width {} ({:?})",
            entries.len(),
            total_height,
            target_width,
            start.elapsed()
        );

        Ok(Self {
            entries,
            total_height,
        })
    }

    fn layout_page(
        page_num: usize,
        page_box: Rect,
        rotation: i32,
        target_width: i32,
    ) -> Result<PageLayout, Fault> {
        // Width the box will have once rotated, before scaling.
        let pre = IDENTITY
            .concat(Matrix::translate(0.0, -page_box.y1))
            .concat(Matrix::rotate(rotation as f32));
        let rotated_width = pre.transform_rect(page_box).width();
        if rotated_width <= 0.0 {
            return Err(Fault::document(format!(
                "degenerate bounds on page {page_num}"
            )));
        }

        let zoom = target_width as f32 / rotated_width;
        let ctm = IDENTITY
            .concat(Matrix::translate(0.0, -page_box.y1))
            .concat(Matrix::scale(zoom, -zoom))
            .concat(Matrix::rotate(rotation as f32));
        let bbox = ctm.transform_rect(page_box).round();

        Ok(PageLayout {
            page_num,
            bbox,
            ctm,
            width: bbox.width(),
            height: bbox.height(),
        })
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PageLayout> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn entries(&self) -> &[PageLayout] {
        &self.entries
    }

    /// Strip height in pixels: every source page contributes its bucket's
    /// height, merged buckets once per physical page.
    #[must_use]
    pub fn total_height(&self) -> i64 {
        self.total_height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
