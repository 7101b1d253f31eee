//! Document access seam: open, page geometry, rasterization
//!
//! The worker owns at most one live document. Everything it needs from the
//! document engine goes through [`DocumentSource`], so the dispatcher and
//! layout code can be exercised against a fake in tests while production
//! runs on MuPDF.

use std::path::Path;

use crate::error::Fault;
use crate::geometry::{IRect, Matrix, Rect};

/// A document opened for pagination and rendering.
pub trait DocumentSource: Sized {
    /// Open and authenticate a document.
    ///
    /// A wrong or missing password is fatal when `must_authenticate` is
    /// set; otherwise it logs a warning and the document continues with
    /// restricted access.
    fn open(path: &Path, password: Option<&str>, must_authenticate: bool) -> Result<Self, Fault>;

    fn page_count(&self) -> usize;

    /// Bounding box and rotation (degrees, multiple of 90) for a 0-based
    /// page. Implementations prefer the crop region over the full media
    /// region when both exist.
    fn page_bounds(&self, page: usize) -> Result<(Rect, i32), Fault>;

    /// Rasterize a page's content into `out`, an RGBA buffer of
    /// `bbox.width() * bbox.height() * 4` bytes pre-cleared by the caller.
    fn render_into(
        &self,
        page: usize,
        ctm: Matrix,
        bbox: IRect,
        out: &mut [u8],
    ) -> Result<(), Fault>;

    /// Flush buffered document mutations so rendering observes a
    /// consistent state. Read-only engines have nothing to do.
    fn flush(&self) {}
}

#[cfg(feature = "pdf")]
pub use self::pdf::MupdfSource;

#[cfg(feature = "pdf")]
mod pdf {
    use std::path::Path;

    use log::{debug, warn};
    use mupdf::{Colorspace, Document};

    use super::DocumentSource;
    use crate::error::Fault;
    use crate::geometry::{IRect, Matrix, Rect};

    /// MuPDF-backed document.
    ///
    /// Page rotation is already folded into the bounds MuPDF reports, so
    /// `page_bounds` returns rotation 0 and the layout transform reduces to
    /// scale and flip for this source.
    pub struct MupdfSource {
        doc: Document,
        page_count: usize,
    }

    impl DocumentSource for MupdfSource {
        fn open(
            path: &Path,
            password: Option<&str>,
            must_authenticate: bool,
        ) -> Result<Self, Fault> {
            let mut doc = Document::open(path.to_string_lossy().as_ref())
                .map_err(|e| Fault::document(format!("cannot open {}: {e}", path.display())))?;

            if doc.needs_password()? {
                let okay = match password {
                    Some(p) => doc.authenticate(p)?,
                    None => false,
                };
                if !okay {
                    if must_authenticate {
                        return Err(Fault::document(format!(
                            "invalid password for {}",
                            path.display()
                        )));
                    }
                    warn!("invalid password, attempting to continue");
                }
            }

            let page_count = doc.page_count()? as usize;
            debug!("opened {} ({page_count} pages)", path.display());

            Ok(Self { doc, page_count })
        }

        fn page_count(&self) -> usize {
            self.page_count
        }

        fn page_bounds(&self, page: usize) -> Result<(Rect, i32), Fault> {
            let page = self.doc.load_page(page as i32)?;
            let bounds = page.bounds()?;
            Ok((
                Rect::new(bounds.x0, bounds.y0, bounds.x1, bounds.y1),
                0,
            ))
        }

        fn render_into(
            &self,
            page: usize,
            ctm: Matrix,
            bbox: IRect,
            out: &mut [u8],
        ) -> Result<(), Fault> {
            let page = self.doc.load_page(page as i32)?;

            // Interpret the content stream once into a display list, then
            // rasterize the list through the device transform.
            let list = page.to_display_list(false)?;
            let transform = mupdf::Matrix::new(ctm.a, ctm.b, ctm.c, ctm.d, ctm.e, ctm.f);
            let pixmap = list.to_pixmap(&transform, &Colorspace::device_rgb(), false)?;

            blit_rgba(&pixmap, bbox, out)
        }
    }

    /// Copy pixmap samples into the caller's RGBA buffer, expanding the
    /// channel count and clamping to the overlap of the two extents.
    fn blit_rgba(pixmap: &mupdf::Pixmap, bbox: IRect, out: &mut [u8]) -> Result<(), Fault> {
        let n = pixmap.n() as usize;
        if n < 3 {
            return Err(Fault::document(format!(
                "unsupported pixmap format: {n} channels"
            )));
        }

        let out_width = bbox.width() as usize;
        let out_height = bbox.height() as usize;
        let src_width = pixmap.width() as usize;
        let src_height = pixmap.height() as usize;
        let stride = pixmap.stride() as usize;
        let samples = pixmap.samples();

        let copy_width = out_width.min(src_width);
        let copy_height = out_height.min(src_height);

        for y in 0..copy_height {
            let src_row = &samples[y * stride..y * stride + copy_width * n];
            let dst_row = &mut out[y * out_width * 4..][..copy_width * 4];
            for (src, dst) in src_row.chunks_exact(n).zip(dst_row.chunks_exact_mut(4)) {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
                dst[3] = 0xFF;
            }
        }

        Ok(())
    }
}
