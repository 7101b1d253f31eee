//! Test doubles: scriptable document source and wire helpers

use std::path::Path;

use crate::error::Fault;
use crate::geometry::{IRect, Matrix, Rect};
use crate::source::DocumentSource;

/// In-memory document with scripted page geometry.
///
/// `render_into` paints the whole buffer with a byte derived from the page
/// number, so tests can tell renders of different pages apart without a
/// real rasterizer.
#[derive(Clone, Debug)]
pub struct FakeSource {
    pages: Vec<(Rect, i32)>,
}

impl FakeSource {
    #[must_use]
    pub fn from_pages(pages: Vec<(Rect, i32)>) -> Self {
        Self { pages }
    }

    /// `count` pages sharing one bounding box, rotation 0.
    #[must_use]
    pub fn uniform(count: usize, bounds: Rect) -> Self {
        Self {
            pages: vec![(bounds, 0); count],
        }
    }

    /// Fill byte used for a page's pixels.
    #[must_use]
    pub fn fill_byte(page: usize) -> u8 {
        (page % 251) as u8
    }
}

impl DocumentSource for FakeSource {
    /// "Opens" a document scripted in the path's file stem: semicolon-
    /// separated page runs of the form `WxH[@ROT][*COUNT]`, e.g.
    /// `612x792*2;612x396` for two letter pages and one half-height page.
    /// Anything else fails like a missing file would.
    fn open(path: &Path, _password: Option<&str>, _must_authenticate: bool) -> Result<Self, Fault> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Fault::document(format!("cannot open {}", path.display())))?;

        let mut pages = Vec::new();
        for run in stem.split(';') {
            let (shape, count) = match run.split_once('*') {
                Some((shape, n)) => (
                    shape,
                    n.parse::<usize>()
                        .map_err(|_| Fault::document(format!("cannot open {}", path.display())))?,
                ),
                None => (run, 1),
            };
            let (dims, rotation) = match shape.split_once('@') {
                Some((dims, rot)) => (
                    dims,
                    rot.parse::<i32>()
                        .map_err(|_| Fault::document(format!("cannot open {}", path.display())))?,
                ),
                None => (shape, 0),
            };
            let (w, h) = dims
                .split_once('x')
                .and_then(|(w, h)| Some((w.parse::<f32>().ok()?, h.parse::<f32>().ok()?)))
                .ok_or_else(|| Fault::document(format!("cannot open {}", path.display())))?;

            for _ in 0..count {
                pages.push((Rect::new(0.0, 0.0, w, h), rotation));
            }
        }

        if pages.is_empty() {
            return Err(Fault::document(format!("cannot open {}", path.display())));
        }
        Ok(Self { pages })
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_bounds(&self, page: usize) -> Result<(Rect, i32), Fault> {
        self.pages
            .get(page)
            .copied()
            .ok_or_else(|| Fault::document(format!("cannot retrieve info from page {page}")))
    }

    fn render_into(
        &self,
        page: usize,
        _ctm: Matrix,
        _bbox: IRect,
        out: &mut [u8],
    ) -> Result<(), Fault> {
        if page >= self.pages.len() {
            return Err(Fault::document(format!(
                "cannot retrieve info from page {page}"
            )));
        }
        out.fill(Self::fill_byte(page));
        Ok(())
    }
}

/// Encode a sequence of command payloads as a framed byte stream.
#[must_use]
pub fn framed(commands: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for cmd in commands {
        crate::protocol::write_frame(&mut out, cmd.as_bytes()).expect("frame");
    }
    out
}

/// Decode a framed response stream back into payload strings.
#[must_use]
pub fn deframed(mut bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let payload = crate::protocol::read_frame(&mut bytes).expect("deframe");
        out.push(String::from_utf8(payload).expect("ascii payload"));
    }
    out
}
