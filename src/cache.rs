//! Live set of rendered pages, addressed by opaque handles
//!
//! Handles cross the protocol boundary, so they are registry ids rather
//! than anything derived from memory layout: a monotonically increasing
//! `u64`, never reused for the lifetime of the process. Freeing an unknown
//! handle is an explicit fault, not a silent release.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::Fault;

/// Opaque token identifying a live rendered page across the protocol
/// boundary. Serialized on the wire as lowercase hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(u64);

impl RenderHandle {
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// One successful render: the page's pixels plus its GPU residency state.
///
/// The pixel buffer is owned exclusively by this entry until freed. `slot`
/// is 0 while the page has no texture slot assigned.
#[derive(Clone)]
pub struct RenderedPage {
    pub page_num: usize,
    /// Index into the layout table this page was rendered against. Relation
    /// only; the table may have been rebuilt since.
    pub layout_index: usize,
    pub width: i32,
    pub height: i32,
    /// RGBA, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
    /// Texture slot id, 0 = none.
    pub slot: u32,
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page_num", &self.page_num)
            .field("layout_index", &self.layout_index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// Owning map from handle to rendered page.
///
/// O(1) insert and removal; slot-occupancy questions are answered by
/// scanning live entries, the pool is small enough that nothing fancier
/// pays for itself. No upper bound on live pages; the control side is
/// responsible for timely frees.
#[derive(Debug)]
pub struct PageSet {
    entries: HashMap<RenderHandle, RenderedPage>,
    next_handle: u64,
}

impl PageSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Insert a freshly rendered page, minting a new handle.
    pub fn insert(&mut self, page: RenderedPage) -> RenderHandle {
        let handle = RenderHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(handle, page);
        handle
    }

    /// Remove a page, releasing its pixel buffer.
    pub fn free(&mut self, handle: RenderHandle) -> Result<(), Fault> {
        self.entries
            .remove(&handle)
            .map(drop)
            .ok_or(Fault::InvalidHandle(handle))
    }

    #[must_use]
    pub fn get(&self, handle: RenderHandle) -> Option<&RenderedPage> {
        self.entries.get(&handle)
    }

    pub fn get_mut(&mut self, handle: RenderHandle) -> Option<&mut RenderedPage> {
        self.entries.get_mut(&handle)
    }

    #[must_use]
    pub fn contains(&self, handle: RenderHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Clear the slot field of whichever live page holds `slot`, returning
    /// its dimensions. At most one page can hold a given slot id.
    pub fn evict_slot(&mut self, slot: u32) -> Option<(i32, i32)> {
        debug_assert!(slot != 0);
        let page = self.entries.values_mut().find(|p| p.slot == slot)?;
        page.slot = 0;
        Some((page.width, page.height))
    }

    /// Drop GPU residency for every live page. Used when the target width
    /// changes and all texture contents become stale.
    pub fn clear_all_slots(&mut self) {
        for page in self.entries.values_mut() {
            page.slot = 0;
        }
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

impl Default for PageSet {
    fn default() -> Self {
        Self::new()
    }
}

/// The page set shared between the dispatcher thread and the display actor.
///
/// Every read or mutation of the set, or of a page's slot field, happens
/// under this mutex; insertions signal the condvar so a display actor can
/// block until a handle it has read off the wire becomes visible.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<(Mutex<PageSet>, Condvar)>,
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(PageSet::new()), Condvar::new())),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PageSet> {
        self.inner
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert under the lock and wake any waiting display actor.
    pub fn insert(&self, page: RenderedPage) -> RenderHandle {
        let handle = self.lock().insert(page);
        self.inner.1.notify_all();
        handle
    }

    pub fn free(&self, handle: RenderHandle) -> Result<(), Fault> {
        self.lock().free(handle)
    }

    /// Block until `handle` is live. The request/response ordering makes
    /// this return immediately in practice; the wait covers an embedding
    /// that hands handles between threads of its own.
    pub fn wait_for(&self, handle: RenderHandle) {
        let mut set = self.lock();
        while !set.contains(handle) {
            set = self
                .inner
                .1
                .wait(set)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}
