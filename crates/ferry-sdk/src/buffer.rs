//! Shared, immutable byte buffers with a release hook

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Reference-counted byte buffer.
///
/// Clones share the same bytes. When the last clone is dropped, the optional
/// release hook runs exactly once. The bridge hands these to the foreign
/// runtime as external buffers without copying.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    bytes: Box<dyn AsRef<[u8]> + Send + Sync>,
    release: Mutex<Option<ReleaseHook>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Some(release) = self.release.get_mut().take() {
            release();
        }
    }
}

impl SharedBuffer {
    /// Create a buffer that owns `bytes`
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }

    /// Create a buffer over any owned byte container
    pub fn from_bytes<B>(bytes: B) -> Self
    where
        B: AsRef<[u8]> + Send + Sync + 'static,
    {
        SharedBuffer {
            inner: Arc::new(BufferInner {
                bytes: Box::new(bytes),
                release: Mutex::new(None),
            }),
        }
    }

    /// Create a buffer whose `release` hook runs when the last clone drops
    pub fn with_release<B, F>(bytes: B, release: F) -> Self
    where
        B: AsRef<[u8]> + Send + Sync + 'static,
        F: FnOnce() + Send + 'static,
    {
        SharedBuffer {
            inner: Arc::new(BufferInner {
                bytes: Box::new(bytes),
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    /// Create an empty buffer
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Borrow the bytes
    pub fn as_slice(&self) -> &[u8] {
        (*self.inner.bytes).as_ref()
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if two handles share the same storage
    pub fn ptr_eq(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this storage
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer").field("len", &self.len()).finish()
    }
}
