use std::sync::{Mutex, OnceLock};

// Freelist shared by every pooled-buffer member in the process. Entries are
// only ever appended back after a release; capacity is retained across
// leases.
static FREELIST: OnceLock<Mutex<Vec<Vec<u8>>>> = OnceLock::new();

const MAX_POOLED: usize = 64;

fn freelist() -> &'static Mutex<Vec<Vec<u8>>> {
    FREELIST.get_or_init(|| Mutex::new(Vec::new()))
}

/// A byte buffer leased from the process-wide pool.
///
/// The owning generated type exposes a `release` method that returns the
/// backing storage to the pool; dropping the buffer releases it as well,
/// so an early `release` is an optimization, not an obligation.
#[derive(Debug, Default)]
pub struct PooledBuf {
    data: Option<Vec<u8>>,
}

impl PooledBuf {
    /// Leases a zeroed buffer of exactly `len` bytes.
    pub fn lease(len: usize) -> Self {
        let mut buf = freelist()
            .lock()
            .expect("buffer pool poisoned")
            .pop()
            .unwrap_or_default();
        buf.clear();
        buf.resize(len, 0);
        Self { data: Some(buf) }
    }

    /// Leases a buffer holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut leased = Self::lease(bytes.len());
        leased.as_mut_slice().copy_from_slice(bytes);
        leased
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Returns the backing storage to the pool, leaving this buffer empty.
    /// Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(buf) = self.data.take() {
            let mut pool = freelist().lock().expect("buffer pool poisoned");
            if pool.len() < MAX_POOLED {
                pool.push(buf);
            }
        }
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.release();
    }
}

impl Clone for PooledBuf {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_slice())
    }
}

impl PartialEq for PooledBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_zeroed_at_the_requested_length() {
        let buf = PooledBuf::lease(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_slice_copies_contents() {
        let buf = PooledBuf::from_slice(&[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn release_empties_and_is_idempotent() {
        let mut buf = PooledBuf::from_slice(&[9; 32]);
        buf.release();
        assert!(buf.is_empty());
        buf.release();
        assert!(buf.is_empty());
    }

    #[test]
    fn released_storage_is_reused() {
        let mut first = PooledBuf::lease(8);
        first.as_mut_slice()[0] = 0xff;
        first.release();
        // The next lease must come back zeroed even when recycled.
        let second = PooledBuf::lease(8);
        assert!(second.as_slice().iter().all(|&b| b == 0));
    }
}
