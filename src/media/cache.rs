//! Latest-frame cache
//!
//! Holds at most one frame: the most recent image whose multipart part was
//! fully received. Writes overwrite, nothing is queued.
//!
//! The writer half lives with the relay core; readers are handed out to the
//! HTTP layer. Backed by `tokio::sync::watch`, so a read is an immediate
//! snapshot and can never observe a half-written frame.

use tokio::sync::watch;

use super::jpeg::Frame;

/// Writer half of the cache, owned by the relay core
#[derive(Debug)]
pub struct FrameCache {
    tx: watch::Sender<Option<Frame>>,
}

/// Cloneable read-only view of the cache
#[derive(Debug, Clone)]
pub struct FrameReader {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameCache {
    /// Create an empty cache
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the cached frame, returning the one it displaced
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        self.tx.send_replace(Some(frame))
    }

    /// Snapshot of the current frame
    pub fn latest(&self) -> Option<Frame> {
        self.tx.borrow().clone()
    }

    /// Create a reader for another task
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Snapshot of the current frame, `None` if nothing was published yet
    pub fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    /// Whether any frame has been published
    pub fn has_frame(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn frame(data: &'static [u8], sequence: u64) -> Frame {
        Frame {
            data: Bytes::from_static(data),
            sequence,
        }
    }

    #[test]
    fn test_empty_cache() {
        let cache = FrameCache::new();
        let reader = cache.reader();

        assert!(cache.latest().is_none());
        assert!(reader.latest().is_none());
        assert!(!reader.has_frame());
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = FrameCache::new();
        let reader = cache.reader();

        assert!(cache.publish(frame(b"\xFF\xD8\xFFone", 1)).is_none());
        let displaced = cache.publish(frame(b"\xFF\xD8\xFFtwo", 2));

        assert_eq!(displaced.map(|f| f.sequence), Some(1));
        let latest = reader.latest().unwrap();
        assert_eq!(latest.sequence, 2);
        assert_eq!(&latest.data[..], b"\xFF\xD8\xFFtwo");
    }

    #[test]
    fn test_reader_created_after_publish_sees_frame() {
        let cache = FrameCache::new();
        cache.publish(frame(b"\xFF\xD8\xFFx", 1));

        let reader = cache.reader();
        assert!(reader.has_frame());
    }

    #[test]
    fn test_reader_keeps_frame_after_writer_dropped() {
        let cache = FrameCache::new();
        let reader = cache.reader();
        cache.publish(frame(b"\xFF\xD8\xFFx", 3));
        drop(cache);

        assert_eq!(reader.latest().map(|f| f.sequence), Some(3));
    }
}
