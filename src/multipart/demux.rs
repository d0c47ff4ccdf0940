//! Multipart stream demultiplexer
//!
//! Each upstream chunk is appended to a pending buffer which is then searched
//! for the rightmost boundary token. Everything up to and including that token
//! is a ready segment and is forwarded verbatim to viewers; the part that sits
//! directly in front of the token is where the newest JPEG lives.
//!
//! ```text
//!  pending: [ ...part A... --b\r\n ...part B... --b\r\n  tail ]
//!           └──────────────── segment ──────────────────┘
//!                                  └─ frame ─┘
//! ```
//!
//! At most one segment is produced per push. Because the split is taken at the
//! rightmost token, the leftover tail never contains a complete token, so the
//! next push only has to search the bytes that could complete one.

use bytes::{Bytes, BytesMut};

use crate::media::Frame;

use super::boundary::Boundary;
use super::error::DemuxError;

/// A ready segment: raw bytes up to and including a boundary
#[derive(Debug, Clone)]
pub struct Segment {
    /// Bytes to forward to viewers, ending with the boundary token
    pub data: Bytes,
    /// Newest frame found in the segment, `None` if the part was malformed
    pub frame: Option<Frame>,
}

impl Segment {
    /// Describe why no frame was extracted, if that is the case
    pub fn frame_error(&self) -> Option<DemuxError> {
        match self.frame {
            Some(_) => None,
            None => Some(DemuxError::MalformedFrame {
                len: self.data.len(),
            }),
        }
    }
}

/// Running counters for one demultiplexer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Bytes pushed in from upstream
    pub bytes_received: u64,
    /// Bytes handed out in segments
    pub bytes_forwarded: u64,
    /// Segments produced
    pub segments: u64,
    /// Frames extracted
    pub frames: u64,
    /// Segments without a start-of-image marker
    pub malformed: u64,
    /// Times the pending buffer was discarded for exceeding its cap
    pub overflows: u64,
}

/// Splits a chunked multipart byte stream into segments
#[derive(Debug)]
pub struct Demuxer {
    boundary: Boundary,
    pending: BytesMut,
    max_pending: usize,
    closed: bool,
    stats: DemuxStats,
}

impl Demuxer {
    /// Create a demultiplexer for the given boundary
    ///
    /// `max_pending` caps the bytes held while waiting for a boundary.
    pub fn new(boundary: Boundary, max_pending: usize) -> Self {
        Self {
            boundary,
            pending: BytesMut::new(),
            max_pending,
            closed: false,
            stats: DemuxStats::default(),
        }
    }

    /// Feed one upstream chunk
    ///
    /// Returns the ready segment if this chunk completed one. When the pending
    /// buffer outgrows its cap without a boundary, the pending bytes are
    /// dropped and `BufferOverflow` is returned; the demuxer stays usable and
    /// picks up again at the next boundary.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Segment>, DemuxError> {
        if self.closed {
            return Ok(None);
        }

        self.stats.bytes_received += chunk.len() as u64;

        let token = self.boundary.token();
        let search_from = self.pending.len().saturating_sub(token.len() - 1);
        self.pending.extend_from_slice(chunk);

        let pos = match rfind(&self.pending[search_from..], token) {
            Some(offset) => search_from + offset,
            None => {
                if self.pending.len() > self.max_pending {
                    let pending = self.pending.len();
                    self.pending.clear();
                    self.stats.overflows += 1;
                    return Err(DemuxError::BufferOverflow {
                        pending,
                        limit: self.max_pending,
                    });
                }
                return Ok(None);
            }
        };

        let data = self.pending.split_to(pos + token.len()).freeze();

        // Part in front of the final token starts after the previous token, if any
        let part_start = rfind(&data[..pos], token)
            .map(|p| p + token.len())
            .unwrap_or(0);
        let frame = Frame::from_part(data.slice(part_start..pos), self.stats.frames + 1);

        self.stats.segments += 1;
        self.stats.bytes_forwarded += data.len() as u64;
        if frame.is_some() {
            self.stats.frames += 1;
        } else {
            self.stats.malformed += 1;
        }

        Ok(Some(Segment { data, frame }))
    }

    /// Stop processing; later pushes are ignored
    ///
    /// Returns the number of pending bytes that were discarded.
    pub fn close(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.closed = true;
        discarded
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes waiting for a boundary
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The boundary this demuxer splits on
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Counters since creation
    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
    const TOKEN: &[u8] = b"--BOUND\r\n";

    fn demuxer() -> Demuxer {
        Demuxer::new(Boundary::new("BOUND"), 1024 * 1024)
    }

    fn part(payload: &[u8]) -> Vec<u8> {
        let mut data = SOI.to_vec();
        data.extend_from_slice(payload);
        data.extend_from_slice(TOKEN);
        data
    }

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut data = SOI.to_vec();
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn test_reference_sequence() {
        let mut demux = demuxer();

        assert!(demux.push(b"JUNK").unwrap().is_none());

        let first = demux.push(&part(b"IMG1DATA")).unwrap().unwrap();
        assert_eq!(first.frame.as_ref().unwrap().data, jpeg(b"IMG1DATA"));
        let mut expected = b"JUNK".to_vec();
        expected.extend_from_slice(&part(b"IMG1DATA"));
        assert_eq!(first.data, expected);

        let second = demux.push(&part(b"IMG2DATA")).unwrap().unwrap();
        assert_eq!(second.frame.as_ref().unwrap().data, jpeg(b"IMG2DATA"));
        assert_eq!(second.data, part(b"IMG2DATA"));

        assert_eq!(demux.stats().segments, 2);
        assert_eq!(demux.stats().frames, 2);
        assert_eq!(demux.pending_len(), 0);
    }

    #[test]
    fn test_frame_skips_part_headers() {
        let mut demux = demuxer();
        let mut data = b"Content-Type: image/jpeg\r\nContent-Length: 5\r\n\r\n".to_vec();
        data.extend_from_slice(&part(b"AB"));

        let segment = demux.push(&data).unwrap().unwrap();
        assert_eq!(segment.frame.unwrap().data, jpeg(b"AB"));
        assert_eq!(segment.data, data);
    }

    #[test]
    fn test_no_boundary_withholds_bytes() {
        let mut demux = demuxer();

        assert!(demux.push(&jpeg(b"partial")).unwrap().is_none());
        assert_eq!(demux.pending_len(), 3 + 7);
        assert_eq!(demux.stats().bytes_forwarded, 0);
    }

    #[test]
    fn test_boundary_split_across_chunks() {
        let stream = [part(b"ONE"), part(b"TWO")].concat();
        let first_token_end = part(b"ONE").len();

        // Split inside the first token at every possible offset
        for cut in (first_token_end - TOKEN.len() + 1)..first_token_end {
            let mut demux = demuxer();

            assert!(demux.push(&stream[..cut]).unwrap().is_none(), "cut {}", cut);
            let segment = demux.push(&stream[cut..first_token_end]).unwrap().unwrap();
            assert_eq!(segment.data, part(b"ONE"));
            assert_eq!(segment.frame.unwrap().data, jpeg(b"ONE"));

            let segment = demux.push(&stream[first_token_end..]).unwrap().unwrap();
            assert_eq!(segment.data, part(b"TWO"));
            assert_eq!(demux.stats().segments, 2);
        }
    }

    #[test]
    fn test_multiple_boundaries_in_one_chunk() {
        let mut demux = demuxer();
        let mut data = [part(b"A"), part(b"B"), part(b"C")].concat();
        data.extend_from_slice(b"tail");

        let segment = demux.push(&data).unwrap().unwrap();

        // One segment up to the rightmost token, newest frame wins
        assert_eq!(segment.data.len(), data.len() - 4);
        assert_eq!(segment.frame.unwrap().data, jpeg(b"C"));
        assert_eq!(demux.pending_len(), 4);
    }

    #[test]
    fn test_malformed_part_still_forwarded() {
        let mut demux = demuxer();
        let mut data = b"no marker".to_vec();
        data.extend_from_slice(TOKEN);

        let segment = demux.push(&data).unwrap().unwrap();
        assert!(segment.frame.is_none());
        assert_eq!(
            segment.frame_error(),
            Some(DemuxError::MalformedFrame { len: data.len() })
        );
        assert_eq!(segment.data, data);
        assert_eq!(demux.stats().malformed, 1);
    }

    #[test]
    fn test_chunked_stream_delivers_prefix_up_to_last_boundary() {
        let stream = [
            b"preamble".to_vec(),
            part(b"first image"),
            part(b"second"),
            b"headers\r\n\r\n".to_vec(),
            part(b"third one is longer than the others"),
            jpeg(b"unterminated"),
        ]
        .concat();
        let last_boundary_end = stream.len() - jpeg(b"unterminated").len();

        for chunk_size in 1..=17 {
            let mut demux = demuxer();
            let mut delivered = Vec::new();

            for chunk in stream.chunks(chunk_size) {
                if let Some(segment) = demux.push(chunk).unwrap() {
                    delivered.extend_from_slice(&segment.data);
                }
            }

            assert_eq!(delivered, &stream[..last_boundary_end], "chunk size {}", chunk_size);
            assert_eq!(demux.pending_len(), stream.len() - last_boundary_end);
        }
    }

    #[test]
    fn test_overflow_discards_and_resyncs() {
        let mut demux = Demuxer::new(Boundary::new("BOUND"), 16);

        assert!(demux.push(&[0u8; 10]).unwrap().is_none());
        let err = demux.push(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DemuxError::BufferOverflow {
                pending: 20,
                limit: 16
            }
        );
        assert_eq!(demux.pending_len(), 0);
        assert_eq!(demux.stats().overflows, 1);

        let segment = demux.push(&part(b"ok")).unwrap().unwrap();
        assert_eq!(segment.frame.unwrap().data, jpeg(b"ok"));
    }

    #[test]
    fn test_closed_demuxer_ignores_input() {
        let mut demux = demuxer();
        demux.push(b"leftover").unwrap();

        assert_eq!(demux.close(), 8);
        assert!(demux.is_closed());
        assert!(demux.push(&part(b"late")).unwrap().is_none());
        assert_eq!(demux.stats().segments, 0);
    }

    #[test]
    fn test_frame_sequence_numbers() {
        let mut demux = demuxer();
        let first = demux.push(&part(b"1")).unwrap().unwrap();
        demux.push(b"bad--BOUND\r\n").unwrap();
        let third = demux.push(&part(b"3")).unwrap().unwrap();

        assert_eq!(first.frame.unwrap().sequence, 1);
        assert_eq!(third.frame.unwrap().sequence, 2);
    }
}
