//! Wire Format
//!
//! Arrow IPC streaming-format framing for frames received from `DoGet`.
//!
//! A Flight `DoGet` reply is a sequence of `FlightData` frames, each carrying
//! an optional IPC message header (flatbuffer) and an optional message body.
//! Concatenated with the right framing they form an IPC stream:
//!
//! ```text
//! [FF FF FF FF][i32 LE len][header ...][body ...]   one per message
//! [FF FF FF FF][00 00 00 00]                        end of stream
//! ```
//!
//! The reassembler forwards headers and bodies in the order received and never
//! inspects the flatbuffer; body length is implied by the header.

use std::io::Cursor;

use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;
use arrow_flight::FlightData;
use bytes::{Bytes, BytesMut};

use super::error::{BridgeError, BridgeResult};

/// Continuation marker preceding every IPC message length.
pub const CONTINUATION_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Terminator of an IPC stream: continuation marker followed by zero length.
pub const END_OF_STREAM: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00];

// ============================================================================
// Data Frame
// ============================================================================

/// One unit pushed by the retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFrame {
    /// IPC message header; present on schema, dictionary and batch messages
    pub header: Bytes,
    /// Record-batch payload belonging to the header
    pub body: Bytes,
}

impl DataFrame {
    pub fn new(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    pub fn header_only(header: impl Into<Bytes>) -> Self {
        Self::new(header, Bytes::new())
    }

    pub fn body_only(body: impl Into<Bytes>) -> Self {
        Self::new(Bytes::new(), body)
    }
}

impl From<FlightData> for DataFrame {
    fn from(data: FlightData) -> Self {
        Self {
            header: data.data_header,
            body: data.data_body,
        }
    }
}

// ============================================================================
// Wire Segment
// ============================================================================

/// A byte chunk emitted by the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireSegment {
    /// `FF FF FF FF`
    Continuation,
    /// Little-endian header length
    Length(i32),
    Header(Bytes),
    Body(Bytes),
    /// Zero length closing the stream
    EndOfStream,
}

impl WireSegment {
    /// Number of bytes this segment occupies on the wire
    pub fn len(&self) -> usize {
        match self {
            WireSegment::Continuation | WireSegment::Length(_) | WireSegment::EndOfStream => 4,
            WireSegment::Header(b) | WireSegment::Body(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            WireSegment::Continuation => Bytes::from_static(&CONTINUATION_MARKER),
            WireSegment::Length(len) => Bytes::copy_from_slice(&len.to_le_bytes()),
            WireSegment::Header(bytes) | WireSegment::Body(bytes) => bytes,
            WireSegment::EndOfStream => Bytes::from_static(&[0u8; 4]),
        }
    }
}

/// Concatenate segments into one contiguous buffer.
pub fn concat_segments(segments: impl IntoIterator<Item = WireSegment>) -> Bytes {
    let mut buf = BytesMut::new();
    for segment in segments {
        buf.extend_from_slice(&segment.into_bytes());
    }
    buf.freeze()
}

// ============================================================================
// Frame Reassembler
// ============================================================================

/// Per-frame transducer from `DataFrame`s to IPC stream segments.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    has_emitted_end: bool,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_emitted_end(&self) -> bool {
        self.has_emitted_end
    }

    /// Frame one upstream unit.
    ///
    /// A non-empty header becomes `[Continuation, Length, Header]`; a non-empty
    /// body follows unframed. Frames pushed after [`finish`](Self::finish)
    /// produce nothing.
    pub fn push(&mut self, frame: &DataFrame) -> BridgeResult<Vec<WireSegment>> {
        if self.has_emitted_end {
            tracing::warn!("frame_after_end_of_stream");
            return Ok(Vec::new());
        }

        let mut segments = Vec::with_capacity(4);
        if !frame.header.is_empty() {
            let len = i32::try_from(frame.header.len()).map_err(|_| {
                BridgeError::SegmentTooLarge {
                    len: frame.header.len(),
                }
            })?;
            segments.push(WireSegment::Continuation);
            segments.push(WireSegment::Length(len));
            segments.push(WireSegment::Header(frame.header.clone()));
        }
        if !frame.body.is_empty() {
            segments.push(WireSegment::Body(frame.body.clone()));
        }
        Ok(segments)
    }

    /// End-of-stream terminator, emitted at most once.
    pub fn finish(&mut self) -> Vec<WireSegment> {
        if self.has_emitted_end {
            return Vec::new();
        }
        self.has_emitted_end = true;
        vec![WireSegment::Continuation, WireSegment::EndOfStream]
    }
}

/// Reassemble a complete, finite frame sequence into one IPC stream buffer.
pub fn reassemble<'a>(frames: impl IntoIterator<Item = &'a DataFrame>) -> BridgeResult<Bytes> {
    let mut reassembler = FrameReassembler::new();
    let mut segments = Vec::new();
    for frame in frames {
        segments.extend(reassembler.push(frame)?);
    }
    segments.extend(reassembler.finish());
    Ok(concat_segments(segments))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode an assembled IPC stream back into record batches.
pub fn decode_stream(bytes: &[u8]) -> BridgeResult<(SchemaRef, Vec<RecordBatch>)> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn sample_frames() -> Vec<DataFrame> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
            ],
        )
        .unwrap();
        arrow_flight::utils::batches_to_flight_data(&schema, vec![batch])
            .unwrap()
            .into_iter()
            .map(DataFrame::from)
            .collect()
    }

    #[test]
    fn test_header_framing_layout() {
        let mut reassembler = FrameReassembler::new();
        let header = vec![7u8; 300];
        let segments = reassembler
            .push(&DataFrame::header_only(header.clone()))
            .unwrap();
        let bytes = concat_segments(segments);
        assert_eq!(&bytes[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[4..8], &300i32.to_le_bytes());
        assert_eq!(&bytes[8..], header.as_slice());
    }

    #[test]
    fn test_body_is_forwarded_unframed() {
        let mut reassembler = FrameReassembler::new();
        let segments = reassembler.push(&DataFrame::body_only(vec![1, 2, 3])).unwrap();
        assert_eq!(segments, vec![WireSegment::Body(Bytes::from(vec![1, 2, 3]))]);
    }

    #[test]
    fn test_header_precedes_body_in_same_frame() {
        let mut reassembler = FrameReassembler::new();
        let segments = reassembler
            .push(&DataFrame::new(vec![9u8; 8], vec![5u8; 16]))
            .unwrap();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], WireSegment::Continuation);
        assert_eq!(segments[1], WireSegment::Length(8));
        assert!(matches!(segments[2], WireSegment::Header(_)));
        assert!(matches!(segments[3], WireSegment::Body(_)));
    }

    #[test]
    fn test_empty_frame_emits_nothing() {
        let mut reassembler = FrameReassembler::new();
        assert!(reassembler.push(&DataFrame::default()).unwrap().is_empty());
    }

    #[test]
    fn test_finish_emits_terminator_once() {
        let mut reassembler = FrameReassembler::new();
        let end = concat_segments(reassembler.finish());
        assert_eq!(end.as_ref(), &END_OF_STREAM);
        assert!(reassembler.has_emitted_end());
        assert!(reassembler.finish().is_empty());
    }

    #[test]
    fn test_push_after_finish_is_dropped() {
        let mut reassembler = FrameReassembler::new();
        reassembler.finish();
        let segments = reassembler
            .push(&DataFrame::new(vec![1u8; 4], vec![2u8; 4]))
            .unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_empty_stream_is_only_terminator() {
        let bytes = reassemble(&[]).unwrap();
        assert_eq!(bytes.as_ref(), &END_OF_STREAM);
    }

    #[test]
    fn test_reassembled_flight_data_decodes() {
        let frames = sample_frames();
        let bytes = reassemble(&frames).unwrap();
        let (schema, batches) = decode_stream(&bytes).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 3);
        let names = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(names.is_null(1));
        assert_eq!(names.value(2), "c");
    }

    #[test]
    fn test_decode_rejects_truncated_stream() {
        let frames = sample_frames();
        let bytes = reassemble(&frames).unwrap();
        // Cut inside the first header
        assert!(decode_stream(&bytes[..12]).is_err());
    }

    #[test]
    fn test_segment_len() {
        assert_eq!(WireSegment::Continuation.len(), 4);
        assert_eq!(WireSegment::Length(12).len(), 4);
        assert_eq!(WireSegment::EndOfStream.len(), 4);
        assert_eq!(WireSegment::Body(Bytes::from_static(b"abc")).len(), 3);
    }

    fn arb_frame() -> impl Strategy<Value = DataFrame> {
        (
            proptest::collection::vec(any::<u8>(), 0..64),
            proptest::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(|(h, b)| DataFrame::new(h, b))
    }

    proptest! {
        #[test]
        fn prop_terminator_once_at_end(frames in proptest::collection::vec(arb_frame(), 0..16)) {
            let mut reassembler = FrameReassembler::new();
            let mut segments = Vec::new();
            for frame in &frames {
                segments.extend(reassembler.push(frame).unwrap());
            }
            segments.extend(reassembler.finish());

            let ends = segments.iter().filter(|s| **s == WireSegment::EndOfStream).count();
            prop_assert_eq!(ends, 1);
            prop_assert_eq!(segments.last(), Some(&WireSegment::EndOfStream));

            let bytes = concat_segments(segments);
            prop_assert!(bytes.ends_with(&END_OF_STREAM));
        }

        #[test]
        fn prop_output_length_matches_frames(frames in proptest::collection::vec(arb_frame(), 0..16)) {
            let expected: usize = frames
                .iter()
                .map(|f| {
                    let header = if f.header.is_empty() { 0 } else { 8 + f.header.len() };
                    header + f.body.len()
                })
                .sum::<usize>()
                + END_OF_STREAM.len();
            let bytes = reassemble(&frames).unwrap();
            prop_assert_eq!(bytes.len(), expected);
        }

        #[test]
        fn prop_every_header_is_prefixed(frames in proptest::collection::vec(arb_frame(), 0..16)) {
            let mut reassembler = FrameReassembler::new();
            for frame in &frames {
                let segments = reassembler.push(frame).unwrap();
                let mut expected = Vec::new();
                if !frame.header.is_empty() {
                    expected.push(WireSegment::Continuation);
                    expected.push(WireSegment::Length(frame.header.len() as i32));
                    expected.push(WireSegment::Header(frame.header.clone()));
                }
                if !frame.body.is_empty() {
                    expected.push(WireSegment::Body(frame.body.clone()));
                }
                prop_assert_eq!(&segments, &expected);

                if let Some(WireSegment::Header(header)) = segments.get(2) {
                    let bytes = concat_segments(segments.clone());
                    prop_assert_eq!(&bytes[0..4], &CONTINUATION_MARKER[..]);
                    prop_assert_eq!(&bytes[4..8], &(header.len() as i32).to_le_bytes()[..]);
                    prop_assert_eq!(&bytes[8..8 + header.len()], header.as_ref());
                }
            }
        }
    }
}
