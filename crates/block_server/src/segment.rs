//! Delimiter-based segmentation of an inbound Put stream.
//!
//! The segmenter pulls frames from the request stream into a running buffer
//! and cuts blocks according to the delimiter policy. Whatever the policy,
//! concatenating the emitted segments in order reproduces the input stream
//! byte for byte.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use river_proto::block::{Delimiter, PutBlockRequest};
use tonic::Status;

/// Target block size. Blocks are exactly this large under `NONE`, and at
/// least this large (modulo the final block) under `LINE`/`JSON`.
pub const BLOCK_SIZE: usize = 8 * 1024 * 1024;

/// One emitted block: its bytes plus the half-open range it occupied in the
/// original stream.
pub struct Segment {
    pub data: Bytes,
    pub lower: u64,
    pub upper: u64,
}

pub struct Segmenter {
    delimiter: Delimiter,
    buf: BytesMut,
    /// Stream offset of `buf[0]`.
    offset: u64,
    eof: bool,
    block_size: usize,
}

impl Segmenter {
    pub fn new(delimiter: Delimiter, initial: Vec<u8>) -> Self {
        Self::with_block_size(delimiter, initial, BLOCK_SIZE)
    }

    fn with_block_size(delimiter: Delimiter, initial: Vec<u8>, block_size: usize) -> Self {
        Segmenter {
            delimiter,
            buf: BytesMut::from(initial.as_slice()),
            offset: 0,
            eof: false,
            block_size,
        }
    }

    /// Pulls frames from `source` until a block can be cut, or until EOF, in
    /// which case the remainder (possibly empty) is the final segment.
    pub async fn next_segment<S>(&mut self, source: &mut S) -> Result<Segment, Status>
    where
        S: Stream<Item = Result<PutBlockRequest, Status>> + Unpin,
    {
        loop {
            if let Some(split) = self.split_point() {
                return Ok(self.emit(split));
            }
            if self.eof {
                let rest = self.buf.len();
                return Ok(self.emit(rest));
            }
            match source.next().await {
                Some(frame) => self.buf.extend_from_slice(&frame?.value),
                None => self.eof = true,
            }
        }
    }

    /// Where to cut, if the buffer already holds a full block.
    fn split_point(&self) -> Option<usize> {
        if self.buf.len() < self.block_size {
            return None;
        }
        match self.delimiter {
            Delimiter::None => Some(self.block_size),
            // Never split a line: cut just past the last newline. A line
            // longer than the block size keeps accumulating until its
            // newline (or EOF) shows up.
            Delimiter::Line => self
                .buf
                .iter()
                .rposition(|&b| b == b'\n')
                .map(|idx| idx + 1),
            Delimiter::Json => self.last_json_boundary(),
        }
    }

    /// Byte offset just past the most recently completed top-level JSON
    /// value in the buffer. An undecodable tail keeps accumulating, the
    /// same way an over-long line does.
    fn last_json_boundary(&self) -> Option<usize> {
        let mut end = 0usize;
        let mut values = serde_json::Deserializer::from_slice(&self.buf)
            .into_iter::<serde_json::value::Value>();
        loop {
            match values.next() {
                Some(Ok(_)) => end = values.byte_offset(),
                Some(Err(_)) | None => break,
            }
        }
        (end > 0).then_some(end)
    }

    fn emit(&mut self, split: usize) -> Segment {
        let data = self.buf.split_to(split).freeze();
        let lower = self.offset;
        self.offset += data.len() as u64;
        Segment {
            data,
            lower,
            upper: self.offset,
        }
    }
}
