//! Section decoding over raw buffers.
//!
//! [`header_info`] sizes the section found at an offset of a buffer, honoring the extended header form of the
//! section types that may carry it. [`SectionStream`] applies it repeatedly to walk the sections laid out in a
//! buffer.
//!
//! Two ways of stepping from one section to the next are supported. Decompressed buffers are walked with
//! [`Advance::Modulo`]: after a section ending at offset `n`, the walk resumes at `n + n % 4`, which only matches
//! the 4-byte alignment of the PI specification when `n` is even. Raw file buffers are walked with
//! [`Advance::Align`], which rounds up to the next 4-byte boundary.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_ffs::{pi::section::EXTENDED_SIZE_SENTINEL, section::SectionKind};

use crate::error::ParseError;

/// Length of the common section header.
pub const COMMON_HEADER_LEN: usize = 4;
/// Length of the common section header when the extended size follows it.
pub const EXTENDED_HEADER_LEN: usize = 8;

const RESERVED_EXTENDED_SIZE: u32 = 0xFFFF_FFFF;

/// Kind and extent of a section, as read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    pub kind: SectionKind,
    pub header_length: usize,
    pub total_length: usize,
}

/// Read the header of the section at `offset` in `buffer`.
///
/// For section types outside the extended-capable set the 24-bit size is clamped to the bytes remaining in
/// `buffer`. The returned lengths are otherwise not checked against the buffer; see [`decode_section`].
pub fn header_info(buffer: &[u8], offset: usize) -> Result<SectionInfo, ParseError> {
    let header = offset
        .checked_add(COMMON_HEADER_LEN)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(ParseError::TruncatedHeader { offset })?;

    let size = u32::from_le_bytes([header[0], header[1], header[2], 0]);
    let kind = SectionKind::from(header[3]);

    if !kind.supports_extended_header() {
        let remaining = buffer.len() - offset;
        return Ok(SectionInfo {
            kind,
            header_length: COMMON_HEADER_LEN,
            total_length: (size as usize).min(remaining),
        });
    }

    if size != EXTENDED_SIZE_SENTINEL {
        return Ok(SectionInfo { kind, header_length: COMMON_HEADER_LEN, total_length: size as usize });
    }

    let extended = buffer
        .get(offset + COMMON_HEADER_LEN..offset + EXTENDED_HEADER_LEN)
        .ok_or(ParseError::TruncatedHeader { offset })?;
    let extended_size = u32::from_le_bytes([extended[0], extended[1], extended[2], extended[3]]);
    if extended_size == RESERVED_EXTENDED_SIZE {
        Err(ParseError::ReservedExtendedSize { offset })?;
    }
    Ok(SectionInfo { kind, header_length: EXTENDED_HEADER_LEN, total_length: extended_size as usize })
}

/// A section located in a buffer. Borrows the section bytes, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSection<'a> {
    info: SectionInfo,
    offset: usize,
    bytes: &'a [u8],
}

impl<'a> DecodedSection<'a> {
    pub fn kind(&self) -> SectionKind {
        self.info.kind
    }

    /// Offset of the section in the buffer it was decoded from.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn header_length(&self) -> usize {
        self.info.header_length
    }

    pub fn total_length(&self) -> usize {
        self.info.total_length
    }

    /// The whole section, header included.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The section bytes following the common header.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[self.info.header_length..]
    }
}

/// Decode the section at `offset` in `buffer`, rejecting sections that are empty, shorter than their header or
/// that overrun the buffer.
pub fn decode_section(buffer: &[u8], offset: usize) -> Result<DecodedSection<'_>, ParseError> {
    let info = header_info(buffer, offset)?;
    let length = info.total_length;
    if length == 0 {
        Err(ParseError::ZeroLength { offset })?;
    }
    if length < info.header_length {
        Err(ParseError::ShorterThanHeader { offset, length, header_length: info.header_length })?;
    }
    if length > buffer.len() - offset {
        Err(ParseError::Overrun { offset, length, buffer_length: buffer.len() })?;
    }
    Ok(DecodedSection { info, offset, bytes: &buffer[offset..offset + length] })
}

/// How a [`SectionStream`] steps past a decoded section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Resume at `end + end % 4`.
    Modulo,
    /// Resume at the next 4-byte aligned offset.
    Align,
}

impl Advance {
    fn next_offset(&self, end: usize) -> usize {
        match self {
            Advance::Modulo => end + end % 4,
            Advance::Align => (end + 3) & !3,
        }
    }
}

/// Iterates the sections of a buffer in ascending offset order.
///
/// The stream stops at the end of the buffer, or after yielding the first error.
#[derive(Debug, Clone)]
pub struct SectionStream<'a> {
    buffer: &'a [u8],
    offset: usize,
    advance: Advance,
    failed: bool,
}

impl<'a> SectionStream<'a> {
    /// Walk `buffer` from offset 0, stepping with [`Advance::Modulo`].
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0, advance: Advance::Modulo, failed: false }
    }

    /// Walk `buffer` from `start`, stepping to 4-byte aligned offsets.
    pub fn aligned(buffer: &'a [u8], start: usize) -> Self {
        Self { buffer, offset: start, advance: Advance::Align, failed: false }
    }
}

impl<'a> Iterator for SectionStream<'a> {
    type Item = Result<DecodedSection<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buffer.len() {
            return None;
        }
        match decode_section(self.buffer, self.offset) {
            Ok(section) => {
                log::trace!(
                    "{:?} section at {:#x}, {:#x} bytes",
                    section.kind(),
                    section.offset(),
                    section.total_length()
                );
                self.offset = self.advance.next_offset(self.offset + section.total_length());
                Some(Ok(section))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Decode every section of `buffer` from offset 0. See [`SectionStream::new`].
pub fn decode_sections(buffer: &[u8]) -> Result<Vec<DecodedSection<'_>>, ParseError> {
    SectionStream::new(buffer).collect()
}
