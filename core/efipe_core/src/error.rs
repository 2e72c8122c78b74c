//! Error types for executable extraction.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_ffs::FirmwareFileSystemError;
use thiserror::Error;

/// A malformed or truncated section.
///
/// Offsets are relative to the start of the buffer being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated section header at offset {offset:#x}")]
    TruncatedHeader { offset: usize },
    #[error("section at offset {offset:#x} carries the reserved all-ones extended size")]
    ReservedExtendedSize { offset: usize },
    #[error("zero length section at offset {offset:#x}")]
    ZeroLength { offset: usize },
    #[error("section at offset {offset:#x} is {length:#x} bytes, shorter than its {header_length} byte header")]
    ShorterThanHeader { offset: usize, length: usize, header_length: usize },
    #[error("section at offset {offset:#x} of {length:#x} bytes overruns the {buffer_length:#x} byte buffer")]
    Overrun { offset: usize, length: usize, buffer_length: usize },
    #[error("compression section payload of {length} bytes is shorter than its 5 byte header")]
    TruncatedCompressionHeader { length: usize },
    #[error("version section at offset {offset:#x} is too short to hold a build number")]
    TruncatedVersion { offset: usize },
}

/// Failure to build an executable record from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("section compressed with unknown algorithm {0:#04x}")]
    UnknownCompressionAlgorithm(u8),
    #[error("codec rejected the compressed stream header: {0}")]
    Info(FirmwareFileSystemError),
    #[error("codec failed to decompress: {0}")]
    Codec(FirmwareFileSystemError),
    #[error("compression sections nested deeper than {0} levels")]
    RecursionLimitExceeded(usize),
}
