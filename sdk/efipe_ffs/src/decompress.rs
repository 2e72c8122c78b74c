//! Decompression codec interface.
//!
//! Codecs follow the two-step contract of the UEFI decompress protocol: the caller first queries the
//! output and scratch sizes for a compressed source, allocates both buffers, then asks the codec to
//! fill the output buffer.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::FirmwareFileSystemError;

/// Buffer sizes required to decompress a given source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecompressInfo {
    /// Size of the decompressed output in bytes.
    pub output_size: usize,
    /// Size of the scratch buffer the codec needs while decompressing.
    pub scratch_size: usize,
}

/// A byte-level decompression codec.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait Decompressor {
    /// Determine the output and scratch buffer sizes for `source`.
    ///
    /// Fails if `source` does not start with a well-formed compressed stream header.
    fn query_info(&self, source: &[u8]) -> Result<DecompressInfo, FirmwareFileSystemError>;

    /// Decompress `source` into `destination`.
    ///
    /// `destination` and `scratch` must be sized as reported by [`Decompressor::query_info`].
    fn decompress(
        &self,
        source: &[u8],
        destination: &mut [u8],
        scratch: &mut [u8],
    ) -> Result<(), FirmwareFileSystemError>;
}
