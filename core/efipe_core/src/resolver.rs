//! Compression section payload resolution.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::borrow::Cow;

use efipe_ffs::{
    decompress::Decompressor,
    pi::section::{NOT_COMPRESSED, STANDARD_COMPRESSION},
    FirmwareFileSystemError,
};

use crate::error::{ExtractError, ParseError};

// Declared decompressed size (u32) followed by the algorithm selector (u8).
const COMPRESSION_HEADER_LEN: usize = 5;

// Output bytes per compressed byte accepted from a codec before any buffer is allocated.
const MAX_EXPANSION_RATIO: usize = 4096;

/// Turns the payload of a compression section into the section stream it encloses.
#[derive(Clone, Copy)]
pub struct CompressionResolver<'d> {
    decompressor: &'d dyn Decompressor,
}

impl<'d> CompressionResolver<'d> {
    pub fn new(decompressor: &'d dyn Decompressor) -> Self {
        Self { decompressor }
    }

    /// Resolve `payload`, the bytes following the common header of a compression section.
    ///
    /// Stored payloads are returned borrowed. Standard payloads are decompressed with the codec into a new
    /// buffer. The declared decompressed size is not consulted. Output or scratch sizes from the codec larger
    /// than 4096 times the compressed length are rejected as an info failure before anything is allocated.
    pub fn resolve<'s>(&self, payload: &'s [u8]) -> Result<Cow<'s, [u8]>, ExtractError> {
        if payload.len() < COMPRESSION_HEADER_LEN {
            Err(ParseError::TruncatedCompressionHeader { length: payload.len() })?;
        }
        let source = &payload[COMPRESSION_HEADER_LEN..];

        match payload[4] {
            NOT_COMPRESSED => Ok(Cow::Borrowed(source)),
            STANDARD_COMPRESSION => {
                let info = self.decompressor.query_info(source).map_err(ExtractError::Info)?;
                if info.output_size > source.len().saturating_mul(MAX_EXPANSION_RATIO)
                    || info.scratch_size > source.len().saturating_mul(MAX_EXPANSION_RATIO)
                {
                    log::warn!(
                        "codec reports {:#x} output and {:#x} scratch bytes for {:#x} compressed bytes",
                        info.output_size,
                        info.scratch_size,
                        source.len()
                    );
                    Err(ExtractError::Info(FirmwareFileSystemError::DataCorrupt))?;
                }
                log::debug!(
                    "decompressing {:#x} bytes into {:#x} (scratch {:#x})",
                    source.len(),
                    info.output_size,
                    info.scratch_size
                );
                let mut output = vec![0u8; info.output_size];
                let mut scratch = vec![0u8; info.scratch_size];
                self.decompressor.decompress(source, &mut output, &mut scratch).map_err(ExtractError::Codec)?;
                Ok(Cow::Owned(output))
            }
            selector => Err(ExtractError::UnknownCompressionAlgorithm(selector)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use efipe_ffs::decompress::{DecompressInfo, MockDecompressor};
    use mockall::predicate::eq;

    use super::*;

    fn payload(selector: u8, data: &[u8]) -> Vec<u8> {
        let mut payload = (data.len() as u32).to_le_bytes().to_vec();
        payload.push(selector);
        payload.extend_from_slice(data);
        payload
    }

    #[test]
    fn stored_payload_should_be_borrowed_verbatim() -> Result<(), Box<dyn Error>> {
        let mut decompressor = MockDecompressor::new();
        decompressor.expect_query_info().never();
        decompressor.expect_decompress().never();

        let payload = payload(0, b"stored bytes");
        let resolved = CompressionResolver::new(&decompressor).resolve(&payload)?;
        assert!(matches!(resolved, Cow::Borrowed(_)));
        assert_eq!(&*resolved, &payload[5..]);
        Ok(())
    }

    #[test]
    fn standard_payload_should_go_through_the_codec() -> Result<(), Box<dyn Error>> {
        let compressed = b"compressed".to_vec();
        let mut decompressor = MockDecompressor::new();
        decompressor
            .expect_query_info()
            .with(eq(compressed.clone()))
            .times(1)
            .returning(|_| Ok(DecompressInfo { output_size: 6, scratch_size: 3 }));
        decompressor.expect_decompress().times(1).returning(|_, destination, scratch| {
            assert_eq!(scratch.len(), 3);
            destination.copy_from_slice(b"output");
            Ok(())
        });

        let payload = payload(1, &compressed);
        let resolved = CompressionResolver::new(&decompressor).resolve(&payload)?;
        assert!(matches!(resolved, Cow::Owned(_)));
        assert_eq!(&*resolved, b"output");
        Ok(())
    }

    #[test]
    fn codec_failures_should_be_reported() {
        let mut decompressor = MockDecompressor::new();
        decompressor.expect_query_info().returning(|_| Err(FirmwareFileSystemError::DataCorrupt));
        let payload = payload(1, b"bad");
        assert_eq!(
            CompressionResolver::new(&decompressor).resolve(&payload),
            Err(ExtractError::Info(FirmwareFileSystemError::DataCorrupt))
        );

        let mut decompressor = MockDecompressor::new();
        decompressor.expect_query_info().returning(|_| Ok(DecompressInfo { output_size: 4, scratch_size: 0 }));
        decompressor.expect_decompress().returning(|_, _, _| Err(FirmwareFileSystemError::DataCorrupt));
        assert_eq!(
            CompressionResolver::new(&decompressor).resolve(&payload),
            Err(ExtractError::Codec(FirmwareFileSystemError::DataCorrupt))
        );
    }

    #[test]
    fn implausible_output_size_should_fail_before_allocating() {
        let mut decompressor = MockDecompressor::new();
        decompressor
            .expect_query_info()
            .returning(|source| Ok(DecompressInfo { output_size: source.len() * 4096 + 1, scratch_size: 0 }));
        decompressor.expect_decompress().never();
        let payload = payload(1, b"tiny");
        assert_eq!(
            CompressionResolver::new(&decompressor).resolve(&payload),
            Err(ExtractError::Info(FirmwareFileSystemError::DataCorrupt))
        );

        let mut decompressor = MockDecompressor::new();
        decompressor
            .expect_query_info()
            .returning(|source| Ok(DecompressInfo { output_size: source.len() * 4096, scratch_size: 0 }));
        decompressor.expect_decompress().times(1).returning(|_, _, _| Ok(()));
        assert_eq!(CompressionResolver::new(&decompressor).resolve(&payload).map(|output| output.len()), Ok(4 * 4096));
    }

    #[test]
    fn unknown_selector_should_fail() {
        let decompressor = MockDecompressor::new();
        let payload = payload(2, b"lzma?");
        assert_eq!(
            CompressionResolver::new(&decompressor).resolve(&payload),
            Err(ExtractError::UnknownCompressionAlgorithm(2))
        );
    }

    #[test]
    fn short_payload_should_fail() {
        let decompressor = MockDecompressor::new();
        assert_eq!(
            CompressionResolver::new(&decompressor).resolve(&[0, 0, 0, 0]),
            Err(ExtractError::Parse(ParseError::TruncatedCompressionHeader { length: 4 }))
        );
    }
}
