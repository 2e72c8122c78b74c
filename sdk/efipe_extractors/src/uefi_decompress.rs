//! Module for UEFI decompression.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_ffs::{
    decompress::{DecompressInfo, Decompressor},
    pi::{
        guid,
        section::{NOT_COMPRESSED, STANDARD_COMPRESSION},
    },
    section::{Section, SectionExtractor, SectionHeader},
    FirmwareFileSystemError,
};
use mu_rust_helpers::uefi_decompress::{decompress_into_with_algo, DecompressionAlgorithm};

// Output bytes one source byte can expand to; a match of at most 256 bytes takes at least two bits.
const MAX_EXPANSION_RATIO: usize = 1024;

/// The UEFI (EFI 1.1) decompression codec, or its TianoCompress variant.
///
/// Sources start with an 8-byte header holding the compressed and original sizes. The codec
/// needs no scratch memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UefiDecompressor {
    tiano: bool,
}

impl UefiDecompressor {
    /// The standard UEFI algorithm, used by compression sections.
    pub const fn new() -> Self {
        Self { tiano: false }
    }

    /// The TianoCompress variant, used by TianoCompress GUID-defined sections.
    pub const fn tiano() -> Self {
        Self { tiano: true }
    }

    fn algorithm(&self) -> DecompressionAlgorithm {
        if self.tiano {
            DecompressionAlgorithm::TianoDecompress
        } else {
            DecompressionAlgorithm::UefiDecompress
        }
    }

    /// Decompress `source` into a newly allocated buffer.
    pub fn decompress_to_vec(&self, source: &[u8]) -> Result<Vec<u8>, FirmwareFileSystemError> {
        let info = self.query_info(source)?;
        let mut destination = vec![0u8; info.output_size];
        let mut scratch = vec![0u8; info.scratch_size];
        self.decompress(source, &mut destination, &mut scratch)?;
        Ok(destination)
    }
}

impl Decompressor for UefiDecompressor {
    fn query_info(&self, source: &[u8]) -> Result<DecompressInfo, FirmwareFileSystemError> {
        //sanity check the src data
        if source.len() < 8 {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }

        let compressed_size = u32::from_le_bytes([source[0], source[1], source[2], source[3]]) as usize;
        if compressed_size > source.len() {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }

        let output_size = u32::from_le_bytes([source[4], source[5], source[6], source[7]]) as usize;
        if output_size > source.len().saturating_mul(MAX_EXPANSION_RATIO) {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        Ok(DecompressInfo { output_size, scratch_size: 0 })
    }

    fn decompress(
        &self,
        source: &[u8],
        destination: &mut [u8],
        _scratch: &mut [u8],
    ) -> Result<(), FirmwareFileSystemError> {
        decompress_into_with_algo(source, destination, self.algorithm()).map_err(|err| {
            log::debug!("uefi decompress of {:#x} byte source failed: {err:?}", source.len());
            FirmwareFileSystemError::DataCorrupt
        })
    }
}

/// Provides decompression for sections compressed with UEFI compression algorithm and TianoCompress GUIDed sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct UefiDecompressSectionExtractor {}

impl SectionExtractor for UefiDecompressSectionExtractor {
    fn extract(&self, section: &Section) -> Result<Vec<u8>, FirmwareFileSystemError> {
        let decompressor = match section.header() {
            SectionHeader::GuidDefined(guid_header, _)
                if guid_header.section_definition_guid == guid::TIANO_DECOMPRESS_SECTION =>
            {
                UefiDecompressor::tiano()
            }
            SectionHeader::Compression(compression_header) => {
                let compression_type = compression_header.compression_type;
                match compression_type {
                    //not compressed, so just return section data
                    NOT_COMPRESSED => return Ok(section.content().to_vec()),
                    STANDARD_COMPRESSION => UefiDecompressor::new(),
                    _ => Err(FirmwareFileSystemError::Unsupported)?,
                }
            }
            _ => return Err(FirmwareFileSystemError::Unsupported),
        };

        decompressor.decompress_to_vec(section.content())
    }
}
