//! Module for LZMA decompression.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::io::Cursor;

use efipe_ffs::{
    pi::guid,
    section::{Section, SectionExtractor, SectionHeader},
    FirmwareFileSystemError,
};

pub const LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

// Properties byte, dictionary size, then the unpacked size.
const LZMA_HEADER_SIZE: usize = 13;

/// Provides decompression for LZMA GUIDed sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzmaSectionExtractor;

impl SectionExtractor for LzmaSectionExtractor {
    fn extract(&self, section: &Section) -> Result<Vec<u8>, FirmwareFileSystemError> {
        if !matches!(section.header(),
            SectionHeader::GuidDefined(guid_header, _) if guid_header.section_definition_guid == guid::LZMA_SECTION)
        {
            return Err(FirmwareFileSystemError::Unsupported);
        }

        let data = section.content();
        if data.len() < LZMA_HEADER_SIZE {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }

        // Get unpacked size to pre-allocate vector, if available
        let mut unpacked_size = [0u8; 8];
        unpacked_size.copy_from_slice(&data[5..LZMA_HEADER_SIZE]);
        let unpacked_size = u64::from_le_bytes(unpacked_size);
        let mut decompressed = if unpacked_size == LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE {
            Vec::<u8>::new()
        } else {
            // the declared size is untrusted.
            Vec::<u8>::with_capacity((unpacked_size as usize).min(data.len().saturating_mul(64)))
        };

        lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut decompressed).map_err(|err| {
            log::debug!("lzma decompress of {:#x} byte section failed: {err:?}", data.len());
            FirmwareFileSystemError::DataCorrupt
        })?;

        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use efipe_ffs::{compose, pi::section::raw_type};

    use super::*;

    fn lzma(data: &[u8]) -> Result<Vec<u8>, Box<dyn Error>> {
        let mut compressed = Vec::new();
        lzma_rs::lzma_compress(&mut Cursor::new(data), &mut compressed)?;
        Ok(compressed)
    }

    #[test]
    fn lzma_section_should_be_extracted() -> Result<(), Box<dyn Error>> {
        let payload = compose::sections(&[
            compose::user_interface_section("Compressed"),
            compose::section(raw_type::PE32, &[0x5a; 512]),
        ]);
        let bytes = compose::guid_defined_section(guid::LZMA_SECTION, &[], &lzma(&payload)?);
        assert_eq!(LzmaSectionExtractor.extract(&Section::new_from_buffer(&bytes)?)?, payload);
        Ok(())
    }

    #[test]
    fn corrupt_lzma_section_should_be_rejected() -> Result<(), Box<dyn Error>> {
        let bytes = compose::guid_defined_section(guid::LZMA_SECTION, &[], &[0x5d, 0, 0]);
        assert_eq!(
            LzmaSectionExtractor.extract(&Section::new_from_buffer(&bytes)?),
            Err(FirmwareFileSystemError::DataCorrupt)
        );
        Ok(())
    }

    #[test]
    fn other_sections_should_be_unsupported() -> Result<(), Box<dyn Error>> {
        let bytes = compose::stored_section(b"plain");
        assert_eq!(
            LzmaSectionExtractor.extract(&Section::new_from_buffer(&bytes)?),
            Err(FirmwareFileSystemError::Unsupported)
        );
        Ok(())
    }
}
