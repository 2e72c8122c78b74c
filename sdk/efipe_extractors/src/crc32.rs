//! Module for crc32 section verification.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_ffs::{
    pi::guid,
    section::{Section, SectionExtractor, SectionHeader},
    FirmwareFileSystemError,
};

/// Provides extraction for CRC32 sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32SectionExtractor {}

impl SectionExtractor for Crc32SectionExtractor {
    fn extract(&self, section: &Section) -> Result<Vec<u8>, FirmwareFileSystemError> {
        let crc_header = match section.header() {
            SectionHeader::GuidDefined(guid_header, crc_header)
                if guid_header.section_definition_guid == guid::CRC32_SECTION =>
            {
                crc_header
            }
            _ => return Err(FirmwareFileSystemError::Unsupported),
        };

        if crc_header.len() < 4 {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        let crc32 = u32::from_le_bytes([crc_header[0], crc_header[1], crc_header[2], crc_header[3]]);
        let content = section.content();
        if crc32 != crc32fast::hash(content) {
            log::warn!("CRC32 mismatch in {section:?}");
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        Ok(content.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use efipe_ffs::{compose, pi::section::raw_type};

    use super::*;

    fn crc32_section(payload: &[u8], crc: u32) -> Vec<u8> {
        compose::guid_defined_section(guid::CRC32_SECTION, &crc.to_le_bytes(), payload)
    }

    #[test]
    fn valid_crc_should_return_payload() -> Result<(), Box<dyn Error>> {
        let payload = compose::section(raw_type::RAW, b"checked");
        let bytes = crc32_section(&payload, crc32fast::hash(&payload));
        assert_eq!(Crc32SectionExtractor {}.extract(&Section::new_from_buffer(&bytes)?)?, payload);
        Ok(())
    }

    #[test]
    fn invalid_crc_should_be_rejected() -> Result<(), Box<dyn Error>> {
        let payload = compose::section(raw_type::RAW, b"checked");
        let bytes = crc32_section(&payload, crc32fast::hash(&payload) ^ 1);
        assert_eq!(
            Crc32SectionExtractor {}.extract(&Section::new_from_buffer(&bytes)?),
            Err(FirmwareFileSystemError::DataCorrupt)
        );

        let bytes = compose::guid_defined_section(guid::CRC32_SECTION, &[0, 1], &payload);
        assert_eq!(
            Crc32SectionExtractor {}.extract(&Section::new_from_buffer(&bytes)?),
            Err(FirmwareFileSystemError::DataCorrupt)
        );
        Ok(())
    }

    #[test]
    fn other_sections_should_be_unsupported() -> Result<(), Box<dyn Error>> {
        let bytes = compose::guid_defined_section(guid::LZMA_SECTION, &[], b"lzma");
        assert_eq!(
            Crc32SectionExtractor {}.extract(&Section::new_from_buffer(&bytes)?),
            Err(FirmwareFileSystemError::Unsupported)
        );
        Ok(())
    }
}
