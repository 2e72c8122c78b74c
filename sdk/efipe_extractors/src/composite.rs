//! Module for a composite of uefi, crc32 and lzma extraction.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_ffs::{
    section::{Section, SectionExtractor},
    FirmwareFileSystemError,
};

#[cfg(feature = "crc32")]
use crate::Crc32SectionExtractor;
#[cfg(feature = "lzma")]
use crate::LzmaSectionExtractor;
#[cfg(feature = "uefi_decompress")]
use crate::UefiDecompressSectionExtractor;

/// Provides a composite section extractor that combines all section extractors based on enabled feature flags.
#[derive(Debug, Clone, Copy)]
pub struct CompositeSectionExtractor {
    #[cfg(feature = "uefi_decompress")]
    uefi_decompress: UefiDecompressSectionExtractor,
    #[cfg(feature = "crc32")]
    crc32: Crc32SectionExtractor,
    #[cfg(feature = "lzma")]
    lzma: LzmaSectionExtractor,
}

impl Default for CompositeSectionExtractor {
    fn default() -> Self {
        Self {
            #[cfg(feature = "uefi_decompress")]
            uefi_decompress: UefiDecompressSectionExtractor {},
            #[cfg(feature = "crc32")]
            crc32: Crc32SectionExtractor {},
            #[cfg(feature = "lzma")]
            lzma: LzmaSectionExtractor {},
        }
    }
}

impl CompositeSectionExtractor {
    // The enabled extractors, in the order they are tried.
    fn extractors(&self) -> Vec<&dyn SectionExtractor> {
        let mut extractors: Vec<&dyn SectionExtractor> = Vec::new();
        #[cfg(feature = "uefi_decompress")]
        extractors.push(&self.uefi_decompress);
        #[cfg(feature = "crc32")]
        extractors.push(&self.crc32);
        #[cfg(feature = "lzma")]
        extractors.push(&self.lzma);
        extractors
    }
}

impl SectionExtractor for CompositeSectionExtractor {
    fn extract(&self, section: &Section) -> Result<Vec<u8>, FirmwareFileSystemError> {
        for extractor in self.extractors() {
            match extractor.extract(section) {
                Err(FirmwareFileSystemError::Unsupported) => continue,
                result => return result,
            }
        }
        log::trace!("no extractor for {section:?}");
        Err(FirmwareFileSystemError::Unsupported)
    }
}
