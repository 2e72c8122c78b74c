//! Firmware File System (FFS) file parsing.
//!
//! `FileRef` is a zero-copy, read-only view over a serialized FFS file backed by a byte slice.
//! It exposes file metadata (name GUID, type, attributes) and the file's sections.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem, ptr};

use r_efi::efi;

use crate::{
    guid_string,
    pi::file::{self, raw::attributes, raw::r#type, raw::state},
    section::{Section, SectionIterator},
    FirmwareFileSystemError,
};

/// The declared type of a file, as far as executable extraction is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    /// EFI_FV_FILETYPE_APPLICATION
    Application,
    /// EFI_FV_FILETYPE_DRIVER
    Driver,
    /// EFI_FV_FILETYPE_MM
    Mm,
    /// EFI_FV_FILETYPE_PEIM
    Peim,
    /// Any other file type; carries the raw value.
    Other(u8),
}

impl From<u8> for FileKind {
    fn from(value: u8) -> Self {
        match value {
            r#type::APPLICATION => FileKind::Application,
            r#type::DRIVER => FileKind::Driver,
            r#type::MM => FileKind::Mm,
            r#type::PEIM => FileKind::Peim,
            other => FileKind::Other(other),
        }
    }
}

/// Zero-copy view over a Firmware File System (FFS) file backed by a byte slice.
///
/// Parsing via [`FileRef::new`] validates the header, state, and (optionally) the
/// data checksum. The lifetime `'a` ties the instance to the provided buffer.
#[derive(Clone)]
pub struct FileRef<'a> {
    data: &'a [u8],
    header: file::Header,
    erase_polarity: bool,
    content_offset: usize,
}

/// Size and content offset declared by the file header at the start of `buffer`, before any state or
/// checksum validation.
pub(crate) fn declared_size(buffer: &[u8]) -> Result<(usize, usize), FirmwareFileSystemError> {
    // Verify that buffer has enough storage for a file header.
    if buffer.len() < mem::size_of::<file::Header>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }

    // safety: buffer is large enough to contain file header.
    let header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const file::Header) };

    if (header.attributes & attributes::LARGE_FILE) == 0 {
        //standard header with 24-bit size.
        let mut size = [0u8; 4];
        size[0..3].copy_from_slice(&header.size);
        Ok((u32::from_le_bytes(size) as usize, mem::size_of::<file::Header>()))
    } else {
        //extended header with 64-bit size.
        if buffer.len() < mem::size_of::<file::Header2>() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        // safety: buffer is large enough to contain file header.
        let header2 = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const file::Header2) };
        let size = usize::try_from(header2.extended_size).map_err(|_| FirmwareFileSystemError::InvalidHeader)?;
        Ok((size, mem::size_of::<file::Header2>()))
    }
}

impl<'a> FileRef<'a> {
    /// Parse a byte slice as an FFS file and validate header/state/checksums.
    ///
    /// Errors
    /// - [`FirmwareFileSystemError::InvalidHeader`]: malformed header, size or header checksum.
    /// - [`FirmwareFileSystemError::InvalidState`]: file state not DATA_VALID.
    /// - [`FirmwareFileSystemError::DataCorrupt`]: data checksum mismatch.
    pub fn new(buffer: &'a [u8]) -> Result<Self, FirmwareFileSystemError> {
        let (size, content_offset) = declared_size(buffer)?;
        // safety: declared_size verified that buffer is large enough to contain file header.
        let header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const file::Header) };

        // Verify that the file holds its own header and fits within the buffer.
        if size < content_offset || size > buffer.len() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // Verify the state field. The erase polarity is inferred from the reserved high bit of the
        // state, which the PI spec requires to match EFI_FVB_ERASE_POLARITY. Only DATA_VALID files
        // are accepted.
        let erase_polarity = (header.state & 0x80) != 0;
        let state = if erase_polarity { !header.state } else { header.state };
        if state & 0xFC != state::DATA_VALID {
            Err(FirmwareFileSystemError::InvalidState)?;
        }

        // Verify the file header checksum.
        let sum = buffer[..content_offset].iter().fold(0u8, |sum, val| sum.wrapping_add(*val));
        let sum = sum.wrapping_sub(header.state);
        let sum = sum.wrapping_sub(header.integrity_check_file);
        if sum != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // Verify the file data checksum.
        if header.attributes & attributes::CHECKSUM == 0 {
            if header.integrity_check_file != 0xAA {
                Err(FirmwareFileSystemError::InvalidHeader)?;
            }
        } else {
            let sum = buffer[content_offset..size]
                .iter()
                .fold(header.integrity_check_file, |sum, val| sum.wrapping_add(*val));
            if sum != 0 {
                Err(FirmwareFileSystemError::DataCorrupt)?;
            }
        }

        Ok(Self { data: &buffer[..size], header, erase_polarity, content_offset })
    }

    /// Total serialized size of the file in bytes (header + content).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The file name GUID from the FFS header.
    pub fn name(&self) -> efi::Guid {
        self.header.name
    }

    /// The raw FFS file type byte.
    pub fn file_type_raw(&self) -> u8 {
        self.header.file_type
    }

    /// The declared file kind.
    pub fn kind(&self) -> FileKind {
        FileKind::from(self.header.file_type)
    }

    /// The raw attributes byte from the FFS header.
    pub fn attributes_raw(&self) -> u8 {
        self.header.attributes
    }

    /// The FFS header (for large files, the leading standard part).
    pub fn header(&self) -> &file::Header {
        &self.header
    }

    /// The file payload bytes (sections area), excluding the header.
    pub fn content(&self) -> &'a [u8] {
        &self.data[self.content_offset..]
    }

    /// Byte offset from the start of the file to the beginning of content.
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// The complete file bytes, including header and content.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Erase polarity encoded in the header; `true` for erase=1, `false` for erase=0.
    pub fn erase_polarity(&self) -> bool {
        self.erase_polarity
    }

    /// Parse the top-level sections contained in this file.
    pub fn sections(&self) -> Result<Vec<Section>, FirmwareFileSystemError> {
        SectionIterator::new(self.content()).collect()
    }
}

impl fmt::Debug for FileRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("name", &guid_string(&self.header.name))
            .field("file_type", &self.header.file_type)
            .field("size", &self.size())
            .field("content_offset", &self.content_offset)
            .field("erase_polarity", &self.erase_polarity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{
        compose::{self, FileBuilder},
        pi::section::raw_type,
        section::SectionKind,
    };

    fn guid() -> efi::Guid {
        efi::Guid::from_fields(0x76b6bdfa, 0x2acd, 0x4462, 0x9e, 0x3f, &[0xcb, 0x58, 0xc9, 0x69, 0xd9, 0x37])
    }

    #[test]
    fn file_should_parse_with_both_erase_polarities() -> Result<(), Box<dyn Error>> {
        for erase_polarity in [true, false] {
            let bytes = FileBuilder::new(guid(), r#type::DRIVER)
                .with_erase_polarity(erase_polarity)
                .with_section(compose::section(raw_type::RAW, b"hello"))
                .serialize();
            let file = FileRef::new(&bytes)?;
            assert_eq!(file.name(), guid());
            assert_eq!(file.kind(), FileKind::Driver);
            assert_eq!(file.erase_polarity(), erase_polarity);
            assert_eq!(file.content_offset(), 24);
            assert_eq!(file.size(), bytes.len());
            let sections = file.sections()?;
            assert_eq!(sections.len(), 1);
            assert_eq!(sections[0].content(), b"hello");
        }
        Ok(())
    }

    #[test]
    fn large_file_should_use_extended_header() -> Result<(), Box<dyn Error>> {
        let bytes = FileBuilder::new(guid(), r#type::APPLICATION)
            .with_large_file(true)
            .with_data_checksum(true)
            .with_section(compose::section(raw_type::PE32, &[0x4d, 0x5a, 0x90, 0x00]))
            .serialize();
        let file = FileRef::new(&bytes)?;
        assert_eq!(file.content_offset(), 32);
        assert_eq!(file.kind(), FileKind::Application);
        assert_eq!(file.sections()?[0].kind(), SectionKind::Pe32);
        Ok(())
    }

    #[test]
    fn trailing_bytes_should_not_be_part_of_the_file() -> Result<(), Box<dyn Error>> {
        let mut bytes =
            FileBuilder::new(guid(), r#type::PEIM).with_section(compose::section(raw_type::RAW, b"x")).serialize();
        let len = bytes.len();
        bytes.extend([0xff; 16]);
        assert_eq!(FileRef::new(&bytes)?.size(), len);
        Ok(())
    }

    #[test]
    fn corrupt_files_should_be_rejected() {
        let good = FileBuilder::new(guid(), r#type::DRIVER)
            .with_data_checksum(true)
            .with_section(compose::section(raw_type::RAW, b"payload"))
            .serialize();
        assert!(FileRef::new(&good).is_ok());

        // truncated.
        assert_eq!(FileRef::new(&good[..20]).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // header checksum.
        let mut bad = good.clone();
        bad[18] ^= 0x01;
        assert_eq!(FileRef::new(&bad).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // data checksum.
        let mut bad = good.clone();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        assert_eq!(FileRef::new(&bad).unwrap_err(), FirmwareFileSystemError::DataCorrupt);

        // deleted state (erase polarity 1: clearing a bit sets it).
        let mut bad = good.clone();
        bad[23] &= !0x10;
        assert_eq!(FileRef::new(&bad).unwrap_err(), FirmwareFileSystemError::InvalidState);

        // size larger than the buffer.
        let mut bad = good;
        bad[20] = 0xff;
        assert_eq!(FileRef::new(&bad).unwrap_err(), FirmwareFileSystemError::InvalidHeader);
    }

    #[test]
    fn file_kind_should_map_executable_types() {
        assert_eq!(FileKind::from(0x09), FileKind::Application);
        assert_eq!(FileKind::from(0x07), FileKind::Driver);
        assert_eq!(FileKind::from(0x0A), FileKind::Mm);
        assert_eq!(FileKind::from(0x06), FileKind::Peim);
        assert_eq!(FileKind::from(0x0B), FileKind::Other(0x0B));
    }
}
