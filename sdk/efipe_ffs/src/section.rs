//! Section parsing for UEFI Firmware File System (FFS) sections.
//!
//! This module models a single FFS section (leaf or encapsulation), parses it from raw bytes and
//! iterates the sections laid out back to back in a file or in an extracted encapsulation buffer.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem, ptr};

use crate::{
    align_up, guid_string,
    pi::section::{self, header, raw_type},
    FirmwareFileSystemError,
};

/// Extracts the payload of an encapsulation section into raw bytes.
///
/// An implementation should return:
/// - `Ok(Vec<u8>)` with the raw, concatenated sub-section bytes that can be parsed by
///   [`SectionIterator`] when extraction is supported and succeeds.
/// - `Err(FirmwareFileSystemError::Unsupported)` if the given section type or parameters are
///   not supported by the extractor. Callers treat this as "no extraction available".
/// - Any other `Err(..)` for hard failures.
#[cfg_attr(any(test, feature = "mockall"), mockall::automock)]
pub trait SectionExtractor {
    /// Attempt to extract the content of `section` into a raw byte buffer that contains zero or
    /// more serialized sub-sections.
    fn extract(&self, section: &Section) -> Result<Vec<u8>, FirmwareFileSystemError>;
}

/// Flavor of a dependency expression section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepexKind {
    /// Pre-EFI initialization dependency expression.
    Pei,
    /// Driver execution environment dependency expression.
    Dxe,
    /// Management mode dependency expression.
    Mm,
}

/// The kind of a section, decoded from the type byte of its common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    All,
    Compression,
    GuidDefined,
    Disposable,
    Pe32,
    Pic,
    Te,
    DependencyExpression(DepexKind),
    Version,
    UserInterface,
    Compatibility16,
    FirmwareVolumeImage,
    FreeformSubtypeGuid,
    Raw,
    /// A type byte outside of the architected set. Carries the raw value.
    Unknown(u8),
}

impl From<u8> for SectionKind {
    fn from(value: u8) -> Self {
        match value {
            raw_type::ALL => SectionKind::All,
            raw_type::COMPRESSION => SectionKind::Compression,
            raw_type::GUID_DEFINED => SectionKind::GuidDefined,
            raw_type::DISPOSABLE => SectionKind::Disposable,
            raw_type::PE32 => SectionKind::Pe32,
            raw_type::PIC => SectionKind::Pic,
            raw_type::TE => SectionKind::Te,
            raw_type::DXE_DEPEX => SectionKind::DependencyExpression(DepexKind::Dxe),
            raw_type::VERSION => SectionKind::Version,
            raw_type::USER_INTERFACE => SectionKind::UserInterface,
            raw_type::COMPATIBILITY16 => SectionKind::Compatibility16,
            raw_type::FIRMWARE_VOLUME_IMAGE => SectionKind::FirmwareVolumeImage,
            raw_type::FREEFORM_SUBTYPE_GUID => SectionKind::FreeformSubtypeGuid,
            raw_type::RAW => SectionKind::Raw,
            raw_type::PEI_DEPEX => SectionKind::DependencyExpression(DepexKind::Pei),
            raw_type::MM_DEPEX => SectionKind::DependencyExpression(DepexKind::Mm),
            other => SectionKind::Unknown(other),
        }
    }
}

impl SectionKind {
    /// The raw section type as stored in the common header.
    pub fn raw(&self) -> u8 {
        match self {
            SectionKind::All => raw_type::ALL,
            SectionKind::Compression => raw_type::COMPRESSION,
            SectionKind::GuidDefined => raw_type::GUID_DEFINED,
            SectionKind::Disposable => raw_type::DISPOSABLE,
            SectionKind::Pe32 => raw_type::PE32,
            SectionKind::Pic => raw_type::PIC,
            SectionKind::Te => raw_type::TE,
            SectionKind::DependencyExpression(DepexKind::Dxe) => raw_type::DXE_DEPEX,
            SectionKind::DependencyExpression(DepexKind::Pei) => raw_type::PEI_DEPEX,
            SectionKind::DependencyExpression(DepexKind::Mm) => raw_type::MM_DEPEX,
            SectionKind::Version => raw_type::VERSION,
            SectionKind::UserInterface => raw_type::USER_INTERFACE,
            SectionKind::Compatibility16 => raw_type::COMPATIBILITY16,
            SectionKind::FirmwareVolumeImage => raw_type::FIRMWARE_VOLUME_IMAGE,
            SectionKind::FreeformSubtypeGuid => raw_type::FREEFORM_SUBTYPE_GUID,
            SectionKind::Raw => raw_type::RAW,
            SectionKind::Unknown(raw) => *raw,
        }
    }

    /// Whether sections of this kind may carry the extended (8-byte) common header.
    ///
    /// Every architected kind may; type bytes outside of that set never do.
    pub fn supports_extended_header(&self) -> bool {
        !matches!(self, SectionKind::Unknown(_))
    }

    /// Whether this kind encapsulates further sections.
    pub fn is_encapsulation(&self) -> bool {
        matches!(self, SectionKind::Compression | SectionKind::GuidDefined | SectionKind::Disposable)
    }
}

/// Logical header representation for the section variants that carry a section-specific header.
#[derive(Debug, Clone)]
pub enum SectionHeader {
    /// Leaf section whose content immediately follows the common header.
    Standard,
    /// Encapsulation section with a compression header.
    Compression(header::Compression),
    /// GUID-defined encapsulation; `(header, guid_specific_data)`.
    GuidDefined(header::GuidDefined, Vec<u8>),
    /// Version info section.
    Version(header::Version),
    /// Freeform subtype GUID leaf section.
    FreeformSubtypeGuid(header::FreeformSubtypeGuid),
}

/// A parsed section. Owns a copy of its serialized bytes (header included).
#[derive(Clone)]
pub struct Section {
    kind: SectionKind,
    header: SectionHeader,
    data: Vec<u8>,
    common_header_len: usize,
    content_offset: usize,
}

impl Section {
    /// Parse a serialized section from the start of `buffer`.
    ///
    /// Validates the common and variant-specific headers. Bytes of `buffer` past the end of the
    /// section are ignored.
    pub fn new_from_buffer(buffer: &[u8]) -> Result<Self, FirmwareFileSystemError> {
        // Verify that the buffer has enough storage for a section header.
        if buffer.len() < mem::size_of::<section::Header>() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // Safety: buffer is large enough to contain the header.
        let common = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const section::Header) };

        // Determine section size and start of section content
        let (section_size, common_header_len) = {
            if common.size.iter().all(|&x| x == 0xff) {
                // size field is all 0xFF - this indicates extended header.
                let ext_header_size = mem::size_of::<section::ExtendedHeader>();
                if buffer.len() < ext_header_size {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                // Safety: buffer is large enough to contain extended header.
                let ext_header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const section::ExtendedHeader) };
                (ext_header.extended_size as usize, ext_header_size)
            } else {
                let mut size = [0u8; 4];
                size[0..3].copy_from_slice(&common.size);
                (u32::from_le_bytes(size) as usize, mem::size_of::<section::Header>())
            }
        };

        // A section must at least hold its own header and must fit inside the buffer.
        if section_size < common_header_len || buffer.len() < section_size {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let kind = SectionKind::from(common.section_type);
        let (header, content_offset) = match kind {
            SectionKind::Compression => {
                let compression: header::Compression = read_specific_header(buffer, common_header_len, section_size)?;
                (SectionHeader::Compression(compression), common_header_len + mem::size_of_val(&compression))
            }
            SectionKind::GuidDefined => {
                let guid_defined: header::GuidDefined = read_specific_header(buffer, common_header_len, section_size)?;
                // Guid-specific fields sit between the fixed header and data_offset.
                let fixed_end = common_header_len + mem::size_of::<header::GuidDefined>();
                let data_offset = guid_defined.data_offset as usize;
                if data_offset < fixed_end || data_offset > section_size {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                let guid_specific = buffer[fixed_end..data_offset].to_vec();
                (SectionHeader::GuidDefined(guid_defined, guid_specific), data_offset)
            }
            SectionKind::Version => {
                let version: header::Version = read_specific_header(buffer, common_header_len, section_size)?;
                (SectionHeader::Version(version), common_header_len + mem::size_of::<header::Version>())
            }
            SectionKind::FreeformSubtypeGuid => {
                let freeform: header::FreeformSubtypeGuid =
                    read_specific_header(buffer, common_header_len, section_size)?;
                (
                    SectionHeader::FreeformSubtypeGuid(freeform),
                    common_header_len + mem::size_of::<header::FreeformSubtypeGuid>(),
                )
            }
            //for all other types, the content immediately follows the common header.
            _ => (SectionHeader::Standard, common_header_len),
        };

        Ok(Section { kind, header, data: buffer[..section_size].to_vec(), common_header_len, content_offset })
    }

    /// The decoded section kind.
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Raw section type (see [`raw_type`]).
    pub fn section_type_raw(&self) -> u8 {
        self.kind.raw()
    }

    /// Borrow the variant-specific header of this section.
    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    /// The total serialized size of this section.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Length of the common header (4 bytes, or 8 for the extended form).
    pub fn common_header_len(&self) -> usize {
        self.common_header_len
    }

    /// Offset of the content from the start of the section, past any variant-specific header.
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// The serialized section, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The section content, past the common and variant-specific headers.
    pub fn content(&self) -> &[u8] {
        &self.data[self.content_offset..]
    }

    /// The display name carried by a user interface section.
    pub fn user_interface(&self) -> Option<String> {
        match self.kind {
            SectionKind::UserInterface => Some(decode_ucs2(self.content())),
            _ => None,
        }
    }

    /// The `(build_number, version_string)` pair carried by a version section.
    pub fn version(&self) -> Option<(u16, String)> {
        match &self.header {
            SectionHeader::Version(version) => Some((version.build_number, decode_ucs2(self.content()))),
            _ => None,
        }
    }
}

fn read_specific_header<T: Copy>(
    buffer: &[u8],
    offset: usize,
    section_size: usize,
) -> Result<T, FirmwareFileSystemError> {
    if section_size < offset + mem::size_of::<T>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    // Safety: the section (and thus the buffer) is large enough to hold the header at offset.
    Ok(unsafe { ptr::read_unaligned(buffer[offset..].as_ptr() as *const T) })
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Section");
        s.field("kind", &self.kind).field("size", &self.size()).field("content_offset", &self.content_offset);
        match &self.header {
            SectionHeader::Standard => (),
            SectionHeader::Compression(compression) => {
                let (compression_type, uncompressed_length) =
                    (compression.compression_type, compression.uncompressed_length);
                s.field("compression_type", &compression_type).field("uncompressed_length", &uncompressed_length);
            }
            SectionHeader::GuidDefined(guid_defined, _) => {
                s.field("section_definition_guid", &guid_string(&guid_defined.section_definition_guid))
                    .field("attributes", &guid_defined.attributes);
            }
            SectionHeader::Version(version) => {
                s.field("build_number", &version.build_number).field("version", &decode_ucs2(self.content()));
            }
            SectionHeader::FreeformSubtypeGuid(freeform) => {
                s.field("sub_type_guid", &guid_string(&freeform.sub_type_guid));
            }
        }
        if let Some(name) = self.user_interface() {
            s.field("name", &name);
        }
        s.finish()
    }
}

impl TryFrom<&[u8]> for Section {
    type Error = FirmwareFileSystemError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Section::new_from_buffer(value)
    }
}

/// Decode a NUL-terminated UCS-2 (UTF-16LE) string. A trailing odd byte is ignored.
pub fn decode_ucs2(bytes: &[u8]) -> String {
    let chars: Vec<u16> =
        bytes.chunks_exact(2).map(|x| u16::from_le_bytes([x[0], x[1]])).take_while(|&c| c != 0).collect();
    String::from_utf16_lossy(&chars)
}

/// Parses a list of serialized sections from a raw byte slice.
///
/// Each call to the iterator yields the next parsed [`Section`]; sections start at 4-byte aligned
/// offsets relative to the start of the slice. Once an error occurs, iteration stops.
pub struct SectionIterator<'a> {
    data: &'a [u8],
    next_offset: usize,
    error: bool,
}

impl<'a> SectionIterator<'a> {
    /// Create a new iterator over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, next_offset: 0, error: false }
    }
}

impl Iterator for SectionIterator<'_> {
    type Item = Result<Section, FirmwareFileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error {
            return None;
        }

        if self.next_offset >= self.data.len() {
            return None;
        }

        let result = Section::new_from_buffer(&self.data[self.next_offset..]);
        match result {
            Ok(ref section) => match align_up(self.next_offset + section.size(), 4) {
                Some(next_offset) => self.next_offset = next_offset,
                None => {
                    self.error = true;
                    return Some(Err(FirmwareFileSystemError::DataCorrupt));
                }
            },
            Err(_) => self.error = true,
        }
        Some(result)
    }
}
