//! Serialization of sections, files and firmware volumes.
//!
//! These builders produce well-formed FFS structures (correct sizes, alignment, checksums and
//! state bits). They are used to craft images for tests and sample firmware.
//!
//! ## Examples
//!
//! ```rust
//! use efipe_ffs::compose::{self, FileBuilder, VolumeBuilder};
//! use efipe_ffs::pi::{file::raw::r#type, section::raw_type};
//! use efipe_ffs::volume::VolumeRef;
//! use r_efi::efi;
//!
//! let file = FileBuilder::new(efi::Guid::from_bytes(&[1u8; 16]), r#type::DRIVER)
//!     .with_section(compose::user_interface_section("Sample"))
//!     .with_section(compose::section(raw_type::PE32, &[0u8; 16]))
//!     .serialize();
//! let fv = VolumeBuilder::new().with_file(file).serialize();
//! let volume = VolumeRef::new(&fv).unwrap();
//! assert_eq!(volume.files().count(), 1);
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{iter, mem};

use r_efi::efi;

use crate::pi::{
    file::{self, raw::attributes, raw::state},
    fv, guid,
    section::{self, raw_type},
};

const MAX_STANDARD_SECTION_SIZE: usize = 0x00FF_FFFF;

/// Serialize a section of type `section_type` around `content`.
///
/// The extended common header is emitted when the section does not fit the 24-bit size field.
pub fn section(section_type: u8, content: &[u8]) -> Vec<u8> {
    let section_size = mem::size_of::<section::Header>() + content.len();
    if section_size >= MAX_STANDARD_SECTION_SIZE {
        return extended_section(section_type, content);
    }
    let mut data = (section_size as u32).to_le_bytes()[0..3].to_vec();
    data.push(section_type);
    data.extend_from_slice(content);
    data
}

/// Serialize a section that always uses the 8-byte extended common header.
pub fn extended_section(section_type: u8, content: &[u8]) -> Vec<u8> {
    let section_size = mem::size_of::<section::ExtendedHeader>() + content.len();
    let mut data = vec![0xff, 0xff, 0xff, section_type];
    data.extend((section_size as u32).to_le_bytes());
    data.extend_from_slice(content);
    data
}

/// Serialize a compression section. `payload` follows the 5-byte compression header verbatim.
pub fn compression_section(compression_type: u8, uncompressed_length: u32, payload: &[u8]) -> Vec<u8> {
    let mut content = uncompressed_length.to_le_bytes().to_vec();
    content.push(compression_type);
    content.extend_from_slice(payload);
    section(raw_type::COMPRESSION, &content)
}

/// Serialize a compression section whose payload is stored uncompressed.
pub fn stored_section(payload: &[u8]) -> Vec<u8> {
    compression_section(section::NOT_COMPRESSED, payload.len() as u32, payload)
}

/// Serialize a GUID-defined section with the given guid-specific header fields.
pub fn guid_defined_section(definition: efi::Guid, guid_specific: &[u8], payload: &[u8]) -> Vec<u8> {
    let data_offset = mem::size_of::<section::Header>()
        + mem::size_of::<section::header::GuidDefined>()
        + guid_specific.len();
    let mut content = definition.as_bytes().to_vec();
    content.extend((data_offset as u16).to_le_bytes());
    // EFI_GUIDED_SECTION_PROCESSING_REQUIRED
    content.extend(0x0001u16.to_le_bytes());
    content.extend_from_slice(guid_specific);
    content.extend_from_slice(payload);
    section(raw_type::GUID_DEFINED, &content)
}

/// Serialize a user interface section carrying `name`.
pub fn user_interface_section(name: &str) -> Vec<u8> {
    section(raw_type::USER_INTERFACE, &ucs2(name))
}

/// Serialize a version section carrying `build_number` and `version`.
pub fn version_section(build_number: u16, version: &str) -> Vec<u8> {
    let mut content = build_number.to_le_bytes().to_vec();
    content.extend(ucs2(version));
    section(raw_type::VERSION, &content)
}

/// Serialize a firmware volume image section wrapping `volume`.
pub fn volume_image_section(volume: &[u8]) -> Vec<u8> {
    section(raw_type::FIRMWARE_VOLUME_IMAGE, volume)
}

/// Encode `text` as NUL-terminated UCS-2.
pub fn ucs2(text: &str) -> Vec<u8> {
    text.encode_utf16().chain(iter::once(0)).flat_map(u16::to_le_bytes).collect()
}

/// Concatenate serialized sections, zero padding each to the next 4-byte boundary.
///
/// No padding is added after the last section.
pub fn sections(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut content = Vec::new();
    let mut section_iter = sections.iter().peekable();
    while let Some(section) = section_iter.next() {
        content.extend_from_slice(section);
        if section_iter.peek().is_some() && content.len() % 4 != 0 {
            //Per PI 1.8A volume 3 section 2.2.4, pad byte is always zero.
            content.extend(iter::repeat(0u8).take(4 - content.len() % 4));
        }
    }
    content
}

/// Builds a serialized FFS file from sections.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    name: efi::Guid,
    file_type: u8,
    attributes: u8,
    erase_polarity: bool,
    state: u8,
    content: Vec<u8>,
    sections: Vec<Vec<u8>>,
}

impl FileBuilder {
    /// Create a new, empty file with the given name and raw type.
    pub fn new(name: efi::Guid, file_type: u8) -> Self {
        Self {
            name,
            file_type,
            attributes: 0,
            erase_polarity: true,
            state: state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID,
            content: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Append a serialized section.
    pub fn with_section(mut self, section: Vec<u8>) -> Self {
        self.sections.push(section);
        self
    }

    /// Append raw bytes after the sections, as found in files that are not section based.
    pub fn with_raw_content(mut self, content: &[u8]) -> Self {
        self.content.extend_from_slice(content);
        self
    }

    /// Enable or disable the data checksum attribute.
    pub fn with_data_checksum(mut self, checksum: bool) -> Self {
        if checksum {
            self.attributes |= attributes::CHECKSUM;
        } else {
            self.attributes &= !attributes::CHECKSUM;
        }
        self
    }

    /// Force the large file (64-bit size) header.
    pub fn with_large_file(mut self, large: bool) -> Self {
        if large {
            self.attributes |= attributes::LARGE_FILE;
        } else {
            self.attributes &= !attributes::LARGE_FILE;
        }
        self
    }

    /// Set the erase polarity encoded in the state bits. `true` => erase=1.
    pub fn with_erase_polarity(mut self, erase_polarity: bool) -> Self {
        self.erase_polarity = erase_polarity;
        self
    }

    /// Replace the state bits, given as if the erase polarity were 0.
    pub fn with_state(mut self, state: u8) -> Self {
        self.state = state;
        self
    }

    /// Serialize the file with header, checksums and state.
    pub fn serialize(&self) -> Vec<u8> {
        let mut content = sections(&self.sections);
        content.extend_from_slice(&self.content);

        let large = (self.attributes & attributes::LARGE_FILE) != 0
            || content.len() > MAX_STANDARD_SECTION_SIZE - mem::size_of::<file::Header>();
        let header_len = if large { mem::size_of::<file::Header2>() } else { mem::size_of::<file::Header>() };
        let size = header_len + content.len();

        let mut header = self.name.as_bytes().to_vec();
        // integrity_check_header, integrity_check_file, type, attributes
        header.extend([0u8, 0u8, self.file_type, self.attributes | if large { attributes::LARGE_FILE } else { 0 }]);
        if large {
            header.extend([0u8; 3]);
        } else {
            header.extend(&(size as u32).to_le_bytes()[0..3]);
        }
        header.push(0); // state
        if large {
            header.extend((size as u64).to_le_bytes());
        }

        // header checksum excludes state and integrity_check_file, both zero at this point.
        let sum = header.iter().fold(0u8, |sum, value| sum.wrapping_add(*value));
        header[16] = 0u8.wrapping_sub(sum);

        header[17] = if self.attributes & attributes::CHECKSUM != 0 {
            0u8.wrapping_sub(content.iter().fold(0u8, |sum, value| sum.wrapping_add(*value)))
        } else {
            0xaa
        };

        let mut file_state = self.state;
        if self.erase_polarity {
            file_state = !file_state;
        }
        header[23] = file_state;

        header.extend(content);
        header
    }
}

/// Builds a serialized firmware volume from files.
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    file_system_guid: efi::Guid,
    attributes: u32,
    block_size: u32,
    fv_name: Option<efi::Guid>,
    files: Vec<Vec<u8>>,
}

impl Default for VolumeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeBuilder {
    /// An FFS2 volume with erase polarity 1 and 4 KiB blocks.
    pub fn new() -> Self {
        Self {
            file_system_guid: guid::FIRMWARE_FILE_SYSTEM2,
            attributes: fv::ERASE_POLARITY,
            block_size: 0x1000,
            fv_name: None,
            files: Vec::new(),
        }
    }

    /// Append a serialized file.
    pub fn with_file(mut self, file: Vec<u8>) -> Self {
        self.files.push(file);
        self
    }

    /// Set the file system GUID recorded in the header.
    pub fn with_file_system_guid(mut self, file_system_guid: efi::Guid) -> Self {
        self.file_system_guid = file_system_guid;
        self
    }

    /// Set the erase polarity attribute.
    pub fn with_erase_polarity(mut self, erase_polarity: bool) -> Self {
        if erase_polarity {
            self.attributes |= fv::ERASE_POLARITY;
        } else {
            self.attributes &= !fv::ERASE_POLARITY;
        }
        self
    }

    /// Add an extended header carrying the volume name.
    pub fn with_name(mut self, fv_name: efi::Guid) -> Self {
        self.fv_name = Some(fv_name);
        self
    }

    /// Serialize the volume. The volume length is rounded up to a whole number of blocks.
    pub fn serialize(&self) -> Vec<u8> {
        let erase_byte = if self.attributes & fv::ERASE_POLARITY != 0 { 0xffu8 } else { 0x00u8 };
        let header_length = mem::size_of::<fv::Header>() + 2 * mem::size_of::<fv::BlockMapEntry>();

        let mut body = Vec::new();
        let ext_header_offset = match self.fv_name {
            Some(fv_name) => {
                body.extend(fv_name.as_bytes());
                body.extend((mem::size_of::<fv::ExtHeader>() as u32).to_le_bytes());
                header_length as u16
            }
            None => 0,
        };

        for file in &self.files {
            // files start 8-byte aligned relative to the start of the volume.
            while (header_length + body.len()) % 8 != 0 {
                body.push(erase_byte);
            }
            body.extend_from_slice(file);
        }

        let block_size = self.block_size as usize;
        let used = header_length + body.len();
        let num_blocks = used.div_ceil(block_size).max(1);
        let fv_length = num_blocks * block_size;
        body.resize(fv_length - header_length, erase_byte);

        let mut volume = vec![0u8; 16];
        volume.extend(self.file_system_guid.as_bytes());
        volume.extend((fv_length as u64).to_le_bytes());
        volume.extend(fv::SIGNATURE.to_le_bytes());
        volume.extend(self.attributes.to_le_bytes());
        volume.extend((header_length as u16).to_le_bytes());
        volume.extend(0u16.to_le_bytes()); // checksum
        volume.extend(ext_header_offset.to_le_bytes());
        volume.push(0); // reserved
        volume.push(fv::FFS_REVISION);
        volume.extend((num_blocks as u32).to_le_bytes());
        volume.extend(self.block_size.to_le_bytes());
        volume.extend([0u8; 8]);

        let sum = volume.chunks_exact(2).fold(0u16, |sum, x| sum.wrapping_add(u16::from_le_bytes([x[0], x[1]])));
        volume[50..52].copy_from_slice(&0u16.wrapping_sub(sum).to_le_bytes());

        volume.extend(body);
        volume
    }
}
