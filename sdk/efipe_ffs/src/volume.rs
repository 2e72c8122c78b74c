//! Firmware Volume (FV) parsing and inspection.
//!
//! `VolumeRef` is a zero-copy, read-only view over a serialized FV backed by a byte slice. It
//! validates FV headers and block maps and iterates the contained files per the PI specification.
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
    align_up,
    file::{declared_size, FileRef},
    pi::{
        file::{self, raw::r#type},
        fv, guid,
    },
    FirmwareFileSystemError,
};

/// Zero-copy view over a Firmware Volume (FV) backed by a byte slice.
///
/// Parsing via [`VolumeRef::new`] validates the FV header, optional extended
/// header, block map, and computes the content start offset.
pub struct VolumeRef<'a> {
    data: &'a [u8],
    fv_header: fv::Header,
    ext_header: Option<fv::ExtHeader>,
    block_map: Vec<fv::BlockMapEntry>,
    content_offset: usize,
}

impl<'a> VolumeRef<'a> {
    /// Parse a byte slice as a Firmware Volume and validate its metadata.
    ///
    /// Validates signature, header length, checksum, revision, filesystem GUID,
    /// extended header bounds, and block map structure. Bytes past `FvLength` are not part
    /// of the volume.
    pub fn new(buffer: &'a [u8]) -> Result<Self, FirmwareFileSystemError> {
        // Verify that buffer has enough storage for a volume header.
        if buffer.len() < mem::size_of::<fv::Header>() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // Safety: buffer is large enough to contain the header.
        let fv_header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const fv::Header) };

        // Signature must be ASCII '_FVH'
        if fv_header.signature != fv::SIGNATURE {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let header_length = fv_header.header_length as usize;
        // Header length must be large enough to hold the header, fit inside the buffer and be a
        // multiple of 2.
        if header_length < mem::size_of::<fv::Header>() || header_length > buffer.len() || header_length & 0x01 != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // Header checksum must be correct
        let sum = buffer[..header_length]
            .chunks_exact(2)
            .fold(0u16, |sum, value| sum.wrapping_add(u16::from_le_bytes([value[0], value[1]])));
        if sum != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        // revision: must be at least fv::FFS_REVISION
        if fv_header.revision < fv::FFS_REVISION {
            Err(FirmwareFileSystemError::Unsupported)?;
        }

        // file_system_guid: must be EFI_FIRMWARE_FILE_SYSTEM2_GUID or EFI_FIRMWARE_FILE_SYSTEM3_GUID.
        if fv_header.file_system_guid != guid::FIRMWARE_FILE_SYSTEM2
            && fv_header.file_system_guid != guid::FIRMWARE_FILE_SYSTEM3
        {
            Err(FirmwareFileSystemError::Unsupported)?;
        }

        // fv_length: must hold the header and fit in the buffer.
        if fv_header.fv_length < header_length as u64 || fv_header.fv_length > buffer.len() as u64 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        let fv_length = fv_header.fv_length as usize;

        //ext_header_offset: must be inside the fv
        if fv_header.ext_header_offset as usize > fv_length {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        //if ext_header is present, its size must fit inside the FV.
        let ext_header = {
            if fv_header.ext_header_offset != 0 {
                let ext_header_offset = fv_header.ext_header_offset as usize;
                if ext_header_offset + mem::size_of::<fv::ExtHeader>() > fv_length {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }

                //Safety: previous check ensures that the buffer is large enough to contain the ext_header
                let ext_header =
                    unsafe { ptr::read_unaligned(buffer[ext_header_offset..].as_ptr() as *const fv::ExtHeader) };
                if ext_header_offset + (ext_header.ext_header_size as usize) > fv_length {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                Some(ext_header)
            } else {
                None
            }
        };

        //block map fills the remainder of the fv header.
        let block_map = &buffer[mem::size_of::<fv::Header>()..header_length];

        //block map should be a multiple of 8 in size
        if block_map.len() & 0x7 != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let mut block_map = block_map
            .chunks_exact(8)
            .map(|x| fv::BlockMapEntry {
                num_blocks: u32::from_le_bytes([x[0], x[1], x[2], x[3]]),
                length: u32::from_le_bytes([x[4], x[5], x[6], x[7]]),
            })
            .collect::<Vec<_>>();

        //block map should terminate with zero entry
        if block_map.pop() != Some(fv::BlockMapEntry { num_blocks: 0, length: 0 }) {
            Err(FirmwareFileSystemError::InvalidBlockMap)?;
        }

        //there must be at least one entry and none of the others may be zero.
        if block_map.is_empty() || block_map.iter().any(|x| x == &fv::BlockMapEntry { num_blocks: 0, length: 0 }) {
            Err(FirmwareFileSystemError::InvalidBlockMap)?;
        }

        let content_offset = match &ext_header {
            // if ext header exists, then data starts after ext header
            Some(ext_header) => fv_header.ext_header_offset as usize + ext_header.ext_header_size as usize,
            // otherwise data starts after the fv_header.
            None => header_length,
        };

        // Files must be 8-byte aligned relative to the start of the FV.
        let content_offset = align_up(content_offset, 8).ok_or(FirmwareFileSystemError::InvalidHeader)?;

        Ok(Self { data: &buffer[..fv_length], fv_header, ext_header, block_map, content_offset })
    }

    /// The erase/pad byte used by this FV according to its attributes.
    ///
    /// Returns 0xFF when erase polarity is 1, otherwise 0x00.
    pub fn erase_byte(&self) -> u8 {
        if self.fv_header.attributes & fv::ERASE_POLARITY != 0 {
            0xff
        } else {
            0
        }
    }

    /// The Firmware Volume name GUID from the extended header, if available.
    pub fn fv_name(&self) -> Option<efi::Guid> {
        self.ext_header.map(|hdr| hdr.fv_name)
    }

    /// The parsed block map describing block counts and sizes within the FV.
    pub fn block_map(&self) -> &[fv::BlockMapEntry] {
        &self.block_map
    }

    /// The FV attributes bitfield (`EFI_FVB_ATTRIBUTES_2`).
    pub fn attributes(&self) -> u32 {
        self.fv_header.attributes
    }

    /// The file system GUID recorded in the header.
    pub fn file_system_guid(&self) -> efi::Guid {
        self.fv_header.file_system_guid
    }

    /// Total FV size in bytes (`FvLength`).
    pub fn size(&self) -> u64 {
        self.fv_header.fv_length
    }

    /// Iterate over contained FFS files as zero-copy [`FileRef`]s.
    ///
    /// PAD files are filtered out per PI spec. Parsing errors are surfaced as iterator items.
    pub fn files(&self) -> impl Iterator<Item = Result<FileRef<'a>, FirmwareFileSystemError>> {
        FileRefIter::new(&self.data[self.content_offset.min(self.data.len())..], self.erase_byte())
            .filter(|x| !matches!(x, Ok(file) if file.file_type_raw() == r#type::FFS_PAD))
    }
}

impl fmt::Debug for VolumeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeRef")
            .field("size", &self.data.len())
            .field("fv_header", &self.fv_header)
            .field("ext_header", &self.ext_header)
            .field("block_map", &self.block_map)
            .field("content_offset", &self.content_offset)
            .finish()
    }
}

impl<'a> TryFrom<&'a [u8]> for VolumeRef<'a> {
    type Error = FirmwareFileSystemError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        VolumeRef::new(value)
    }
}

struct FileRefIter<'a> {
    data: &'a [u8],
    next_offset: usize,
    erase_byte: u8,
    error: bool,
}

impl<'a> FileRefIter<'a> {
    fn new(data: &'a [u8], erase_byte: u8) -> Self {
        Self { data, next_offset: 0, erase_byte, error: false }
    }
}

impl<'a> Iterator for FileRefIter<'a> {
    type Item = Result<FileRef<'a>, FirmwareFileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error || self.next_offset > self.data.len() {
            return None;
        }
        let remaining = &self.data[self.next_offset..];
        if remaining.len() < mem::size_of::<file::Header>() {
            return None;
        }
        // free space starts where a header consists only of erase bytes.
        if remaining[..mem::size_of::<file::Header>()].iter().all(|&x| x == self.erase_byte) {
            return None;
        }
        let result = FileRef::new(remaining);
        match result {
            // the next file is located at the next 8-byte aligned offset following the last byte of this one.
            Ok(ref file) => match align_up(self.next_offset + file.size(), 8) {
                Some(next_offset) => self.next_offset = next_offset,
                None => {
                    self.error = true;
                    return Some(Err(FirmwareFileSystemError::DataCorrupt));
                }
            },
            // files in another state (deleted, marked for update) still declare their size and are stepped over.
            Err(FirmwareFileSystemError::InvalidState) => {
                match declared_size(remaining)
                    .ok()
                    .filter(|(size, content_offset)| size >= content_offset && *size <= remaining.len())
                    .and_then(|(size, _)| align_up(self.next_offset + size, 8))
                {
                    Some(next_offset) => self.next_offset = next_offset,
                    None => self.error = true,
                }
            }
            Err(_) => self.error = true,
        }
        Some(result)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use log::{self, Level, LevelFilter, Metadata, Record};

    use super::*;
    use crate::{
        compose::{self, FileBuilder, VolumeBuilder},
        file::FileKind,
        pi::{file::raw::state, section::raw_type},
    };

    // Sample logger for log crate to dump stuff in tests
    struct SimpleLogger;
    impl log::Log for SimpleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                println!("{}", record.args());
            }
        }

        fn flush(&self) {}
    }
    static LOGGER: SimpleLogger = SimpleLogger;

    fn set_logger() {
        let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
    }

    fn sample_file(seed: u8, file_type: u8) -> Vec<u8> {
        FileBuilder::new(efi::Guid::from_bytes(&[seed; 16]), file_type)
            .with_section(compose::user_interface_section("Sample"))
            .with_section(compose::section(raw_type::PE32, &[seed; 13]))
            .serialize()
    }

    fn sample_volume() -> Vec<u8> {
        VolumeBuilder::new()
            .with_file(sample_file(1, r#type::DRIVER))
            .with_file(FileBuilder::new(efi::Guid::from_bytes(&[0xff; 16]), r#type::FFS_PAD).serialize())
            .with_file(sample_file(2, r#type::APPLICATION))
            .serialize()
    }

    #[test]
    fn test_firmware_volume() -> Result<(), Box<dyn Error>> {
        set_logger();
        let fv_bytes = sample_volume();
        let fv = VolumeRef::new(&fv_bytes)?;
        assert_eq!(fv.size(), fv_bytes.len() as u64);
        assert_eq!(fv.erase_byte(), 0xff);
        assert_eq!(fv.block_map(), &[fv::BlockMapEntry { num_blocks: 1, length: 0x1000 }]);
        assert_eq!(fv.fv_name(), None);

        let files = fv.files().collect::<Result<Vec<_>, _>>()?;
        let kinds: Vec<_> = files.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, vec![FileKind::Driver, FileKind::Application]);
        assert_eq!(files[1].name(), efi::Guid::from_bytes(&[2; 16]));
        Ok(())
    }

    #[test]
    fn volume_with_ext_header_should_expose_name() -> Result<(), Box<dyn Error>> {
        let name = efi::Guid::from_bytes(&[0x5a; 16]);
        let fv_bytes = VolumeBuilder::new().with_name(name).with_file(sample_file(3, r#type::DRIVER)).serialize();
        let fv = VolumeRef::new(&fv_bytes)?;
        assert_eq!(fv.fv_name(), Some(name));
        assert_eq!(fv.files().count(), 1);
        Ok(())
    }

    #[test]
    fn volume_with_zero_erase_polarity_should_stop_at_free_space() -> Result<(), Box<dyn Error>> {
        let file = FileBuilder::new(efi::Guid::from_bytes(&[4; 16]), r#type::DRIVER)
            .with_erase_polarity(false)
            .with_section(compose::section(raw_type::PE32, &[1, 2, 3]))
            .serialize();
        let fv_bytes = VolumeBuilder::new().with_erase_polarity(false).with_file(file).serialize();
        let fv = VolumeRef::new(&fv_bytes)?;
        assert_eq!(fv.erase_byte(), 0);
        assert_eq!(fv.files().count(), 1);
        Ok(())
    }

    #[test]
    fn trailing_data_should_not_be_part_of_the_volume() -> Result<(), Box<dyn Error>> {
        let mut fv_bytes = sample_volume();
        let len = fv_bytes.len();
        fv_bytes.extend(sample_volume());
        let fv = VolumeRef::new(&fv_bytes)?;
        assert_eq!(fv.size(), len as u64);
        assert_eq!(fv.files().count(), 2);
        Ok(())
    }

    #[test]
    fn test_malformed_firmware_volume() {
        set_logger();
        let good = sample_volume();

        // bogus signature.
        let mut fv_bytes = good.clone();
        fv_bytes[40] ^= 0xff;
        assert_eq!(VolumeRef::new(&fv_bytes).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // bogus header_length.
        let mut fv_bytes = good.clone();
        fv_bytes[48..50].copy_from_slice(&0u16.to_le_bytes());
        assert_eq!(VolumeRef::new(&fv_bytes).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // bogus checksum.
        let mut fv_bytes = good.clone();
        fv_bytes[50] ^= 0x5a;
        assert_eq!(VolumeRef::new(&fv_bytes).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // truncated buffer.
        assert_eq!(VolumeRef::new(&good[..good.len() - 1]).unwrap_err(), FirmwareFileSystemError::InvalidHeader);

        // unknown file system.
        let fv_bytes = VolumeBuilder::new().with_file_system_guid(efi::Guid::from_bytes(&[0xa5; 16])).serialize();
        assert_eq!(VolumeRef::new(&fv_bytes).unwrap_err(), FirmwareFileSystemError::Unsupported);
    }

    #[test]
    fn files_in_other_states_should_be_stepped_over() -> Result<(), Box<dyn Error>> {
        let live = state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID;
        let fv_bytes = VolumeBuilder::new()
            .with_file(
                FileBuilder::new(efi::Guid::from_bytes(&[3; 16]), r#type::DRIVER)
                    .with_section(compose::section(raw_type::PE32, &[3; 7]))
                    .with_state(live | state::MARKED_FOR_UPDATE)
                    .serialize(),
            )
            .with_file(sample_file(1, r#type::DRIVER))
            .serialize();
        let fv = VolumeRef::new(&fv_bytes)?;
        let mut files = fv.files();
        assert_eq!(files.next().map(|x| x.map(|_| ())), Some(Err(FirmwareFileSystemError::InvalidState)));
        assert_eq!(files.next().transpose()?.map(|file| file.name()), Some(efi::Guid::from_bytes(&[1; 16])));
        assert!(files.next().is_none());
        Ok(())
    }

    #[test]
    fn corrupt_file_should_end_iteration_with_error() -> Result<(), Box<dyn Error>> {
        let mut fv_bytes = sample_volume();
        // corrupt the header checksum of the first file.
        fv_bytes[72 + 16] ^= 0x01;
        let fv = VolumeRef::new(&fv_bytes)?;
        let mut files = fv.files();
        assert_eq!(files.next().map(|x| x.map(|_| ())), Some(Err(FirmwareFileSystemError::InvalidHeader)));
        assert!(files.next().is_none());
        Ok(())
    }
}
