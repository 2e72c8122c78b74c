//! Firmware storage definitions.
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Volume 3,
//! sections 3.1 (Firmware Storage Code Definitions) and 3.2 (Firmware File System).
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Well-known GUIDs used by firmware volumes and encapsulation sections.
pub mod guid {
    use r_efi::efi;

    /// EFI_FIRMWARE_FILE_SYSTEM2_GUID
    pub const FIRMWARE_FILE_SYSTEM2: efi::Guid =
        efi::Guid::from_fields(0x8C8CE578, 0x8A3D, 0x4F1C, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xC3, 0x2D, 0xD3]);
    /// EFI_FIRMWARE_FILE_SYSTEM3_GUID
    pub const FIRMWARE_FILE_SYSTEM3: efi::Guid =
        efi::Guid::from_fields(0x5473C07A, 0x3DCB, 0x4DCA, 0xBD, 0x6F, &[0x1E, 0x96, 0x89, 0xE7, 0x34, 0x9A]);
    /// GUID-defined section compressed with LZMA.
    pub const LZMA_SECTION: efi::Guid =
        efi::Guid::from_fields(0xEE4E5898, 0x3914, 0x4259, 0x9D, 0x6E, &[0xDC, 0x7B, 0xD7, 0x94, 0x03, 0xCF]);
    /// GUID-defined section compressed with the Tiano variant of the EFI compression algorithm.
    pub const TIANO_DECOMPRESS_SECTION: efi::Guid =
        efi::Guid::from_fields(0xA31280AD, 0x481E, 0x41B6, 0x95, 0xE8, &[0x12, 0x7F, 0x4C, 0x98, 0x47, 0x79]);
    /// GUID-defined section protected by a CRC32.
    pub const CRC32_SECTION: efi::Guid =
        efi::Guid::from_fields(0xFC1BCDB0, 0x7D31, 0x49AA, 0x93, 0x6A, &[0xA4, 0x60, 0x0D, 0x9D, 0xD0, 0x83]);
}

/// Firmware volume definitions.
pub mod fv {
    /// Minimum firmware volume header revision understood by the parser.
    pub const FFS_REVISION: u8 = 2;

    /// The `_FVH` signature, little-endian.
    pub const SIGNATURE: u32 = u32::from_le_bytes(*b"_FVH");

    /// Offset of the signature field from the start of the volume header.
    pub const SIGNATURE_OFFSET: usize = 40;

    /// EFI_FVB2_ERASE_POLARITY
    pub const ERASE_POLARITY: u32 = 0x0000_0800;

    /// EFI_FIRMWARE_VOLUME_HEADER
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct Header {
        pub zero_vector: [u8; 16],
        pub file_system_guid: r_efi::efi::Guid,
        pub fv_length: u64,
        pub signature: u32,
        pub attributes: u32,
        pub header_length: u16,
        pub checksum: u16,
        pub ext_header_offset: u16,
        pub reserved: u8,
        pub revision: u8,
    }

    /// EFI_FV_BLOCK_MAP_ENTRY
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockMapEntry {
        pub num_blocks: u32,
        pub length: u32,
    }

    /// EFI_FIRMWARE_VOLUME_EXT_HEADER
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct ExtHeader {
        pub fv_name: r_efi::efi::Guid,
        pub ext_header_size: u32,
    }
}

/// FFS file definitions.
pub mod file {
    use r_efi::efi;

    pub mod raw {
        pub mod state {
            pub const HEADER_CONSTRUCTION: u8 = 0x01;
            pub const HEADER_VALID: u8 = 0x02;
            pub const DATA_VALID: u8 = 0x04;
            pub const MARKED_FOR_UPDATE: u8 = 0x08;
            pub const DELETED: u8 = 0x10;
        }

        pub mod r#type {
            pub const RAW: u8 = 0x01;
            pub const FREEFORM: u8 = 0x02;
            pub const SECURITY_CORE: u8 = 0x03;
            pub const PEI_CORE: u8 = 0x04;
            pub const DXE_CORE: u8 = 0x05;
            pub const PEIM: u8 = 0x06;
            pub const DRIVER: u8 = 0x07;
            pub const COMBINED_PEIM_DRIVER: u8 = 0x08;
            pub const APPLICATION: u8 = 0x09;
            pub const MM: u8 = 0x0A;
            pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x0B;
            pub const FFS_PAD: u8 = 0xF0;
        }

        pub mod attributes {
            pub const LARGE_FILE: u8 = 0x01;
            pub const CHECKSUM: u8 = 0x40;
        }
    }

    /// EFI_FFS_FILE_HEADER
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Header {
        pub name: efi::Guid,
        pub integrity_check_header: u8,
        pub integrity_check_file: u8,
        pub file_type: u8,
        pub attributes: u8,
        pub size: [u8; 3],
        pub state: u8,
    }

    /// EFI_FFS_FILE_HEADER2
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Header2 {
        pub header: Header,
        pub extended_size: u64,
    }
}

/// FFS section definitions.
pub mod section {
    use r_efi::efi;

    /// Section type values stored in the common section header.
    pub mod raw_type {
        pub const ALL: u8 = 0x00;
        pub const COMPRESSION: u8 = 0x01;
        pub const GUID_DEFINED: u8 = 0x02;
        pub const DISPOSABLE: u8 = 0x03;
        pub const PE32: u8 = 0x10;
        pub const PIC: u8 = 0x11;
        pub const TE: u8 = 0x12;
        pub const DXE_DEPEX: u8 = 0x13;
        pub const VERSION: u8 = 0x14;
        pub const USER_INTERFACE: u8 = 0x15;
        pub const COMPATIBILITY16: u8 = 0x16;
        pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x17;
        pub const FREEFORM_SUBTYPE_GUID: u8 = 0x18;
        pub const RAW: u8 = 0x19;
        pub const PEI_DEPEX: u8 = 0x1B;
        pub const MM_DEPEX: u8 = 0x1C;
        pub const FFS_PAD: u8 = 0xF0;
    }

    /// Size field value indicating that the 32-bit extended size follows the common header.
    pub const EXTENDED_SIZE_SENTINEL: u32 = 0x00FF_FFFF;

    /// Compression type values of EFI_COMPRESSION_SECTION.
    pub const NOT_COMPRESSED: u8 = 0x00;
    pub const STANDARD_COMPRESSION: u8 = 0x01;

    /// EFI_COMMON_SECTION_HEADER
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct Header {
        pub size: [u8; 3],
        pub section_type: u8,
    }

    /// EFI_COMMON_SECTION_HEADER2
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct ExtendedHeader {
        pub size: [u8; 3],
        pub section_type: u8,
        pub extended_size: u32,
    }

    /// Section-specific headers that follow the common header.
    pub mod header {
        use super::efi;

        /// EFI_COMPRESSION_SECTION
        #[repr(C, packed)]
        #[derive(Debug, Clone, Copy)]
        pub struct Compression {
            pub uncompressed_length: u32,
            pub compression_type: u8,
        }

        /// EFI_GUID_DEFINED_SECTION
        #[repr(C)]
        #[derive(Debug, Clone, Copy)]
        pub struct GuidDefined {
            pub section_definition_guid: efi::Guid,
            pub data_offset: u16,
            pub attributes: u16,
        }

        /// EFI_VERSION_SECTION
        #[repr(C)]
        #[derive(Debug, Clone, Copy)]
        pub struct Version {
            pub build_number: u16,
        }

        /// EFI_FREEFORM_SUBTYPE_GUID_SECTION
        #[repr(C)]
        #[derive(Debug, Clone, Copy)]
        pub struct FreeformSubtypeGuid {
            pub sub_type_guid: efi::Guid,
        }
    }
}
