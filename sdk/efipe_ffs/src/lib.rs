//! Support for the Firmware File System as described in the UEFI Platform
//! Initialization Specification.
//!
//! This crate parses firmware images into a tree of firmware volumes and
//! files, exposes the sections of each file, and defines the seams used to
//! plug in decompression ([`decompress::Decompressor`]) and encapsulation
//! section extraction ([`section::SectionExtractor`]).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod compose;
pub mod decompress;
pub mod err;
pub mod file;
pub mod pi;
pub mod section;
pub mod tree;
pub mod volume;

pub use err::FirmwareFileSystemError;

use r_efi::efi;
use uuid::Uuid;

/// Renders an EFI GUID in the registry format used by firmware tooling
/// (`8C8CE578-8A3D-4F1C-9935-896185C32DD3`).
pub fn guid_string(guid: &efi::Guid) -> String {
    Uuid::from_bytes_le(*guid.as_bytes()).to_string().to_uppercase()
}

/// Align `value` up to the next multiple of `alignment` (a power of two).
pub(crate) fn align_up(value: usize, alignment: usize) -> Option<usize> {
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}
