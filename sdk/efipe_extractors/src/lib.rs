//! # Section Extractor Implementations
//!
//! This crate provides implementations of the `efipe_ffs::section::SectionExtractor` and
//! `efipe_ffs::decompress::Decompressor` traits.
//!
//! ## Features
//!
//! This crate contains the following features, where each feature corresponds to a different
//! implementation. The crate is configured in this manner to reduce compilation times, by only
//! compiling the necessary implementations.
//! - `uefi_decompress`: Enables the `UefiDecompressor` codec and the `UefiDecompressSectionExtractor`
//!   for compression sections and TianoCompress GUID-defined sections.
//! - `crc32`: Enables the `Crc32SectionExtractor` implementation to validate CRC32 GUID-defined
//!   sections and return the verified payload.
//! - `lzma`: Enables the `LzmaSectionExtractor` implementation for GUID-defined LZMA compressed
//!   sections.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(test)]
#[macro_use]
mod test_support;

#[cfg(feature = "uefi_decompress")]
mod uefi_decompress;
#[cfg(feature = "uefi_decompress")]
pub use uefi_decompress::{UefiDecompressSectionExtractor, UefiDecompressor};

#[cfg(feature = "crc32")]
mod crc32;
#[cfg(feature = "crc32")]
pub use crc32::Crc32SectionExtractor;

#[cfg(feature = "lzma")]
mod lzma;
#[cfg(feature = "lzma")]
pub use lzma::LzmaSectionExtractor;

mod composite;
pub use composite::CompositeSectionExtractor;
