//! Error types for the Firmware File System (FFS) crate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
use thiserror::Error;

/// Error definitions for Firmware File System
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FirmwareFileSystemError {
    /// The FFS header is invalid or malformed.
    #[error("invalid firmware file system header")]
    InvalidHeader,
    /// The block map structure is invalid.
    #[error("invalid firmware volume block map")]
    InvalidBlockMap,
    /// A parameter provided to a function is invalid.
    #[error("invalid parameter")]
    InvalidParameter,
    /// The requested operation or feature is unsupported.
    #[error("unsupported")]
    Unsupported,
    /// The FFS is in an invalid or unexpected state.
    #[error("invalid file state")]
    InvalidState,
    /// Data corruption was detected in the FFS.
    #[error("data corrupt")]
    DataCorrupt,
    /// No firmware volume could be located in the image.
    #[error("no firmware volume found in image")]
    VolumeNotFound,
    /// Firmware volumes are nested deeper than the parser allows.
    #[error("firmware volumes nested deeper than {0} levels")]
    NestingTooDeep(usize),
}
