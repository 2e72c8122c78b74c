//! The executable record synthesized from a firmware file.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{borrow::Cow, fmt};

use efipe_depex::Depex;
use efipe_ffs::{file::FileKind, guid_string};
use r_efi::efi;

pub const DEFAULT_NAME: &str = "Unknown";
pub const DEFAULT_VERSION: &str = "UnknownVersion";
pub const DEFAULT_BUILD_NUMBER: &str = "UnknownBuild";

/// Executable flavor, derived from the declared type of the file that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutableType {
    App,
    Dxe,
    Smm,
    Pei,
}

impl ExecutableType {
    /// Map a file type to the executable type it carries. Returns `None` for non-executable file types.
    pub fn from_file_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Application => Some(ExecutableType::App),
            FileKind::Driver => Some(ExecutableType::Dxe),
            FileKind::Mm => Some(ExecutableType::Smm),
            FileKind::Peim => Some(ExecutableType::Pei),
            FileKind::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutableType::App => "APP",
            ExecutableType::Dxe => "DXE",
            ExecutableType::Smm => "SMM",
            ExecutableType::Pei => "PEI",
        }
    }
}

impl fmt::Display for ExecutableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executable extracted from a firmware file.
///
/// `code` borrows the PE32 payload from the file when it was reachable without decompression and owns it
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable<'a> {
    pub(crate) guid: efi::Guid,
    pub(crate) executable_type: Option<ExecutableType>,
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) build_number: String,
    pub(crate) dependencies: Depex,
    pub(crate) code: Cow<'a, [u8]>,
}

impl<'a> Executable<'a> {
    /// A record carrying only defaults.
    pub fn new(guid: efi::Guid, executable_type: Option<ExecutableType>) -> Self {
        Self {
            guid,
            executable_type,
            name: DEFAULT_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            build_number: DEFAULT_BUILD_NUMBER.to_string(),
            dependencies: Depex::default(),
            code: Cow::Borrowed(&[]),
        }
    }

    pub fn guid(&self) -> efi::Guid {
        self.guid
    }

    pub fn executable_type(&self) -> Option<ExecutableType> {
        self.executable_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn build_number(&self) -> &str {
        &self.build_number
    }

    pub fn dependencies(&self) -> &Depex {
        &self.dependencies
    }

    /// The PE32 image, or an empty slice when the file carried none.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Type rendering used in file names and listings; `UNKNOWN` when unset.
    pub fn type_label(&self) -> &'static str {
        self.executable_type.map_or("UNKNOWN", |t| t.as_str())
    }

    /// `<Name>_<Type>_<GUID>_<Version>_<index>.efi`, with path separators and control characters replaced.
    pub fn output_file_name(&self, index: usize) -> String {
        let file_name =
            format!("{}_{}_{}_{}_{index}.efi", self.name, self.type_label(), guid_string(&self.guid), self.version);
        file_name.chars().map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: efi::Guid =
        efi::Guid::from_fields(0x0379_be4e, 0xd706, 0x437d, 0xb0, 0x37, &[0xed, 0xb8, 0x2f, 0xb7, 0x72, 0xa4]);

    #[test]
    fn new_record_should_carry_defaults() {
        let exe = Executable::new(GUID, Some(ExecutableType::Dxe));
        assert_eq!(exe.name(), "Unknown");
        assert_eq!(exe.version(), "UnknownVersion");
        assert_eq!(exe.build_number(), "UnknownBuild");
        assert!(exe.dependencies().is_empty());
        assert!(exe.code().is_empty());
    }

    #[test]
    fn file_kinds_should_map_to_types() {
        assert_eq!(ExecutableType::from_file_kind(FileKind::Application), Some(ExecutableType::App));
        assert_eq!(ExecutableType::from_file_kind(FileKind::Driver), Some(ExecutableType::Dxe));
        assert_eq!(ExecutableType::from_file_kind(FileKind::Mm), Some(ExecutableType::Smm));
        assert_eq!(ExecutableType::from_file_kind(FileKind::Peim), Some(ExecutableType::Pei));
        assert_eq!(ExecutableType::from_file_kind(FileKind::Other(0x03)), None);
    }

    #[test]
    fn output_file_name_should_be_composed_and_sanitized() {
        let mut exe = Executable::new(GUID, Some(ExecutableType::Smm));
        exe.name = "Smm/Core\\Dxe".to_string();
        exe.version = "1.0\n".to_string();
        assert_eq!(exe.output_file_name(2), "Smm_Core_Dxe_SMM_0379BE4E-D706-437D-B037-EDB82FB772A4_1.0__2.efi");

        let unknown = Executable::new(GUID, None);
        assert_eq!(
            unknown.output_file_name(0),
            "Unknown_UNKNOWN_0379BE4E-D706-437D-B037-EDB82FB772A4_UnknownVersion_0.efi"
        );
    }
}
