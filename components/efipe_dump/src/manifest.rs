//! The `manifest.json` describing the extracted executables.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use efipe_core::Executable;
use efipe_ffs::guid_string;
use serde::Serialize;

/// One extracted executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub executable_type: String,
    pub guid: String,
    pub version: String,
    pub build_number: String,
    pub dependencies: String,
    pub code_size: usize,
    pub file_name: String,
}

impl ManifestEntry {
    pub fn new(exe: &Executable, file_name: String) -> Self {
        Self {
            name: exe.name().to_string(),
            executable_type: exe.type_label().to_string(),
            guid: guid_string(&exe.guid()),
            version: exe.version().to_string(),
            build_number: exe.build_number().to_string(),
            dependencies: exe.dependencies().to_string(),
            code_size: exe.code().len(),
            file_name,
        }
    }

    /// The single line printed for `--list`.
    pub fn listing(&self) -> String {
        let mut line = format!(
            "{:<7} {} {} {} ({}) {:#x} bytes",
            self.executable_type, self.guid, self.name, self.version, self.build_number, self.code_size
        );
        if !self.dependencies.is_empty() {
            line.push_str(&format!(" [{}]", self.dependencies));
        }
        line
    }
}

/// Top-level document written to `manifest.json`.
#[derive(Debug, Serialize)]
pub struct Manifest {
    pub unique: usize,
    pub candidates: usize,
    pub executables: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use efipe_core::ExecutableBuilder;
    use efipe_extractors::UefiDecompressor;
    use efipe_ffs::{
        compose::{self, FileBuilder},
        pi::{file::raw::r#type, section::raw_type},
        tree::FirmwareFile,
    };
    use r_efi::efi;

    use super::*;

    fn entry(file_type: u8) -> Result<ManifestEntry, Box<dyn Error>> {
        let file = FileBuilder::new(efi::Guid::from_bytes(&[0x11; 16]), file_type)
            .with_section(compose::section(raw_type::DXE_DEPEX, &[0x06, 0x08]))
            .with_section(compose::version_section(7, "1.2"))
            .with_section(compose::user_interface_section("Shell"))
            .with_section(compose::section(raw_type::PE32, &[0x4d, 0x5a, 0, 0, 0, 0]))
            .serialize();
        let file = FirmwareFile::new_from_buffer(&file)?;
        let decompressor = UefiDecompressor::new();
        let exe = ExecutableBuilder::new(&decompressor).build(&file)?;
        let file_name = exe.output_file_name(0);
        Ok(ManifestEntry::new(&exe, file_name))
    }

    #[test]
    fn entry_should_mirror_the_executable() -> Result<(), Box<dyn Error>> {
        let entry = entry(r#type::APPLICATION)?;
        assert_eq!(entry.name, "Shell");
        assert_eq!(entry.executable_type, "APP");
        assert_eq!(entry.guid, "11111111-1111-1111-1111-111111111111");
        assert_eq!(entry.version, "1.2");
        assert_eq!(entry.build_number, "7");
        assert_eq!(entry.dependencies, "TRUE END");
        assert_eq!(entry.code_size, 6);
        assert_eq!(entry.file_name, "Shell_APP_11111111-1111-1111-1111-111111111111_1.2_0.efi");
        assert_eq!(
            entry.listing(),
            "APP     11111111-1111-1111-1111-111111111111 Shell 1.2 (7) 0x6 bytes [TRUE END]"
        );
        Ok(())
    }

    #[test]
    fn manifest_should_serialize_type_field() -> Result<(), Box<dyn Error>> {
        let manifest = Manifest { unique: 1, candidates: 2, executables: vec![entry(r#type::DRIVER)?] };
        let json: serde_json::Value = serde_json::from_str(&manifest.to_json()?)?;
        assert_eq!(json["unique"], 1);
        assert_eq!(json["candidates"], 2);
        assert_eq!(json["executables"][0]["type"], "DXE");
        assert_eq!(json["executables"][0]["code_size"], 6);
        Ok(())
    }
}
