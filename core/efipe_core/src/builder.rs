//! Executable record synthesis.
//!
//! [`ExecutableBuilder`] walks the sections of a firmware file once, left to right, and folds them into an
//! [`Executable`]. Compression sections are resolved and the sections they enclose are walked in place, so a
//! file whose image sits several compression levels deep yields the same record as a flat one.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::borrow::Cow;

use efipe_depex::Depex;
use efipe_ffs::{
    decompress::Decompressor,
    section::{decode_ucs2, SectionKind},
    tree::{FirmwareFile, DEFAULT_MAX_DEPTH},
};

use crate::{
    decoder::{decode_section, DecodedSection, SectionStream},
    error::{ExtractError, ParseError},
    executable::{Executable, ExecutableType},
    resolver::CompressionResolver,
};

// Decides how a PE32 payload found in a buffer of lifetime 's is retained by an executable of lifetime 'a.
type Keep<'s, 'a> = fn(&'s [u8]) -> Cow<'a, [u8]>;

fn owned<'a>(payload: &[u8]) -> Cow<'a, [u8]> {
    Cow::Owned(payload.to_vec())
}

/// Builds [`Executable`] records from firmware files.
pub struct ExecutableBuilder<'d> {
    resolver: CompressionResolver<'d>,
    max_depth: usize,
}

impl<'d> ExecutableBuilder<'d> {
    /// A builder decompressing standard compression sections with `decompressor`.
    pub fn new(decompressor: &'d dyn Decompressor) -> Self {
        Self { resolver: CompressionResolver::new(decompressor), max_depth: DEFAULT_MAX_DEPTH }
    }

    /// Limit the nesting of compression sections to `max_depth` levels.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the executable record of `file`.
    ///
    /// Files that come with pre-parsed sections are walked from those. Files left unparsed (PEIMs) are decoded
    /// here from the end of the file header up to the file size, stepping to 4-byte aligned offsets.
    pub fn build<'a>(&self, file: &'a FirmwareFile) -> Result<Executable<'a>, ExtractError> {
        let mut exe = Executable::new(file.name(), ExecutableType::from_file_kind(file.kind()));

        match file.sections() {
            Some(sections) => {
                let decoded = sections.iter().map(|section| decode_section(section.bytes(), 0));
                self.walk(&mut exe, decoded, 0, Cow::Borrowed)?;
            }
            None => {
                let data = &file.data()[..file.size().min(file.data().len())];
                self.walk(&mut exe, SectionStream::aligned(data, file.content_offset()), 0, Cow::Borrowed)?;
            }
        }

        log::debug!(
            "built {} {} ({}), {:#x} code bytes",
            exe.type_label(),
            exe.name(),
            efipe_ffs::guid_string(&exe.guid()),
            exe.code().len()
        );
        Ok(exe)
    }

    fn walk<'s, 'a, I>(
        &self,
        exe: &mut Executable<'a>,
        sections: I,
        depth: usize,
        keep: Keep<'s, 'a>,
    ) -> Result<(), ExtractError>
    where
        I: IntoIterator<Item = Result<DecodedSection<'s>, ParseError>>,
    {
        for section in sections {
            let section = section?;
            let payload = section.payload();
            match section.kind() {
                SectionKind::DependencyExpression(_) => exe.dependencies = Depex::from(payload),
                SectionKind::UserInterface => exe.name = decode_ucs2(payload),
                SectionKind::Version => {
                    if payload.len() < 2 {
                        Err(ParseError::TruncatedVersion { offset: section.offset() })?;
                    }
                    exe.build_number = u16::from_le_bytes([payload[0], payload[1]]).to_string();
                    exe.version = decode_ucs2(&payload[2..]);
                }
                SectionKind::Pe32 => exe.code = keep(payload),
                SectionKind::Compression => {
                    if depth >= self.max_depth {
                        Err(ExtractError::RecursionLimitExceeded(self.max_depth))?;
                    }
                    match self.resolver.resolve(payload)? {
                        Cow::Borrowed(inner) => self.walk(exe, SectionStream::new(inner), depth + 1, keep)?,
                        Cow::Owned(buffer) => self.walk(exe, SectionStream::new(&buffer), depth + 1, owned)?,
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}
