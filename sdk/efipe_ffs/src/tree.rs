//! Firmware image tree.
//!
//! [`parse`] turns a raw firmware image into a tree of [`FirmwareNode`]s: the image itself, the firmware
//! volumes found in it, their files, and the volumes nested inside firmware volume image files. The tree
//! owns copies of the file bytes so it can outlive the image buffer.
//!
//! Trees are traversed with [`walk`], which hands every node to a [`Visitor`] depth-first and lets it
//! decide whether the children of that node are visited.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use log::{debug, trace, warn};
use r_efi::efi;

use crate::{
    file::{FileKind, FileRef},
    guid_string,
    pi::{
        file::{raw::r#type, Header},
        fv,
    },
    section::{Section, SectionExtractor, SectionIterator, SectionKind},
    volume::VolumeRef,
    FirmwareFileSystemError,
};

/// Default bound on the nesting of firmware volumes (and of encapsulation sections wrapping them).
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// What a [`Container`] node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// The whole image handed to [`parse`].
    Image,
    /// A firmware volume.
    Volume,
}

/// A node grouping other nodes: the image root or a firmware volume.
#[derive(Debug, Clone)]
pub struct Container {
    kind: ContainerKind,
    name: Option<efi::Guid>,
    offset: usize,
    size: usize,
    children: Vec<FirmwareNode>,
}

impl Container {
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The volume name from the extended header, if any.
    pub fn name(&self) -> Option<efi::Guid> {
        self.name
    }

    /// Offset of the container within its enclosing buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn children(&self) -> &[FirmwareNode] {
        &self.children
    }
}

/// A file of a firmware volume, together with any volumes nested inside it.
#[derive(Clone)]
pub struct FirmwareFile {
    header: Header,
    size: usize,
    content_offset: usize,
    erase_polarity: bool,
    data: Vec<u8>,
    sections: Option<Vec<Section>>,
    children: Vec<FirmwareNode>,
}

impl FirmwareFile {
    /// Copy `file` into an owned node.
    ///
    /// The top-level sections are parsed for section-based file types. Raw, pad and PEIM files are left
    /// unparsed; consumers decode them on demand from [`FirmwareFile::data`].
    pub fn new(file: &FileRef) -> Result<Self, FirmwareFileSystemError> {
        let sections = if has_sections(file.file_type_raw()) { Some(file.sections()?) } else { None };
        Ok(Self {
            header: *file.header(),
            size: file.size(),
            content_offset: file.content_offset(),
            erase_polarity: file.erase_polarity(),
            data: file.data().to_vec(),
            sections,
            children: Vec::new(),
        })
    }

    /// Parse a serialized FFS file from the start of `buffer` into an owned node.
    pub fn new_from_buffer(buffer: &[u8]) -> Result<Self, FirmwareFileSystemError> {
        Self::new(&FileRef::new(buffer)?)
    }

    pub fn name(&self) -> efi::Guid {
        self.header.name
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from(self.header.file_type)
    }

    pub fn file_type_raw(&self) -> u8 {
        self.header.file_type
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Total size of the file, header included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Length of the file header (24, or 32 for large files).
    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    pub fn erase_polarity(&self) -> bool {
        self.erase_polarity
    }

    /// The complete serialized file.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The file bytes past the header.
    pub fn content(&self) -> &[u8] {
        &self.data[self.content_offset..]
    }

    /// The pre-parsed top-level sections, or `None` for files that were left unparsed.
    pub fn sections(&self) -> Option<&[Section]> {
        self.sections.as_deref()
    }

    /// Volumes nested inside this file.
    pub fn children(&self) -> &[FirmwareNode] {
        &self.children
    }
}

impl fmt::Debug for FirmwareFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirmwareFile")
            .field("name", &guid_string(&self.header.name))
            .field("file_type", &self.header.file_type)
            .field("attributes", &self.header.attributes)
            .field("state", &self.header.state)
            .field("integrity_check_header", &self.header.integrity_check_header)
            .field("integrity_check_file", &self.header.integrity_check_file)
            .field("size", &self.size)
            .field("sections", &self.sections)
            .field("children", &self.children.len())
            .finish()
    }
}

fn has_sections(file_type: u8) -> bool {
    match file_type {
        r#type::PEIM => false,
        // freeform through firmware volume image, and the MM variants that follow.
        0x02..=0x0F => true,
        _ => false,
    }
}

/// A node of the firmware tree.
#[derive(Debug, Clone)]
pub enum FirmwareNode {
    Container(Container),
    File(FirmwareFile),
}

impl FirmwareNode {
    pub fn children(&self) -> &[FirmwareNode] {
        match self {
            FirmwareNode::Container(container) => container.children(),
            FirmwareNode::File(file) => file.children(),
        }
    }
}

/// Decision returned by a [`Visitor`] for the node it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Visit the children of the node.
    Descend,
    /// Do not visit the children of the node.
    SkipChildren,
}

/// Receives the nodes of a firmware tree from [`walk`].
pub trait Visitor<'t> {
    fn visit(&mut self, node: &'t FirmwareNode) -> Traversal;
}

/// Visit `node` and, as directed by `visitor`, its descendants in tree order.
pub fn walk<'t, V: Visitor<'t> + ?Sized>(node: &'t FirmwareNode, visitor: &mut V) {
    if visitor.visit(node) == Traversal::Descend {
        for child in node.children() {
            walk(child, visitor);
        }
    }
}

/// Builds firmware trees, expanding encapsulation sections with a [`SectionExtractor`].
pub struct Parser<'e> {
    extractor: &'e dyn SectionExtractor,
    max_depth: usize,
}

impl<'e> Parser<'e> {
    pub fn new(extractor: &'e dyn SectionExtractor) -> Self {
        Self { extractor, max_depth: DEFAULT_MAX_DEPTH }
    }

    /// Bound the nesting of volumes inside volumes.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse `image` into a tree rooted at an [`ContainerKind::Image`] container.
    ///
    /// Fails with [`FirmwareFileSystemError::VolumeNotFound`] if the image holds no valid volume. Errors in the
    /// files of a valid volume are propagated.
    pub fn parse(&self, image: &[u8]) -> Result<FirmwareNode, FirmwareFileSystemError> {
        let volumes = self.scan(image, 0)?;
        if volumes.is_empty() {
            Err(FirmwareFileSystemError::VolumeNotFound)?;
        }
        debug!("found {} top-level firmware volume(s) in {:#x} byte image", volumes.len(), image.len());
        Ok(FirmwareNode::Container(Container {
            kind: ContainerKind::Image,
            name: None,
            offset: 0,
            size: image.len(),
            children: volumes,
        }))
    }

    fn scan(&self, buffer: &[u8], depth: usize) -> Result<Vec<FirmwareNode>, FirmwareFileSystemError> {
        let mut volumes = Vec::new();
        let mut position = 0;
        while let Some(start) = find_volume(buffer, position) {
            match VolumeRef::new(&buffer[start..]) {
                Ok(volume) => {
                    trace!("volume at {start:#x}, {:#x} bytes", volume.size());
                    volumes.push(self.volume_node(&volume, start, depth)?);
                    position = start + volume.size() as usize;
                }
                Err(err) => {
                    warn!("skipping invalid firmware volume candidate at {start:#x}: {err}");
                    position = start + 1;
                }
            }
        }
        Ok(volumes)
    }

    fn volume_node(
        &self,
        volume: &VolumeRef,
        offset: usize,
        depth: usize,
    ) -> Result<FirmwareNode, FirmwareFileSystemError> {
        let mut files = Vec::new();
        for file in volume.files() {
            let file = match file {
                Err(FirmwareFileSystemError::InvalidState) => {
                    warn!("skipping file that is not in the DATA_VALID state in volume at {offset:#x}");
                    continue;
                }
                file => file?,
            };
            let mut file = FirmwareFile::new(&file)?;
            if file.file_type_raw() == r#type::FIRMWARE_VOLUME_IMAGE {
                if let Some(sections) = &file.sections {
                    file.children = self.nested_volumes(sections, depth, 0)?;
                }
            }
            files.push(FirmwareNode::File(file));
        }
        Ok(FirmwareNode::Container(Container {
            kind: ContainerKind::Volume,
            name: volume.fv_name(),
            offset,
            size: volume.size() as usize,
            children: files,
        }))
    }

    fn nested_volumes(
        &self,
        sections: &[Section],
        depth: usize,
        encapsulation_depth: usize,
    ) -> Result<Vec<FirmwareNode>, FirmwareFileSystemError> {
        if depth >= self.max_depth || encapsulation_depth > self.max_depth {
            Err(FirmwareFileSystemError::NestingTooDeep(self.max_depth))?;
        }
        let mut volumes = Vec::new();
        for section in sections {
            match section.kind() {
                SectionKind::FirmwareVolumeImage => volumes.extend(self.scan(section.content(), depth + 1)?),
                kind if kind.is_encapsulation() => match self.extractor.extract(section) {
                    Ok(extracted) => {
                        let sub_sections = SectionIterator::new(&extracted).collect::<Result<Vec<_>, _>>()?;
                        volumes.extend(self.nested_volumes(&sub_sections, depth, encapsulation_depth + 1)?);
                    }
                    Err(FirmwareFileSystemError::Unsupported) => {
                        warn!("no extractor for {section:?}; nested volumes inside it are not parsed")
                    }
                    Err(err) => Err(err)?,
                },
                _ => (),
            }
        }
        Ok(volumes)
    }
}

/// Parse `image` with default options. See [`Parser::parse`].
pub fn parse(image: &[u8], extractor: &dyn SectionExtractor) -> Result<FirmwareNode, FirmwareFileSystemError> {
    Parser::new(extractor).parse(image)
}

// Offset of the next volume header candidate at or after `from`, located by its signature.
fn find_volume(buffer: &[u8], from: usize) -> Option<usize> {
    let signature = fv::SIGNATURE.to_le_bytes();
    buffer
        .get(from.checked_add(fv::SIGNATURE_OFFSET)?..)?
        .windows(signature.len())
        .position(|window| window == signature)
        .map(|index| from + index)
}
