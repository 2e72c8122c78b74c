//! Collection and deduplication of executable candidates.
//!
//! A [`Collector`] walks a firmware tree and buckets the files whose type the [`CollectionPolicy`] accepts by
//! file name GUID. Firmware images routinely carry the same module several times (recovery copies, A/B
//! volumes); [`Collector::finish`] collapses the entries of a bucket whose structural rendering hashes the same.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::{BTreeMap, HashSet};

use efipe_ffs::{
    file::FileKind,
    tree::{self, FirmwareFile, FirmwareNode, Traversal, Visitor},
};
use r_efi::efi;
use sha2::{Digest, Sha512};

/// Which declared file types are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    pub application: bool,
    pub driver: bool,
    pub mm: bool,
    pub peim: bool,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self { application: true, driver: true, mm: true, peim: false }
    }
}

impl CollectionPolicy {
    pub fn with_peim(mut self, peim: bool) -> Self {
        self.peim = peim;
        self
    }

    pub fn with_mm(mut self, mm: bool) -> Self {
        self.mm = mm;
        self
    }

    pub fn accepts(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Application => self.application,
            FileKind::Driver => self.driver,
            FileKind::Mm => self.mm,
            FileKind::Peim => self.peim,
            FileKind::Other(_) => false,
        }
    }
}

/// Tree visitor gathering candidate files by GUID.
#[derive(Debug, Default)]
pub struct Collector<'t> {
    policy: CollectionPolicy,
    buckets: BTreeMap<efi::Guid, Vec<&'t FirmwareFile>>,
    candidates: usize,
}

impl<'t> Collector<'t> {
    pub fn new(policy: CollectionPolicy) -> Self {
        Self { policy, buckets: BTreeMap::new(), candidates: 0 }
    }

    /// Deduplicate the buckets gathered so far.
    ///
    /// Within a bucket, the first file of each distinct fingerprint is kept, in traversal order.
    pub fn finish(self) -> Collection<'t> {
        let buckets = self
            .buckets
            .into_iter()
            .map(|(guid, files)| {
                if files.len() < 2 {
                    return (guid, files);
                }
                let total = files.len();
                let mut seen = HashSet::new();
                let kept: Vec<_> = files.into_iter().filter(|file| seen.insert(fingerprint(file))).collect();
                if kept.len() != total {
                    log::debug!(
                        "{}: dropped {} duplicate(s) of {total}",
                        efipe_ffs::guid_string(&guid),
                        total - kept.len()
                    );
                }
                (guid, kept)
            })
            .collect();
        Collection { buckets, candidates: self.candidates }
    }
}

impl<'t> Visitor<'t> for Collector<'t> {
    fn visit(&mut self, node: &'t FirmwareNode) -> Traversal {
        match node {
            FirmwareNode::File(file) if self.policy.accepts(file.kind()) => {
                self.buckets.entry(file.name()).or_default().push(file);
                self.candidates += 1;
                Traversal::SkipChildren
            }
            _ => Traversal::Descend,
        }
    }
}

/// SHA-512 over the `Debug` rendering of `file`, which lists header fields and section descriptors only.
fn fingerprint(file: &FirmwareFile) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(format!("{file:?}"));
    hasher.finalize().to_vec()
}

/// Deduplicated candidate files, keyed by GUID in ascending order.
#[derive(Debug, Default)]
pub struct Collection<'t> {
    buckets: BTreeMap<efi::Guid, Vec<&'t FirmwareFile>>,
    candidates: usize,
}

impl<'t> Collection<'t> {
    pub fn buckets(&self) -> &BTreeMap<efi::Guid, Vec<&'t FirmwareFile>> {
        &self.buckets
    }

    /// Number of files collected before deduplication.
    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Number of files kept after deduplication.
    pub fn unique(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Every kept file with its GUID and its index within the GUID bucket.
    pub fn iter(&self) -> impl Iterator<Item = (efi::Guid, usize, &'t FirmwareFile)> + '_ {
        self.buckets
            .iter()
            .flat_map(|(guid, files)| files.iter().enumerate().map(move |(index, file)| (*guid, index, *file)))
    }
}

/// Collect and deduplicate the files of `tree` accepted by `policy`.
pub fn collect(tree: &FirmwareNode, policy: CollectionPolicy) -> Collection<'_> {
    let mut collector = Collector::new(policy);
    tree::walk(tree, &mut collector);
    collector.finish()
}
