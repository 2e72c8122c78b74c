//! Executable extraction from firmware file system trees.
//!
//! The pieces compose leaf-first:
//!
//! - [`decoder`] sizes and walks the sections laid out in a buffer.
//! - [`resolver`] turns a compression section payload into the buffer it encloses.
//! - [`builder`] folds the sections of a file, through any number of compression levels, into an
//!   [`Executable`].
//! - [`collector`] gathers candidate files from a firmware tree by GUID and drops duplicates.
//!
//! ## Example
//!
//! ```rust
//! use efipe_core::{collect, CollectionPolicy, ExecutableBuilder};
//! use efipe_extractors::{CompositeSectionExtractor, UefiDecompressor};
//! use efipe_ffs::{
//!     compose::{self, FileBuilder, VolumeBuilder},
//!     pi::{file::raw::r#type, section::raw_type},
//!     tree,
//! };
//! use r_efi::efi;
//!
//! let name = efi::Guid::from_bytes(&[7u8; 16]);
//! let file = FileBuilder::new(name, r#type::DRIVER)
//!     .with_section(compose::user_interface_section("Sample"))
//!     .with_section(compose::section(raw_type::PE32, b"MZ.."))
//!     .serialize();
//! let image = VolumeBuilder::new().with_file(file).serialize();
//!
//! let tree = tree::parse(&image, &CompositeSectionExtractor::default()).unwrap();
//! let collection = collect(&tree, CollectionPolicy::default());
//! let decompressor = UefiDecompressor::new();
//! let builder = ExecutableBuilder::new(&decompressor);
//! for (_, index, file) in collection.iter() {
//!     let exe = builder.build(file).unwrap();
//!     assert_eq!(exe.name(), "Sample");
//!     assert_eq!(exe.code(), b"MZ..");
//!     assert!(exe.output_file_name(index).starts_with("Sample_DXE_"));
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod builder;
pub mod collector;
pub mod decoder;
pub mod error;
pub mod executable;
pub mod resolver;

pub use builder::ExecutableBuilder;
pub use collector::{collect, Collection, CollectionPolicy, Collector};
pub use error::{ExtractError, ParseError};
pub use executable::{Executable, ExecutableType};
pub use resolver::CompressionResolver;
