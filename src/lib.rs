//! Oxipack: git object model, delta codec and pack format in Rust.
//!
//! The crate provides:
//! - Canonical encoding and hashing of blobs, trees, commits and tags (`object`)
//! - The copy/insert delta codec used by git packs (`delta`)
//! - Pack stream encoding and decoding, including thin packs (`pack`)
//! - A pluggable zlib backend for pack entries and loose objects (`compress`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxipack::object::{Blob, ObjectGraph};
//! use oxipack::pack::{self, PackWriter};
//!
//! let mut graph = ObjectGraph::new();
//! let blob = graph.insert(Blob::new("hello world\n"));
//!
//! let mut writer = PackWriter::new(&graph);
//! writer.add(blob).unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let unpacked = pack::decode(&bytes).unwrap();
//! assert_eq!(unpacked.len(), 1);
//! ```

pub mod compress;
pub mod delta;
pub mod hash;
pub mod object;
pub mod pack;
pub mod varint;

#[cfg(feature = "cli")]
pub mod cli;
