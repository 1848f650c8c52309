// src/repository/mod.rs

//! Published repository management
//!
//! Built bundles are copied from the result directory into a publish tree
//! laid out as `<publish_dir>/<distribution>/<arch>/`, and each
//! architecture directory is indexed into a `Packages.info` file that
//! mirrors the metadata embedded in its bundles.

mod index;
mod publish;

pub use index::{index, package_name_of, IndexRecord, INDEX_FILE};
pub use publish::{architecture_of, publish};
