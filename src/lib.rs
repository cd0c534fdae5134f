//! `sifrun` is a container launcher for scientific and high-performance
//! computing workloads: it resolves an image reference, materializes the
//! image into a content-addressed cache, composes a rootfs, builds an OCI
//! runtime configuration, and supervises a low-level OCI runtime.

pub mod cache;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod launcher;
pub mod lock_map;
pub mod network;
pub mod image;
pub mod oci;
pub mod oci_spec;
pub mod reference;
pub mod rootfs;
pub mod storage;
pub mod supervisor;
pub mod transport;

pub use config::Config;
pub use context::Context;
pub use error::{ErrorKind, SifError};
