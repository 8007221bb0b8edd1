//! # Specbook Common
//!
//! Virtual filesystem images shared by the editor and the repository
//! synchronizer. One image exists per repository URL; it holds the working
//! tree and the version-control directory.

pub mod error;
pub mod filesystem;
pub mod result;

pub use error::*;
pub use filesystem::*;
pub use result::*;
