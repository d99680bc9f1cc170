//! Master metadata for a project: which raw images exist, which series they
//! belong to and at which tilt angle they were acquired.
//!
//! The master table is built once by scanning the source folder and is the
//! upstream input for candidate construction in every stage.

mod scan;
mod table;

pub use scan::scan_source_folder;
pub use table::{MasterMetadata, MasterRow};
