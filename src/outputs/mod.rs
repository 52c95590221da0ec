//! Output generation.
//!
//! # Submodules
//!
//! - [`csv_file`]: Builds output rows and writes them to the per-video CSV file
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── youtube_comments_SzXMacu80o8.csv
//! └── youtube_comments_dQw4w9WgXcQ.csv
//! ```
//!
//! Files are named after the video only, so a second run for the same video
//! replaces the first run's file.

pub mod csv_file;
