//! Utility functions shared by the engine and the CLI.
//!
//! ## Modules
//!
//! - [`app_data`] - Application config stored in the platform data directory
//! - [`encoding`] - Variable-length integer and little-endian helpers
//! - [`tokenizer`] - Text analysis for indexed fields and query values
//! - [`progress`] - Spinner shim over `indicatif`
//!
//! ```
//! use csvdex::utils::analyze;
//!
//! assert_eq!(analyze("Ada Lovelace"), vec!["ada", "lovelace"]);
//! ```

pub mod app_data;
pub mod encoding;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use encoding::*;
pub use tokenizer::*;
