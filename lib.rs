//! # dirlock - In-place directory encryption
//!
//! dirlock rewrites every regular file below a target directory with
//! XChaCha20-Poly1305 authenticated encryption (optionally gzip-wrapped), and
//! reverses the transformation with the same key. The tool's own executable,
//! its configuration and its key backup are never touched, so a run can
//! always be undone.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dirlock::{
//!     config::{self, Anchors, JsonConfigSource, RunOptions},
//!     key_manager::KeySink,
//!     pipeline::{Direction, TransformPipeline},
//!     walker::DirectoryWalker,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_file = Path::new("dirlock.json");
//!     let source = JsonConfigSource::load(config_file)?;
//!     let anchors = Anchors::from_process(config_file)?;
//!     let options = RunOptions { direction: Direction::Encrypt, compress: false };
//!     let res = config::resolve(&source, None, &anchors, options)?;
//!
//!     if res.generated_key {
//!         KeySink::new(res.config.backup.clone())
//!             .persist(&res.config.key, &mut tokio::io::stdout())
//!             .await;
//!     }
//!
//!     let pipeline = TransformPipeline::from_key(options.direction, &res.config.key);
//!     let report = DirectoryWalker::new(pipeline, res.config.protected)
//!         .walk(&res.config.target)
//!         .await?;
//!     println!("{} files transformed", report.transformed());
//!     Ok(())
//! }
//! ```
//!
//! ## Byte Pipeline
//!
//! - **Encrypt**: encrypt, then gzip when compression is enabled
//! - **Decrypt**: gunzip when compression is enabled, then decrypt

pub mod compression;
pub mod config;
pub mod encryptor;
pub mod error;
pub mod fixtures;
pub mod key_manager;
pub mod pipeline;
pub mod protect;
pub mod walker;

// Re-export common types for convenience
pub use error::DirlockError;
