//! Ledger loader.
//!
//! Takes a root file, follows its `include` lines, merges the options of
//! every file, and runs the result through the plugin pipeline. Results are
//! cached on disk next to the root and reused while none of the files
//! change.
//!
//! Loading favors partial results: missing files, syntax errors, bad
//! options and everything plugins report are collected in
//! [`LoadResult::errors`]. Only a plugin that fails outright aborts the load
//! with a [`PipelineFailure`].
//!
//! # Example
//!
//! ```no_run
//! use beanroot_loader::Loader;
//! use std::path::Path;
//!
//! let result = Loader::new().load(Path::new("ledger.beancount"))?;
//! for error in &result.errors {
//!     eprintln!("{error}");
//! }
//! println!("{} directives", result.directives.len());
//! # Ok::<(), beanroot_loader::PipelineFailure>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod encoding;
mod options;
mod pipeline;
mod resolve;

pub use cache::{
    cache_path, compute_input_hash, invalidate_cache, load_cache_entry, needs_refresh,
    save_cache_entry, CacheEntry, FileStamp, Fingerprint, CACHE_VERSION,
};
pub use encoding::decode;
pub use options::aggregate_options;
pub use pipeline::{run_pipeline, PipelineFailure};
pub use resolve::{DefaultParser, Resolution, SourceFile, SourceParser};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use beanroot_core::{sort_directives, Directive, OptionError, Options};
use beanroot_parser::ParseError;
use beanroot_plugin::{DeprecatedPlugins, PluginError, PluginRegistry};

use crate::cache::watched_paths;
use crate::resolve::Resolver;

/// Name given to text loaded from memory.
pub const STRING_SOURCE: &str = "<string>";

/// A problem found while loading. None of these stop the load.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LoadError {
    /// The root or an include is not there.
    #[error("file {} does not exist", .path.display())]
    FileMissing {
        /// Path as resolved.
        path: PathBuf,
    },

    /// A file was reached through a second `include`. The first copy is
    /// kept.
    #[error("duplicate include of {} from {}:{lineno}", .path.display(), .included_from.display())]
    DuplicateInclude {
        /// Canonical path of the included file.
        path: PathBuf,
        /// File holding the second `include`.
        included_from: PathBuf,
        /// Line of the second `include`.
        lineno: u32,
    },

    /// A syntax error.
    #[error("{}: {error}", .path.display())]
    Parse {
        /// File with the error.
        path: PathBuf,
        /// What the parser said.
        #[source]
        error: ParseError,
    },

    /// The file exists but could not be read.
    #[error("failed to read {}: {message}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// The OS error.
        message: String,
    },

    /// Bytes that are not text in the expected encoding.
    #[error("decoding failed: {message}")]
    Decode {
        /// What went wrong.
        message: String,
    },

    /// An `option` line with a rejected value.
    #[error("{}:{lineno}: {error}", .path.display())]
    InvalidOption {
        /// File with the option.
        path: PathBuf,
        /// Line of the option.
        lineno: u32,
        /// Why it was rejected.
        #[source]
        error: OptionError,
    },

    /// A declared plugin that no registry entry answers to.
    #[error("plugin {name:?} could not be found")]
    PluginLoad {
        /// Name as declared.
        name: String,
    },

    /// A ledger error reported by a stage or plugin, booking errors
    /// included.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Whether a result came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Caching was off, or the input was not a file.
    Disabled,
    /// Served from a blob that still matched.
    Hit,
    /// Computed from the sources.
    Miss,
}

/// Everything a load produces.
#[derive(Debug, Clone)]
pub struct LoadResult {
    /// Directives after the pipeline, in date order.
    pub directives: Vec<Directive>,
    /// Errors from every phase, in the order found.
    pub errors: Vec<LoadError>,
    /// Aggregated options.
    pub options: Options,
    /// How the result was obtained.
    pub cache: CacheStatus,
}

impl LoadResult {
    fn from_entry(entry: CacheEntry, cache: CacheStatus) -> Self {
        Self {
            directives: entry.directives,
            errors: entry.errors,
            options: entry.options,
            cache,
        }
    }
}

/// Loader configuration.
///
/// Caching is on by default. The registry and the deprecated-name table
/// are owned by the loader and shared by every load it performs.
#[derive(Clone)]
pub struct Loader {
    parser: Arc<dyn SourceParser>,
    registry: PluginRegistry,
    deprecated: Arc<DeprecatedPlugins>,
    cache: bool,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// The bundled parser, the native plugins and the standard deprecated
    /// names, with caching on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: Arc::new(DefaultParser),
            registry: PluginRegistry::builtin(),
            deprecated: Arc::new(DeprecatedPlugins::default()),
            cache: true,
        }
    }

    /// Turn the on-disk cache on or off.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Use `registry` to look up declared plugins.
    #[must_use]
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use `deprecated` to rename old plugin names.
    #[must_use]
    pub fn with_deprecated(mut self, deprecated: DeprecatedPlugins) -> Self {
        self.deprecated = Arc::new(deprecated);
        self
    }

    /// Parse sources with `parser`.
    #[must_use]
    pub fn with_parser(mut self, parser: impl SourceParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Tag stored in fingerprints. A blob written by a different build or
    /// with a different set of plugins is never reused.
    fn version_tag(&self) -> String {
        let plugins: Vec<&str> = self.registry.names().collect();
        format!(
            "{}/{}/{}",
            env!("CARGO_PKG_VERSION"),
            CACHE_VERSION,
            plugins.join(",")
        )
    }

    /// Load `path` and everything it includes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineFailure`] if a plugin fails outright. Every other
    /// problem is reported in [`LoadResult::errors`].
    pub fn load(&self, path: &Path) -> Result<LoadResult, PipelineFailure> {
        let Ok(root) = path.canonicalize() else {
            let entry = self.compute(Resolver::new(self.parser.as_ref()).root(path))?;
            let status = if self.cache {
                CacheStatus::Miss
            } else {
                CacheStatus::Disabled
            };
            return Ok(LoadResult::from_entry(entry, status));
        };

        if !self.cache {
            let entry = self.compute(Resolver::new(self.parser.as_ref()).root(&root))?;
            return Ok(LoadResult::from_entry(entry, CacheStatus::Disabled));
        }

        let tag = self.version_tag();
        if let Some(entry) = load_cache_entry(&root) {
            if entry.fingerprint.is_valid_for(&root, &tag) {
                debug!(path = %root.display(), "cache hit");
                return Ok(LoadResult::from_entry(entry, CacheStatus::Hit));
            }
        }
        debug!(path = %root.display(), "cache miss");

        let mut entry = self.compute(Resolver::new(self.parser.as_ref()).root(&root))?;
        entry.fingerprint.tag = tag;
        if let Err(err) = save_cache_entry(&root, &entry) {
            warn!(path = %cache_path(&root).display(), error = %err, "could not write cache");
        }
        Ok(LoadResult::from_entry(entry, CacheStatus::Miss))
    }

    /// Load ledger text held in memory.
    ///
    /// `encoding` names how `bytes` are encoded; see [`decode`]. Includes
    /// are resolved against the current directory. The cache is not used.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineFailure`] if a plugin fails outright.
    pub fn load_text(&self, bytes: &[u8], encoding: &str) -> Result<LoadResult, PipelineFailure> {
        let (text, decode_error) = decode(bytes, encoding);
        let base_dir = std::env::current_dir().unwrap_or_default();
        let resolver =
            Resolver::new(self.parser.as_ref()).root_text(STRING_SOURCE, &text, &base_dir);
        let mut entry = self.compute(resolver)?;
        if let Some(error) = decode_error {
            entry.errors.insert(0, error);
        }
        Ok(LoadResult::from_entry(entry, CacheStatus::Disabled))
    }

    /// Resolve, aggregate, sort and run the pipeline.
    fn compute(&self, resolver: Resolver<'_>) -> Result<CacheEntry, PipelineFailure> {
        let resolution = resolver.run();
        let (mut options, option_errors) = aggregate_options(&resolution.files);
        options.missing_includes = resolution
            .missing
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        options.input_hash = Some(compute_input_hash(watched_paths(&options)));

        let mut errors = resolution.errors;
        let mut directives = Vec::new();
        for file in &resolution.files {
            errors.extend(file.parsed.errors.iter().map(|error| LoadError::Parse {
                path: file.path.clone(),
                error: error.clone(),
            }));
        }
        errors.extend(option_errors);

        let fingerprint = Fingerprint {
            tag: String::new(),
            files: resolution.stamps,
        };

        for file in resolution.files {
            directives.extend(file.parsed.directives);
        }
        sort_directives(&mut directives);

        let (directives, pipeline_errors) =
            run_pipeline(directives, &options, &self.registry, &self.deprecated)?;
        errors.extend(pipeline_errors);

        Ok(CacheEntry {
            fingerprint,
            directives,
            errors,
            options,
        })
    }
}

/// Load `path` with the default [`Loader`].
///
/// # Errors
///
/// Returns [`PipelineFailure`] if a plugin fails outright.
pub fn load_from_path(path: &Path) -> Result<LoadResult, PipelineFailure> {
    Loader::new().load(path)
}

/// Load in-memory ledger text with the default [`Loader`].
///
/// # Errors
///
/// Returns [`PipelineFailure`] if a plugin fails outright.
pub fn load_from_text(bytes: &[u8], encoding: &str) -> Result<LoadResult, PipelineFailure> {
    Loader::new().load_text(bytes, encoding)
}
