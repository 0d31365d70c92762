//! Include resolution.
//!
//! Files are processed in first-in first-out discovery order starting with
//! the root. Include paths are relative to the including file's directory
//! unless absolute, and are compared after canonicalization, so two
//! spellings of the same file count as one.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

use beanroot_parser::ParseResult;

use crate::cache::FileStamp;
use crate::encoding::decode;
use crate::LoadError;

/// Turns file content into directives.
///
/// The loader only needs the output shape of [`ParseResult`]; any grammar
/// that produces it can be plugged in with
/// [`Loader::with_parser`](crate::Loader::with_parser).
pub trait SourceParser: Send + Sync {
    /// Parse `source`, read from `filename`.
    fn parse(&self, source: &str, filename: &str) -> ParseResult;
}

/// The bundled ledger grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

impl SourceParser for DefaultParser {
    fn parse(&self, source: &str, filename: &str) -> ParseResult {
        beanroot_parser::parse(source, filename)
    }
}

/// One file of the include closure.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Canonical path, or a placeholder name for in-memory text.
    pub path: PathBuf,
    /// What the parser made of it.
    pub parsed: ParseResult,
    /// False for text that did not come from disk.
    pub on_disk: bool,
}

/// The include closure of one root.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Files in processing order, root first.
    pub files: Vec<SourceFile>,
    /// Includes that did not exist.
    pub missing: Vec<PathBuf>,
    /// Every on-disk file and missing include, stamped before it was read.
    pub stamps: Vec<FileStamp>,
    /// Missing files, duplicate includes, unreadable files.
    pub errors: Vec<LoadError>,
}

/// A pending include: the path to read and the `include` line that asked
/// for it.
struct Pending {
    path: PathBuf,
    from: Option<(PathBuf, u32)>,
}

/// Resolves the closure breadth first.
pub(crate) struct Resolver<'a> {
    parser: &'a dyn SourceParser,
    queue: VecDeque<Pending>,
    seen: HashSet<PathBuf>,
    resolution: Resolution,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(parser: &'a dyn SourceParser) -> Self {
        Self {
            parser,
            queue: VecDeque::new(),
            seen: HashSet::new(),
            resolution: Resolution::default(),
        }
    }

    /// Start from a file on disk.
    pub(crate) fn root(mut self, path: &Path) -> Self {
        self.queue.push_back(Pending {
            path: path.to_path_buf(),
            from: None,
        });
        self
    }

    /// Start from text that is already in memory. Its includes resolve
    /// against `base_dir`.
    pub(crate) fn root_text(mut self, name: &str, source: &str, base_dir: &Path) -> Self {
        let parsed = self.parser.parse(source, name);
        let file = SourceFile {
            path: PathBuf::from(name),
            parsed,
            on_disk: false,
        };
        self.enqueue_includes(&file, base_dir);
        self.resolution.files.push(file);
        self
    }

    pub(crate) fn run(mut self) -> Resolution {
        while let Some(pending) = self.queue.pop_front() {
            self.visit(pending);
        }
        self.resolution
    }

    fn visit(&mut self, pending: Pending) {
        let canonical = match pending.path.canonicalize() {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                trace!(path = %pending.path.display(), "include does not exist");
                self.resolution.stamps.push(FileStamp::of(&pending.path));
                self.resolution.missing.push(pending.path.clone());
                self.resolution
                    .errors
                    .push(LoadError::FileMissing { path: pending.path });
                return;
            }
            Err(err) => {
                self.resolution.errors.push(LoadError::Io {
                    path: pending.path,
                    message: err.to_string(),
                });
                return;
            }
        };

        if !self.seen.insert(canonical.clone()) {
            let (included_from, lineno) = pending.from.unwrap_or_default();
            self.resolution.errors.push(LoadError::DuplicateInclude {
                path: canonical,
                included_from,
                lineno,
            });
            return;
        }

        // A write that lands during the read must invalidate the result.
        self.resolution.stamps.push(FileStamp::of(&canonical));
        let bytes = match fs::read(&canonical) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.resolution.errors.push(LoadError::Io {
                    path: canonical,
                    message: err.to_string(),
                });
                return;
            }
        };
        let (source, decode_error) = decode(&bytes, "utf-8");
        self.resolution.errors.extend(decode_error);

        let filename = canonical.display().to_string();
        trace!(path = %filename, "parsing");
        let file = SourceFile {
            parsed: self.parser.parse(&source, &filename),
            path: canonical,
            on_disk: true,
        };
        let base_dir = file.path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.enqueue_includes(&file, &base_dir);
        self.resolution.files.push(file);
    }

    fn enqueue_includes(&mut self, file: &SourceFile, base_dir: &Path) {
        for (include, lineno) in &file.parsed.includes {
            let include = Path::new(include);
            let path = if include.is_absolute() {
                include.to_path_buf()
            } else {
                base_dir.join(include)
            };
            self.queue.push_back(Pending {
                path,
                from: Some((file.path.clone(), *lineno)),
            });
        }
    }
}
