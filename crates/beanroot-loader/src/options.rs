//! Option aggregation across the include closure.

use std::collections::HashSet;

use beanroot_core::Options;

use crate::resolve::SourceFile;
use crate::LoadError;

/// Merge the `option`, `plugin` and currency declarations of `files`.
///
/// `files` must be in resolution order with the root first. Accumulating
/// options collect every distinct value across all files. Any other key
/// takes its value from the first file that sets it; within one file the
/// last line wins. Rejected values are reported and leave the default.
///
/// `include` lists the on-disk files of the closure, sorted.
pub fn aggregate_options(files: &[SourceFile]) -> (Options, Vec<LoadError>) {
    let mut options = Options::new();
    let mut errors = Vec::new();
    let mut claimed: HashSet<&str> = HashSet::new();

    for file in files {
        let mut set_here: HashSet<&str> = HashSet::new();
        for (key, value, lineno) in &file.parsed.options {
            if !Options::is_accumulating(key) && claimed.contains(key.as_str()) {
                continue;
            }
            match options.set(key, value) {
                Ok(()) => {
                    set_here.insert(key.as_str());
                }
                Err(error) => errors.push(LoadError::InvalidOption {
                    path: file.path.clone(),
                    lineno: *lineno,
                    error,
                }),
            }
        }
        claimed.extend(set_here);

        for (name, config, _) in &file.parsed.plugins {
            options.add_plugin(name, config.as_deref());
        }
        for currency in &file.parsed.commodities {
            options.add_commodity(currency);
        }
    }

    let mut include: Vec<String> = files
        .iter()
        .filter(|f| f.on_disk)
        .map(|f| f.path.display().to_string())
        .collect();
    include.sort();
    for path in &include {
        options.add_include(path);
    }
    options.filename = files.first().map(|f| f.path.display().to_string());

    (options, errors)
}
