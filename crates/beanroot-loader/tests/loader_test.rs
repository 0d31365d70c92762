//! Loading ledgers from disk and from memory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beanroot_core::{BookingMethod, Directive};
use beanroot_loader::{
    cache_path, load_from_path, load_from_text, needs_refresh, CacheStatus, DefaultParser,
    LoadError, Loader, SourceParser,
};
use beanroot_parser::ParseResult;
use beanroot_plugin::{Plugin, PluginError, PluginInput, PluginOutput, PluginRegistry};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn append_newline(path: &Path) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(b"\n").unwrap();
}

fn basenames(include: &[String]) -> Vec<String> {
    include
        .iter()
        .map(|p| Path::new(p).file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn uncached() -> Loader {
    Loader::new().with_cache(false)
}

/// Counts parsed files so cache hits are observable.
#[derive(Clone, Default)]
struct CountingParser(Arc<AtomicUsize>);

impl CountingParser {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl SourceParser for CountingParser {
    fn parse(&self, source: &str, filename: &str) -> ParseResult {
        self.0.fetch_add(1, Ordering::SeqCst);
        DefaultParser.parse(source, filename)
    }
}

#[test]
fn test_load_nonexistent_root() {
    let result = uncached()
        .load(Path::new("/bull/bla/root.beancount"))
        .unwrap();
    assert!(result.directives.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].to_string().contains("does not exist"));
    assert!(result.options.include.is_empty());
}

#[test]
fn test_load_with_missing_include() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "root.beancount",
        "include \"/some/file/that/does/not/exist.beancount\"\n",
    );
    let result = uncached().load(&root).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(result.errors[0], LoadError::FileMissing { .. }));
    assert_eq!(basenames(&result.options.include), ["root.beancount"]);
}

#[test]
fn test_load_with_absolute_and_relative_includes() {
    let dir = TempDir::new().unwrap();
    let patates = write(&dir, "legumes/patates.beancount", "2014-01-04 open Assets:Patates\n");
    let root = write(
        &dir,
        "apples.beancount",
        &format!(
            "include \"fruits/oranges.beancount\"\ninclude \"{}\"\n2014-01-01 open Assets:Apples\n",
            patates.display()
        ),
    );
    write(
        &dir,
        "fruits/oranges.beancount",
        "include \"../legumes/tomates.beancount\"\n2014-01-02 open Assets:Oranges\n",
    );
    write(&dir, "legumes/tomates.beancount", "2014-01-03 open Assets:Tomates\n");

    let result = uncached().load(&root).unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.directives.len(), 4);
    assert_eq!(
        basenames(&result.options.include),
        [
            "apples.beancount",
            "oranges.beancount",
            "patates.beancount",
            "tomates.beancount"
        ]
    );
    assert!(result
        .options
        .include
        .iter()
        .all(|p| Path::new(p).is_absolute()));
}

#[test]
fn test_duplicate_include_contributes_once() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "apples.beancount",
        "include \"fruits/oranges.beancount\"\ninclude \"legumes/tomates.beancount\"\n2014-01-01 open Assets:Apples\n",
    );
    write(
        &dir,
        "fruits/oranges.beancount",
        "include \"../legumes/tomates.beancount\"\n2014-01-02 open Assets:Oranges\n",
    );
    write(&dir, "legumes/tomates.beancount", "2014-01-03 open Assets:Tomates\n");

    let result = uncached().load(&root).unwrap();
    assert_eq!(result.directives.len(), 3);
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        &result.errors[0],
        LoadError::DuplicateInclude { lineno: 1, .. }
    ));
    assert_eq!(
        basenames(&result.options.include),
        ["apples.beancount", "oranges.beancount", "tomates.beancount"]
    );
}

#[test]
fn test_include_cycle_terminates() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.beancount", "include \"b.beancount\"\n2014-01-01 open Assets:A\n");
    write(&dir, "b.beancount", "include \"a.beancount\"\n2014-01-01 open Assets:B\n");

    let result = uncached().load(&a).unwrap();
    assert_eq!(result.directives.len(), 2);
    assert_eq!(basenames(&result.options.include), ["a.beancount", "b.beancount"]);
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, LoadError::DuplicateInclude { .. })));
}

#[test]
fn test_options_aggregate_across_files() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "apples.beancount",
        "include \"oranges.beancount\"\ninclude \"bananas.beancount\"\noption \"operating_currency\" \"USD\"\n",
    );
    write(
        &dir,
        "oranges.beancount",
        "option \"operating_currency\" \"CAD\"\noption \"booking_method\" \"FIFO\"\n2015-12-12 open Assets:CA:Checking  CAD\n",
    );
    write(
        &dir,
        "bananas.beancount",
        "option \"operating_currency\" \"EUR\"\noption \"booking_method\" \"LIFO\"\n2015-12-13 open Assets:FR:Checking  EUR\n",
    );

    let result = uncached().load(&root).unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.options.operating_currency, ["USD", "CAD", "EUR"]);
    assert_eq!(result.options.commodities, ["CAD", "EUR"]);
    assert_eq!(result.options.booking_method, BookingMethod::Fifo);
}

#[test]
fn test_cache_hits_until_a_file_changes() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "apples.beancount",
        "include \"oranges.beancount\"\n2014-01-01 open Assets:Apples\n",
    );
    write(
        &dir,
        "oranges.beancount",
        "include \"bananas.beancount\"\n2014-01-02 open Assets:Oranges\n",
    );
    write(&dir, "bananas.beancount", "2014-01-02 open Assets:Bananas\n");

    let parser = CountingParser::default();
    let loader = Loader::new().with_parser(parser.clone());

    let first = loader.load(&root).unwrap();
    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(first.directives.len(), 3);
    assert_eq!(parser.count(), 3);
    assert!(cache_path(&root.canonicalize().unwrap()).exists());

    let second = loader.load(&root).unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(parser.count(), 3);
    assert_eq!(second.directives, first.directives);
    assert_eq!(second.errors, first.errors);
    assert_eq!(second.options, first.options);

    append_newline(&root);
    assert_eq!(loader.load(&root).unwrap().cache, CacheStatus::Miss);
    assert_eq!(parser.count(), 6);
    assert_eq!(loader.load(&root).unwrap().cache, CacheStatus::Hit);

    append_newline(&dir.path().join("bananas.beancount"));
    assert_eq!(loader.load(&root).unwrap().cache, CacheStatus::Miss);
    assert_eq!(parser.count(), 9);
}

#[test]
fn test_cache_notices_created_include() {
    let dir = TempDir::new().unwrap();
    let root = write(&dir, "root.beancount", "include \"later.beancount\"\n");

    let loader = Loader::new();
    let first = loader.load(&root).unwrap();
    assert_eq!(first.errors.len(), 1);
    assert_eq!(loader.load(&root).unwrap().cache, CacheStatus::Hit);

    write(&dir, "later.beancount", "2014-01-01 open Assets:Cash\n");
    let reloaded = loader.load(&root).unwrap();
    assert_eq!(reloaded.cache, CacheStatus::Miss);
    assert!(reloaded.errors.is_empty());
    assert_eq!(reloaded.directives.len(), 1);
}

#[test]
fn test_moved_root_needs_refresh() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "apples.beancount",
        "include \"oranges.beancount\"\n2014-01-01 open Assets:Apples\n",
    );
    write(&dir, "oranges.beancount", "2014-01-02 open Assets:Oranges\n");

    let result = load_from_path(&root).unwrap();
    assert!(result.errors.is_empty());
    assert!(!needs_refresh(&result.options));

    fs::rename(&root, dir.path().join("bigapples.beancount")).unwrap();
    assert!(needs_refresh(&result.options));

    let reloaded = load_from_path(&root).unwrap();
    assert_ne!(reloaded.cache, CacheStatus::Hit);
    assert!(reloaded.directives.is_empty());
}

#[test]
fn test_created_include_needs_refresh() {
    let dir = TempDir::new().unwrap();
    let root = write(&dir, "root.beancount", "include \"later.beancount\"\n");

    let result = uncached().load(&root).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(basenames(&result.options.missing_includes), ["later.beancount"]);
    assert!(!needs_refresh(&result.options));

    write(&dir, "later.beancount", "2014-01-01 open Assets:Cash\n");
    assert!(needs_refresh(&result.options));
}

#[test]
fn test_cache_blob_is_hidden() {
    let dir = TempDir::new().unwrap();
    let root = write(&dir, "main.beancount", "2014-01-01 open Assets:Cash\n");
    Loader::new().load(&root).unwrap();
    assert!(dir.path().join(".main.beancount.cache").exists());
    assert!(!dir.path().join("main.beancount.cache").exists());
}

#[test]
fn test_cache_does_not_change_results() {
    let dir = TempDir::new().unwrap();
    let root = write(
        &dir,
        "main.beancount",
        concat!(
            "option \"title\" \"Household\"\n",
            "plugin \"beancount.plugins.nothing_here\"\n",
            "2014-01-01 open Assets:Cash\n",
            "2014-01-01 open Expenses:Food\n",
            "2014-01-05 * \"Lunch\"\n",
            "  Expenses:Food   12.50 USD\n",
            "  Assets:Cash\n",
            "2014-01-06 balance Assets:Cash  -12.50 USD\n",
        ),
    );
    let plain = uncached().load(&root).unwrap();
    assert_eq!(plain.errors.len(), 1);

    let loader = Loader::new();
    let miss = loader.load(&root).unwrap();
    let hit = loader.load(&root).unwrap();
    assert_eq!(hit.cache, CacheStatus::Hit);
    for cached in [&miss, &hit] {
        assert_eq!(cached.directives, plain.directives);
        assert_eq!(cached.errors, plain.errors);
        assert_eq!(cached.options, plain.options);
    }
}

#[test]
fn test_load_text_encodings() {
    let text = "2015-01-01 open Assets:Something\n2015-05-23 note Assets:Something \"¡¢£¤¥¦§¨©ª«¬®¯°±²³´µ¶·¸¹º»¼\"\n";

    let result = load_from_text(text.as_bytes(), "utf8").unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.cache, CacheStatus::Disabled);

    let latin1: Vec<u8> = text.chars().map(|c| c as u8).collect();
    let decoded = load_from_text(&latin1, "latin1").unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.directives, result.directives);
}

#[test]
fn test_load_text_plugins() {
    let deprecated = load_from_text(b"plugin \"beancount.ops.auto_accounts\"\n", "utf-8").unwrap();
    assert!(deprecated.errors.is_empty(), "{:?}", deprecated.errors);

    let invalid = load_from_text(b"plugin \"invalid.module.name\"\n", "utf-8").unwrap();
    assert_eq!(invalid.errors.len(), 1);
    assert!(matches!(invalid.errors[0], LoadError::PluginLoad { .. }));
}

#[test]
fn test_booking_error_reaches_caller() {
    let text = concat!(
        "2014-01-01 open Assets:Broker\n",
        "2014-01-02 * \"Buy\"\n",
        "  Assets:Broker    10 GOOG {45 USD}\n",
        "  Assets:Cash    -450 USD\n",
        "2014-01-03 * \"Sell\"\n",
        "  Assets:Broker    -4 GOOG\n",
        "  Assets:Cash     180 USD\n",
    );
    let strict = load_from_text(text.as_bytes(), "utf-8").unwrap();
    assert!(
        matches!(
            strict.errors.first(),
            Some(LoadError::Plugin(PluginError::Booking(_)))
        ),
        "{:?}",
        strict.errors
    );

    let fifo = format!("option \"booking_method\" \"FIFO\"\n{text}");
    let fifo = load_from_text(fifo.as_bytes(), "utf-8").unwrap();
    assert!(fifo.errors.is_empty(), "{:?}", fifo.errors);
}

#[test]
fn test_out_of_range_amounts_are_reported() {
    let text = concat!(
        "2014-01-01 open Assets:A\n",
        "2014-01-01 open Equity:Opening\n",
        "2014-01-02 * \"Fill\"\n",
        "  Assets:A    79228162514264337593543950335 USD\n",
        "  Equity:Opening\n",
        "2014-01-03 * \"Fill again\"\n",
        "  Assets:A    79228162514264337593543950335 USD\n",
        "  Equity:Opening\n",
    );
    let result = load_from_text(text.as_bytes(), "utf-8").unwrap();
    assert!(
        result.errors.iter().any(|e| matches!(e, LoadError::Plugin(PluginError::Booking(_)))
            && e.to_string().contains("overflows")),
        "{:?}",
        result.errors
    );
    assert_eq!(result.directives.len(), 4);
}

#[test]
fn test_tiny_units_with_huge_total_price() {
    let text = concat!(
        "2014-01-01 open Assets:Stock\n",
        "2014-01-01 open Assets:Cash\n",
        "2014-01-02 * \"Odd fill\"\n",
        "  Assets:Stock    0.0000000000000000000000000001 GOOG @@ 79228162514264337593543950335 USD\n",
        "  Assets:Cash\n",
    );
    let result = load_from_text(text.as_bytes(), "utf-8").unwrap();
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.directives.len(), 3);
}

#[test]
fn test_unknown_open_booking_method_is_reported() {
    let text = concat!(
        "2014-01-01 open Assets:Broker \"SOMETIMES\"\n",
        "2014-01-01 open Assets:Cash\n",
        "2014-01-02 * \"Buy\"\n",
        "  Assets:Broker    10 GOOG {45 USD}\n",
        "  Assets:Cash    -450 USD\n",
    );
    let result = load_from_text(text.as_bytes(), "utf-8").unwrap();
    assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
    assert!(result.errors[0].to_string().contains("SOMETIMES"));
}

struct Explodes;

impl Plugin for Explodes {
    fn name(&self) -> &'static str {
        "explodes"
    }

    fn process(&self, _input: PluginInput<'_>) -> anyhow::Result<PluginOutput> {
        anyhow::bail!("boom")
    }
}

#[test]
fn test_plugin_failure_aborts_load() {
    let mut registry = PluginRegistry::builtin();
    registry.register(Explodes);
    let failure = uncached()
        .with_registry(registry)
        .load_text(b"plugin \"explodes\"\n2014-01-01 open Assets:Cash\n", "utf-8")
        .unwrap_err();
    assert_eq!(failure.plugin, "explodes");
}

#[test]
fn test_loaded_directives_are_sorted() {
    let result = load_from_text(
        b"2014-02-01 open Assets:B\n2014-01-01 open Assets:A\n",
        "utf-8",
    )
    .unwrap();
    let dates: Vec<_> = result.directives.iter().map(Directive::date).collect();
    let mut sorted = dates.clone();
    sorted.sort();
    assert_eq!(dates, sorted);
}
