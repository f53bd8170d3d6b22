//! Process-wide property cache backed by a `key=value` file
//!
//! The cache is loaded once and can be refreshed or cleared at runtime.
//! [`update_property`] rewrites a single key in place: the new content goes
//! to a temporary file in the same directory, which then replaces the
//! original, so readers never observe a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use crate::config::ConfigStore;
use crate::error::{Error, Result};

/// In-memory copy of a property file
#[derive(Debug)]
pub struct PropertyCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl PropertyCache {
    /// Load `path` into a new cache
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self {
            path: path.into(),
            entries: RwLock::default(),
        };
        cache.refresh()?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing every cached entry
    ///
    /// On failure the previous entries are kept.
    pub fn refresh(&self) -> Result<usize> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            tracing::error!(
                "Exception occurred while loading configuration properties from {}: {}",
                self.path.display(),
                e
            );
            Error::property_file(&self.path, format!("failed to load properties: {}", e))
        })?;

        let parsed = parse_properties(&content);
        let count = parsed.len();
        *self.write_entries() = parsed;

        tracing::info!("Loaded {} properties from {}", count, self.path.display());
        Ok(count)
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.write_entries().clear();
        tracing::info!("Properties cleared");
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Integer value for `key`
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| {
                    Error::Configuration(format!("{} is not an integer: '{}'", key, raw))
                })
            })
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every entry
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persist `key=value` to the backing file, then update the cache
    pub fn update(&self, key: &str, value: &str) -> Result<()> {
        update_property(&self.path, key, value)?;
        self.write_entries()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for PropertyCache {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}

/// Parse `key=value` / `key: value` lines
///
/// `#` and `!` start comments. A trailing backslash continues the value on
/// the next line. Later duplicates win.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        if !is_entry(line) {
            continue;
        }

        let mut logical = line.trim_start().to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        entries.insert(key.to_string(), value.to_string());
    }

    entries
}

fn is_entry(line: &str) -> bool {
    let trimmed = line.trim_start();
    !(trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!'))
}

/// Split on the first `=` or `:` into a trimmed key and its value
fn split_entry(line: &str) -> (&str, &str) {
    match line.find(['=', ':']) {
        Some(index) => (line[..index].trim(), line[index + 1..].trim_start()),
        None => (line.trim(), ""),
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Replace (or append) one property in `path`
///
/// Every entry whose key is `key` is rewritten as `key=value`, whatever
/// separator and spacing it used, continuation lines included. Every other
/// line, comments and ordering included, is preserved. Repeating the same
/// update leaves the file unchanged.
pub fn update_property(path: impl AsRef<Path>, key: &str, value: &str) -> Result<()> {
    let path = path.as_ref();

    if key.is_empty() || key.contains(['=', ':', '\n', '\r']) || key.trim() != key {
        return Err(Error::property_file(
            path,
            format!("invalid property key '{}'", key),
        ));
    }
    if value.contains(['\n', '\r']) {
        return Err(Error::property_file(
            path,
            format!("value for {} must be a single line", key),
        ));
    }

    let original = fs::read_to_string(path).map_err(|e| {
        Error::property_file(
            path,
            format!("error occurred while reading file for key {}: {}", key, e),
        )
    })?;

    let updated = rewrite_properties(&original, key, value);
    let write_error = |e: std::io::Error| {
        Error::property_file(
            path,
            format!("error occurred while updating key {}: {}", key, e),
        )
    };

    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(updated.as_bytes()).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;

    // Keep the original file's permissions rather than the temp file's 0600
    let permissions = fs::metadata(path).map_err(write_error)?.permissions();
    temp.as_file().set_permissions(permissions).map_err(write_error)?;

    temp.persist(path).map_err(|e| write_error(e.error))?;

    tracing::debug!(key, "Updated property in {}", path.display());
    Ok(())
}

fn rewrite_properties(original: &str, key: &str, value: &str) -> String {
    let entry = format!("{}={}", key, value);
    let mut out = String::with_capacity(original.len() + entry.len() + 1);
    let mut replaced = false;
    // The previous physical line ended with a continuation backslash
    let mut continued = false;
    let mut dropping = false;

    for line in original.lines() {
        if continued {
            continued = ends_with_continuation(line);
            if !dropping {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        }

        dropping = false;
        if is_entry(line) {
            let trimmed = line.trim_start();
            continued = ends_with_continuation(trimmed);
            if split_entry(trimmed).0 == key {
                out.push_str(&entry);
                out.push('\n');
                replaced = true;
                dropping = continued;
                continue;
            }
        }

        out.push_str(line);
        out.push('\n');
    }

    if !replaced {
        out.push_str(&entry);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# broker settings
config.kafka.enable-log-kafka=false
config.kafka.server-details = localhost:4222
config.kafka.log-topic: app.logs
retry.count=3
";

    fn sample_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("application.properties");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_parse_separators_and_comments() {
        let entries = parse_properties(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries["config.kafka.enable-log-kafka"], "false");
        assert_eq!(entries["config.kafka.server-details"], "localhost:4222");
        assert_eq!(entries["config.kafka.log-topic"], "app.logs");
    }

    #[test]
    fn test_parse_continuation_and_bare_keys() {
        let entries = parse_properties("servers=a:1,\\\n    b:2\nflag\n! comment\n");
        assert_eq!(entries["servers"], "a:1,b:2");
        assert_eq!(entries["flag"], "");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = PropertyCache::load(sample_file(&dir)).unwrap();

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get_int("retry.count").unwrap(), Some(3));
        assert_eq!(cache.get_int("missing").unwrap(), None);
        assert!(cache.get_int("config.kafka.log-topic").is_err());
        assert_eq!(
            cache.get_bool("config.kafka.enable-log-kafka").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = PropertyCache::load(dir.path().join("absent.properties")).unwrap_err();
        assert!(matches!(err, Error::PropertyFile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_refresh_and_clear() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);
        let cache = PropertyCache::load(&path).unwrap();

        fs::write(&path, "only.key=1\n").unwrap();
        assert_eq!(cache.refresh().unwrap(), 1);
        assert_eq!(cache.get("only.key").as_deref(), Some("1"));
        assert_eq!(cache.get("retry.count"), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_refresh_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);
        let cache = PropertyCache::load(&path).unwrap();

        fs::remove_file(&path).unwrap();
        assert!(cache.refresh().is_err());
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);

        update_property(&path, "retry.count", "5").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# broker settings\n\
             config.kafka.enable-log-kafka=false\n\
             config.kafka.server-details = localhost:4222\n\
             config.kafka.log-topic: app.logs\n\
             retry.count=5\n"
        );
    }

    #[test]
    fn test_update_matches_spaced_and_colon_separators() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);

        update_property(&path, "config.kafka.server-details", "new:4222").unwrap();
        update_property(&path, "config.kafka.server-details", "new:4222").unwrap();
        update_property(&path, "config.kafka.log-topic", "app.events").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# broker settings\n\
             config.kafka.enable-log-kafka=false\n\
             config.kafka.server-details=new:4222\n\
             config.kafka.log-topic=app.events\n\
             retry.count=3\n"
        );

        let entries = parse_properties(&content);
        assert_eq!(entries["config.kafka.server-details"], "new:4222");
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_update_replaces_continued_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.properties");
        fs::write(&path, "servers = a:1,\\\n    b:2\nother=x\\\nservers=still-other\n").unwrap();

        update_property(&path, "servers", "c:3").unwrap();

        // The continuation of `other` is not a key line of its own
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "servers=c:3\nother=x\\\nservers=still-other\n"
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);

        update_property(&path, "config.kafka.enable-log-kafka", "true").unwrap();
        let first = fs::read_to_string(&path).unwrap();
        update_property(&path, "config.kafka.enable-log-kafka", "true").unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        let matching = second
            .lines()
            .filter(|l| l.starts_with("config.kafka.enable-log-kafka="))
            .count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn test_update_appends_missing_key_once() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);

        update_property(&path, "config.kafka.audit-topic", "app.audit").unwrap();
        update_property(&path, "config.kafka.audit-topic", "app.audit").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(SAMPLE));
        assert!(content.ends_with("config.kafka.audit-topic=app.audit\n"));
        assert_eq!(content.matches("config.kafka.audit-topic=").count(), 1);
    }

    #[test]
    fn test_update_missing_file_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.properties");

        let err = update_property(&path, "k", "v").unwrap_err();
        assert!(matches!(err, Error::PropertyFile { .. }));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_update_rejects_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);

        assert!(update_property(&path, "", "v").is_err());
        assert!(update_property(&path, "a=b", "v").is_err());
        assert!(update_property(&path, "k", "two\nlines").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE);
    }

    #[test]
    fn test_cache_update_writes_through() {
        let dir = TempDir::new().unwrap();
        let path = sample_file(&dir);
        let cache = PropertyCache::load(&path).unwrap();

        cache.update("retry.count", "9").unwrap();
        assert_eq!(cache.get_int("retry.count").unwrap(), Some(9));

        let reloaded = PropertyCache::load(&path).unwrap();
        assert_eq!(reloaded.get("retry.count").as_deref(), Some("9"));
    }
}
