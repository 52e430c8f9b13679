//! PATH discovery — enumerates executables reachable via `PATH`, filters out
//! obvious noise, probes the survivors for `--help` support, and caches the
//! scored result to disk.
//!
//! Three phases, run in order: enumerate (`enumerate_candidates`), filter
//! (`is_noise`), probe-and-score (`discover`). Probing is the only phase that
//! spawns processes, and it is bounded — at most `max_concurrent` candidates
//! in flight, and at most one child per candidate running at a time (the
//! help flags `--help`, `-h`, `-?` are tried sequentially, stopping at the
//! first substantive response).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{ClimbError, Result};
use crate::runner::{run, RunOptions};

/// How much help a CLI offers, as observed during probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HelpQuality {
    None,
    Basic,
    Rich,
}

/// A rough bucket for where a candidate's executable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    UserInstalled,
    LanguageTool,
    System,
    Unknown,
}

/// One row of discovery output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredCli {
    pub name: String,
    pub path: PathBuf,
    pub score: i32,
    pub has_help: bool,
    pub help_quality: HelpQuality,
    pub category: Category,
}

/// Options controlling a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub max_concurrent: usize,
    pub probe_timeout: Duration,
    pub min_score: i32,
    pub limit: Option<usize>,
    /// Whether to consult and refresh the on-disk discovery cache.
    pub use_cache: bool,
    /// How long a cached result stays fresh before a full re-scan.
    pub cache_ttl: Duration,
}

/// Default discovery cache freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            probe_timeout: Duration::from_secs(2),
            min_score: -5,
            limit: None,
            use_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

const HELP_FLAGS: &[&str] = &["--help", "-h", "-?"];

/// Phase A — enumerate candidate executables from a `PATH`-style string,
/// deduplicating by file name and preferring the earliest directory.
pub fn enumerate_candidates(path_var: &str) -> Vec<(String, PathBuf)> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for dir in std::env::split_paths(path_var) {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable PATH directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if !seen.insert(name.to_string()) {
                continue;
            }
            if !is_executable(&path) {
                continue;
            }
            out.push((name.to_string(), path));
        }
    }

    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Phase B — the mandatory, purely algorithmic noise filter. No hardcoded
/// allow/deny lists: every rule here is a structural heuristic about the
/// *shape* of a name or path, because probing a false negative just wastes a
/// process spawn while probing a false positive can pop open a GUI window.
pub fn is_noise(name: &str, path: &Path) -> bool {
    if name.len() <= 2 {
        return true;
    }
    if ends_with_version_suffix(name) {
        return true;
    }
    if name.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase()) && name.len() <= 4 {
        return true;
    }
    if name.starts_with('_') {
        return true;
    }
    const NON_CLI_EXT: &[&str] = &[
        ".so", ".a", ".dylib", ".dll", ".o", ".conf", ".txt", ".md", ".json", ".xml", ".yml",
        ".yaml",
    ];
    if NON_CLI_EXT.iter().any(|ext| name.ends_with(ext)) {
        return true;
    }
    if name.ends_with('~') || name.ends_with(".bak") || name.ends_with(".swp") {
        return true;
    }

    let path_str = path.to_string_lossy();
    if path_str.contains("/System/Library/") || path_str.contains("/usr/libexec/") {
        return true;
    }
    if path_str.starts_with("/mnt/") || path_str.contains("Program Files") {
        return true;
    }
    if name.ends_with(".exe") {
        // On a non-Windows host .exe only ever shows up via interop (WSL,
        // Wine) and is never something we can run directly. On an actual
        // Windows host every native executable ends in .exe, so the same
        // rule there would blank out discovery entirely — only drop the
        // ones that are recognizably GUI-bundle launchers.
        if !cfg!(windows) || path_str.contains("Program Files") || path_str.to_lowercase().contains("\\winsxs\\") {
            return true;
        }
    }
    if path_str.contains(".app/Contents/MacOS/")
        && (path_str.to_lowercase().contains("helper") || path_str.to_lowercase().contains("agent"))
    {
        return true;
    }

    false
}

fn ends_with_version_suffix(name: &str) -> bool {
    let tail: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let digits = tail.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 2 {
        return false;
    }
    name.len() > tail.len()
        && matches!(name.as_bytes()[name.len() - tail.len() - 1], b'-' | b'.')
}

fn score_candidate(name: &str, path: &Path, help_quality: HelpQuality, category: Category) -> i32 {
    let mut score = 0;
    match help_quality {
        HelpQuality::None => {}
        HelpQuality::Basic => score += 10 + 4,
        HelpQuality::Rich => score += 10 + 8,
    }
    if (3..=15).contains(&name.len()) {
        score += 2;
    }
    if name.contains('-') {
        score += 2;
    }
    if ends_with_version_suffix(name) {
        score -= 3;
    }
    if name.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        score -= 2;
    }
    match category {
        Category::UserInstalled => score += 5,
        Category::LanguageTool => score += 3,
        Category::System => score -= 2,
        Category::Unknown => score += 1,
    }
    let _ = path;
    score
}

fn categorize(path: &Path) -> Category {
    let s = path.to_string_lossy();
    if s.contains("/.local/bin") || s.ends_with("/local/bin") || s.contains("/local/bin/") {
        Category::UserInstalled
    } else if s.contains("/.cargo/bin")
        || s.contains("/npm")
        || s.contains("/go/bin")
        || s.contains("/.gem/")
        || s.contains("site-packages")
    {
        Category::LanguageTool
    } else if s.starts_with("/usr/bin") || s.starts_with("/bin") {
        Category::System
    } else {
        Category::Unknown
    }
}

/// Probe one candidate sequentially through [`HELP_FLAGS`], stopping at the
/// first response longer than 10 characters. Mandatory: parallel probing of
/// one candidate's flags would multiply process count for no benefit.
async fn probe(path: &Path, timeout: Duration) -> (bool, HelpQuality, Option<String>) {
    let opts = RunOptions {
        timeout,
        ..RunOptions::default()
    };
    for flag in HELP_FLAGS {
        let result = run(
            &path.to_string_lossy(),
            &[flag.to_string()],
            &opts,
        )
        .await;
        let Ok(result) = result else {
            continue;
        };
        let text = if result.stdout.trim().len() > result.stderr.trim().len() {
            result.stdout
        } else {
            result.stderr
        };
        if text.trim().len() > 10 {
            let quality = classify_quality(&text);
            return (true, quality, Some(text));
        }
    }
    (false, HelpQuality::None, None)
}

fn classify_quality(text: &str) -> HelpQuality {
    const RICH_MARKERS: &[&str] = &[
        "SYNOPSIS", "USAGE", "DESCRIPTION", "OPTIONS", "COMMANDS", "EXAMPLES",
    ];
    if text.len() > 500 && RICH_MARKERS.iter().any(|m| text.contains(m)) {
        HelpQuality::Rich
    } else if text.len() > 100 || text.contains("--") {
        HelpQuality::Basic
    } else {
        HelpQuality::None
    }
}

/// Progress callback invoked after each probing batch with (processed, total).
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Run full discovery: enumerate, filter, probe in bounded batches, score,
/// and sort (score descending, name ascending on ties).
pub async fn discover(
    path_var: &str,
    opts: &DiscoverOptions,
    on_progress: Option<ProgressFn>,
) -> Vec<DiscoveredCli> {
    if opts.use_cache {
        if let Some(cache) = load_cache(opts.cache_ttl, path_var) {
            tracing::info!(cached = cache.clis.len(), "discovery cache hit");
            let mut results: Vec<DiscoveredCli> = cache
                .clis
                .into_iter()
                .filter(|c| c.score >= opts.min_score)
                .collect();
            if let Some(limit) = opts.limit {
                results.truncate(limit);
            }
            return results;
        }
        tracing::debug!("discovery cache miss, performing full scan");
    }

    let candidates: Vec<(String, PathBuf)> = enumerate_candidates(path_var)
        .into_iter()
        .filter(|(name, path)| !is_noise(name, path))
        .collect();

    let total = candidates.len();
    tracing::info!(candidates = total, max_concurrent = opts.max_concurrent, "starting discovery probe");
    let semaphore = Arc::new(Semaphore::new(opts.max_concurrent.max(1)));
    let mut results = Vec::with_capacity(total);
    let mut processed = 0usize;

    for chunk in candidates.chunks(opts.max_concurrent.max(1)) {
        let mut handles = Vec::with_capacity(chunk.len());
        for (name, path) in chunk {
            let name = name.clone();
            let path = path.clone();
            let sem = semaphore.clone();
            let timeout = opts.probe_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await;
                let (has_help, help_quality, _text) = probe(&path, timeout).await;
                let category = categorize(&path);
                let score = score_candidate(&name, &path, help_quality, category);
                DiscoveredCli {
                    name,
                    path,
                    score,
                    has_help,
                    help_quality,
                    category,
                }
            }));
        }
        for handle in handles {
            if let Ok(cli) = handle.await {
                processed += 1;
                if cli.score >= opts.min_score {
                    results.push(cli);
                }
            }
        }
        tracing::debug!(processed, total, "discovery batch complete");
        if let Some(cb) = &on_progress {
            cb(processed, total);
        }
    }

    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    if opts.use_cache {
        if let Err(e) = save_cache(&results, path_var) {
            tracing::warn!(error = %e, "failed to persist discovery cache");
        }
    }

    if let Some(limit) = opts.limit {
        results.truncate(limit);
    }
    tracing::info!(found = results.len(), "discovery complete");
    results
}

/// Resolve and probe a single CLI by name, for incremental cache updates.
pub async fn discover_one(name: &str, opts: &DiscoverOptions) -> Option<DiscoveredCli> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            let (has_help, help_quality, _text) = probe(&candidate, opts.probe_timeout).await;
            let category = categorize(&candidate);
            let score = score_candidate(name, &candidate, help_quality, category);
            return Some(DiscoveredCli {
                name: name.to_string(),
                path: candidate,
                score,
                has_help,
                help_quality,
                category,
            });
        }
    }
    None
}

/// On-disk discovery cache shape, keyed by a hash of the PATH string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryCache {
    pub timestamp_ms: u128,
    pub path_hash: String,
    pub clis: Vec<DiscoveredCli>,
}

pub fn hash_path(path_var: &str) -> String {
    let mut hasher = DefaultHasher::new();
    path_var.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn default_cache_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cli-discovery-cache.json"))
}

/// Load the cache if present, fresh (within `ttl`), and keyed to the current
/// PATH. Any failure to parse is treated as absent, per `CacheCorruption`.
pub fn load_cache(ttl: Duration, path_var: &str) -> Option<DiscoveryCache> {
    let cache = load_cache_any_age(path_var)?;
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_millis();
    if now_ms.saturating_sub(cache.timestamp_ms) > ttl.as_millis() {
        return None;
    }
    Some(cache)
}

/// Load the cache regardless of age, as long as it is parseable and keyed to
/// the current PATH — used when merging a single fresh probe in rather than
/// trusting the cache's existing entries as current.
fn load_cache_any_age(path_var: &str) -> Option<DiscoveryCache> {
    let cache_path = default_cache_path()?;
    let content = match std::fs::read_to_string(&cache_path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path = %cache_path.display(), error = %e, "discovery cache unreadable");
            return None;
        }
    };
    let cache: DiscoveryCache = match serde_json::from_str(&content) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(path = %cache_path.display(), error = %e, "discovery cache corrupt, treating as absent");
            return None;
        }
    };
    if cache.path_hash != hash_path(path_var) {
        tracing::debug!("discovery cache PATH hash mismatch, invalidating");
        return None;
    }
    Some(cache)
}

/// Persist the discovery cache. A write failure is silently ignored — the
/// cache is advisory, not load-bearing.
pub fn save_cache(clis: &[DiscoveredCli], path_var: &str) -> Result<()> {
    let Some(cache_path) = default_cache_path() else {
        return Ok(());
    };
    if let Some(parent) = cache_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ClimbError::Io(cache_path.display().to_string(), e.to_string()))?
        .as_millis();
    let cache = DiscoveryCache {
        timestamp_ms: now_ms,
        path_hash: hash_path(path_var),
        clis: clis.to_vec(),
    };
    let json = serde_json::to_string_pretty(&cache)
        .map_err(|e| ClimbError::Io(cache_path.display().to_string(), e.to_string()))?;
    std::fs::write(&cache_path, json)
        .map_err(|e| ClimbError::Io(cache_path.display().to_string(), e.to_string()))
}

/// Merge a freshly-probed CLI into an existing cache snapshot, keeping it sorted.
pub fn upsert(clis: &mut Vec<DiscoveredCli>, updated: DiscoveredCli) {
    clis.retain(|c| c.name != updated.name);
    clis.push(updated);
    clis.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
}

/// Probe a single named CLI and merge it into the on-disk cache, without
/// re-scanning the rest of PATH. Used when a front-end already knows which
/// executable it wants and just needs it scored and persisted.
pub async fn add_single_cli_to_cache(name: &str, opts: &DiscoverOptions) -> Result<Option<DiscoveredCli>> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    let Some(found) = discover_one(name, opts).await else {
        return Ok(None);
    };

    let mut clis = load_cache_any_age(&path_var).map(|c| c.clis).unwrap_or_default();
    upsert(&mut clis, found.clone());
    save_cache(&clis, &path_var)?;

    Ok(Some(found))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_single_letter() {
        assert!(is_noise("a", Path::new("/usr/bin/a")));
    }

    #[test]
    fn test_noise_version_suffixed() {
        assert!(is_noise("python3.11", Path::new("/usr/bin/python3.11")));
        assert!(is_noise("gcc-11", Path::new("/usr/bin/gcc-11")));
    }

    #[test]
    fn test_noise_windows_interop_path() {
        assert!(is_noise("notepad.exe", Path::new("/mnt/c/Windows/notepad.exe")));
    }

    #[test]
    fn test_noise_macos_gui_helper() {
        assert!(is_noise(
            "crashpad_handler",
            Path::new("/Applications/Foo.app/Contents/MacOS/crashpad_helper")
        ));
    }

    #[test]
    fn test_noise_non_cli_extension() {
        assert!(is_noise("libfoo.so", Path::new("/usr/lib/libfoo.so")));
        assert!(is_noise("notes.txt", Path::new("/home/user/bin/notes.txt")));
    }

    #[test]
    fn test_not_noise_normal_tool() {
        assert!(!is_noise("ripgrep", Path::new("/usr/local/bin/ripgrep")));
        assert!(!is_noise("kubectl", Path::new("/usr/local/bin/kubectl")));
    }

    #[test]
    fn test_hash_path_changes_with_path() {
        assert_ne!(hash_path("/usr/bin"), hash_path("/usr/bin:/usr/local/bin"));
    }

    #[tokio::test]
    async fn test_discover_echo_like_script_on_synthetic_path() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("hellocli");
        std::fs::write(
            &script_path,
            "#!/bin/sh\necho 'Usage: hellocli [OPTIONS]'\necho\necho 'Options:'\necho '  -h, --help    Show help'\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let path_var = dir.path().to_string_lossy().to_string();
        let opts = DiscoverOptions { use_cache: false, ..DiscoverOptions::default() };
        let results = discover(&path_var, &opts, None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "hellocli");
        assert!(results[0].has_help);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut clis = vec![DiscoveredCli {
            name: "foo".into(),
            path: PathBuf::from("/usr/bin/foo"),
            score: 1,
            has_help: false,
            help_quality: HelpQuality::None,
            category: Category::Unknown,
        }];
        upsert(
            &mut clis,
            DiscoveredCli {
                name: "foo".into(),
                path: PathBuf::from("/usr/local/bin/foo"),
                score: 20,
                has_help: true,
                help_quality: HelpQuality::Rich,
                category: Category::UserInstalled,
            },
        );
        assert_eq!(clis.len(), 1);
        assert_eq!(clis[0].score, 20);
    }

    #[cfg(feature = "integration-tests")]
    mod integration {
        use super::*;

        #[tokio::test]
        async fn test_real_path_discovery_finds_git() {
            let path_var = std::env::var("PATH").unwrap_or_default();
            let results = discover(&path_var, &DiscoverOptions::default(), None).await;
            assert!(
                results.iter().any(|c| c.name == "git"),
                "expected git to be discoverable on this machine's PATH"
            );
        }
    }
}
