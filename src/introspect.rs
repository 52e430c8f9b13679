//! Introspection & menu orchestrator — the component front-ends actually
//! talk to. Ties the runner ([`crate::runner`]) and help parser
//! ([`crate::help`]) together behind a lazily-expanding, TTL-cached command
//! tree, and turns a chosen path plus flag values into a ready-to-exec argv.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use crate::error::Result;
use crate::help::{self, CommandNode};
use crate::runner::{run, RunOptions};

/// Default time a cached subtree is considered fresh before re-probing.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    node: CommandNode,
    fetched_at: Instant,
}

/// Key for an explored subtree: the root CLI name plus the command path
/// taken to reach it (empty path means the root itself).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct NodeKey {
    cli_name: String,
    path: Vec<String>,
}

/// Coordinates discovery of a CLI's command tree, caching each explored
/// subtree and coalescing concurrent requests for the same unexplored node.
pub struct Introspector {
    ttl: Duration,
    cache: Mutex<HashMap<NodeKey, CacheEntry>>,
    in_flight: Mutex<HashMap<NodeKey, Arc<Notify>>>,
}

impl Default for Introspector {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Introspector {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the root command tree for `executable_path`, probing `--help`
    /// if nothing fresh is cached.
    pub async fn introspect(&self, cli_name: &str, executable_path: &str) -> Result<CommandNode> {
        self.expand(cli_name, executable_path, &[]).await
    }

    /// Return the subtree reached by `path` (empty for the root), probing
    /// `executable_path path... --help` if nothing fresh is cached.
    ///
    /// Concurrent callers asking for the same unexplored `(cli_name, path)`
    /// coalesce onto a single probe: the first caller in does the work, and
    /// the rest wait on a [`Notify`] rather than each spawning their own
    /// child.
    pub async fn expand(
        &self,
        cli_name: &str,
        executable_path: &str,
        path: &[String],
    ) -> Result<CommandNode> {
        let key = NodeKey {
            cli_name: cli_name.to_string(),
            path: path.to_vec(),
        };

        if let Some(node) = self.fresh_cached(&key).await {
            tracing::debug!(cli = %cli_name, ?path, "introspection cache hit");
            return Ok(node);
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&key) {
                Some(existing.clone())
            } else {
                in_flight.insert(key.clone(), Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            tracing::debug!(cli = %cli_name, ?path, "coalescing onto in-flight probe");
            notify.notified().await;
            if let Some(node) = self.fresh_cached(&key).await {
                return Ok(node);
            }
        }

        tracing::info!(cli = %cli_name, ?path, "probing for command subtree");
        let result = self.probe(executable_path, path).await;

        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(notify) = in_flight.remove(&key) {
                notify.notify_waiters();
            }
        }

        let node = result?;
        self.cache
            .lock()
            .await
            .insert(key, CacheEntry { node: node.clone(), fetched_at: Instant::now() });
        Ok(node)
    }

    async fn fresh_cached(&self, key: &NodeKey) -> Option<CommandNode> {
        let cache = self.cache.lock().await;
        let entry = cache.get(key)?;
        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.node.clone())
    }

    async fn probe(&self, executable_path: &str, path: &[String]) -> Result<CommandNode> {
        let mut args: Vec<String> = path.to_vec();
        args.push("--help".to_string());

        let opts = RunOptions::default();
        let result = run(executable_path, &args, &opts).await?;

        let name = path.last().cloned().unwrap_or_else(|| {
            std::path::Path::new(executable_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| executable_path.to_string())
        });

        // A --help child that hangs is not a spawn failure: the executable
        // exists and was resolved fine, it just never answered. The caller
        // still gets a (possibly empty) node rather than an error, with the
        // stall recorded as a warning.
        if result.timed_out {
            tracing::warn!(executable = %executable_path, subpath = ?path, "help probe timed out");
            let mut parsed = help::parse("");
            parsed
                .telemetry
                .warnings
                .push(format!("'{executable_path}' timed out awaiting --help response"));
            return Ok(CommandNode {
                name,
                description: None,
                confidence: parsed.telemetry.avg_command_confidence,
                source_section: None,
                options: parsed.options,
                usages: parsed.usages,
                children: parsed.commands,
                explored: true,
            });
        }

        let text = if result.stdout.trim().is_empty() {
            result.stderr
        } else {
            result.stdout
        };

        let parsed = help::parse(&text);

        Ok(CommandNode {
            name,
            description: None,
            confidence: parsed.telemetry.avg_command_confidence,
            source_section: None,
            options: parsed.options,
            usages: parsed.usages,
            children: parsed.commands,
            explored: true,
        })
    }

    /// Invalidate every cached subtree belonging to `cli_name`.
    pub async fn invalidate(&self, cli_name: &str) {
        let mut cache = self.cache.lock().await;
        cache.retain(|key, _| key.cli_name != cli_name);
    }
}

/// Build a ready-to-exec argv from a resolved path, chosen options, and
/// positional arguments.
///
/// Ordering is fixed: `[cli_name, ...default_args, ...path, ...flags, ...positionals]`.
/// Flags that take a value are emitted as two argv entries (`--flag`,
/// `value`); boolean flags are emitted alone.
pub fn resolve_argv(
    cli_name: &str,
    default_args: &[String],
    path: &[String],
    chosen_options: &[(String, Option<String>)],
    positionals: &[String],
) -> Vec<String> {
    let mut argv = Vec::with_capacity(
        1 + default_args.len() + path.len() + chosen_options.len() * 2 + positionals.len(),
    );

    argv.push(cli_name.to_string());
    argv.extend(default_args.iter().cloned());
    argv.extend(path.iter().cloned());

    for (flag, value) in chosen_options {
        argv.push(flag.clone());
        if let Some(value) = value {
            argv.push(value.clone());
        }
    }

    argv.extend(positionals.iter().cloned());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_argv_ordering() {
        let argv = resolve_argv(
            "git",
            &[],
            &["commit".to_string()],
            &[("--message".to_string(), Some("fix bug".to_string()))],
            &[],
        );
        assert_eq!(argv, vec!["git", "commit", "--message", "fix bug"]);
    }

    #[test]
    fn test_resolve_argv_with_default_args_and_positionals() {
        let argv = resolve_argv(
            "kubectl",
            &["--namespace".to_string(), "default".to_string()],
            &["get".to_string(), "pods".to_string()],
            &[("--output".to_string(), Some("json".to_string()))],
            &["my-pod".to_string()],
        );
        assert_eq!(
            argv,
            vec!["kubectl", "--namespace", "default", "get", "pods", "--output", "json", "my-pod"]
        );
    }

    #[test]
    fn test_resolve_argv_boolean_flag_has_no_value() {
        let argv = resolve_argv(
            "ls",
            &[],
            &[],
            &[("--all".to_string(), None)],
            &[],
        );
        assert_eq!(argv, vec!["ls", "--all"]);
    }

    #[tokio::test]
    async fn test_introspect_caches_and_coalesces() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("gitlike");
        std::fs::write(
            &script_path,
            "#!/bin/sh\necho 'Usage: gitlike <command>'\necho\necho 'Commands:'\necho '  commit  Record changes'\necho '  status  Show status'\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let introspector = Arc::new(Introspector::new(Duration::from_secs(60)));
        let path_str = script_path.to_string_lossy().into_owned();

        let a = introspector.clone();
        let pa = path_str.clone();
        let b = introspector.clone();
        let pb = path_str.clone();

        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.introspect("gitlike", &pa).await }),
            tokio::spawn(async move { b.introspect("gitlike", &pb).await }),
        );

        let node1 = r1.unwrap().unwrap();
        let node2 = r2.unwrap().unwrap();
        assert_eq!(node1.children.len(), 2);
        assert_eq!(node2.children.len(), 2);
        assert!(node1.explored);
        assert!(node1.children.iter().all(|c| !c.explored));
    }

    #[tokio::test]
    async fn test_hung_help_does_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("hangcli");
        std::fs::write(&script_path, "#!/bin/sh\nsleep 60\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let introspector = Introspector::new(Duration::from_secs(60));
        let path_str = script_path.to_string_lossy().into_owned();
        let node = introspector.introspect("hangcli", &path_str).await.unwrap();
        assert!(node.explored);
        assert!(node.children.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("hellocli");
        std::fs::write(&script_path, "#!/bin/sh\necho 'Usage: hellocli'\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let introspector = Introspector::new(Duration::from_secs(60));
        let path_str = script_path.to_string_lossy().into_owned();
        introspector.introspect("hellocli", &path_str).await.unwrap();
        assert!(introspector.fresh_cached(&NodeKey { cli_name: "hellocli".into(), path: vec![] }).await.is_some());
        introspector.invalidate("hellocli").await;
        assert!(introspector.fresh_cached(&NodeKey { cli_name: "hellocli".into(), path: vec![] }).await.is_none());
    }
}
