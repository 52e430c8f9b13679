//! Sandbox environment — the restricted environment-variable map handed to
//! every child process the engine spawns.
//!
//! A generic introspection engine runs executables it has never seen before,
//! purely to read their `--help` text. Left alone, many of those executables
//! will try to page their output, open a GUI window, or prompt an editor —
//! any of which would hang the engine waiting on a human who isn't there.
//! `sandbox_env` neutralises all three classes of hostile behaviour and pins
//! down everything else (terminal width, color) so output is deterministic.

use std::collections::HashMap;
use std::env;

/// Sentinel set on every sandboxed child so it can detect this context if it wishes.
pub const DISCOVERY_SENTINEL: &str = "CLIMB_DISCOVERY";

/// Build the environment map to use when spawning a child for introspection
/// or execution.
///
/// Starts from the ambient process environment (so things like `PATH` and
/// `HOME` still work) and overrides the specific variables below. Pure
/// function: the same ambient environment always produces the same result.
pub fn sandbox_env() -> HashMap<String, String> {
    let mut env: HashMap<String, String> = env::vars().collect();

    // Interactive pagers.
    env.insert("PAGER".into(), "cat".into());
    env.insert("MANPAGER".into(), "cat".into());
    env.insert("GIT_PAGER".into(), "cat".into());
    env.insert("SYSTEMD_PAGER".into(), "cat".into());
    env.remove("AWS_PAGER");
    env.insert("AWS_PAGER".into(), "".into());
    env.insert("LESS".into(), "FRX".into());

    // GUI launches.
    env.remove("DISPLAY");
    env.remove("WAYLAND_DISPLAY");
    env.remove("DBUS_SESSION_BUS_ADDRESS");
    env.remove("XDG_RUNTIME_DIR");
    env.remove("XDG_CURRENT_DESKTOP");
    env.insert("QT_QPA_PLATFORM".into(), "offscreen".into());
    env.insert("SDL_AUDIODRIVER".into(), "dummy".into());
    env.insert("NO_AT_BRIDGE".into(), "1".into());

    // Editor / browser / sudo prompts.
    env.insert("VISUAL".into(), "true".into());
    env.insert("EDITOR".into(), "true".into());
    env.insert("GIT_EDITOR".into(), "true".into());
    env.insert("BROWSER".into(), "true".into());
    env.insert("SUDO_ASKPASS".into(), "false".into());

    // Determinism.
    env.insert("TERM".into(), "dumb".into());
    env.insert("COLUMNS".into(), "80".into());
    env.insert("LINES".into(), "24".into());
    env.insert("NO_COLOR".into(), "1".into());
    env.insert("CI".into(), "1".into());
    env.insert("ANSIBLE_NOCOLOR".into(), "1".into());

    env.insert(DISCOVERY_SENTINEL.into(), "1".into());

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pager_neutralized() {
        let env = sandbox_env();
        assert_eq!(env.get("PAGER").map(String::as_str), Some("cat"));
        assert_eq!(env.get("GIT_PAGER").map(String::as_str), Some("cat"));
        assert_eq!(env.get("AWS_PAGER").map(String::as_str), Some(""));
    }

    #[test]
    fn test_gui_vars_cleared_or_headless() {
        let env = sandbox_env();
        assert!(!env.contains_key("DISPLAY"));
        assert!(!env.contains_key("WAYLAND_DISPLAY"));
        assert_eq!(env.get("QT_QPA_PLATFORM").map(String::as_str), Some("offscreen"));
        assert_eq!(env.get("SDL_AUDIODRIVER").map(String::as_str), Some("dummy"));
    }

    #[test]
    fn test_prompts_neutralized() {
        let env = sandbox_env();
        assert_eq!(env.get("EDITOR").map(String::as_str), Some("true"));
        assert_eq!(env.get("VISUAL").map(String::as_str), Some("true"));
        assert_eq!(env.get("SUDO_ASKPASS").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_determinism_vars() {
        let env = sandbox_env();
        assert_eq!(env.get("TERM").map(String::as_str), Some("dumb"));
        assert_eq!(env.get("COLUMNS").map(String::as_str), Some("80"));
        assert_eq!(env.get("NO_COLOR").map(String::as_str), Some("1"));
        assert_eq!(env.get(DISCOVERY_SENTINEL).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_overrides_ambient_values() {
        // SAFETY: test-only, no concurrent threads depend on this env var.
        unsafe { env::set_var("PAGER", "less") };
        let env = sandbox_env();
        assert_eq!(env.get("PAGER").map(String::as_str), Some("cat"));
        // SAFETY: test-only cleanup.
        unsafe { env::remove_var("PAGER") };
    }
}
