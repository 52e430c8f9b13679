//! Help text parser — turns arbitrary `--help` output into a structured
//! [`ParsedHelp`] tree annotated with per-entity confidence and aggregate
//! telemetry.
//!
//! This is deliberately heuristic. CLI authors do not follow a shared
//! grammar for help text, so the parser never fails outright: an
//! unrecognised or empty input simply yields an empty `ParsedHelp` with a
//! telemetry warning. Determinism matters more than cleverness — the same
//! text must always produce byte-identical output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// One node in a CLI's discovered command tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandNode {
    pub name: String,
    pub description: Option<String>,
    pub confidence: f32,
    /// Which section label this entry was extracted from (e.g. "commands").
    pub source_section: Option<String>,
    pub options: Vec<CliOption>,
    pub usages: Vec<Usage>,
    /// Subcommands of this node. Empty does not necessarily mean "no
    /// subcommands" — see [`crate::introspect`] for lazy expansion.
    pub children: Vec<CommandNode>,
    /// Whether `children` reflects an actual `--help` probe of this node, as
    /// opposed to names merely extracted from a parent's command listing.
    /// Always `false` out of [`parse`]; [`crate::introspect::Introspector`]
    /// flips it once it has fetched the subtree.
    pub explored: bool,
}

/// A flag or named parameter belonging to a [`CommandNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliOption {
    pub long: Option<String>,
    pub short: Option<String>,
    pub takes_value: bool,
    pub value_name: Option<String>,
    pub description: Option<String>,
    pub default: Option<String>,
    pub repeatable: bool,
    pub confidence: f32,
}

/// A raw usage/synopsis line, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub text: String,
    pub section: String,
}

/// Aggregate statistics and warnings produced while parsing one help text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub sections_detected: usize,
    pub command_blocks: usize,
    pub option_blocks: usize,
    pub warnings: Vec<String>,
    pub avg_command_confidence: f32,
    pub avg_option_confidence: f32,
}

/// The full result of parsing one help text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedHelp {
    pub commands: Vec<CommandNode>,
    pub options: Vec<CliOption>,
    pub usages: Vec<Usage>,
    pub telemetry: Telemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Usage,
    Commands,
    Options,
    Examples,
    Description,
    Environment,
    SeeAlso,
    Arguments,
    Other,
}

struct Section<'a> {
    kind: SectionKind,
    label: &'a str,
    lines: Vec<&'a str>,
}

static SECTION_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s{0,1}([A-Za-z][A-Za-z /]*?)\s*:?\s*$").expect("valid regex")
});

// Group 4 is the value placeholder: a delimited form (`<NAME>`, `[NAME]`),
// an all-caps token (`NAME`, `FILE`), or a bare lowercase type name in the
// kubectl/cobra/pflag style (`string`, `int`, `duration`...). The trailing
// `\b` keeps it from partially matching the lead word of a description —
// without it "Show help" would match "S" as a one-letter placeholder.
// Group 5 captures whatever whitespace follows the placeholder; callers
// still have to check that gap (or check that nothing trails at all) before
// trusting group 4, since a real description can also start with a short
// capitalized word followed by a single space.
static FLAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:-([a-zA-Z0-9]),?\s*)?(?:--([a-zA-Z][a-zA-Z0-9_-]*))(=|\s+)?(<[^>]+>|\[[^\]]+\]|(?:[A-Z][A-Z0-9_-]*|string|int(?:8|16|32|64)?|uint(?:8|16|32|64)?|float(?:32|64)?|bool|duration|bytes(?:Base64|Hex)?|ip(?:Slice)?|cidr|stringArray|stringSlice|intSlice|uintSlice|count)\b)?(\s*)(.*)$",
    )
    .expect("valid regex")
});

static SHORT_ONLY_FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-([a-zA-Z0-9])\b(?:\s+(.*))?$").expect("valid regex"));

static COMMAND_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s{1,8})([a-zA-Z][a-zA-Z0-9_-]*(?:\s*[,|]\s*[a-zA-Z][a-zA-Z0-9_-]*)*)(?:\s{2,}(.*))?$")
        .expect("valid regex")
});

fn classify_label(label: &str) -> SectionKind {
    let lower = label.to_lowercase();
    match lower.as_str() {
        "usage" | "synopsis" => SectionKind::Usage,
        "commands" | "available commands" | "subcommands" | "core commands"
        | "management commands" | "other commands" | "groups" => SectionKind::Commands,
        "options" | "flags" | "global options" | "optional arguments" => SectionKind::Options,
        "examples" | "example" => SectionKind::Examples,
        "description" => SectionKind::Description,
        "environment" | "environment variables" => SectionKind::Environment,
        "see also" => SectionKind::SeeAlso,
        "arguments" | "positional arguments" => SectionKind::Arguments,
        _ => SectionKind::Other,
    }
}

/// Step 1: normalise raw help text — strip ANSI escapes, unify newlines,
/// expand tabs, trim trailing whitespace per line.
fn normalize(raw: &str) -> String {
    let stripped = strip_ansi(raw);
    stripped
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.replace('\t', "        "))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_ansi(text: &str) -> String {
    static ANSI_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Step 2: split normalised text into labelled sections.
fn detect_sections(text: &str) -> Vec<Section<'_>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut current: Option<Section<'_>> = None;

    for &line in &lines {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        let looks_like_header = !trimmed.is_empty()
            && indent <= 1
            && (is_all_caps_label(trimmed) || trimmed.ends_with(':'))
            && SECTION_LABEL_RE.is_match(trimmed);

        if looks_like_header {
            if let Some(sec) = current.take() {
                sections.push(sec);
            }
            let label = trimmed.trim_end_matches(':').trim();
            current = Some(Section {
                kind: classify_label(label),
                label,
                lines: Vec::new(),
            });
            continue;
        }

        if let Some(sec) = current.as_mut() {
            sec.lines.push(line);
        }
    }

    if let Some(sec) = current.take() {
        sections.push(sec);
    }

    sections
}

fn is_all_caps_label(s: &str) -> bool {
    let letters: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

/// Step 3: extract [`CommandNode`]s from `commands`-like sections.
fn extract_commands(section: &Section<'_>) -> Vec<CommandNode> {
    let mut commands = Vec::new();
    let mut descriptions_aligned = true;
    let mut last_desc_col: Option<usize> = None;

    for &line in &section.lines {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = COMMAND_ROW_RE.captures(line) else {
            continue;
        };
        let names_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let description = caps.get(3).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());

        let aliases: Vec<&str> = names_raw.split([',', '|']).map(str::trim).collect();
        let canonical = aliases.iter().max_by_key(|a| a.len()).copied().unwrap_or(names_raw);

        if let Some(m) = caps.get(3) {
            let col = m.start();
            if let Some(prev) = last_desc_col {
                if prev != col {
                    descriptions_aligned = false;
                }
            }
            last_desc_col = Some(col);
        }

        let mut confidence: f32 = 0.5;
        confidence += 0.3; // came from a labelled commands section
        if description.is_some() {
            confidence += 0.1;
        }
        if !description.as_deref().unwrap_or("").ends_with('.') {
            confidence += 0.1;
        }

        commands.push(CommandNode {
            name: canonical.to_string(),
            description,
            confidence: confidence.min(1.0),
            source_section: Some(section.label.to_lowercase()),
            options: Vec::new(),
            usages: Vec::new(),
            children: Vec::new(),
            explored: false,
        });
    }

    if descriptions_aligned {
        for c in &mut commands {
            c.confidence = (c.confidence + 0.2).min(1.0);
        }
    }

    dedup_by_name(commands)
}

fn dedup_by_name(commands: Vec<CommandNode>) -> Vec<CommandNode> {
    let mut seen = std::collections::HashSet::new();
    commands
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .collect()
}

/// Step 4: extract [`CliOption`]s from `options`-like sections.
fn extract_options(section: &Section<'_>) -> Vec<CliOption> {
    let mut options = Vec::new();

    for &line in &section.lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = FLAG_RE.captures(line) {
            if caps.get(2).is_none() {
                continue;
            }
            let short = caps.get(1).map(|m| format!("-{}", m.as_str()));
            let long = caps.get(2).map(|m| format!("--{}", m.as_str()));
            let value_token = caps.get(4).map(|m| m.as_str());
            let gap = caps.get(5).map(|m| m.as_str()).unwrap_or("");
            let tail = caps.get(6).map(|m| m.as_str()).unwrap_or("");

            // A delimited placeholder is unambiguous on its own. A bare one
            // only counts if it's clearly set apart from what follows —
            // either by a double-space-or-more gap, or by being the last
            // thing on the line — otherwise it's just the first word of a
            // description that happens to look like a type name.
            let delimited = value_token.map(|t| t.starts_with('[') || t.starts_with('<')).unwrap_or(false);
            let clearly_separated = delimited || gap.len() >= 2 || tail.trim().is_empty();

            let (takes_value, value_name, description_text) = match value_token {
                Some(tok) if clearly_separated && tok.starts_with('[') => {
                    (true, Some(tok.trim_matches(['[', ']']).to_string()), tail.trim().to_string())
                }
                Some(tok) if clearly_separated && tok.starts_with('<') => {
                    (true, Some(tok.trim_matches(['<', '>']).to_string()), tail.trim().to_string())
                }
                Some(tok) if clearly_separated => (true, Some(tok.to_string()), tail.trim().to_string()),
                Some(tok) => (false, None, format!("{tok}{gap}{tail}").trim().to_string()),
                None => (false, None, tail.trim().to_string()),
            };

            let description = if description_text.is_empty() { None } else { Some(description_text) };
            let repeatable = description.as_deref().map(|d| d.to_lowercase().contains("repeat")).unwrap_or(false)
                || line.contains("...");
            let default = description.as_deref().and_then(extract_default);

            let mut confidence: f32 = 0.5;
            confidence += 0.3;
            if description.is_some() {
                confidence += 0.1;
            }
            if short.is_some() {
                confidence += 0.1;
            }

            options.push(CliOption {
                long,
                short,
                takes_value,
                value_name,
                description,
                default,
                repeatable,
                confidence: confidence.min(1.0),
            });
        } else if let Some(caps) = SHORT_ONLY_FLAG_RE.captures(line) {
            let short = caps.get(1).map(|m| format!("-{}", m.as_str()));
            let description = caps.get(2).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());
            options.push(CliOption {
                long: None,
                short,
                takes_value: false,
                value_name: None,
                description,
                default: None,
                repeatable: false,
                confidence: 0.6,
            });
        }
    }

    merge_short_long(options)
}

/// aws-style help lists `--version, -v` on the option's own description line
/// as `short` trailing a comma after the long form has already matched; merge
/// any option lacking a short form with an immediately preceding short-only
/// entry that shares no long form of its own.
fn merge_short_long(options: Vec<CliOption>) -> Vec<CliOption> {
    let mut merged: Vec<CliOption> = Vec::with_capacity(options.len());
    for opt in options {
        if opt.long.is_none() && opt.short.is_some() {
            if let Some(prev) = merged.last_mut() {
                if prev.short.is_none() {
                    prev.short = opt.short;
                    continue;
                }
            }
        }
        merged.push(opt);
    }
    merged
}

fn extract_default(description: &str) -> Option<String> {
    static DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)[\[(]default:?\s*([^\])]+)[\])]").expect("valid regex")
    });
    DEFAULT_RE
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Step 5: usage lines are kept verbatim.
fn extract_usages(section: &Section<'_>) -> Vec<Usage> {
    section
        .lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| Usage {
            text: l.to_string(),
            section: section.label.to_lowercase(),
        })
        .collect()
}

/// Parse free-form `--help` output into a [`ParsedHelp`].
///
/// Deterministic and infallible: an empty or unrecognisable input returns an
/// empty result with a telemetry warning rather than an error.
pub fn parse(help_text: &str) -> ParsedHelp {
    let text = normalize(help_text);
    let mut result = ParsedHelp::default();

    if text.trim().is_empty() {
        result.telemetry.warnings.push("empty help text".to_string());
        return result;
    }

    let sections = detect_sections(&text);
    result.telemetry.sections_detected = sections.len();

    let mut found_commands_section = false;
    let mut found_options_section = false;

    for section in &sections {
        match section.kind {
            SectionKind::Commands => {
                found_commands_section = true;
                let extracted = extract_commands(section);
                if extracted.is_empty() {
                    result
                        .telemetry
                        .warnings
                        .push(format!("commands section '{}' empty", section.label));
                }
                result.telemetry.command_blocks += extracted.len();
                result.commands.extend(extracted);
            }
            SectionKind::Options | SectionKind::Arguments => {
                let extracted = extract_options(section);
                if !extracted.is_empty() {
                    found_options_section = true;
                }
                result.telemetry.option_blocks += extracted.len();
                result.options.extend(extracted);
            }
            SectionKind::Usage => {
                result.usages.extend(extract_usages(section));
            }
            _ => {}
        }
    }

    if !found_commands_section {
        result.telemetry.warnings.push("no commands section found".to_string());
    }
    if !found_options_section {
        result.telemetry.warnings.push("no options section found".to_string());
    }

    result.commands = dedup_by_name(result.commands);

    result.telemetry.avg_command_confidence = average(result.commands.iter().map(|c| c.confidence));
    result.telemetry.avg_option_confidence = average(result.options.iter().map(|o| o.confidence));

    for warning in &result.telemetry.warnings {
        tracing::debug!(warning = %warning, "help parser warning");
    }
    tracing::trace!(
        commands = result.commands.len(),
        options = result.options.len(),
        sections = result.telemetry.sections_detected,
        "parsed help text"
    );

    result
}

fn average(values: impl Iterator<Item = f32>) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_never_an_error() {
        let parsed = parse("");
        assert!(parsed.commands.is_empty());
        assert!(parsed.telemetry.warnings.iter().any(|w| w.contains("empty")));
    }

    #[test]
    fn test_hellocli_options() {
        let help = "Usage: hellocli [OPTIONS]\n\nOptions:\n  -h, --help    Show help\n  --name NAME   Who to greet (default: world)\n";
        let parsed = parse(help);
        assert_eq!(parsed.options.len(), 2);
        let name_opt = parsed.options.iter().find(|o| o.long.as_deref() == Some("--name")).unwrap();
        assert!(name_opt.takes_value);
        assert_eq!(name_opt.value_name.as_deref(), Some("NAME"));
        assert_eq!(name_opt.default.as_deref(), Some("world"));
        let help_opt = parsed.options.iter().find(|o| o.long.as_deref() == Some("--help")).unwrap();
        assert_eq!(help_opt.short.as_deref(), Some("-h"));
        assert!(!help_opt.takes_value);
        assert_eq!(help_opt.value_name, None);
        assert_eq!(help_opt.description.as_deref(), Some("Show help"));
    }

    #[test]
    fn test_gitlike_subcommands() {
        let help = "Usage: gitlike <command>\n\nCommands:\n  clone      Clone a repository\n  commit     Record changes\n  push       Update remote\n";
        let parsed = parse(help);
        let names: Vec<&str> = parsed.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["clone", "commit", "push"]);
        assert!(parsed.telemetry.avg_command_confidence >= 0.7);
        assert!(parsed.commands.iter().all(|c| !c.explored));
    }

    #[test]
    fn test_determinism() {
        let help = "Commands:\n  get   Get things\n  set   Set things\n";
        let a = parse(help);
        let b = parse(help);
        assert_eq!(a, b);
    }

    #[test]
    fn test_kubectl_style_options_with_short_flag() {
        let help = "Options:\n  -n, --namespace string   If present, the namespace scope\n      --kubeconfig string  Path to the kubeconfig file\n";
        let parsed = parse(help);
        let ns = parsed.options.iter().find(|o| o.long.as_deref() == Some("--namespace")).unwrap();
        assert_eq!(ns.short.as_deref(), Some("-n"));
        assert!(ns.takes_value);
        assert_eq!(ns.value_name.as_deref(), Some("string"));
        assert_eq!(ns.description.as_deref(), Some("If present, the namespace scope"));
    }

    #[test]
    fn test_no_commands_section_warns() {
        let help = "Options:\n  --verbose   Enable verbose output\n";
        let parsed = parse(help);
        assert!(parsed.telemetry.warnings.iter().any(|w| w.contains("no commands section")));
    }

    #[test]
    fn test_aliases_collapse_to_canonical_name() {
        let help = "Commands:\n  remove, rm   Remove an item\n";
        let parsed = parse(help);
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.commands[0].name, "remove");
    }
}
