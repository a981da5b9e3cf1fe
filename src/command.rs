//! Chef command grammar.
//!
//! Package and app-step commands look like
//! `chef-client -o 'role[web]' -E prod-env -l debug`. Only the run-list
//! (`-o`) and the environment (`-E`) matter for locking; everything else is
//! preserved verbatim when the command is rewritten.
use crate::error::LockError;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static RUN_LIST_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        -o \s+ ['"]?
        (?P<run_list>
            (?:recipe|role)\[[^\]]+\]
            (?:,\s*(?:recipe|role)\[[^\]]+\])*
        )
        ['"]?
        "#,
    )
    .expect("run-list regex is valid")
});

static ENVIRONMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)-E\s+['"]?(?P<environment>[^\s'"]+)['"]?"#)
        .expect("environment regex is valid")
});

static RUN_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:recipe|role)\[").expect("run-list regex is valid"));

/// Run-list and environment extracted from a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub run_list: String,
    /// Empty when the command names no environment.
    pub environment: String,
}

impl ParsedCommand {
    pub fn environment(&self) -> Option<&str> {
        if self.environment.is_empty() {
            None
        } else {
            Some(&self.environment)
        }
    }
}

/// Byte ranges of the interesting tokens in a command.
struct CommandTokens {
    run_list: Range<usize>,
    /// End of the run-list token, past any closing quote.
    run_list_end: usize,
    environment: Option<Range<usize>>,
}

/// Whether a command drives the automation tool at all.
///
/// Commands that fail this test are passed through untouched and never parsed.
pub fn is_automation_command(command: &str, marker: &str) -> bool {
    (!marker.is_empty() && command.contains(marker)) || RUN_LIST_RE.is_match(command)
}

/// Extract the run-list and optional environment from a command.
///
/// `-E` may appear before or after `-o`.
pub fn parse_command(command: &str) -> Result<ParsedCommand, LockError> {
    let tokens = tokens(command)?;
    Ok(ParsedCommand {
        run_list: command[tokens.run_list].to_string(),
        environment: tokens
            .environment
            .map(|range| command[range].to_string())
            .unwrap_or_default(),
    })
}

/// Point a command at `environment`.
///
/// An existing `-E <env>` has its name replaced in place; otherwise
/// `-E <environment>` is inserted right after the run-list token.
pub fn rewrite_environment(command: &str, environment: &str) -> Result<String, LockError> {
    let tokens = tokens(command)?;
    if let Some(existing) = tokens.environment {
        return Ok(splice(command, existing, environment));
    }
    let at = tokens.run_list_end;
    Ok(splice(command, at..at, &format!(" -E {environment}")))
}

fn tokens(command: &str) -> Result<CommandTokens, LockError> {
    let run_list = RUN_LIST_TOKEN_RE.captures(command).ok_or_else(|| {
        LockError::contract(
            "command",
            "expected `-o <recipe[..]|role[..]>` with optional `-E <env>`",
            command,
        )
    })?;
    let run_list_end = run_list.get(0).map_or(command.len(), |m| m.end());
    let run_list = run_list.name("run_list").map_or(0..0, |m| m.range());

    let mut environments = ENVIRONMENT_RE
        .captures_iter(command)
        .filter_map(|caps| caps.name("environment").map(|m| m.range()));
    let environment = environments.next();
    if environments.next().is_some() {
        return Err(LockError::contract("command", "more than one `-E <env>`", command));
    }
    Ok(CommandTokens {
        run_list,
        run_list_end,
        environment,
    })
}

fn splice(text: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(replacement);
    out.push_str(&text[range.end..]);
    out
}
