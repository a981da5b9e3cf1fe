//! Resolver output parsing and first-party/third-party classification.
use crate::error::LockError;
use crate::model::{Cookbook, CookbookSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How cookbook names are matched against the first-party allowlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyPolicy {
    /// Name must equal an allowlist entry.
    #[default]
    Exact,
    /// Name must start with an allowlist entry. Coarser: `ultra-cache`
    /// matches an `ult` entry.
    Prefix,
}

/// Splits resolved cookbooks into first-party and third-party groups.
#[derive(Debug, Clone)]
pub struct Classifier {
    policy: ClassifyPolicy,
    first_party: BTreeSet<String>,
}

impl Classifier {
    pub fn new<I, S>(policy: ClassifyPolicy, first_party: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy,
            first_party: first_party.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_first_party(&self, name: &str) -> bool {
        match self.policy {
            ClassifyPolicy::Exact => self.first_party.contains(name),
            ClassifyPolicy::Prefix => self
                .first_party
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str())),
        }
    }

    pub fn classify(&self, cookbooks: Vec<Cookbook>) -> CookbookSet {
        let (first_party, third_party) = cookbooks
            .into_iter()
            .partition(|cookbook| self.is_first_party(&cookbook.name));
        CookbookSet {
            first_party,
            third_party,
        }
    }

    /// Parse a raw `knife solve` listing and classify it.
    pub fn classify_listing(&self, listing: &str) -> Result<CookbookSet, LockError> {
        Ok(self.classify(parse_solve_listing(listing)?))
    }
}

/// Parse the interior `<name> <version>` lines of a resolver listing.
///
/// The first and last lines are framing and are dropped.
pub fn parse_solve_listing(listing: &str) -> Result<Vec<Cookbook>, LockError> {
    let lines: Vec<&str> = listing.lines().collect();
    if lines.len() < 2 {
        return Err(LockError::contract(
            "resolver listing",
            "missing header/footer framing lines",
            listing,
        ));
    }
    lines[1..lines.len() - 1]
        .iter()
        .copied()
        .map(parse_cookbook_line)
        .collect()
}

fn parse_cookbook_line(line: &str) -> Result<Cookbook, LockError> {
    let mut cols = line.split_whitespace();
    match (cols.next(), cols.next()) {
        (Some(name), Some(version)) => Ok(Cookbook {
            name: name.to_string(),
            version: version.to_string(),
        }),
        _ => Err(LockError::contract(
            "resolver listing",
            "cookbook line is missing its version column",
            line,
        )),
    }
}
