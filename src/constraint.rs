// Copyright (C) 2026 by GiGa infosystems

//! Version constraints as given on the command line, see [`VersionConstraint`].

use crate::error::{Error, Result};
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use std::{fmt, str::FromStr};

/// A predicate over published versions.
///
/// Supports the usual `semver` comparators, plus:
/// * `any` (also `*` or nothing at all) for any stable version, which is the default
/// * bare versions (`1.2.3`) which match exactly that version, as one usually wants to diff
///   against a specific release rather than a caret range
/// * `= X.Y` which is `= X.Y.0`, missing segments are zero
/// * `~> X`, the pessimistic operator: `~> 1.2` is `>=1.2.0, <2.0.0`, `~> 1.2.3` is
///   `>=1.2.3, <1.3.0`
///
/// Clauses are separated by commas and all have to match.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VersionConstraint {
    text: String,
    req: VersionReq,
}

impl VersionConstraint {
    /// Accept any stable version
    pub fn any() -> Self {
        VersionConstraint {
            text: "any".to_owned(),
            req: VersionReq::STAR,
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    pub fn as_req(&self) -> &VersionReq {
        &self.req
    }

    fn parse_clause(clause: &str) -> Result<Vec<Comparator>> {
        let invalid = |reason: &dyn fmt::Display| {
            Error::invalid_input(format!("invalid version constraint `{clause}`: {reason}"))
        };

        let compact = clause
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();

        if let Some(rest) = compact.strip_prefix("~>") {
            let partial = format!("={rest}")
                .parse::<Comparator>()
                .map_err(|err| invalid(&err))?;
            return pessimistic(partial)
                .ok_or_else(|| invalid(&"the segment to bump is too large"));
        }

        if let Ok(version) = compact.parse::<Version>() {
            return Ok(vec![exact(&version)]);
        }

        let mut comparator = compact
            .parse::<Comparator>()
            .map_err(|err| invalid(&err))?;
        // `= 1.2` is `1.2.0`, not `1.2.*`
        if comparator.op == Op::Exact {
            comparator.minor = comparator.minor.or(Some(0));
            comparator.patch = comparator.patch.or(Some(0));
        }
        Ok(vec![comparator])
    }
}

fn exact(version: &Version) -> Comparator {
    Comparator {
        op: Op::Exact,
        major: version.major,
        minor: Some(version.minor),
        patch: Some(version.patch),
        pre: version.pre.clone(),
    }
}

/// Expand `~> partial` into a lower & an upper bound.
///
/// Returns `None` if the bumped segment would overflow.
fn pessimistic(partial: Comparator) -> Option<Vec<Comparator>> {
    let lower = Comparator {
        op: Op::GreaterEq,
        minor: Some(partial.minor.unwrap_or(0)),
        patch: Some(partial.patch.unwrap_or(0)),
        ..partial.clone()
    };

    // The last given segment may float, the one before it gets bumped
    let (major, minor) = match (partial.minor, partial.patch) {
        (Some(minor), Some(_)) => (partial.major, minor.checked_add(1)?),
        _ => (partial.major.checked_add(1)?, 0),
    };

    let upper = Comparator {
        op: Op::Less,
        major,
        minor: Some(minor),
        patch: Some(0),
        pre: Prerelease::EMPTY,
    };

    Some(vec![lower, upper])
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if matches!(trimmed, "" | "*" | "any") {
            return Ok(Self::any());
        }

        let mut comparators = Vec::new();
        for clause in trimmed.split(',') {
            comparators.extend(Self::parse_clause(clause)?);
        }

        Ok(VersionConstraint {
            text: trimmed.to_owned(),
            req: VersionReq { comparators },
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
