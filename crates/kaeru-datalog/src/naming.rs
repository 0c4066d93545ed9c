//! Soufflé identifier sanitizing and collision resolution.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::error::NameCollision;

/// Words the Soufflé parser reserves. None of them may name a relation or
/// an attribute.
const RESERVED: &[&str] = &[
    "as", "autoinc", "band", "bitand", "bitor", "bitxor", "bnot", "bor", "brie", "bshl",
    "bshr", "bshru", "btree", "btree_delete", "bxor", "cat", "contains", "count", "eqrel",
    "false", "ftoi", "ftou", "inline", "input", "itof", "itou", "land", "lnot", "lor",
    "lxor", "magic", "match", "max", "mean", "min", "nil", "no_inline", "no_magic", "ord",
    "output", "overridable", "printsize", "range", "strlen", "substr", "sum", "to_float",
    "to_number", "to_string", "to_unsigned", "true", "utof", "utoi",
];

/// Turn an arbitrary string into a valid Soufflé identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and an empty name or
/// a leading digit gets a `_` prefix. A name made only of underscores gets a
/// trailing `0` so it never reads as the wildcard. Reserved words get a
/// trailing `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.chars().all(|c| c == '_') {
        out.push('0');
    } else if RESERVED.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Hand out unique names, suffixing `_2`, `_3`, ... on collision.
#[derive(Debug, Default)]
struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    /// Claim `name`, returning the name actually granted.
    fn claim(&mut self, name: String) -> String {
        if self.taken.insert(name.clone()) {
            return name;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", name, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Relation names claimed so far in a run.
///
/// Filled in one sequential pass over the inputs, so the suffix a relation
/// receives depends only on input order.
#[derive(Debug, Default)]
pub struct NameTable {
    names: UniqueNames,
    collisions: Vec<NameCollision>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a relation name for `file`. Collisions are recorded and logged.
    pub fn claim(&mut self, raw: &str, file: &Path) -> String {
        let requested = sanitize_identifier(raw);
        let resolved = self.names.claim(requested.clone());

        if resolved != requested {
            let collision = NameCollision {
                requested,
                resolved: resolved.clone(),
                file: file.to_path_buf(),
            };
            warn!(
                requested = %collision.requested,
                resolved = %collision.resolved,
                file = %file.display(),
                "relation name collision"
            );
            self.collisions.push(collision);
        }

        resolved
    }

    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    pub fn into_collisions(self) -> Vec<NameCollision> {
        self.collisions
    }
}

/// Field names within a single relation.
#[derive(Debug, Default)]
pub struct FieldNames {
    names: UniqueNames,
}

impl FieldNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, raw: &str) -> String {
        self.names.claim(sanitize_identifier(raw))
    }
}
