//! Parser for the `;`-separated condition language.

use tracing::warn;

use super::{Condition, ConditionError, ConditionKind};

/// Clause separator.
const CLAUSE_SEPARATOR: char = ';';

/// Separates a tag from its arguments.
const TAG_SEPARATOR: char = ':';

/// Separates arguments.
const ARG_SEPARATOR: char = ',';

/// Negation prefix.
const NEGATION: char = '!';

/// Split a condition string into trimmed, non-empty clauses.
pub fn split_clauses(source: &str) -> Vec<&str> {
    source
        .split(CLAUSE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse one clause.
pub(super) fn parse_clause(raw: &str) -> Result<Condition, ConditionError> {
    let mut clause = raw.trim();
    let mut negated = false;

    if let Some(rest) = clause.strip_prefix(NEGATION) {
        negated = true;
        clause = rest.trim_start();
    }

    if clause.is_empty() {
        return Err(ConditionError::Empty);
    }

    let condition = match clause.split_once(TAG_SEPARATOR) {
        Some((tag, rest)) => {
            let kind = ConditionKind::from_tag(tag)
                .ok_or_else(|| ConditionError::Unsupported(tag.trim().to_string()))?;
            let args = rest
                .split(ARG_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            Condition::new(kind, args)?
        }
        None => Condition::permission(clause),
    };

    Ok(if negated { condition.negate() } else { condition })
}

/// Parse a condition string, collecting the clauses that failed.
///
/// Returns the conditions in declaration order, with an unsupported
/// condition in place of each rejected clause, along with each rejected
/// clause and its error.
pub fn try_parse_conditions(source: &str) -> (Vec<Condition>, Vec<(String, ConditionError)>) {
    let mut conditions = Vec::new();
    let mut rejected = Vec::new();

    for clause in split_clauses(source) {
        match parse_clause(clause) {
            Ok(condition) => conditions.push(condition),
            Err(e) => {
                conditions.push(Condition::unsupported(clause));
                rejected.push((clause.to_string(), e));
            }
        }
    }

    (conditions, rejected)
}

/// Parse a condition string, logging bad clauses.
///
/// A bad clause becomes an unsupported condition, so a channel gated by
/// it denies everyone rather than nobody.
pub fn parse_conditions(source: &str) -> Vec<Condition> {
    let (conditions, rejected) = try_parse_conditions(source);
    for (clause, e) in rejected {
        warn!(clause = %clause, "Unsupported condition, channel will deny it: {e}");
    }
    conditions
}
