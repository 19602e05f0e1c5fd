//! Boolean filter expressions over raw log lines.
//!
//! Clauses are separated by the literal ` OR `; a line matches when any clause
//! matches. Inside a clause every whitespace-separated word must occur in the
//! line (case-sensitive substring). A clause with no words is vacuously true,
//! so empty or blank expressions match everything.
//!
//! The word `\OR` is kept verbatim: it is searched for as the two-character
//! prefix plus `OR`, not rewritten to `OR`.

/// Separator between OR-ed clauses.
pub const OR_SEPARATOR: &str = " OR ";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpression {
    clauses: Vec<Vec<String>>,
}

impl FilterExpression {
    pub fn parse(expression: &str) -> Self {
        if expression.trim().is_empty() {
            return Self::default();
        }
        let clauses = expression
            .split(OR_SEPARATOR)
            .map(|clause| clause.split_whitespace().map(str::to_string).collect())
            .collect();
        Self { clauses }
    }

    /// True when the expression places no constraint on lines.
    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Vec<String>] {
        &self.clauses
    }

    pub fn matches(&self, line: &str) -> bool {
        if self.is_match_all() {
            return true;
        }
        self.clauses
            .iter()
            .any(|words| words.iter().all(|w| line.contains(w.as_str())))
    }
}

pub fn matches(line: &str, expression: &str) -> bool {
    FilterExpression::parse(expression).matches(line)
}
