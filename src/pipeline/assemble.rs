//! Report assembly: merge task results into the three-key report.

use crate::output::{Report, RuleCheck, Sections};

/// Evidence for rule checks that were never run or whose call failed.
pub const RULES_NOT_EVALUATED: &str = "Rule checks were not evaluated";

/// Combine whatever the tasks produced into a well-formed [`Report`].
///
/// A `None` part (task failed, skipped or not selected) is replaced by its
/// degraded value: an empty summary, seven empty sections, or six `unclear`
/// rule checks with zero confidence.
pub fn assemble_report(
    summary: Option<String>,
    sections: Option<Sections>,
    rule_checks: Option<Vec<RuleCheck>>,
) -> Report {
    Report {
        summary: summary.unwrap_or_default(),
        sections: sections.unwrap_or_default(),
        rule_checks: rule_checks.unwrap_or_else(|| RuleCheck::all_unclear(RULES_NOT_EVALUATED)),
    }
}
