//! Line-oriented rule text format.
//!
//! A rule is a block of `key: value` lines in a fixed order:
//!
//! | Key | Required |
//! |---|---|
//! | `template:` | no |
//! | `precondition:` | no |
//! | `condition:` | yes |
//! | `action:` | yes, ends the block |
//!
//! Blocks are separated by blank lines. Lines starting with `#`, `//` or `;`
//! are comments, and `/* ... */` or `#| ... |#` comment out everything up to
//! the closing tag, possibly across lines.

use crate::core::error::ImportError;
use crate::script::parser::ExpressionParser;
use crate::templating::{ImportPolicy, ImportReport, RuleRecord};

const TEMPLATE_KEY: &str = "template";
const PRECONDITION_KEY: &str = "precondition";
const CONDITION_KEY: &str = "condition";
const ACTION_KEY: &str = "action";

const BLOCK_COMMENTS: [(&str, &str); 2] = [("/*", "*/"), ("#|", "|#")];
const LINE_COMMENTS: [&str; 3] = ["#", "//", ";"];

/// Render rules in import order.
///
/// Values are written trimmed and blank optional fields are left out, so the
/// output always imports. Records whose values are single-line, trimmed and
/// non-empty parse back unchanged.
pub fn render_rules_to_text(rules: &[RuleRecord]) -> String {
    rules
        .iter()
        .map(|rule| {
            let mut block = String::new();
            let optional = [
                (TEMPLATE_KEY, rule.template_family.as_deref()),
                (PRECONDITION_KEY, rule.precondition.as_deref()),
            ];
            for (key, value) in optional {
                if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                    block.push_str(&format!("{}: {}\n", key, value));
                }
            }
            block.push_str(&format!("{}: {}\n", CONDITION_KEY, rule.condition.trim()));
            block.push_str(&format!("{}: {}\n", ACTION_KEY, rule.action.trim()));
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rule block being assembled, with the line each field came from
#[derive(Default)]
struct PendingRule {
    start_line: usize,
    template_family: Option<String>,
    precondition: Option<(usize, String)>,
    condition: Option<(usize, String)>,
}

impl PendingRule {
    fn is_empty(&self) -> bool {
        self.template_family.is_none() && self.precondition.is_none() && self.condition.is_none()
    }
}

/// Parse rule text.
///
/// With a `validation` parser, conditions, preconditions and actions are
/// compiled against that parser's host and handled per `policy`. Structural
/// problems always fail the import regardless of policy.
pub fn parse_from_text(
    text: &str,
    validation: Option<&ExpressionParser<'_>>,
    policy: ImportPolicy,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    let mut pending = PendingRule::default();
    let mut open_comment: Option<(&str, usize)> = None;
    let mut last_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        last_line = line_no;
        let mut line = raw.trim();

        if let Some((close, _)) = open_comment {
            match line.find(close) {
                Some(pos) => {
                    line = line[pos + close.len()..].trim();
                    open_comment = None;
                }
                None => continue,
            }
        }

        if raw.trim().is_empty() {
            if !pending.is_empty() {
                return Err(ImportError::new(
                    line_no,
                    "Rule ended before its 'action:' line",
                ));
            }
            continue;
        }

        if let Some(&(open, close)) = BLOCK_COMMENTS.iter().find(|(open, _)| line.starts_with(open)) {
            let rest = &line[open.len()..];
            match rest.find(close) {
                Some(pos) => line = rest[pos + close.len()..].trim(),
                None => {
                    open_comment = Some((close, line_no));
                    continue;
                }
            }
        }

        if line.is_empty() || LINE_COMMENTS.iter().any(|prefix| line.starts_with(prefix)) {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .map(|(key, value)| (key.trim(), value.trim()))
            .ok_or_else(|| ImportError::new(line_no, format!("Expected 'key: value', got '{}'", line)))?;
        if value.is_empty() {
            return Err(ImportError::new(line_no, format!("Empty '{}' line", key)));
        }

        if pending.is_empty() {
            pending.start_line = line_no;
        }
        match key {
            TEMPLATE_KEY => {
                if !pending.is_empty() {
                    return Err(out_of_order(line_no, key));
                }
                pending.template_family = Some(value.to_string());
            }
            PRECONDITION_KEY => {
                if pending.precondition.is_some() || pending.condition.is_some() {
                    return Err(out_of_order(line_no, key));
                }
                pending.precondition = Some((line_no, value.to_string()));
            }
            CONDITION_KEY => {
                if pending.condition.is_some() {
                    return Err(out_of_order(line_no, key));
                }
                pending.condition = Some((line_no, value.to_string()));
            }
            ACTION_KEY => {
                let rule = std::mem::take(&mut pending);
                let Some((condition_line, condition)) = rule.condition else {
                    return Err(ImportError::new(line_no, "'action:' without a 'condition:' line"));
                };
                let record = RuleRecord {
                    condition,
                    action: value.to_string(),
                    template_family: rule.template_family,
                    precondition: rule.precondition.as_ref().map(|(_, p)| p.clone()),
                };
                let checked = match (validation, policy) {
                    (Some(parser), ImportPolicy::Strict | ImportPolicy::SkipInvalid) => {
                        validate_record(parser, &record, rule.precondition.map(|(l, _)| l), condition_line, line_no)
                    }
                    _ => Ok(()),
                };
                match checked {
                    Ok(()) => report.rules.push(record),
                    Err(err) if policy == ImportPolicy::SkipInvalid => {
                        tracing::warn!(line = err.line, start = rule.start_line, error = %err.message, "skipping invalid rule");
                        report.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            other => {
                return Err(ImportError::new(line_no, format!("Unknown key '{}'", other)));
            }
        }
    }

    if let Some((_, start)) = open_comment {
        return Err(ImportError::new(start, "Unterminated block comment"));
    }
    if !pending.is_empty() {
        return Err(ImportError::new(last_line, "Rule ended before its 'action:' line"));
    }

    tracing::debug!(rules = report.rules.len(), skipped = report.skipped, "imported rule text");
    Ok(report)
}

fn out_of_order(line: usize, key: &str) -> ImportError {
    ImportError::new(line, format!("Unexpected '{}:' line", key))
}

fn validate_record(
    parser: &ExpressionParser<'_>,
    record: &RuleRecord,
    precondition_line: Option<usize>,
    condition_line: usize,
    action_line: usize,
) -> Result<(), ImportError> {
    if let (Some(precondition), Some(line)) = (&record.precondition, precondition_line) {
        parser
            .parse_condition(precondition)
            .map_err(|err| ImportError::new(line, format!("Invalid precondition: {}", err)))?;
    }
    parser
        .parse_condition(&record.condition)
        .map_err(|err| ImportError::new(condition_line, format!("Invalid condition: {}", err)))?;
    parser
        .parse_action(&record.action)
        .map_err(|err| ImportError::new(action_line, format!("Invalid action: {}", err)))?;
    Ok(())
}
