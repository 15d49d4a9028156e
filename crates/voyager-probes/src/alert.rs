//! Declarative alert conditions and severity escalation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Severity of a probe result, ordered so `Critical` dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Info,
    Warn,
    Critical,
}

impl Severity {
    pub fn is_alerting(&self) -> bool {
        matches!(self, Severity::Warn | Severity::Critical)
    }
}

/// Comparison operators a condition can apply to a measured field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Neq,
    Contains,
    Regex,
}

/// One escalation rule: if `field`'s measured value satisfies `operator`
/// against `threshold`, the probe result's severity is raised to at least
/// `severity`. Unmatched conditions contribute nothing; critical overrides
/// warn when multiple conditions match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCondition {
    pub field: String,
    pub operator: Operator,
    pub threshold: Value,
    pub severity: Severity,
}

impl AlertCondition {
    fn matches(&self, value: &Value) -> bool {
        match self.operator {
            Operator::Gt => numeric_cmp(value, &self.threshold) == Some(Ordering::Greater),
            Operator::Lt => numeric_cmp(value, &self.threshold) == Some(Ordering::Less),
            Operator::Eq => value == &self.threshold,
            Operator::Neq => value != &self.threshold,
            Operator::Contains => match (value.as_str(), self.threshold.as_str()) {
                (Some(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
            Operator::Regex => match self.threshold.as_str() {
                Some(pattern) => Regex::new(pattern)
                    .map(|re| re.is_match(&stringify(value)))
                    .unwrap_or(false),
                None => false,
            },
        }
    }
}

fn numeric_cmp(value: &Value, threshold: &Value) -> Option<Ordering> {
    let a = value.as_f64()?;
    let b = threshold.as_f64()?;
    a.partial_cmp(&b)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Computes the escalated severity for `fields` given `conditions`,
/// starting from `base`. Each matching condition can only raise severity,
/// never lower it.
pub fn escalate(
    base: Severity,
    fields: &std::collections::HashMap<String, Value>,
    conditions: &[AlertCondition],
) -> Severity {
    let mut severity = base;
    for condition in conditions {
        if let Some(value) = fields.get(&condition.field) {
            if condition.matches(value) && condition.severity > severity {
                severity = condition.severity;
            }
        }
    }
    severity
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> std::collections::HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn gt_condition_escalates_to_critical() {
        let conditions = vec![AlertCondition {
            field: "latencyMs".into(),
            operator: Operator::Gt,
            threshold: json!(1000),
            severity: Severity::Critical,
        }];
        let result = escalate(Severity::Trace, &fields(&[("latencyMs", json!(1500))]), &conditions);
        assert_eq!(result, Severity::Critical);
    }

    #[test]
    fn unmatched_condition_contributes_nothing() {
        let conditions = vec![AlertCondition {
            field: "latencyMs".into(),
            operator: Operator::Gt,
            threshold: json!(1000),
            severity: Severity::Critical,
        }];
        let result = escalate(Severity::Trace, &fields(&[("latencyMs", json!(10))]), &conditions);
        assert_eq!(result, Severity::Trace);
    }

    #[test]
    fn critical_overrides_warn_across_multiple_conditions() {
        let conditions = vec![
            AlertCondition {
                field: "errorRate".into(),
                operator: Operator::Gt,
                threshold: json!(0.1),
                severity: Severity::Warn,
            },
            AlertCondition {
                field: "errorRate".into(),
                operator: Operator::Gt,
                threshold: json!(0.5),
                severity: Severity::Critical,
            },
        ];
        let result = escalate(Severity::Trace, &fields(&[("errorRate", json!(0.9))]), &conditions);
        assert_eq!(result, Severity::Critical);
    }

    #[test]
    fn regex_condition_matches_stringified_value() {
        let conditions = vec![AlertCondition {
            field: "userAgent".into(),
            operator: Operator::Regex,
            threshold: json!("(?i)headless"),
            severity: Severity::Warn,
        }];
        let result = escalate(
            Severity::Trace,
            &fields(&[("userAgent", json!("HeadlessChrome/120.0"))]),
            &conditions,
        );
        assert_eq!(result, Severity::Warn);
    }
}
