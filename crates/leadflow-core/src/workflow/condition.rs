//! Condition step evaluation against a lead.

use leadflow_types::lead::Lead;
use leadflow_types::workflow::{ConditionField, ConditionOperator, ConditionStep};

/// A lead attribute as seen by the comparison operators.
enum FieldValue<'a> {
    Text(Option<&'a str>),
    Number(i64),
    List(&'a [String]),
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn field_value(field: ConditionField, lead: &Lead) -> FieldValue<'_> {
    match field {
        ConditionField::Status => FieldValue::Text(text(&lead.status)),
        ConditionField::Source => FieldValue::Text(text(&lead.source)),
        ConditionField::Priority => FieldValue::Text(text(&lead.priority)),
        ConditionField::ProgramInterest => FieldValue::Text(text(&lead.program_interest)),
        ConditionField::City => FieldValue::Text(text(&lead.city)),
        ConditionField::Country => FieldValue::Text(text(&lead.country)),
        ConditionField::Email => FieldValue::Text(text(&lead.email)),
        ConditionField::Phone => FieldValue::Text(text(&lead.phone)),
        ConditionField::LeadScore => FieldValue::Number(lead.lead_score),
        ConditionField::Tags => FieldValue::List(&lead.tags),
    }
}

/// Evaluate a condition step. Text comparisons ignore case; ordering
/// operators compare numerically and are false when either side is not a
/// number. For `tags`, `equals`/`contains` test membership and the ordering
/// operators compare the tag count.
pub fn evaluate(step: &ConditionStep, lead: &Lead) -> bool {
    let expected = step.value.trim();
    let value = field_value(step.field, lead);

    match step.operator {
        ConditionOperator::Equals => equals(&value, expected),
        ConditionOperator::NotEquals => !equals(&value, expected),
        ConditionOperator::Contains => contains(&value, expected),
        ConditionOperator::NotContains => !contains(&value, expected),
        ConditionOperator::GreaterThan => compare(&value, expected).is_some_and(|(a, b)| a > b),
        ConditionOperator::LessThan => compare(&value, expected).is_some_and(|(a, b)| a < b),
        ConditionOperator::IsEmpty => is_empty(&value),
        ConditionOperator::IsNotEmpty => !is_empty(&value),
    }
}

fn equals(value: &FieldValue<'_>, expected: &str) -> bool {
    match value {
        FieldValue::Text(text) => text.is_some_and(|t| t.eq_ignore_ascii_case(expected)),
        FieldValue::Number(n) => expected.parse::<i64>().is_ok_and(|e| *n == e),
        FieldValue::List(tags) => tags.iter().any(|t| t.eq_ignore_ascii_case(expected)),
    }
}

fn contains(value: &FieldValue<'_>, expected: &str) -> bool {
    let needle = expected.to_lowercase();
    match value {
        FieldValue::Text(text) => text.is_some_and(|t| t.to_lowercase().contains(&needle)),
        FieldValue::Number(n) => n.to_string().contains(&needle),
        FieldValue::List(tags) => tags.iter().any(|t| t.eq_ignore_ascii_case(expected)),
    }
}

fn compare(value: &FieldValue<'_>, expected: &str) -> Option<(f64, f64)> {
    let rhs = expected.parse::<f64>().ok()?;
    let lhs = match value {
        FieldValue::Text(text) => (*text)?.parse::<f64>().ok()?,
        FieldValue::Number(n) => *n as f64,
        FieldValue::List(tags) => tags.len() as f64,
    };
    Some((lhs, rhs))
}

fn is_empty(value: &FieldValue<'_>) -> bool {
    match value {
        FieldValue::Text(text) => text.is_none(),
        FieldValue::Number(_) => false,
        FieldValue::List(tags) => tags.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_types::workflow::BranchAction;
    use uuid::Uuid;

    fn condition(field: ConditionField, operator: ConditionOperator, value: &str) -> ConditionStep {
        ConditionStep {
            field,
            operator,
            value: value.to_string(),
            if_false: BranchAction::Continue,
        }
    }

    fn lead() -> Lead {
        let mut lead = Lead::new(Uuid::now_v7(), Uuid::now_v7());
        lead.status = Some("Qualified".to_string());
        lead.city = Some("  ".to_string());
        lead.lead_score = 42;
        lead.tags = vec!["webinar".to_string(), "nursing".to_string()];
        lead
    }

    #[test]
    fn test_text_comparisons_ignore_case() {
        let lead = lead();
        assert!(evaluate(&condition(ConditionField::Status, ConditionOperator::Equals, "qualified"), &lead));
        assert!(evaluate(&condition(ConditionField::Status, ConditionOperator::Contains, "QUAL"), &lead));
        assert!(evaluate(&condition(ConditionField::Status, ConditionOperator::NotEquals, "new"), &lead));
    }

    #[test]
    fn test_score_ordering() {
        let lead = lead();
        assert!(evaluate(&condition(ConditionField::LeadScore, ConditionOperator::GreaterThan, "40"), &lead));
        assert!(!evaluate(&condition(ConditionField::LeadScore, ConditionOperator::LessThan, "40"), &lead));
        assert!(!evaluate(&condition(ConditionField::LeadScore, ConditionOperator::GreaterThan, "many"), &lead));
    }

    #[test]
    fn test_blank_fields_are_empty() {
        let lead = lead();
        assert!(evaluate(&condition(ConditionField::City, ConditionOperator::IsEmpty, ""), &lead));
        assert!(evaluate(&condition(ConditionField::Email, ConditionOperator::IsEmpty, ""), &lead));
        assert!(!evaluate(&condition(ConditionField::Email, ConditionOperator::Equals, ""), &lead));
    }

    #[test]
    fn test_tags_use_membership() {
        let lead = lead();
        assert!(evaluate(&condition(ConditionField::Tags, ConditionOperator::Contains, "Webinar"), &lead));
        assert!(evaluate(&condition(ConditionField::Tags, ConditionOperator::NotContains, "web"), &lead));
        assert!(evaluate(&condition(ConditionField::Tags, ConditionOperator::GreaterThan, "1"), &lead));
        assert!(evaluate(&condition(ConditionField::Tags, ConditionOperator::IsNotEmpty, ""), &lead));
    }
}
