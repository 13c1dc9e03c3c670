//! Condition evaluation shared by the `if` block and database `where` clauses.
//!
//! Comparisons are loose: `1 == "1"` and `true == 1` hold, `null` only equals `null`,
//! ordering converts both sides to numbers unless both are strings.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Evaluator, ScriptError, resolve, strip_prefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Evaluate the condition's raw script and use its truthiness.
    Js,
    #[serde(other)]
    Unknown,
}

/// Relation of a condition to the one that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub lhs: Value,
    #[serde(default)]
    pub rhs: Value,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub js: Option<String>,
    #[serde(default)]
    pub chain: Chain,
}

impl Condition {
    pub fn new(lhs: Value, operator: ComparisonOperator, rhs: Value) -> Self {
        Self {
            lhs,
            rhs,
            operator,
            js: None,
            chain: Chain::And,
        }
    }

    pub fn script(code: impl Into<String>) -> Self {
        Self {
            lhs: Value::Null,
            rhs: Value::Null,
            operator: ComparisonOperator::Js,
            js: Some(code.into()),
            chain: Chain::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.chain = Chain::Or;
        self
    }
}

/// Resolve script operands, then compare. With the `js` operator and a raw script the
/// operands are ignored and the script's truthiness is the result.
pub fn evaluate(
    vm: &dyn Evaluator,
    lhs: &Value,
    rhs: &Value,
    operator: ComparisonOperator,
    raw_script: Option<&str>,
) -> Result<bool, ScriptError> {
    if operator == ComparisonOperator::Js
        && let Some(code) = raw_script
    {
        let value = vm.run(strip_prefix(code))?;
        return Ok(vm.truthy(&value));
    }
    let lhs = resolve(vm, lhs)?;
    let rhs = resolve(vm, rhs)?;
    Ok(compare(operator, &lhs, &rhs))
}

/// Evaluate every condition in order and fold the results with [`resolve_chain`].
pub fn evaluate_conditions(
    vm: &dyn Evaluator,
    conditions: &[Condition],
) -> Result<bool, ScriptError> {
    let mut results = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let passed = evaluate(
            vm,
            &condition.lhs,
            &condition.rhs,
            condition.operator,
            condition.js.as_deref(),
        )?;
        results.push((passed, condition.chain));
    }
    Ok(resolve_chain(results))
}

/// OR of AND-groups. A condition tagged `or` closes the current group; a trailing `or`
/// closes nothing new. No conditions at all is one empty group, which is true.
pub fn resolve_chain<I>(results: I) -> bool
where
    I: IntoIterator<Item = (bool, Chain)>,
{
    let mut any_group = false;
    let mut group = true;
    let mut open = true;
    for (passed, chain) in results {
        group &= passed;
        open = true;
        if chain == Chain::Or {
            any_group |= group;
            group = true;
            open = false;
        }
    }
    if open {
        any_group |= group;
    }
    any_group
}

pub fn compare(operator: ComparisonOperator, lhs: &Value, rhs: &Value) -> bool {
    match operator {
        ComparisonOperator::Eq => loose_eq(lhs, rhs),
        ComparisonOperator::Neq => !loose_eq(lhs, rhs),
        ComparisonOperator::Gt => loose_cmp(lhs, rhs) == Some(Ordering::Greater),
        ComparisonOperator::Gte => matches!(
            loose_cmp(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ComparisonOperator::Lt => loose_cmp(lhs, rhs) == Some(Ordering::Less),
        ComparisonOperator::Lte => {
            matches!(loose_cmp(lhs, rhs), Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOperator::Js | ComparisonOperator::Unknown => false,
    }
}

/// Primitive form of a composite value: arrays join their elements with `,`,
/// objects become `[object Object]`.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|item| match to_primitive(item) {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Value::String("[object Object]".to_string()),
        other => other.clone(),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => to_number(&to_primitive(value)),
    }
}

fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

pub fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(_), Value::Number(_)) => to_number(lhs) == to_number(rhs),
        (a, b) if is_composite(a) && is_composite(b) => a == b,
        (a, b) if is_composite(a) => loose_eq(&to_primitive(a), b),
        (a, b) if is_composite(b) => loose_eq(a, &to_primitive(b)),
        _ => to_number(lhs) == to_number(rhs),
    }
}

/// Ordering used by `gt`/`gte`/`lt`/`lte`; `None` when either side is not a number.
pub fn loose_cmp(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    let lhs = to_primitive(lhs);
    let rhs = to_primitive(rhs);
    if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
        return Some(a.cmp(b));
    }
    to_number(&lhs).partial_cmp(&to_number(&rhs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{RhaiScriptEngine, ScriptEngine};
    use serde_json::{Map, json};

    const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::Eq,
        ComparisonOperator::Neq,
        ComparisonOperator::Gt,
        ComparisonOperator::Gte,
        ComparisonOperator::Lt,
        ComparisonOperator::Lte,
    ];

    fn vm(scope: Value) -> Box<dyn Evaluator> {
        let Value::Object(map) = scope else {
            panic!("scope must be an object")
        };
        RhaiScriptEngine::new().bind(map)
    }

    fn chain(items: &[(bool, Chain)]) -> bool {
        resolve_chain(items.iter().copied())
    }

    #[test]
    fn equality_is_loose() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(loose_eq(&json!("1.0"), &json!(1)));
        assert!(loose_eq(&json!(0), &json!("")));
        assert!(loose_eq(&json!([1, 2]), &json!("1,2")));
        assert!(!loose_eq(&Value::Null, &json!(0)));
        assert!(loose_eq(&Value::Null, &Value::Null));
        assert!(!loose_eq(&json!("a"), &json!("b")));
    }

    #[test]
    fn ordering_is_numeric_unless_both_strings() {
        assert!(compare(ComparisonOperator::Gt, &json!("10"), &json!(9)));
        assert!(compare(ComparisonOperator::Lt, &json!("10"), &json!("9")));
        assert!(compare(ComparisonOperator::Gte, &Value::Null, &json!(0)));
        assert!(!compare(ComparisonOperator::Gt, &json!("abc"), &json!(1)));
        assert!(!compare(ComparisonOperator::Lte, &json!("abc"), &json!(1)));
    }

    #[test]
    fn unknown_operator_is_false() {
        let op: ComparisonOperator = serde_json::from_value(json!("like")).unwrap();
        assert_eq!(op, ComparisonOperator::Unknown);
        let vm = vm(json!({}));
        assert!(!evaluate(vm.as_ref(), &json!(1), &json!(1), op, None).unwrap());
    }

    #[test]
    fn js_operator_uses_raw_script_truthiness() {
        let vm = vm(json!({"age": 20}));
        let ok = evaluate(
            vm.as_ref(),
            &json!("ignored"),
            &json!("ignored"),
            ComparisonOperator::Js,
            Some("js:age >= 18"),
        )
        .unwrap();
        assert!(ok);
        let no = evaluate(
            vm.as_ref(),
            &Value::Null,
            &Value::Null,
            ComparisonOperator::Js,
            Some("age - 20"),
        )
        .unwrap();
        assert!(!no);
    }

    #[test]
    fn js_operator_without_script_is_false() {
        let vm = vm(json!({}));
        assert!(!evaluate(vm.as_ref(), &json!(1), &json!(1), ComparisonOperator::Js, None).unwrap());
    }

    #[test]
    fn script_operands_match_pre_resolved_values() {
        let vm = vm(json!({"a": 5, "b": "5", "c": 7}));
        let pairs = [
            (json!("js:a"), json!(5), json!("js:b"), json!("5")),
            (json!("js:a"), json!(5), json!("js:c"), json!(7)),
            (json!("js:c"), json!(7), json!(6), json!(6)),
        ];
        for (lhs_script, lhs_value, rhs_script, rhs_value) in pairs {
            for op in ALL {
                let scripted = evaluate(vm.as_ref(), &lhs_script, &rhs_script, op, None).unwrap();
                assert_eq!(scripted, compare(op, &lhs_value, &rhs_value), "{:?}", op);
            }
        }
    }

    #[test]
    fn failing_operand_script_propagates() {
        let vm = vm(json!({}));
        let err = evaluate(
            vm.as_ref(),
            &json!("js:missing + 1"),
            &json!(1),
            ComparisonOperator::Eq,
            None,
        );
        assert!(err.is_err());
    }

    #[test]
    fn chain_without_or_is_plain_and() {
        use Chain::And;
        assert!(chain(&[(true, And), (true, And), (true, And)]));
        assert!(!chain(&[(true, And), (false, And), (true, And)]));
    }

    #[test]
    fn chain_is_or_of_and_groups() {
        use Chain::{And, Or};
        // [T, T] or [F]
        assert!(chain(&[(true, And), (true, Or), (false, And)]));
        // [T, F] or [F, T]
        assert!(!chain(&[(true, And), (false, Or), (false, And), (true, And)]));
        // [F] or [T, T]
        assert!(chain(&[(false, Or), (true, And), (true, And)]));
    }

    #[test]
    fn trailing_or_is_ignored() {
        use Chain::{And, Or};
        for items in [
            vec![(true, And)],
            vec![(false, And)],
            vec![(true, And), (false, And)],
            vec![(false, Or), (true, And)],
        ] {
            let mut trailing = items.clone();
            if let Some(last) = trailing.last_mut() {
                last.1 = Or;
            }
            assert_eq!(chain(&items), chain(&trailing), "{:?}", items);
        }
    }

    #[test]
    fn empty_condition_list_is_true() {
        assert!(chain(&[]));
        let vm = RhaiScriptEngine::new().bind(Map::new());
        assert!(evaluate_conditions(vm.as_ref(), &[]).unwrap());
    }

    #[test]
    fn conditions_deserialize_from_editor_shape() {
        let raw = json!([
            {"lhs": "js:age", "rhs": 18, "operator": "gte", "chain": "or"},
            {"operator": "js", "js": "js:admin"}
        ]);
        let conditions: Vec<Condition> = serde_json::from_value(raw).unwrap();
        assert_eq!(conditions[0].chain, Chain::Or);
        assert_eq!(conditions[1].chain, Chain::And);
        let vm = vm(json!({"age": 12, "admin": true}));
        assert!(evaluate_conditions(vm.as_ref(), &conditions).unwrap());
    }
}
