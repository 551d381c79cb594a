// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Operator semantics over collections
//!
//! Arithmetic and comparison propagate empty operands; logical operators use
//! three-valued logic where empty means unknown.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

use super::error::{EvaluationError, EvaluationResult};
use crate::ast::{BinaryOperator, UnaryOperator};
use crate::model::{Collection, FhirPathValue};

fn boolean(value: bool) -> Collection {
    Collection::single(FhirPathValue::Boolean(value))
}

fn optional_boolean(value: Option<bool>) -> Collection {
    value.map(FhirPathValue::Boolean).into_iter().collect()
}

fn singleton<'a>(
    operation: impl std::fmt::Display,
    collection: &'a Collection,
) -> EvaluationResult<Option<&'a FhirPathValue>> {
    match collection.len() {
        0 => Ok(None),
        1 => Ok(collection.first()),
        count => Err(EvaluationError::SingletonExpected {
            operation: operation.to_string(),
            count,
        }),
    }
}

/// Singleton evaluation of a collection as a boolean
pub fn to_boolean(
    operation: impl std::fmt::Display,
    collection: &Collection,
) -> EvaluationResult<Option<bool>> {
    Ok(singleton(operation, collection)?.map(|item| item.as_boolean().unwrap_or(true)))
}

/// Evaluate a binary operator over two evaluated operands
pub fn evaluate_binary(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    use BinaryOperator::*;
    match op {
        Equal => Ok(optional_boolean(equality(left, right))),
        NotEqual => Ok(optional_boolean(equality(left, right).map(|eq| !eq))),
        Equivalent => Ok(boolean(equivalence(left, right))),
        NotEquivalent => Ok(boolean(!equivalence(left, right))),
        LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            comparison(op, left, right)
        }
        And | Or | Xor | Implies => logic(op, left, right),
        Add | Subtract | Multiply | Divide | Modulo | IntegerDivide => {
            arithmetic(op, left, right)
        }
        Concatenate => concatenate(left, right),
        Union => Ok(union(left, right)),
        In => membership(op, left, right),
        Contains => membership(op, right, left),
    }
}

/// Evaluate a unary operator
pub fn evaluate_unary(op: UnaryOperator, operand: &Collection) -> EvaluationResult<Collection> {
    let Some(value) = singleton(op, operand)? else {
        return Ok(Collection::new());
    };
    let result = match (op, value) {
        (UnaryOperator::Positive, FhirPathValue::Integer(_) | FhirPathValue::Decimal(_)) => {
            Some(value.clone())
        }
        (UnaryOperator::Negate, FhirPathValue::Integer(i)) => {
            i.checked_neg().map(FhirPathValue::Integer)
        }
        (UnaryOperator::Negate, FhirPathValue::Decimal(d)) => Some(FhirPathValue::Decimal(-*d)),
        _ => {
            return Err(EvaluationError::TypeError {
                expected: "Integer or Decimal".to_string(),
                actual: value.type_name().to_string(),
            });
        }
    };
    Ok(result.into_iter().collect())
}

fn equality(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut unknown = false;
    for (l, r) in left.iter().zip(right.iter()) {
        match l.equals(r) {
            Some(false) => return Some(false),
            Some(true) => {}
            None => unknown = true,
        }
    }
    if unknown { None } else { Some(true) }
}

fn equivalence(left: &Collection, right: &Collection) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|l| right.iter().any(|r| l.equivalent(r)))
}

fn comparison(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    let (Some(l), Some(r)) = (singleton(op, left)?, singleton(op, right)?) else {
        return Ok(Collection::new());
    };
    let ordering = l.compare(r).ok_or_else(|| EvaluationError::TypeError {
        expected: format!("comparable operands for '{op}'"),
        actual: format!("{} and {}", l.type_name(), r.type_name()),
    })?;
    let result = match op {
        BinaryOperator::LessThan => ordering == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOperator::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(boolean(result))
}

fn logic(op: BinaryOperator, left: &Collection, right: &Collection) -> EvaluationResult<Collection> {
    let l = to_boolean(op, left)?;
    let r = to_boolean(op, right)?;
    let result = match op {
        BinaryOperator::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOperator::Or => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOperator::Xor => match (l, r) {
            (Some(a), Some(b)) => Some(a != b),
            _ => None,
        },
        _ => match (l, r) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), other) => other,
            (None, _) => None,
        },
    };
    Ok(optional_boolean(result))
}

fn arithmetic(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    let (Some(l), Some(r)) = (singleton(op, left)?, singleton(op, right)?) else {
        return Ok(Collection::new());
    };
    let result = match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => integer_arithmetic(op, *a, *b),
        (FhirPathValue::String(a), FhirPathValue::String(b)) if op == BinaryOperator::Add => {
            Some(FhirPathValue::String(format!("{a}{b}")))
        }
        _ => match (l.as_decimal(), r.as_decimal()) {
            (Some(a), Some(b)) => decimal_arithmetic(op, a, b),
            _ => {
                return Err(EvaluationError::TypeError {
                    expected: format!("numeric operands for '{op}'"),
                    actual: format!("{} and {}", l.type_name(), r.type_name()),
                });
            }
        },
    };
    Ok(result.into_iter().collect())
}

fn integer_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Option<FhirPathValue> {
    let value = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::IntegerDivide => a.checked_div(b),
        BinaryOperator::Modulo => a.checked_rem(b),
        _ => return decimal_arithmetic(op, Decimal::from(a), Decimal::from(b)),
    };
    value.map(FhirPathValue::Integer)
}

fn decimal_arithmetic(op: BinaryOperator, a: Decimal, b: Decimal) -> Option<FhirPathValue> {
    let value = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide => a.checked_div(b),
        BinaryOperator::Modulo => a.checked_rem(b),
        BinaryOperator::IntegerDivide => {
            return a
                .checked_div(b)
                .and_then(|q| q.trunc().to_i64())
                .map(FhirPathValue::Integer);
        }
        _ => None,
    };
    value.map(FhirPathValue::Decimal)
}

fn concatenate(left: &Collection, right: &Collection) -> EvaluationResult<Collection> {
    let op = BinaryOperator::Concatenate;
    let text = |c: &Collection| -> EvaluationResult<String> {
        Ok(singleton(op, c)?
            .and_then(FhirPathValue::to_string_value)
            .unwrap_or_default())
    };
    Ok(Collection::single(FhirPathValue::String(
        text(left)? + &text(right)?,
    )))
}

/// Union of two collections without duplicates, left items first
pub fn union(left: &Collection, right: &Collection) -> Collection {
    let mut result = Collection::new();
    for item in left.iter().chain(right.iter()) {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

fn membership(
    op: BinaryOperator,
    element: &Collection,
    collection: &Collection,
) -> EvaluationResult<Collection> {
    match singleton(op, element)? {
        None => Ok(Collection::new()),
        Some(item) => Ok(boolean(collection.contains(item))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn c(value: serde_json::Value) -> Collection {
        Collection::from_json(&value)
    }

    #[rstest]
    #[case(BinaryOperator::Add, json!(1), json!(2), json!(3))]
    #[case(BinaryOperator::Add, json!(1), json!(0.5), json!(1.5))]
    #[case(BinaryOperator::Subtract, json!(5), json!(7), json!(-2))]
    #[case(BinaryOperator::Multiply, json!(3), json!(4), json!(12))]
    #[case(BinaryOperator::Divide, json!(3), json!(2), json!(1.5))]
    #[case(BinaryOperator::Divide, json!(3), json!(0), json!([]))]
    #[case(BinaryOperator::IntegerDivide, json!(7), json!(2), json!(3))]
    #[case(BinaryOperator::Modulo, json!(7), json!(2), json!(1))]
    #[case(BinaryOperator::Add, json!("a"), json!("b"), json!("ab"))]
    #[case(BinaryOperator::Add, json!([]), json!(1), json!([]))]
    #[case(BinaryOperator::Concatenate, json!([]), json!("b"), json!("b"))]
    fn test_arithmetic(
        #[case] op: BinaryOperator,
        #[case] left: serde_json::Value,
        #[case] right: serde_json::Value,
        #[case] expected: serde_json::Value,
    ) {
        assert_eq!(
            evaluate_binary(op, &c(left), &c(right)).unwrap(),
            c(expected)
        );
    }

    #[rstest]
    #[case(BinaryOperator::And, json!(true), json!([]), json!([]))]
    #[case(BinaryOperator::And, json!(false), json!([]), json!(false))]
    #[case(BinaryOperator::Or, json!([]), json!(true), json!(true))]
    #[case(BinaryOperator::Or, json!(false), json!([]), json!([]))]
    #[case(BinaryOperator::Xor, json!(true), json!(false), json!(true))]
    #[case(BinaryOperator::Implies, json!([]), json!(true), json!(true))]
    #[case(BinaryOperator::Implies, json!(false), json!([]), json!(true))]
    #[case(BinaryOperator::Implies, json!(true), json!([]), json!([]))]
    fn test_three_valued_logic(
        #[case] op: BinaryOperator,
        #[case] left: serde_json::Value,
        #[case] right: serde_json::Value,
        #[case] expected: serde_json::Value,
    ) {
        assert_eq!(
            evaluate_binary(op, &c(left), &c(right)).unwrap(),
            c(expected)
        );
    }

    #[test]
    fn test_equality_and_equivalence() {
        let eq = |l, r| evaluate_binary(BinaryOperator::Equal, &c(l), &c(r)).unwrap();
        assert_eq!(eq(json!([1, 2]), json!([1, 2])), boolean(true));
        assert_eq!(eq(json!([1, 2]), json!([2, 1])), boolean(false));
        assert_eq!(eq(json!([]), json!(1)), Collection::new());

        let equiv = |l, r| evaluate_binary(BinaryOperator::Equivalent, &c(l), &c(r)).unwrap();
        assert_eq!(equiv(json!([1, 2]), json!([2, 1])), boolean(true));
        assert_eq!(equiv(json!([]), json!([])), boolean(true));
    }

    #[test]
    fn test_comparison_requires_compatible_types() {
        let lt = |l, r| evaluate_binary(BinaryOperator::LessThan, &c(l), &c(r));
        assert_eq!(lt(json!(1), json!(2)).unwrap(), boolean(true));
        assert_eq!(lt(json!("a"), json!("b")).unwrap(), boolean(true));
        assert!(lt(json!("a"), json!(1)).is_err());
        assert!(lt(json!([1, 2]), json!(1)).is_err());
    }

    #[test]
    fn test_union_and_membership() {
        let union = evaluate_binary(BinaryOperator::Union, &c(json!([1, 2])), &c(json!([2, 3])));
        assert_eq!(union.unwrap(), c(json!([1, 2, 3])));
        let member = evaluate_binary(BinaryOperator::In, &c(json!(2)), &c(json!([1, 2])));
        assert_eq!(member.unwrap(), boolean(true));
        let contains =
            evaluate_binary(BinaryOperator::Contains, &c(json!([1, 2])), &c(json!(5)));
        assert_eq!(contains.unwrap(), boolean(false));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(
            evaluate_unary(UnaryOperator::Negate, &c(json!(5))).unwrap(),
            c(json!(-5))
        );
        assert!(evaluate_unary(UnaryOperator::Negate, &c(json!("x"))).is_err());
    }
}
