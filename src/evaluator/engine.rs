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

//! Tree-walking FHIRPath evaluator

use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use super::error::{EvaluationError, EvaluationResult};
use super::operators::{evaluate_binary, evaluate_unary};
use crate::ast::{ExpressionNode, LiteralValue};
use crate::model::{
    Collection, FhirPathValue, choice_suffix, matches_type, parse_date_literal,
    parse_datetime_literal, parse_time_literal,
};
use crate::registry::{
    EvaluationContext, FunctionImpl, FunctionRegistry, FunctionResult, LambdaEvaluationContext,
    ParameterKind,
};

/// Main FHIRPath evaluation engine
#[derive(Clone)]
pub struct ExpressionEvaluator {
    /// Function registry
    functions: Arc<FunctionRegistry>,
}

impl ExpressionEvaluator {
    /// Create an evaluator over the given function registry
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }

    /// The registry functions are resolved against
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Evaluate an expression with `input` as both focus and root
    pub fn evaluate(
        &self,
        expression: &ExpressionNode,
        input: Collection,
    ) -> EvaluationResult<Collection> {
        self.evaluate_with_context(expression, &EvaluationContext::new(input))
    }

    /// Evaluate with explicit context
    pub fn evaluate_with_context(
        &self,
        expression: &ExpressionNode,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        match expression {
            ExpressionNode::Literal(literal) => self.evaluate_literal(literal),

            ExpressionNode::Identifier(name) => Ok(self.evaluate_identifier(name, context)),

            ExpressionNode::Path { base, path } => {
                let base = self.evaluate_with_context(base, context)?;
                Ok(base.navigate(path))
            }

            ExpressionNode::Variable(name) => self.evaluate_variable(name, context),

            ExpressionNode::EnvironmentVariable(name) => {
                self.evaluate_environment_variable(name, context)
            }

            ExpressionNode::FunctionCall(call) => {
                self.invoke(&call.name, &call.args, context.input.clone(), context)
            }

            ExpressionNode::MethodCall(call) => {
                if call.method == "ofType" {
                    if let Some(result) = self.choice_of_type(&call.base, &call.args, context) {
                        return result;
                    }
                }
                let input = self.evaluate_with_context(&call.base, context)?;
                self.invoke(&call.method, &call.args, input, context)
            }

            ExpressionNode::BinaryOp(data) => {
                let left = self.evaluate_with_context(&data.left, context)?;
                let right = self.evaluate_with_context(&data.right, context)?;
                evaluate_binary(data.op, &left, &right)
            }

            ExpressionNode::UnaryOp { op, operand } => {
                let operand = self.evaluate_with_context(operand, context)?;
                evaluate_unary(*op, &operand)
            }

            ExpressionNode::Index { base, index } => self.evaluate_index(base, index, context),

            ExpressionNode::TypeCheck {
                expression,
                type_name,
            } => {
                let value = self.evaluate_with_context(expression, context)?;
                match value.len() {
                    0 => Ok(Collection::new()),
                    1 => Ok(Collection::single(FhirPathValue::Boolean(
                        value.iter().all(|item| matches_type(item, type_name)),
                    ))),
                    count => Err(EvaluationError::SingletonExpected {
                        operation: "is".to_string(),
                        count,
                    }),
                }
            }

            ExpressionNode::TypeCast {
                expression,
                type_name,
            } => {
                let type_arg = [ExpressionNode::identifier(type_name.as_str())];
                if let Some(result) = self.choice_of_type(expression, &type_arg, context) {
                    return result;
                }
                let value = self.evaluate_with_context(expression, context)?;
                if value.len() > 1 {
                    return Err(EvaluationError::SingletonExpected {
                        operation: "as".to_string(),
                        count: value.len(),
                    });
                }
                Ok(value
                    .into_iter()
                    .filter(|item| matches_type(item, type_name))
                    .collect())
            }
        }
    }

    /// Evaluate a literal value
    fn evaluate_literal(&self, literal: &LiteralValue) -> EvaluationResult<Collection> {
        let value = match literal {
            LiteralValue::Boolean(b) => FhirPathValue::Boolean(*b),
            LiteralValue::Integer(i) => FhirPathValue::Integer(*i),
            LiteralValue::Decimal(s) => match Decimal::from_str(s) {
                Ok(d) => FhirPathValue::Decimal(d),
                Err(_) => {
                    return Err(EvaluationError::InvalidOperation {
                        message: format!("Invalid decimal literal: {s}"),
                    });
                }
            },
            LiteralValue::String(s) => FhirPathValue::String(s.clone()),
            LiteralValue::Date(s) => parse_date_literal(s),
            LiteralValue::DateTime(s) => parse_datetime_literal(s),
            LiteralValue::Time(s) => parse_time_literal(s),
            LiteralValue::Null => return Ok(Collection::new()),
        };
        Ok(Collection::single(value))
    }

    /// Evaluate an identifier (property access)
    ///
    /// An identifier naming the resource type of a focus item (`Patient` on a
    /// Patient) selects the item itself.
    fn evaluate_identifier(&self, name: &str, context: &EvaluationContext) -> Collection {
        let mut result = Collection::new();
        for item in context.input.iter() {
            if item.resource_type() == Some(name) {
                result.push(item.clone());
            } else {
                item.push_children(name, &mut result);
            }
        }
        result
    }

    /// Evaluate a `$`-variable
    fn evaluate_variable(
        &self,
        name: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        match (name, context.variables.get(name)) {
            (_, Some(value)) => Ok(Collection::single(value.clone())),
            ("this", None) => Ok(context.input.clone()),
            _ => Err(EvaluationError::UnknownVariable {
                name: format!("${name}"),
            }),
        }
    }

    /// Evaluate a `%`-variable
    fn evaluate_environment_variable(
        &self,
        name: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        let string = |s: &str| Ok(Collection::single(FhirPathValue::String(s.to_string())));
        match name {
            "resource" | "rootResource" | "context" => Ok(context.root.clone()),
            "ucum" => string("http://unitsofmeasure.org"),
            "sct" => string("http://snomed.info/sct"),
            "loinc" => string("http://loinc.org"),
            _ => Err(EvaluationError::UnknownVariable {
                name: format!("%{name}"),
            }),
        }
    }

    /// Evaluate an indexer (`name[0]`)
    fn evaluate_index(
        &self,
        base: &ExpressionNode,
        index: &ExpressionNode,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        let base = self.evaluate_with_context(base, context)?;
        let index = self.evaluate_with_context(index, context)?;
        let position = match index.as_single() {
            None if index.is_empty() => return Ok(Collection::new()),
            Some(FhirPathValue::Integer(i)) => *i,
            _ => {
                return Err(EvaluationError::TypeError {
                    expected: "single Integer index".to_string(),
                    actual: format!("{index:?}"),
                });
            }
        };
        Ok(usize::try_from(position)
            .ok()
            .and_then(|i| base.get(i))
            .cloned()
            .into_iter()
            .collect())
    }

    /// Resolve `element.ofType(T)` on a choice element to the `elementT` key
    ///
    /// Returns `None` when the base is not a plain member access, in which case
    /// the generic type filter applies.
    fn choice_of_type(
        &self,
        base: &ExpressionNode,
        args: &[ExpressionNode],
        context: &EvaluationContext,
    ) -> Option<EvaluationResult<Collection>> {
        let [type_arg] = args else {
            return None;
        };
        let type_name = type_arg.as_type_specifier()?;
        let (parents, element) = match base {
            ExpressionNode::Identifier(name)
                if !context.input.iter().any(|i| i.resource_type() == Some(name)) =>
            {
                (Ok(context.input.clone()), name.as_str())
            }
            ExpressionNode::Path { base, path } => {
                (self.evaluate_with_context(base, context), path.as_str())
            }
            _ => return None,
        };
        let parents = match parents {
            Ok(parents) => parents,
            Err(e) => return Some(Err(e)),
        };
        let typed_key = format!("{element}{}", choice_suffix(&type_name));
        let mut result = Collection::new();
        for parent in parents.iter() {
            if parent.field(element).is_some() {
                let mut children = Collection::new();
                parent.push_children(element, &mut children);
                result.extend(
                    children
                        .into_iter()
                        .filter(|child| matches_type(child, &type_name))
                        .collect(),
                );
            } else {
                parent.push_field(&typed_key, &mut result);
            }
        }
        Some(Ok(result))
    }

    /// Evaluate a function argument declared as `kind`
    fn evaluate_argument(
        &self,
        kind: ParameterKind,
        arg: &ExpressionNode,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        match kind {
            ParameterKind::TypeSpecifier => match arg.as_type_specifier() {
                Some(type_name) => Ok(Collection::single(FhirPathValue::String(type_name))),
                None => Err(EvaluationError::InvalidOperation {
                    message: format!("expected a type specifier, got '{arg}'"),
                }),
            },
            ParameterKind::Value | ParameterKind::Expression => {
                self.evaluate_with_context(arg, context)
            }
        }
    }

    /// Invoke a registered function on `input`
    ///
    /// Value arguments are evaluated against the calling context; lambda
    /// arguments are handed to the function unevaluated.
    fn invoke(
        &self,
        name: &str,
        args: &[ExpressionNode],
        input: Collection,
        context: &EvaluationContext,
    ) -> EvaluationResult<Collection> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EvaluationError::UnknownFunction {
                name: name.to_string(),
            })?;
        let call_context = context.with_input(input);

        match function {
            FunctionImpl::Value(function) => {
                let signature = function.signature();
                let values = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| self.evaluate_argument(signature.parameter_kind(i), arg, context))
                    .collect::<EvaluationResult<Vec<_>>>()?;
                Ok(function.evaluate(&values, &call_context)?)
            }
            FunctionImpl::Lambda(function) => {
                let evaluator = |expression: &ExpressionNode,
                                 focus: &Collection,
                                 index: Option<usize>|
                 -> FunctionResult<Collection> {
                    let scope = match (index, focus.as_single()) {
                        (Some(index), Some(item)) => call_context.for_item(item.clone(), index),
                        _ => call_context.with_input(focus.clone()),
                    };
                    self.evaluate_with_context(expression, &scope)
                        .map_err(|e| e.into_function_error(name))
                };
                let lambda = LambdaEvaluationContext {
                    context: &call_context,
                    evaluator: &evaluator,
                };
                Ok(function.evaluate_with_lambda(args, &lambda)?)
            }
        }
    }
}
