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

//! String manipulation functions for FHIRPath expressions
//!
//! All of these operate on a single string input. An empty input or an empty
//! argument gives an empty result.

use regex::Regex;
use std::sync::LazyLock;

use super::{boolean, integer_arg, singleton_string, string_arg};
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{
    EvaluationContext, FhirPathFunction, FunctionError, FunctionRegistry, FunctionResult,
};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// Register all string functions
pub fn register_string_functions(registry: &mut FunctionRegistry) {
    registry.register(JoinFunction);
    registry.register(StartsWithFunction);
    registry.register(EndsWithFunction);
    registry.register(ContainsFunction);
    registry.register(LowerFunction);
    registry.register(UpperFunction);
    registry.register(LengthFunction);
    registry.register(SubstringFunction);
    registry.register(ReplaceFunction);
    registry.register(MatchesFunction);
    registry.register(TrimFunction);
}

fn string(value: impl Into<String>) -> Collection {
    Collection::single(FhirPathValue::String(value.into()))
}

/// join() function - concatenates the input strings with a separator
pub struct JoinFunction;

impl FhirPathFunction for JoinFunction {
    fn name(&self) -> &str {
        "join"
    }
    fn human_friendly_name(&self) -> &str {
        "Join"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "join",
                vec![ParameterInfo::optional("separator", ParameterKind::Value)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Joins a collection of strings into a single string, optionally using the given separator. If the input is empty, the result is empty."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        if context.input.is_empty() {
            return Ok(Collection::new());
        }
        let separator = string_arg(self.name(), args, 0)?.unwrap_or("");
        let parts = context
            .input
            .iter()
            .map(|item| {
                item.to_string_value()
                    .ok_or_else(|| FunctionError::InvalidArgumentType {
                        name: self.name().to_string(),
                        index: 0,
                        expected: "String".to_string(),
                        actual: item.type_name().to_string(),
                    })
            })
            .collect::<FunctionResult<Vec<_>>>()?;
        Ok(string(parts.join(separator)))
    }
}

/// Shared shape of the `(input: String, arg: String) -> Boolean` functions
fn string_predicate(
    function: &dyn FhirPathFunction,
    args: &[Collection],
    context: &EvaluationContext,
    predicate: impl Fn(&str, &str) -> bool,
) -> FunctionResult<Collection> {
    function.validate_args(args)?;
    let name = function.name();
    match (
        singleton_string(name, &context.input)?,
        string_arg(name, args, 0)?,
    ) {
        (Some(input), Some(arg)) => Ok(boolean(predicate(input, arg))),
        _ => Ok(Collection::new()),
    }
}

static SUBSTRING_ARG: LazyLock<Vec<ParameterInfo>> =
    LazyLock::new(|| vec![ParameterInfo::required("substring", ParameterKind::Value)]);

/// startsWith() function
pub struct StartsWithFunction;

impl FhirPathFunction for StartsWithFunction {
    fn name(&self) -> &str {
        "startsWith"
    }
    fn human_friendly_name(&self) -> &str {
        "Starts With"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("startsWith", SUBSTRING_ARG.clone()));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` when the input string starts with the given prefix."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_predicate(self, args, context, |input, prefix| input.starts_with(prefix))
    }
}

/// endsWith() function
pub struct EndsWithFunction;

impl FhirPathFunction for EndsWithFunction {
    fn name(&self) -> &str {
        "endsWith"
    }
    fn human_friendly_name(&self) -> &str {
        "Ends With"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("endsWith", SUBSTRING_ARG.clone()));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` when the input string ends with the given suffix."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_predicate(self, args, context, |input, suffix| input.ends_with(suffix))
    }
}

/// contains() function (string containment, not the collection operator)
pub struct ContainsFunction;

impl FhirPathFunction for ContainsFunction {
    fn name(&self) -> &str {
        "contains"
    }
    fn human_friendly_name(&self) -> &str {
        "Contains"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("contains", SUBSTRING_ARG.clone()));
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` when the given substring is a substring of the input string."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_predicate(self, args, context, |input, part| input.contains(part))
    }
}

/// Shared shape of the `(input: String) -> String` functions
fn string_map(
    function: &dyn FhirPathFunction,
    args: &[Collection],
    context: &EvaluationContext,
    map: impl Fn(&str) -> FhirPathValue,
) -> FunctionResult<Collection> {
    function.validate_args(args)?;
    Ok(singleton_string(function.name(), &context.input)?
        .map(map)
        .into_iter()
        .collect())
}

/// lower() function
pub struct LowerFunction;

impl FhirPathFunction for LowerFunction {
    fn name(&self) -> &str {
        "lower"
    }
    fn human_friendly_name(&self) -> &str {
        "Lower"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("lower", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_map(self, args, context, |s| FhirPathValue::String(s.to_lowercase()))
    }
}

/// upper() function
pub struct UpperFunction;

impl FhirPathFunction for UpperFunction {
    fn name(&self) -> &str {
        "upper"
    }
    fn human_friendly_name(&self) -> &str {
        "Upper"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("upper", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_map(self, args, context, |s| FhirPathValue::String(s.to_uppercase()))
    }
}

/// length() function - number of characters
pub struct LengthFunction;

impl FhirPathFunction for LengthFunction {
    fn name(&self) -> &str {
        "length"
    }
    fn human_friendly_name(&self) -> &str {
        "Length"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("length", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_map(self, args, context, |s| {
            FhirPathValue::Integer(s.chars().count() as i64)
        })
    }
}

/// trim() function
pub struct TrimFunction;

impl FhirPathFunction for TrimFunction {
    fn name(&self) -> &str {
        "trim"
    }
    fn human_friendly_name(&self) -> &str {
        "Trim"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> =
            LazyLock::new(|| FunctionSignature::new("trim", vec![]));
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        string_map(self, args, context, |s| FhirPathValue::String(s.trim().to_string()))
    }
}

/// substring() function - character based
pub struct SubstringFunction;

impl FhirPathFunction for SubstringFunction {
    fn name(&self) -> &str {
        "substring"
    }
    fn human_friendly_name(&self) -> &str {
        "Substring"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "substring",
                vec![
                    ParameterInfo::required("start", ParameterKind::Value),
                    ParameterInfo::optional("length", ParameterKind::Value),
                ],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns the part of the string starting at position `start` (zero-based). If `length` is given, at most `length` characters are returned. A start outside the string gives an empty result."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let (Some(input), Some(start)) = (
            singleton_string(self.name(), &context.input)?,
            integer_arg(self.name(), args, 0)?,
        ) else {
            return Ok(Collection::new());
        };
        let char_count = input.chars().count() as i64;
        if start < 0 || start >= char_count {
            return Ok(Collection::new());
        }
        let length = integer_arg(self.name(), args, 1)?.unwrap_or(char_count);
        let taken: String = input
            .chars()
            .skip(start as usize)
            .take(length.max(0) as usize)
            .collect();
        Ok(string(taken))
    }
}

/// replace() function - plain (non-regex) replacement of every occurrence
pub struct ReplaceFunction;

impl FhirPathFunction for ReplaceFunction {
    fn name(&self) -> &str {
        "replace"
    }
    fn human_friendly_name(&self) -> &str {
        "Replace"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "replace",
                vec![
                    ParameterInfo::required("pattern", ParameterKind::Value),
                    ParameterInfo::required("substitution", ParameterKind::Value),
                ],
            )
        });
        &SIG
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let name = self.name();
        match (
            singleton_string(name, &context.input)?,
            string_arg(name, args, 0)?,
            string_arg(name, args, 1)?,
        ) {
            (Some(input), Some(pattern), Some(substitution)) => {
                Ok(string(input.replace(pattern, substitution)))
            }
            _ => Ok(Collection::new()),
        }
    }
}

/// matches() function - regular expression search
pub struct MatchesFunction;

impl FhirPathFunction for MatchesFunction {
    fn name(&self) -> &str {
        "matches"
    }
    fn human_friendly_name(&self) -> &str {
        "Matches"
    }
    fn signature(&self) -> &FunctionSignature {
        static SIG: LazyLock<FunctionSignature> = LazyLock::new(|| {
            FunctionSignature::new(
                "matches",
                vec![ParameterInfo::required("regex", ParameterKind::Value)],
            )
        });
        &SIG
    }
    fn documentation(&self) -> &str {
        "Returns `true` when the value matches the given regular expression anywhere in the string."
    }
    fn evaluate(
        &self,
        args: &[Collection],
        context: &EvaluationContext,
    ) -> FunctionResult<Collection> {
        self.validate_args(args)?;
        let (Some(input), Some(pattern)) = (
            singleton_string(self.name(), &context.input)?,
            string_arg(self.name(), args, 0)?,
        ) else {
            return Ok(Collection::new());
        };
        let regex = Regex::new(pattern).map_err(|e| {
            FunctionError::evaluation(self.name(), format!("invalid regex '{pattern}': {e}"))
        })?;
        Ok(boolean(regex.is_match(input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(
        function: &dyn FhirPathFunction,
        input: &str,
        args: &[&str],
    ) -> FunctionResult<Collection> {
        let args: Vec<Collection> = args.iter().map(|a| string(*a)).collect();
        function.evaluate(&args, &EvaluationContext::new(string(input)))
    }

    #[rstest]
    #[case(&StartsWithFunction, "hello", "he", true)]
    #[case(&EndsWithFunction, "hello", "lo", true)]
    #[case(&ContainsFunction, "hello", "ell", true)]
    #[case(&ContainsFunction, "hello", "", true)]
    #[case(&MatchesFunction, "2020-01-01", r"^\d{4}-", true)]
    #[case(&MatchesFunction, "abc", r"\d", false)]
    fn test_predicates(
        #[case] function: &dyn FhirPathFunction,
        #[case] input: &str,
        #[case] arg: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(call(function, input, &[arg]).unwrap(), boolean(expected));
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(call(&UpperFunction, "abc", &[]).unwrap(), string("ABC"));
        assert_eq!(call(&LowerFunction, "ABC", &[]).unwrap(), string("abc"));
        assert_eq!(call(&TrimFunction, "  x ", &[]).unwrap(), string("x"));
        assert_eq!(
            call(&LengthFunction, "héllo", &[]).unwrap(),
            Collection::single(FhirPathValue::Integer(5))
        );
    }

    #[test]
    fn test_substring_bounds() {
        let context = EvaluationContext::new(string("abcdef"));
        let int = |i| Collection::single(FhirPathValue::Integer(i));
        let eval = |args: &[Collection]| SubstringFunction.evaluate(args, &context).unwrap();
        assert_eq!(eval(&[int(2)]), string("cdef"));
        assert_eq!(eval(&[int(1), int(2)]), string("bc"));
        assert_eq!(eval(&[int(6)]), Collection::new());
        assert_eq!(eval(&[int(-1)]), Collection::new());
    }

    #[test]
    fn test_join_and_replace() {
        let input = Collection::from_vec(vec![
            FhirPathValue::String("a".into()),
            FhirPathValue::String("b".into()),
        ]);
        let result = JoinFunction
            .evaluate(&[string(",")], &EvaluationContext::new(input))
            .unwrap();
        assert_eq!(result, string("a,b"));
        assert_eq!(
            call(&ReplaceFunction, "a-b-c", &["-", "+"]).unwrap(),
            string("a+b+c")
        );
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        assert!(call(&MatchesFunction, "abc", &["("]).is_err());
    }

    #[test]
    fn test_multiple_inputs_are_rejected() {
        let input = Collection::from_vec(vec![
            FhirPathValue::String("a".into()),
            FhirPathValue::String("b".into()),
        ]);
        assert!(UpperFunction
            .evaluate(&[], &EvaluationContext::new(input))
            .is_err());
    }
}
