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

//! Expression AST nodes

use super::operator::{BinaryOperator, UnaryOperator};
use smallvec::SmallVec;
use std::fmt;

/// Function and method arguments; most calls take at most two.
pub type Arguments = SmallVec<[ExpressionNode; 2]>;

/// AST node for FHIRPath expressions
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value (string, number, boolean, date/time, empty)
    Literal(LiteralValue),

    /// Identifier evaluated against the current focus
    Identifier(String),

    /// Member navigation (e.g., `Patient.name`)
    Path {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Member name
        path: String,
    },

    /// Binary operation
    BinaryOp(Box<BinaryOpData>),

    /// Unary operation
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Function call without an explicit base (`exists()`, `getResourceKey()`)
    FunctionCall(Box<FunctionCallData>),

    /// Method call on a base expression (`name.where(use = 'official')`)
    MethodCall(Box<MethodCallData>),

    /// Indexer (`name[0]`)
    Index {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Type check (`value is Quantity`)
    TypeCheck {
        /// Expression to check
        expression: Box<ExpressionNode>,
        /// Type name
        type_name: String,
    },

    /// Type cast (`value as Quantity`)
    TypeCast {
        /// Expression to cast
        expression: Box<ExpressionNode>,
        /// Type name
        type_name: String,
    },

    /// Special variable (`$this`, `$index`, `$total`), stored without the `$`
    Variable(String),

    /// Environment variable (`%resource`), stored without the `%`
    EnvironmentVariable(String),
}

/// Binary operation data
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Function arguments
    pub args: Arguments,
}

/// Method call data
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCallData {
    /// Base expression to call method on
    pub base: ExpressionNode,
    /// Method name
    pub method: String,
    /// Method arguments
    pub args: Arguments,
}

/// Literal values in FHIRPath
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Decimal literal (stored as string to preserve precision)
    Decimal(String),
    /// String literal, escapes already resolved
    String(String),
    /// Date literal without the `@` (YYYY, YYYY-MM or YYYY-MM-DD)
    Date(String),
    /// DateTime literal without the `@`
    DateTime(String),
    /// Time literal without the `@T`
    Time(String),
    /// Empty collection `{}`
    Null,
}

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a function call expression
    pub fn function_call(name: impl Into<String>, args: impl Into<Arguments>) -> Self {
        Self::FunctionCall(Box::new(FunctionCallData {
            name: name.into(),
            args: args.into(),
        }))
    }

    /// Create a method call expression
    pub fn method_call(
        base: ExpressionNode,
        method: impl Into<String>,
        args: impl Into<Arguments>,
    ) -> Self {
        Self::MethodCall(Box::new(MethodCallData {
            base,
            method: method.into(),
            args: args.into(),
        }))
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a path navigation expression
    pub fn path(base: ExpressionNode, path: impl Into<String>) -> Self {
        Self::Path {
            base: Box::new(base),
            path: path.into(),
        }
    }

    /// Create an index access expression
    pub fn index(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a type check expression
    pub fn type_check(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCheck {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a type cast expression
    pub fn type_cast(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCast {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a special variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create an environment variable reference
    pub fn environment_variable(name: impl Into<String>) -> Self {
        Self::EnvironmentVariable(name.into())
    }

    /// Get the identifier name if this is an identifier expression
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Interpret this node as a type specifier (`Quantity`, `FHIR.Patient`, `'Patient'`)
    pub fn as_type_specifier(&self) -> Option<String> {
        match self {
            Self::Identifier(name) => Some(name.clone()),
            Self::Literal(LiteralValue::String(name)) => Some(name.clone()),
            Self::Path { base, path } => base
                .as_type_specifier()
                .map(|namespace| format!("{namespace}.{path}")),
            _ => None,
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &Arguments) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Identifier(name) => f.write_str(name),
            Self::Path { base, path } => write!(f, "{base}.{path}"),
            Self::BinaryOp(data) => write!(f, "({} {} {})", data.left, data.op, data.right),
            Self::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            Self::FunctionCall(data) => {
                write!(f, "{}(", data.name)?;
                write_args(f, &data.args)?;
                f.write_str(")")
            }
            Self::MethodCall(data) => {
                write!(f, "{}.{}(", data.base, data.method)?;
                write_args(f, &data.args)?;
                f.write_str(")")
            }
            Self::Index { base, index } => write!(f, "{base}[{index}]"),
            Self::TypeCheck {
                expression,
                type_name,
            } => write!(f, "({expression} is {type_name})"),
            Self::TypeCast {
                expression,
                type_name,
            } => write!(f, "({expression} as {type_name})"),
            Self::Variable(name) => write!(f, "${name}"),
            Self::EnvironmentVariable(name) => write!(f, "%{name}"),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => f.write_str(d),
            Self::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Date(d) | Self::DateTime(d) => write!(f, "@{d}"),
            Self::Time(t) => write!(f, "@T{t}"),
            Self::Null => f.write_str("{}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_structure() {
        let expr = ExpressionNode::method_call(
            ExpressionNode::path(ExpressionNode::identifier("Patient"), "name"),
            "where",
            vec![ExpressionNode::binary_op(
                BinaryOperator::Equal,
                ExpressionNode::identifier("use"),
                ExpressionNode::literal(LiteralValue::String("official".into())),
            )],
        );
        assert_eq!(expr.to_string(), "Patient.name.where((use = 'official'))");
    }

    #[test]
    fn type_specifier_from_qualified_path() {
        let node = ExpressionNode::path(ExpressionNode::identifier("FHIR"), "Patient");
        assert_eq!(node.as_type_specifier().as_deref(), Some("FHIR.Patient"));
        assert_eq!(
            ExpressionNode::literal(LiteralValue::Integer(1)).as_type_specifier(),
            None
        );
    }
}
