//! The Earth Engine REST expression graph.
//!
//! An [`Expression`] is a map of named [`ValueNode`]s plus the name of the
//! result node. Nodes nest arbitrarily, so every expression built here is a
//! single inline tree stored under the name `"0"`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Name of the single node every expression is stored under.
const RESULT_NODE: &str = "0";

/// A serialized Earth Engine computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    result: String,
    values: BTreeMap<String, ValueNode>,
}

impl Expression {
    /// Wraps `node` as the expression result.
    #[must_use]
    pub fn new(node: ValueNode) -> Self {
        Self {
            result: RESULT_NODE.to_string(),
            values: BTreeMap::from([(RESULT_NODE.to_string(), node)]),
        }
    }

    /// The result node.
    #[must_use]
    pub fn root(&self) -> Option<&ValueNode> {
        self.values.get(&self.result)
    }
}

/// One node of the expression graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    /// A JSON literal.
    ConstantValue(Value),
    /// An API function call.
    FunctionInvocationValue(FunctionInvocation),
    /// A list of nodes.
    ArrayValue(ArrayValue),
}

/// A call of a named API function with named arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    /// Function name, e.g. `Image.select`.
    pub function_name: String,
    /// Named arguments.
    pub arguments: BTreeMap<String, ValueNode>,
}

/// A list of nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayValue {
    /// The elements.
    pub values: Vec<ValueNode>,
}

impl ValueNode {
    /// A constant.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::ConstantValue(value.into())
    }

    /// A list of nodes.
    #[must_use]
    pub const fn array(values: Vec<Self>) -> Self {
        Self::ArrayValue(ArrayValue { values })
    }

    /// A list of string constants.
    #[must_use]
    pub fn strings<S: AsRef<str>>(values: &[S]) -> Self {
        Self::constant(
            values
                .iter()
                .map(|s| Value::from(s.as_ref()))
                .collect::<Vec<_>>(),
        )
    }

    /// A call of `function` with the given named arguments.
    pub fn call<'a>(function: &str, arguments: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        Self::FunctionInvocationValue(FunctionInvocation {
            function_name: function.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        })
    }

    /// A call of `function` without arguments.
    #[must_use]
    pub fn nullary(function: &str) -> Self {
        Self::FunctionInvocationValue(FunctionInvocation {
            function_name: function.to_string(),
            arguments: BTreeMap::new(),
        })
    }

    /// The function name when this node is a call.
    #[must_use]
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Self::FunctionInvocationValue(f) => Some(&f.function_name),
            _ => None,
        }
    }

    /// A named argument when this node is a call.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Self> {
        match self {
            Self::FunctionInvocationValue(f) => f.arguments.get(name),
            _ => None,
        }
    }
}
