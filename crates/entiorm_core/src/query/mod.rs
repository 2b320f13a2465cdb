//! Query function dispatch.
//!
//! A filter expression is a tree of [`FilterCall`]s. The boolean
//! combinators `AND` and `OR` are built in; every other function name is
//! looked up in the resolver's [`FunctionRegistry`]. Two backends share the
//! same default function names:
//!
//! - [`ArrayFunctionResolver`] evaluates filters against in-memory entities.
//! - [`BuilderFunctionResolver`] renders filters into SQL fragments.
//!
//! Resolution is a separate step from evaluation, so unknown functions,
//! malformed arguments and bad property paths fail before any candidate is
//! looked at.

mod array;
mod builder;
mod expression;
mod mapper;
mod reflection;

pub use array::{ArrayCollectionHelper, ArrayFunctionResolver, ArrayPredicate, ValueAccessor};
pub use builder::{BuilderFunctionResolver, Join, QueryBuilder, QueryBuilderHelper, QueryFragment};
pub use expression::{PathStep, PropertyPath};
pub use mapper::Mapper;
pub use reflection::{underscore, StorageReflection, UnderscoreReflection};

use crate::error::{CoreError, CoreResult};
use entiorm_codec::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Name of the conjunction combinator.
pub const AND: &str = "AND";
/// Name of the disjunction combinator.
pub const OR: &str = "OR";

/// One argument of a filter function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterArg {
    /// Nested function call.
    Call(FilterCall),
    /// Literal value (property paths are text literals).
    Value(Value),
}

impl From<FilterCall> for FilterArg {
    fn from(call: FilterCall) -> Self {
        Self::Call(call)
    }
}

impl From<Value> for FilterArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for FilterArg {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for FilterArg {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

/// A named function applied to raw, unresolved arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    /// Function name.
    pub function: String,
    /// Arguments in call order.
    pub args: Vec<FilterArg>,
}

impl FilterCall {
    /// Creates a call.
    pub fn new(function: impl Into<String>, args: Vec<FilterArg>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// `AND` over the given calls.
    pub fn and(calls: impl IntoIterator<Item = FilterCall>) -> Self {
        Self::new(AND, calls.into_iter().map(FilterArg::Call).collect())
    }

    /// `OR` over the given calls.
    pub fn or(calls: impl IntoIterator<Item = FilterCall>) -> Self {
        Self::new(OR, calls.into_iter().map(FilterArg::Call).collect())
    }

    /// `equals(path, value)`.
    pub fn equals(path: &str, value: impl Into<Value>) -> Self {
        Self::new("equals", vec![path.into(), FilterArg::Value(value.into())])
    }

    /// `compare(path, operator, value)`.
    pub fn compare(path: &str, operator: &str, value: impl Into<Value>) -> Self {
        Self::new(
            "compare",
            vec![path.into(), operator.into(), FilterArg::Value(value.into())],
        )
    }

    /// `like(path, prefix)`.
    pub fn like(path: &str, prefix: &str) -> Self {
        Self::new("like", vec![path.into(), prefix.into()])
    }
}

/// A registered query function.
pub type QueryFunction<H, O> = Arc<dyn Fn(&H, &[FilterArg]) -> CoreResult<O> + Send + Sync>;

/// Registration table of custom query functions for one backend.
///
/// `AND` and `OR` are resolved before the table is consulted.
pub struct FunctionRegistry<H, O> {
    functions: HashMap<String, QueryFunction<H, O>>,
}

impl<H, O> FunctionRegistry<H, O> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registers a function, replacing one with the same name.
    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&H, &[FilterArg]) -> CoreResult<O> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Looks up a function.
    pub fn get(&self, name: &str) -> Option<&QueryFunction<H, O>> {
        self.functions.get(name)
    }

    /// Whether a function is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<H, O> Default for FunctionRegistry<H, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, O> fmt::Debug for FunctionRegistry<H, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Maps function calls onto backend outputs.
pub trait QueryFunctionResolver {
    /// Evaluation context handed to every function.
    type Helper;
    /// What a resolved call produces.
    type Output;

    /// Backend name used in error messages.
    fn backend(&self) -> &str;

    /// Custom function table.
    fn registry(&self) -> &FunctionRegistry<Self::Helper, Self::Output>;

    /// Combines resolved parts with short-circuit conjunction.
    fn combine_and(&self, parts: Vec<Self::Output>) -> Self::Output;

    /// Combines resolved parts with short-circuit disjunction.
    fn combine_or(&self, parts: Vec<Self::Output>) -> Self::Output;

    /// Resolves a function call.
    fn resolve(
        &self,
        helper: &Self::Helper,
        function: &str,
        args: &[FilterArg],
    ) -> CoreResult<Self::Output> {
        match function {
            AND => Ok(self.combine_and(self.resolve_nested(helper, function, args)?)),
            OR => Ok(self.combine_or(self.resolve_nested(helper, function, args)?)),
            _ => {
                let Some(custom) = self.registry().get(function) else {
                    warn!(function, backend = self.backend(), "undefined query function");
                    return Err(CoreError::logic(format!(
                        "Call to undefined function {function} in the {} backend.",
                        self.backend()
                    )));
                };
                trace!(function, backend = self.backend(), "resolving query function");
                custom(helper, args)
            }
        }
    }

    /// Resolves a [`FilterCall`].
    fn resolve_call(&self, helper: &Self::Helper, call: &FilterCall) -> CoreResult<Self::Output> {
        self.resolve(helper, &call.function, &call.args)
    }

    /// Resolves every argument of a combinator; each must be a call.
    fn resolve_nested(
        &self,
        helper: &Self::Helper,
        function: &str,
        args: &[FilterArg],
    ) -> CoreResult<Vec<Self::Output>> {
        args.iter()
            .map(|arg| match arg {
                FilterArg::Call(call) => self.resolve_call(helper, call),
                FilterArg::Value(value) => Err(CoreError::invalid_argument(format!(
                    "{function} expects function calls as arguments, got {value}."
                ))),
            })
            .collect()
    }
}

/// Checks the argument count of a function.
pub fn arity(function: &str, args: &[FilterArg], expected: usize) -> CoreResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "Function {function} expects {expected} arguments, got {}.",
            args.len()
        )))
    }
}

/// Literal argument at `index`.
pub fn value_arg<'a>(function: &str, args: &'a [FilterArg], index: usize) -> CoreResult<&'a Value> {
    match args.get(index) {
        Some(FilterArg::Value(value)) => Ok(value),
        _ => Err(CoreError::invalid_argument(format!(
            "Function {function} expects a value as argument {}.",
            index + 1
        ))),
    }
}

/// Text literal argument at `index`.
pub fn text_arg<'a>(function: &str, args: &'a [FilterArg], index: usize) -> CoreResult<&'a str> {
    value_arg(function, args, index)?.as_text().ok_or_else(|| {
        CoreError::invalid_argument(format!(
            "Function {function} expects text as argument {}.",
            index + 1
        ))
    })
}

/// Comparison operator of the `compare` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl CompareOperator {
    /// Parses an operator symbol.
    pub fn parse(symbol: &str) -> CoreResult<Self> {
        Ok(match symbol {
            "=" => Self::Equal,
            "!=" => Self::NotEqual,
            "<" => Self::Less,
            "<=" => Self::LessOrEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterOrEqual,
            other => {
                return Err(CoreError::invalid_argument(format!(
                    "Unknown comparison operator '{other}'."
                )))
            }
        })
    }

    /// SQL symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Applies the operator; incomparable values only satisfy `!=`.
    ///
    /// A null `left` only matches a null `right` through `=`, and a
    /// non-null one never, so `!=` against a value skips null columns the
    /// way SQL does.
    pub fn matches(self, left: &Value, right: &Value) -> bool {
        if left.is_null() && !right.is_null() {
            return false;
        }
        match self {
            Self::Equal => left == right,
            Self::NotEqual => left != right,
            _ => match left.compare(right) {
                Some(ordering) => match self {
                    Self::Less => ordering == Ordering::Less,
                    Self::LessOrEqual => ordering != Ordering::Greater,
                    Self::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        registry: FunctionRegistry<(), String>,
    }

    impl QueryFunctionResolver for Echo {
        type Helper = ();
        type Output = String;

        fn backend(&self) -> &str {
            "echo"
        }

        fn registry(&self) -> &FunctionRegistry<(), String> {
            &self.registry
        }

        fn combine_and(&self, parts: Vec<String>) -> String {
            format!("and({})", parts.join(","))
        }

        fn combine_or(&self, parts: Vec<String>) -> String {
            format!("or({})", parts.join(","))
        }
    }

    fn echo() -> Echo {
        Echo {
            registry: FunctionRegistry::new()
                .register("leaf", |_: &(), args: &[FilterArg]| Ok(format!("leaf{}", args.len()))),
        }
    }

    #[test]
    fn combinators_resolve_recursively() {
        let call = FilterCall::and([
            FilterCall::new("leaf", vec![]),
            FilterCall::or([FilterCall::new("leaf", vec![1i64.into()])]),
        ]);
        assert_eq!(echo().resolve_call(&(), &call).unwrap(), "and(leaf0,or(leaf1))");
    }

    #[test]
    fn unknown_function_is_a_logic_error() {
        let err = echo().resolve(&(), "unknownOp", &[]).unwrap_err();
        assert!(err.is_logic());
        assert!(err.to_string().contains("unknownOp"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn unknown_nested_function_fails_whole_call() {
        let call = FilterCall::or([FilterCall::new("leaf", vec![]), FilterCall::new("nope", vec![])]);
        assert!(echo().resolve_call(&(), &call).unwrap_err().is_logic());
    }

    #[test]
    fn combinator_rejects_literals() {
        let err = echo().resolve(&(), AND, &[1i64.into()]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn argument_helpers() {
        let args = vec![FilterArg::from("title"), FilterArg::from(3i64)];
        assert!(arity("f", &args, 2).is_ok());
        assert!(arity("f", &args, 3).is_err());
        assert_eq!(text_arg("f", &args, 0).unwrap(), "title");
        assert!(text_arg("f", &args, 1).is_err());
        assert_eq!(value_arg("f", &args, 1).unwrap(), &Value::Integer(3));
        assert!(value_arg("f", &args, 2).is_err());
    }

    #[test]
    fn compare_operators() {
        let one = Value::Integer(1);
        let two = Value::Integer(2);
        assert!(CompareOperator::parse("<").unwrap().matches(&one, &two));
        assert!(CompareOperator::parse(">=").unwrap().matches(&two, &two));
        assert!(!CompareOperator::parse(">").unwrap().matches(&one, &Value::from("x")));
        assert!(CompareOperator::parse("!=").unwrap().matches(&one, &Value::from("x")));
        assert!(CompareOperator::parse("~").is_err());
        assert_eq!(CompareOperator::LessOrEqual.symbol(), "<=");
    }

    #[test]
    fn null_columns_follow_sql_rules() {
        let year = Value::Integer(1965);
        assert!(!CompareOperator::NotEqual.matches(&Value::Null, &year));
        assert!(!CompareOperator::Less.matches(&Value::Null, &year));
        assert!(CompareOperator::Equal.matches(&Value::Null, &Value::Null));
        assert!(!CompareOperator::NotEqual.matches(&Value::Null, &Value::Null));
        assert!(CompareOperator::NotEqual.matches(&year, &Value::Null));
    }

    #[test]
    fn registry_names_are_sorted() {
        let registry: FunctionRegistry<(), ()> = FunctionRegistry::new()
            .register("b", |_: &(), _: &[FilterArg]| Ok(()))
            .register("a", |_: &(), _: &[FilterArg]| Ok(()));
        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.contains("a"));
        assert!(format!("{registry:?}").contains("\"a\""));
    }
}
