use super::{
    arity, text_arg, value_arg, CompareOperator, FilterArg, FilterCall, FunctionRegistry,
    PropertyPath, QueryFunctionResolver, StorageReflection,
};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityMetadata, MetadataCatalog};
use entiorm_codec::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Condition produced by the builder backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFragment {
    /// Condition text with `?` placeholders bound to `args` in order.
    Expression {
        /// SQL text.
        sql: String,
        /// Bound values.
        args: Vec<Value>,
    },
    /// Conjunction; empty is always true.
    And(Vec<QueryFragment>),
    /// Disjunction; empty is always false.
    Or(Vec<QueryFragment>),
}

impl QueryFragment {
    /// Creates an expression fragment.
    pub fn expression(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Expression {
            sql: sql.into(),
            args,
        }
    }

    /// Renders the fragment and collects its bound values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut args = Vec::new();
        let sql = self.render(&mut args);
        (sql, args)
    }

    fn render(&self, args: &mut Vec<Value>) -> String {
        let (parts, glue, empty) = match self {
            Self::Expression { sql, args: bound } => {
                args.extend(bound.iter().cloned());
                return sql.clone();
            }
            Self::And(parts) => (parts, " AND ", "1=1"),
            Self::Or(parts) => (parts, " OR ", "1=0"),
        };
        match parts.as_slice() {
            [] => empty.to_string(),
            [single] => single.render(args),
            many => {
                let rendered: Vec<String> = many.iter().map(|p| format!("({})", p.render(args))).collect();
                rendered.join(glue)
            }
        }
    }
}

/// A `LEFT JOIN` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// Alias of the joined table.
    pub alias: String,
    /// Join condition.
    pub on: String,
}

/// Minimal `SELECT` builder hosting query fragments.
///
/// It only renders text; nothing is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    table: String,
    alias: String,
    joins: Vec<Join>,
    conditions: Vec<QueryFragment>,
}

impl QueryBuilder {
    /// Selects from `table` aliased as `alias`.
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            joins: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Root alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Adds a `LEFT JOIN` unless `alias` is already joined.
    pub fn left_join(
        &mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: impl Into<String>,
    ) -> &mut Self {
        let alias = alias.into();
        if !self.joins.iter().any(|join| join.alias == alias) {
            self.joins.push(Join {
                table: table.into(),
                alias,
                on: on.into(),
            });
        }
        self
    }

    /// Adds a condition; conditions are joined with `AND`.
    pub fn and_where(&mut self, fragment: QueryFragment) -> &mut Self {
        self.conditions.push(fragment);
        self
    }

    /// Joins in insertion order.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Renders the statement and its bound values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {}.* FROM {} AS {}", self.alias, self.table, self.alias);
        for join in &self.joins {
            sql.push_str(&format!(" LEFT JOIN {} AS {} ON {}", join.table, join.alias, join.on));
        }
        if self.conditions.is_empty() {
            return (sql, Vec::new());
        }
        let (condition, args) = QueryFragment::And(self.conditions.clone()).to_sql();
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
        (sql, args)
    }
}

/// Evaluation context of the builder backend.
///
/// Property expressions are turned into qualified columns; relationship
/// hops add joins to the hosted builder.
pub struct QueryBuilderHelper {
    catalog: Arc<MetadataCatalog>,
    entity: Arc<EntityMetadata>,
    reflection: Arc<dyn StorageReflection>,
    builder: Mutex<QueryBuilder>,
}

impl QueryBuilderHelper {
    /// Creates a helper for `entity` rows selected by `builder`.
    pub fn new(
        catalog: Arc<MetadataCatalog>,
        entity: &str,
        reflection: Arc<dyn StorageReflection>,
        builder: QueryBuilder,
    ) -> CoreResult<Self> {
        let entity = catalog.get(entity)?;
        Ok(Self {
            catalog,
            entity,
            reflection,
            builder: Mutex::new(builder),
        })
    }

    /// Entity type being queried.
    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.entity
    }

    /// Resolves a property expression into `alias.column`.
    pub fn process_property_expr(&self, expr: &str) -> CoreResult<String> {
        let path = PropertyPath::parse(&self.catalog, self.entity.name(), expr)?;
        let mut builder = self.builder.lock();
        let mut alias = builder.alias().to_string();
        let (leaf, hops) = path
            .steps()
            .split_last()
            .ok_or_else(|| CoreError::invalid_argument(format!("Empty property expression '{expr}'.")))?;

        for step in hops {
            let Some(relationship) = &step.relationship else {
                continue;
            };
            if relationship.kind.is_collection() {
                return Err(CoreError::invalid_argument(format!(
                    "Property {}::${} is a collection and cannot be joined.",
                    step.entity.name(),
                    step.property
                )));
            }
            let target = self.catalog.get(&relationship.entity)?;
            let join_alias = format!("{alias}_{}", step.property);
            let on = format!(
                "{join_alias}.{} = {alias}.{}",
                self.reflection.column_name(&target, target.primary_key())?,
                self.reflection.column_name(&step.entity, &step.property)?
            );
            builder.left_join(self.reflection.table_name(&target), join_alias.clone(), on);
            alias = join_alias;
        }

        let column = self.reflection.column_name(&leaf.entity, &leaf.property)?;
        Ok(format!("{alias}.{column}"))
    }

    /// Adds a resolved condition to the hosted builder.
    pub fn and_where(&self, fragment: QueryFragment) {
        self.builder.lock().and_where(fragment);
    }

    /// Releases the hosted builder.
    pub fn into_builder(self) -> QueryBuilder {
        self.builder.into_inner()
    }
}

impl fmt::Debug for QueryBuilderHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilderHelper")
            .field("entity", &self.entity.name())
            .field("reflection", &self.reflection)
            .field("builder", &*self.builder.lock())
            .finish()
    }
}

/// Resolver rendering filters into [`QueryFragment`]s.
pub struct BuilderFunctionResolver {
    registry: FunctionRegistry<QueryBuilderHelper, QueryFragment>,
}

impl BuilderFunctionResolver {
    /// Creates a resolver with the default functions `equals`, `compare`
    /// and `like`.
    pub fn new() -> Self {
        Self {
            registry: FunctionRegistry::new()
                .register("equals", equals)
                .register("compare", compare)
                .register("like", like),
        }
    }

    /// Adds or replaces a custom function.
    #[must_use]
    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&QueryBuilderHelper, &[FilterArg]) -> CoreResult<QueryFragment>
            + Send
            + Sync
            + 'static,
    {
        self.registry = self.registry.register(name, function);
        self
    }

    /// Resolves `call` and adds it to the helper's builder.
    pub fn apply(&self, helper: &QueryBuilderHelper, call: &FilterCall) -> CoreResult<()> {
        let fragment = self.resolve_call(helper, call)?;
        debug!(
            entity = %helper.metadata().name(),
            function = %call.function,
            "builder filter applied"
        );
        helper.and_where(fragment);
        Ok(())
    }
}

impl Default for BuilderFunctionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuilderFunctionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderFunctionResolver")
            .field("registry", &self.registry)
            .finish()
    }
}

impl QueryFunctionResolver for BuilderFunctionResolver {
    type Helper = QueryBuilderHelper;
    type Output = QueryFragment;

    fn backend(&self) -> &str {
        "builder"
    }

    fn registry(&self) -> &FunctionRegistry<QueryBuilderHelper, QueryFragment> {
        &self.registry
    }

    fn combine_and(&self, parts: Vec<QueryFragment>) -> QueryFragment {
        QueryFragment::And(parts)
    }

    fn combine_or(&self, parts: Vec<QueryFragment>) -> QueryFragment {
        QueryFragment::Or(parts)
    }
}

fn equals(helper: &QueryBuilderHelper, args: &[FilterArg]) -> CoreResult<QueryFragment> {
    arity("equals", args, 2)?;
    let column = helper.process_property_expr(text_arg("equals", args, 0)?)?;
    Ok(match value_arg("equals", args, 1)? {
        Value::Null => QueryFragment::expression(format!("{column} IS NULL"), vec![]),
        Value::Array(options) if options.is_empty() => QueryFragment::expression("1=0", vec![]),
        Value::Array(options) => {
            let placeholders = vec!["?"; options.len()].join(", ");
            QueryFragment::expression(format!("{column} IN ({placeholders})"), options.clone())
        }
        value => QueryFragment::expression(format!("{column} = ?"), vec![value.clone()]),
    })
}

fn compare(helper: &QueryBuilderHelper, args: &[FilterArg]) -> CoreResult<QueryFragment> {
    arity("compare", args, 3)?;
    let column = helper.process_property_expr(text_arg("compare", args, 0)?)?;
    let operator = CompareOperator::parse(text_arg("compare", args, 1)?)?;
    let value = value_arg("compare", args, 2)?;
    Ok(match (operator, value) {
        (CompareOperator::Equal, Value::Null) => {
            QueryFragment::expression(format!("{column} IS NULL"), vec![])
        }
        (CompareOperator::NotEqual, Value::Null) => {
            QueryFragment::expression(format!("{column} IS NOT NULL"), vec![])
        }
        (operator, value) => QueryFragment::expression(
            format!("{column} {} ?", operator.symbol()),
            vec![value.clone()],
        ),
    })
}

fn like(helper: &QueryBuilderHelper, args: &[FilterArg]) -> CoreResult<QueryFragment> {
    arity("like", args, 2)?;
    let column = helper.process_property_expr(text_arg("like", args, 0)?)?;
    let pattern = format!("{}%", escape_like(text_arg("like", args, 1)?));
    Ok(QueryFragment::expression(
        format!("{column} LIKE ? ESCAPE '\\'"),
        vec![Value::Text(pattern)],
    ))
}

/// Escapes `LIKE` wildcards with a backslash.
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
