//! Dynamic WHERE-clause builder
//!
//! Search screens build their filter from whatever the user filled in. Every
//! append method is a no-op when its value is absent (null or an empty
//! string), so callers can pass form fields straight through. The builder
//! keeps predicates as data and renders them for a [`Dialect`] at the end;
//! the rendered SQL always uses `@name` placeholders, which the connection
//! translates for the provider when the statement runs.
//!
//! Parameter names are unique within a builder: appending a second `@x`
//! binds it as `@x_2`, then `@x_3`, and so on.

use super::convert;
use super::dates::DateRange;
use super::dialect::Dialect;
use super::parameter::{normalize_name, Parameter};
use super::value::DatabaseValue;
use chrono::NaiveDateTime;

/// Keyword joining a predicate to what precedes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    Where,
    And,
    Or,
}

impl Conjunction {
    fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::Where => "WHERE",
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// Not equal to (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE pattern matching
    Like,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Compare {
        column: String,
        op: Operator,
        param: String,
    },
    InLiteral {
        column: String,
        list: String,
        negated: bool,
    },
    InParams {
        column: String,
        params: Vec<String>,
    },
    DayRange {
        column: String,
        from: Option<String>,
        to: Option<String>,
    },
    Between {
        column: String,
        from: String,
        to: String,
    },
    NotNull {
        column: String,
    },
    Group(Vec<(Conjunction, Predicate)>),
}

impl Predicate {
    fn render(&self, dialect: Dialect, out: &mut String) {
        match self {
            Predicate::Compare { column, op, param } => {
                out.push_str(&format!("{} {} @{}", column, op.as_sql(), param));
            }
            Predicate::InLiteral {
                column,
                list,
                negated,
            } => {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                out.push_str(&format!("{} {} ({})", column, keyword, list));
            }
            Predicate::InParams { column, params } => {
                let names: Vec<String> = params.iter().map(|p| format!("@{}", p)).collect();
                out.push_str(&format!("{} IN ({})", column, names.join(",")));
            }
            Predicate::DayRange { column, from, to } => {
                let col = dialect.truncate_to_day(column);
                let day = |name: &String| dialect.truncate_to_day(&format!("@{}", name));
                match (from, to) {
                    (Some(from), Some(to)) => {
                        out.push_str(&format!("{} BETWEEN {} AND {}", col, day(from), day(to)))
                    }
                    (Some(from), None) => out.push_str(&format!("{} >= {}", col, day(from))),
                    (None, Some(to)) => out.push_str(&format!("{} <= {}", col, day(to))),
                    (None, None) => {}
                }
            }
            Predicate::Between { column, from, to } => {
                out.push_str(&format!("{} BETWEEN @{} AND @{}", column, from, to));
            }
            Predicate::NotNull { column } => {
                out.push_str(&format!("{} IS NOT NULL", column));
            }
            Predicate::Group(nodes) => {
                out.push('(');
                render_nodes(nodes, dialect, true, out);
                out.push(')');
            }
        }
    }
}

fn render_nodes(nodes: &[(Conjunction, Predicate)], dialect: Dialect, skip_first: bool, out: &mut String) {
    for (i, (conjunction, predicate)) in nodes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if !(skip_first && i == 0) {
            out.push_str(conjunction.as_sql());
            out.push(' ');
        }
        predicate.render(dialect, out);
    }
}

/// Rendered filter: SQL fragment plus the parameters it references
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Parameter>,
}

impl WhereClause {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Clause from hand-written SQL
    pub fn raw(sql: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Builder for [`WhereClause`]
///
/// # Example
///
/// ```
/// use rust_db_support::core::dialect::Dialect;
/// use rust_db_support::core::query_builder::{ClauseBuilder, Conjunction};
///
/// let clause = ClauseBuilder::new()
///     .eq(Conjunction::Where, "o.status", "status", "OPEN")
///     .like(Conjunction::And, "o.customer", "customer", "")
///     .build(Dialect::Oracle);
///
/// assert_eq!(clause.sql, "WHERE o.status = @status");
/// assert_eq!(clause.params.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseBuilder {
    nodes: Vec<(Conjunction, Predicate)>,
    params: Vec<Parameter>,
    /// Names bound by an enclosing builder
    reserved: Vec<String>,
}

impl ClauseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of predicates appended at the top level
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    fn is_taken(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name().eq_ignore_ascii_case(name))
            || self.reserved.iter().any(|r| r.eq_ignore_ascii_case(name))
    }

    /// `param` without its prefix, suffixed `_2`, `_3`, ... while the name
    /// is already taken
    fn unique_name(&self, param: &str) -> String {
        let base = normalize_name(param);
        if !self.is_taken(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.is_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Bind `value` under a unique name derived from `param`
    fn push_param(&mut self, param: &str, value: impl Into<DatabaseValue>) -> String {
        let parameter = Parameter::new(self.unique_name(param), value);
        let name = parameter.name().to_string();
        self.params.push(parameter);
        name
    }

    fn compare(
        mut self,
        conjunction: Conjunction,
        column: &str,
        op: Operator,
        param: &str,
        value: DatabaseValue,
    ) -> Self {
        let value = value.coerce_null();
        if value.is_absent() {
            return self;
        }
        let param = self.push_param(param, value);
        self.nodes.push((
            conjunction,
            Predicate::Compare {
                column: column.to_string(),
                op,
                param,
            },
        ));
        self
    }

    /// `column = @param`
    #[must_use]
    pub fn eq(self, conjunction: Conjunction, column: &str, param: &str, value: impl Into<DatabaseValue>) -> Self {
        self.compare(conjunction, column, Operator::Eq, param, value.into())
    }

    /// `column <> @param`
    #[must_use]
    pub fn not_eq(self, conjunction: Conjunction, column: &str, param: &str, value: impl Into<DatabaseValue>) -> Self {
        self.compare(conjunction, column, Operator::Ne, param, value.into())
    }

    /// `column > @param`, or `>=` when `or_equal`
    #[must_use]
    pub fn gt(
        self,
        conjunction: Conjunction,
        column: &str,
        param: &str,
        value: impl Into<DatabaseValue>,
        or_equal: bool,
    ) -> Self {
        let op = if or_equal { Operator::Ge } else { Operator::Gt };
        self.compare(conjunction, column, op, param, value.into())
    }

    /// `column < @param`, or `<=` when `or_equal`
    #[must_use]
    pub fn lt(
        self,
        conjunction: Conjunction,
        column: &str,
        param: &str,
        value: impl Into<DatabaseValue>,
        or_equal: bool,
    ) -> Self {
        let op = if or_equal { Operator::Le } else { Operator::Lt };
        self.compare(conjunction, column, op, param, value.into())
    }

    /// `column LIKE @param`; `*` in the pattern becomes `%`
    #[must_use]
    pub fn like(self, conjunction: Conjunction, column: &str, param: &str, pattern: &str) -> Self {
        match convert::replace_wildcard(pattern) {
            Some(pattern) => self.compare(conjunction, column, Operator::Like, param, pattern.into()),
            None => self,
        }
    }

    fn in_list(mut self, conjunction: Conjunction, column: &str, list: &str, negated: bool) -> Self {
        if list.trim().is_empty() {
            return self;
        }
        self.nodes.push((
            conjunction,
            Predicate::InLiteral {
                column: column.to_string(),
                list: list.to_string(),
                negated,
            },
        ));
        self
    }

    /// `column IN (list)` with `list` inserted verbatim. Only for trusted
    /// input such as values the application generated itself.
    #[must_use]
    pub fn in_literal(self, conjunction: Conjunction, column: &str, list: &str) -> Self {
        self.in_list(conjunction, column, list, false)
    }

    /// `column NOT IN (list)` with `list` inserted verbatim
    #[must_use]
    pub fn not_in_literal(self, conjunction: Conjunction, column: &str, list: &str) -> Self {
        self.in_list(conjunction, column, list, true)
    }

    /// `column IN (@param0,@param1,...)` from a comma separated list.
    /// Blank entries are dropped.
    #[must_use]
    pub fn in_values(self, conjunction: Conjunction, column: &str, param: &str, csv: &str) -> Self {
        let values: Vec<&str> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        self.in_array(conjunction, column, param, &values)
    }

    /// `column IN (@param0,@param1,...)` with one parameter per value
    #[must_use]
    pub fn in_array<T>(mut self, conjunction: Conjunction, column: &str, param: &str, values: &[T]) -> Self
    where
        T: Clone + Into<DatabaseValue>,
    {
        if values.is_empty() {
            return self;
        }
        let mut names = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            names.push(self.push_param(&format!("{}{}", param, i), value.clone()));
        }
        self.nodes.push((
            conjunction,
            Predicate::InParams {
                column: column.to_string(),
                params: names,
            },
        ));
        self
    }

    /// A comma separated value becomes a quoted `IN` list, anything else a
    /// `LIKE` match
    #[must_use]
    pub fn in_or_like(self, conjunction: Conjunction, column: &str, param: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        if value.contains(',') {
            let compact: String = value.chars().filter(|c| *c != ' ').collect();
            match convert::add_quotes(&compact) {
                Some(list) => self.in_literal(conjunction, column, &list),
                None => self,
            }
        } else {
            self.like(conjunction, column, param, value)
        }
    }

    /// Day-granular, inclusive date filter. Open ends compare one-sided; a
    /// bound holding the minimum date counts as open. With
    /// `include_null_dates == false` rows whose column is null are excluded
    /// as well.
    #[must_use]
    pub fn date_range(
        mut self,
        conjunction: Conjunction,
        column: &str,
        from_param: &str,
        to_param: &str,
        range: DateRange,
        include_null_dates: bool,
    ) -> Self {
        let present = |bound: Option<NaiveDateTime>| {
            bound.filter(|dt| !DatabaseValue::from(*dt).coerce_null().is_null())
        };
        let (from, to) = (present(range.from), present(range.to));
        if from.is_none() && to.is_none() {
            return self;
        }
        let from = from.map(|dt| self.push_param(from_param, dt));
        let to = to.map(|dt| self.push_param(to_param, dt));
        self.nodes.push((
            conjunction,
            Predicate::DayRange {
                column: column.to_string(),
                from,
                to,
            },
        ));
        if !include_null_dates {
            self.nodes.push((
                Conjunction::And,
                Predicate::NotNull {
                    column: column.to_string(),
                },
            ));
        }
        self
    }

    /// `column BETWEEN @from AND @to`; a single bound compares with `>=`
    /// or `<=`
    #[must_use]
    pub fn range(
        mut self,
        conjunction: Conjunction,
        column: &str,
        from_param: &str,
        to_param: &str,
        from: impl Into<DatabaseValue>,
        to: impl Into<DatabaseValue>,
    ) -> Self {
        let from = from.into().coerce_null();
        let to = to.into().coerce_null();
        match (from.is_absent(), to.is_absent()) {
            (true, true) => self,
            (false, true) => self.gt(conjunction, column, from_param, from, true),
            (true, false) => self.lt(conjunction, column, to_param, to, true),
            (false, false) => {
                let from = self.push_param(from_param, from);
                let to = self.push_param(to_param, to);
                self.nodes.push((
                    conjunction,
                    Predicate::Between {
                        column: column.to_string(),
                        from,
                        to,
                    },
                ));
                self
            }
        }
    }

    /// Parenthesized group. The conjunction of the first predicate inside the
    /// group is dropped; a group that ends up empty adds nothing. Names bound
    /// outside the group stay taken inside it.
    #[must_use]
    pub fn group<F>(mut self, conjunction: Conjunction, build: F) -> Self
    where
        F: FnOnce(ClauseBuilder) -> ClauseBuilder,
    {
        let mut seed = ClauseBuilder::new();
        seed.reserved = self
            .reserved
            .iter()
            .cloned()
            .chain(self.params.iter().map(|p| p.name().to_string()))
            .collect();
        let inner = build(seed);
        if inner.is_empty() {
            return self;
        }
        self.nodes.push((conjunction, Predicate::Group(inner.nodes)));
        self.params.extend(inner.params);
        self
    }

    /// Render for `dialect`
    pub fn build(&self, dialect: Dialect) -> WhereClause {
        let mut sql = String::new();
        render_nodes(&self.nodes, dialect, false, &mut sql);
        WhereClause {
            sql,
            params: self.params.clone(),
        }
    }

    /// Render for `dialect`, consuming the builder
    pub fn into_clause(self, dialect: Dialect) -> WhereClause {
        let mut sql = String::new();
        render_nodes(&self.nodes, dialect, false, &mut sql);
        WhereClause {
            sql,
            params: self.params,
        }
    }
}
