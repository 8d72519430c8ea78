//! Predicate and query model shared by every `TreeStore` backend
//!
//! The engine never builds backend-specific queries. It describes what it
//! needs with these types and each store evaluates them its own way: the
//! memory store in Rust, the libsql store by rendering SQL.
//!
//! A `Predicate` is a conjunction of `Condition`s. An empty predicate is
//! unconditionally true, which is also the default tree scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Logical column of a tree row
///
/// Backends map `Parent`/`Left`/`Right`/`Level` onto the column names of the
/// active `TreeConfig`; `Property(name)` addresses one key of the JSON
/// `properties` object and `Properties` the whole object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Parent,
    Left,
    Right,
    Level,
    Properties,
    Property(String),
}

impl Field {
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Apply the operator to an ordering (`None` means incomparable and never matches)
    pub fn matches(&self, ordering: Option<Ordering>) -> bool {
        let Some(ord) = ordering else {
            return false;
        };
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Right-hand side of a comparison: a literal or another column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare {
        field: Field,
        op: CompareOp,
        operand: Operand,
    },
    /// Inclusive numeric range, `field BETWEEN low AND high`
    Between { field: Field, low: i64, high: i64 },
    IsNull(Field),
    NotNull(Field),
    In { field: Field, values: Vec<Value> },
    /// Disjunction of conditions
    Any(Vec<Condition>),
}

impl Condition {
    pub fn compare(field: Field, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field,
            op,
            operand: Operand::Value(value.into()),
        }
    }

    /// Raw field-to-field comparison (`field OP other`)
    pub fn compare_fields(field: Field, op: CompareOp, other: Field) -> Self {
        Self::Compare {
            field,
            op,
            operand: Operand::Field(other),
        }
    }
}

/// Conjunction of conditions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Unconditionally true predicate
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_conditions(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Merge another predicate into this conjunction
    pub fn and_all(mut self, other: &Predicate) -> Self {
        self.conditions.extend(other.conditions.iter().cloned());
        self
    }

    pub fn eq(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Eq, value))
    }

    pub fn ne(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Ne, value))
    }

    pub fn lt(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Lt, value))
    }

    pub fn le(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Le, value))
    }

    pub fn gt(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Gt, value))
    }

    pub fn ge(self, field: Field, value: impl Into<Value>) -> Self {
        self.and(Condition::compare(field, CompareOp::Ge, value))
    }

    pub fn between(self, field: Field, low: i64, high: i64) -> Self {
        self.and(Condition::Between { field, low, high })
    }

    pub fn is_null(self, field: Field) -> Self {
        self.and(Condition::IsNull(field))
    }

    pub fn not_null(self, field: Field) -> Self {
        self.and(Condition::NotNull(field))
    }

    pub fn is_in(self, field: Field, values: Vec<Value>) -> Self {
        self.and(Condition::In { field, values })
    }

    /// Equality terms on properties (`property = literal`), used to stamp scope
    /// values onto newly created nodes
    pub fn property_equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().filter_map(|c| match c {
            Condition::Compare {
                field: Field::Property(name),
                op: CompareOp::Eq,
                operand: Operand::Value(value),
            } => Some((name.as_str(), value)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: Field,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Row selection for `find_one`/`find_all`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindQuery {
    pub predicate: Predicate,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl FindQuery {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            ..Default::default()
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
}

impl Aggregate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// New value for one column in a bulk update
#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    /// Overwrite with a literal (`Value::Null` clears nullable columns)
    Set(Value),
    /// Add a signed delta to a numeric column (`col = col + delta`)
    Shift(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: Field,
    pub value: AssignValue,
}

impl Assignment {
    pub fn set(field: Field, value: impl Into<Value>) -> Self {
        Self {
            field,
            value: AssignValue::Set(value.into()),
        }
    }

    pub fn shift(field: Field, delta: i64) -> Self {
        Self {
            field,
            value: AssignValue::Shift(delta),
        }
    }
}

/// Compare two JSON values with SQL-like semantics
///
/// Numbers compare numerically, strings lexically, booleans as booleans.
/// `Null` and mismatched types are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
