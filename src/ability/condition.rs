use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Number, Value};

use crate::error::GuardError;
use crate::utils::lookup_path;

/// A single test against one attribute of a subject instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Exists(bool),
}

/// An opaque test over the whole attribute document of a subject.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The conditions a subject instance must satisfy for a rule to apply.
///
/// Conditions are either built in code or parsed from a query document in the
/// usual `{ field: value, field: { "$op": value } }` form. All tests must
/// hold.
#[derive(Clone, Default)]
pub struct Conditions {
    fields: Vec<(String, Condition)>,
    predicate: Option<Predicate>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Ne(value.into()))
    }

    pub fn is_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Condition::In(values))
    }

    pub fn not_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Condition::Nin(values))
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(value.into()))
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gte(value.into()))
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(value.into()))
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lte(value.into()))
    }

    pub fn exists(self, field: &str, exists: bool) -> Self {
        self.with(field, Condition::Exists(exists))
    }

    /// Adds an arbitrary predicate over the subject attributes.
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with(mut self, field: &str, condition: Condition) -> Self {
        self.fields.push((field.to_string(), condition));
        self
    }

    /// Parses a query document.
    pub fn from_query(query: &Value) -> Result<Self, GuardError> {
        let query = match query {
            Value::Object(query) => query,
            _ => {
                return Err(GuardError::InvalidConditions {
                    field: String::new(),
                    message: String::from("conditions must be an object"),
                })
            }
        };

        let mut conditions = Conditions::new();
        for (field, expr) in query.iter() {
            match expr {
                Value::Object(ops) if is_operator_map(ops) => {
                    for (op, value) in ops.iter() {
                        let condition = parse_operator(field, op, value)?;
                        conditions.fields.push((field.clone(), condition));
                    }
                }
                _ => conditions.fields.push((field.clone(), Condition::Eq(expr.clone()))),
            }
        }

        Ok(conditions)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.predicate.is_none()
    }

    pub fn fields(&self) -> &[(String, Condition)] {
        &self.fields
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn matches(&self, attrs: &Value) -> bool {
        for (field, condition) in self.fields.iter() {
            let actual = lookup_path(attrs, field);
            if !condition.test(actual) {
                return false;
            }
        }

        match self.predicate {
            Some(ref predicate) => predicate(attrs),
            None => true,
        }
    }
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Conditions");
        s.field("fields", &self.fields);
        if self.predicate.is_some() {
            s.field("predicate", &"<fn>");
        }
        s.finish()
    }
}

impl Condition {
    fn test(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expect) => equals(actual, expect),
            Condition::Ne(expect) => !equals(actual, expect),
            Condition::In(expects) => expects.iter().any(|e| equals(actual, e)),
            Condition::Nin(expects) => !expects.iter().any(|e| equals(actual, e)),
            Condition::Gt(expect) => compare(actual, expect) == Some(Ordering::Greater),
            Condition::Gte(expect) => matches!(
                compare(actual, expect),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(expect) => compare(actual, expect) == Some(Ordering::Less),
            Condition::Lte(expect) => matches!(
                compare(actual, expect),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Exists(exists) => actual.is_some() == *exists,
        }
    }
}

fn is_operator_map(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn parse_operator(field: &str, op: &str, value: &Value) -> Result<Condition, GuardError> {
    let invalid = |message: String| GuardError::InvalidConditions {
        field: field.to_string(),
        message,
    };
    let condition = match op {
        "$eq" => Condition::Eq(value.clone()),
        "$ne" => Condition::Ne(value.clone()),
        "$in" | "$nin" => {
            let values = match value {
                Value::Array(values) => values.clone(),
                _ => return Err(invalid(format!("operator '{op}' expects an array"))),
            };
            if op == "$in" {
                Condition::In(values)
            } else {
                Condition::Nin(values)
            }
        }
        "$gt" => Condition::Gt(value.clone()),
        "$gte" => Condition::Gte(value.clone()),
        "$lt" => Condition::Lt(value.clone()),
        "$lte" => Condition::Lte(value.clone()),
        "$exists" => match value {
            Value::Bool(exists) => Condition::Exists(*exists),
            _ => return Err(invalid(String::from("operator '$exists' expects a bool"))),
        },
        _ => return Err(invalid(format!("unknown operator '{op}'"))),
    };
    Ok(condition)
}

/// Equality in query semantics: a missing attribute equals `null`, and an
/// array attribute equals any scalar it contains.
fn equals(actual: Option<&Value>, expect: &Value) -> bool {
    let actual = match actual {
        Some(actual) => actual,
        None => return expect.is_null(),
    };

    if let (Value::Array(items), false) = (actual, expect.is_array()) {
        return items.iter().any(|item| scalar_equals(item, expect));
    }

    scalar_equals(actual, expect)
}

fn scalar_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => number_cmp(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, expect: &Value) -> Option<Ordering> {
    match (actual?, expect) {
        (Value::Number(a), Value::Number(b)) => number_cmp(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Integers compare exactly; only a float on either side falls back to f64.
fn number_cmp(a: &Number, b: &Number) -> Option<Ordering> {
    let integer = |n: &Number| {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    };
    match (integer(a), integer(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}
