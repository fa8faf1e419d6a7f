//! Query language for the record collection.
//!
//! Turns bracket-style query strings (`filter[name]=Trip`,
//! `filter[price][$gt]=100`, `sort[name]=-1`) into nested JSON, and compiles
//! that JSON into a [`Filter`] and a [`Sort`] the store evaluates while
//! scanning documents.
//!
//! Query-string values always arrive as text. A text value matches a stored
//! number or boolean when the text renders the same value, so
//! `filter[seats]=4` finds `{"seats": 4}`.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::{ObjectId, ID_FIELD};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("filter must be an object, got {0}")]
    NotAnObject(&'static str),
    #[error("unknown query operator '{0}'")]
    UnknownOperator(String),
    #[error("field '{0}' mixes operators and plain values")]
    MixedOperators(String),
}

/// Parse `(key, value)` pairs into nested JSON, following bracket notation.
///
/// `a[b][c]=1` nests objects, `a[]=x` appends to an array, and a key seen
/// twice collects its values into an array.
pub fn parse_nested(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut root = Map::new();
    for (key, value) in pairs {
        let segments = split_key(key);
        insert_at(&mut root, &segments, value.clone());
    }
    root
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    for part in key[open + 1..key.len() - 1].split("][") {
        if part.contains('[') || part.contains(']') {
            // Unbalanced brackets: keep the whole key literal.
            return vec![key.to_string()];
        }
        segments.push(part.to_string());
    }
    segments
}

fn insert_at(target: &mut Map<String, Value>, segments: &[String], value: String) {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return,
    };

    match rest {
        [] => append(target, head, value, false),
        // `key[]=v` always appends.
        [last] if last.is_empty() => append(target, head, value, true),
        _ => {
            let child = target
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_at(child, rest, value);
            }
        }
    }
}

fn append(target: &mut Map<String, Value>, key: &str, value: String, as_array: bool) {
    let value = Value::String(value);
    match target.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(slot @ Value::String(_)) => {
            let first = slot.take();
            *slot = Value::Array(vec![first, value]);
        }
        // Conflicts with an existing object are dropped.
        Some(_) => {}
        None => {
            let initial = if as_array { Value::Array(vec![value]) } else { value };
            target.insert(key.to_string(), initial);
        }
    }
}

/// JavaScript `parseInt` semantics: optional sign followed by the leading digits.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Coerce a raw query value to an integer the way the listing endpoint does.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_int_prefix(s),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::Array(items) => items.first().and_then(coerce_int),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    path: String,
    predicate: Predicate,
}

/// Conjunction of field predicates. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn compile(raw: &Value) -> Result<Self, QueryError> {
        let fields = match raw {
            Value::Object(fields) => fields,
            Value::Null => return Ok(Self::all()),
            Value::String(s) if s.is_empty() => return Ok(Self::all()),
            other => return Err(QueryError::NotAnObject(type_name(other))),
        };

        let mut clauses = Vec::new();
        for (path, condition) in fields {
            if path.starts_with('$') {
                return Err(QueryError::UnknownOperator(path.clone()));
            }
            compile_condition(path, condition, &mut clauses)?;
        }
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.clauses.iter().all(|clause| {
            let field = lookup(doc, &clause.path);
            clause_matches(&clause.predicate, field)
        })
    }
}

fn compile_condition(
    path: &str,
    condition: &Value,
    clauses: &mut Vec<Clause>,
) -> Result<(), QueryError> {
    let normalized;
    let condition = if path == ID_FIELD {
        normalized = normalize_ids(condition);
        &normalized
    } else {
        condition
    };

    let ops = match condition {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
        _ => {
            clauses.push(Clause {
                path: path.to_string(),
                predicate: Predicate::Eq(condition.clone()),
            });
            return Ok(());
        }
    };

    for (op, operand) in ops {
        let predicate = match op.as_str() {
            "$eq" => Predicate::Eq(operand.clone()),
            "$ne" => Predicate::Ne(operand.clone()),
            "$gt" => Predicate::Gt(operand.clone()),
            "$gte" => Predicate::Gte(operand.clone()),
            "$lt" => Predicate::Lt(operand.clone()),
            "$lte" => Predicate::Lte(operand.clone()),
            "$in" => Predicate::In(as_list(operand)),
            "$nin" => Predicate::Nin(as_list(operand)),
            "$exists" => Predicate::Exists(truthy(operand)),
            other if other.starts_with('$') => {
                return Err(QueryError::UnknownOperator(other.to_string()))
            }
            _ => return Err(QueryError::MixedOperators(path.to_string())),
        };
        clauses.push(Clause {
            path: path.to_string(),
            predicate,
        });
    }
    Ok(())
}

/// Lowercase id-shaped strings so `_id` filters match however the id was cased,
/// same as path identifiers.
fn normalize_ids(value: &Value) -> Value {
    match value {
        Value::String(s) => match ObjectId::parse(s) {
            Some(id) => Value::String(id.to_string()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_ids).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_ids(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn as_list(operand: &Value) -> Vec<Value> {
    match operand {
        Value::Array(items) => items.clone(),
        // `[$in][0]=a&[$in][1]=b` arrives as an object keyed by index.
        Value::Object(items) => items.values().cloned().collect(),
        other => vec![other.clone()],
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve a dotted path (`trip.origin.city`) inside a document.
pub fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn clause_matches(predicate: &Predicate, field: Option<&Value>) -> bool {
    match predicate {
        Predicate::Eq(query) => equals(field, query),
        Predicate::Ne(query) => !equals(field, query),
        Predicate::Gt(query) => ordered(field, query, |o| o == Ordering::Greater),
        Predicate::Gte(query) => ordered(field, query, |o| o != Ordering::Less),
        Predicate::Lt(query) => ordered(field, query, |o| o == Ordering::Less),
        Predicate::Lte(query) => ordered(field, query, |o| o != Ordering::Greater),
        Predicate::In(options) => options.iter().any(|q| equals(field, q)),
        Predicate::Nin(options) => !options.iter().any(|q| equals(field, q)),
        Predicate::Exists(expected) => field.is_some() == *expected,
    }
}

fn equals(field: Option<&Value>, query: &Value) -> bool {
    match field {
        // Missing fields only match an explicit null.
        None => query.is_null(),
        Some(stored) => {
            loose_eq(stored, query)
                || matches!(stored, Value::Array(items) if items.iter().any(|item| loose_eq(item, query)))
        }
    }
}

fn ordered(field: Option<&Value>, query: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_scalar(item, query).map_or(false, &accept)),
        Some(stored) => compare_scalar(stored, query).map_or(false, accept),
    }
}

fn loose_eq(stored: &Value, query: &Value) -> bool {
    match (stored, query) {
        (Value::Number(n), Value::String(s)) => match (n.as_f64(), s.trim().parse::<f64>()) {
            (Some(a), Ok(b)) => a == b,
            _ => false,
        },
        (Value::Bool(b), Value::String(s)) => s == if *b { "true" } else { "false" },
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        _ => stored == query,
    }
}

fn compare_scalar(stored: &Value, query: &Value) -> Option<Ordering> {
    match (stored, query) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
    /// Direction did not coerce to a usable integer; the key does not affect order.
    Unordered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    /// Integer the raw direction coerced to; `None` when it did not parse.
    pub coerced: Option<i64>,
}

impl SortKey {
    pub fn direction(&self) -> Direction {
        match self.coerced {
            Some(n) if n > 0 => Direction::Ascending,
            Some(n) if n < 0 => Direction::Descending,
            _ => Direction::Unordered,
        }
    }
}

/// Ordered list of sort keys, in the order they appeared in the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<SortKey>,
}

impl Sort {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from a `{field: direction}` object; anything else yields no sort.
    pub fn from_value(raw: &Value) -> Self {
        let keys = match raw {
            Value::Object(fields) => fields
                .iter()
                .map(|(field, raw)| SortKey {
                    field: field.clone(),
                    coerced: coerce_int(raw),
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// True when at least one key orders results.
    pub fn is_ordering(&self) -> bool {
        self.keys
            .iter()
            .any(|k| k.direction() != Direction::Unordered)
    }

    /// Coerced form echoed back in listing metadata (`null` for unparsable directions).
    pub fn to_value(&self) -> Value {
        let fields = self
            .keys
            .iter()
            .map(|k| (k.field.clone(), k.coerced.map_or(Value::Null, Value::from)))
            .collect();
        Value::Object(fields)
    }

    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for key in &self.keys {
            let ordering = match key.direction() {
                Direction::Ascending => sort_cmp(lookup(a, &key.field), lookup(b, &key.field)),
                Direction::Descending => sort_cmp(lookup(b, &key.field), lookup(a, &key.field)),
                Direction::Unordered => continue,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Cross-type ordering: missing/null < numbers < strings < objects < arrays < booleans.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ Value::Object(_)), Some(y @ Value::Object(_)))
        | (Some(x @ Value::Array(_)), Some(y @ Value::Array(_))) => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}
