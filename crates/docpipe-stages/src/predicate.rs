//! # Match Predicates
//!
//! A small predicate language over document fields, parsed from the familiar
//! one-document form: `{"a": 5}`, `{"qty": {"$gt": 3}}`,
//! `{"$or": [...]}`, `{"x": {"$exists": true}}`,
//! `{"$text": {"$search": "coffee"}}`.
//!
//! Conjunctions are stored as flat lists ([`Predicate::And`]) rather than
//! nested binary trees, which keeps conjunct decomposition -- the basis of
//! filter pushdown -- a simple flatten.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use docpipe_core::error::{Error, Result};
use docpipe_core::path::FieldPath;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    fn from_name(name: &str) -> Option<CmpOp> {
        Some(match name {
            "$eq" => CmpOp::Eq,
            "$ne" => CmpOp::Ne,
            "$lt" => CmpOp::Lt,
            "$lte" => CmpOp::Lte,
            "$gt" => CmpOp::Gt,
            "$gte" => CmpOp::Gte,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "$eq",
            CmpOp::Ne => "$ne",
            CmpOp::Lt => "$lt",
            CmpOp::Lte => "$lte",
            CmpOp::Gt => "$gt",
            CmpOp::Gte => "$gte",
        }
    }
}

/// A filter predicate over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Compare the value at `path` against a literal.
    Compare {
        path: FieldPath,
        op: CmpOp,
        value: Value,
    },
    /// Test whether `path` is present (or absent).
    Exists { path: FieldPath, exists: bool },
    /// Full-text search. Only legal in a pipeline-initial filter.
    Text { search: String },
    /// Conjunction, stored flat.
    And(Vec<Predicate>),
    /// Disjunction, stored flat.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Parse a predicate document.
    pub fn parse(spec: &Value) -> Result<Predicate> {
        let Some(doc) = spec.as_object() else {
            return Err(Error::InvalidPredicate(
                "a match specification must be an object".to_string(),
            ));
        };

        let mut clauses = Vec::new();
        for (key, value) in doc {
            match key.as_str() {
                "$and" => clauses.push(Self::parse_connective(value, "$and")?),
                "$or" => {
                    let Predicate::And(parts) = Self::parse_connective(value, "$or")? else {
                        unreachable!("parse_connective returns And");
                    };
                    clauses.push(Predicate::Or(parts));
                }
                "$text" => {
                    let search = value
                        .get("$search")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            Error::InvalidPredicate(
                                "$text requires a {\"$search\": <string>} body".to_string(),
                            )
                        })?;
                    clauses.push(Predicate::Text {
                        search: search.to_string(),
                    });
                }
                other if other.starts_with('$') => {
                    return Err(Error::InvalidPredicate(format!(
                        "unrecognized top-level operator: '{other}'"
                    )));
                }
                field => {
                    let path = FieldPath::parse(field)?;
                    clauses.push(Self::parse_field_clause(path, value)?);
                }
            }
        }

        match clauses.len() {
            0 => Err(Error::InvalidPredicate(
                "a match specification must contain at least one clause".to_string(),
            )),
            1 => Ok(clauses.into_iter().next().expect("one clause")),
            _ => Ok(Predicate::And(clauses)),
        }
    }

    fn parse_connective(value: &Value, name: &str) -> Result<Predicate> {
        let Some(parts) = value.as_array() else {
            return Err(Error::InvalidPredicate(format!(
                "{name} requires a non-empty array"
            )));
        };
        if parts.is_empty() {
            return Err(Error::InvalidPredicate(format!(
                "{name} requires a non-empty array"
            )));
        }
        let parsed = parts.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
        Ok(Predicate::And(parsed))
    }

    /// Parse the right-hand side of a `{field: ...}` clause: either a literal
    /// (implicit `$eq`) or an operator document like `{"$gt": 3}`.
    fn parse_field_clause(path: FieldPath, value: &Value) -> Result<Predicate> {
        let is_operator_doc = value
            .as_object()
            .is_some_and(|doc| doc.keys().any(|k| k.starts_with('$')));

        if !is_operator_doc {
            return Ok(Predicate::Compare {
                path,
                op: CmpOp::Eq,
                value: value.clone(),
            });
        }

        let doc = value.as_object().expect("checked above");
        let mut clauses = Vec::new();
        for (op_name, operand) in doc {
            if let Some(op) = CmpOp::from_name(op_name) {
                clauses.push(Predicate::Compare {
                    path: path.clone(),
                    op,
                    value: operand.clone(),
                });
            } else if op_name == "$exists" {
                let exists = operand.as_bool().ok_or_else(|| {
                    Error::InvalidPredicate("$exists requires a boolean operand".to_string())
                })?;
                clauses.push(Predicate::Exists {
                    path: path.clone(),
                    exists,
                });
            } else {
                return Err(Error::InvalidPredicate(format!(
                    "unrecognized operator '{op_name}' for field '{path}'"
                )));
            }
        }

        match clauses.len() {
            0 => Err(Error::InvalidPredicate(format!(
                "empty operator document for field '{path}'"
            ))),
            1 => Ok(clauses.into_iter().next().expect("one clause")),
            _ => Ok(Predicate::And(clauses)),
        }
    }

    /// Flatten top-level conjunctions into a list of conjuncts. A
    /// non-conjunction predicate is its own single conjunct.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::And(parts) => parts.iter().flat_map(|p| p.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Rebuild a predicate from conjuncts. `parts` must be non-empty.
    pub fn from_conjuncts(mut parts: Vec<Predicate>) -> Predicate {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        }
    }

    /// Every field path referenced anywhere in the predicate.
    pub fn paths(&self) -> BTreeSet<FieldPath> {
        let mut out = BTreeSet::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut BTreeSet<FieldPath>) {
        match self {
            Predicate::Compare { path, .. } | Predicate::Exists { path, .. } => {
                out.insert(path.clone());
            }
            Predicate::Text { .. } => {}
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_paths(out);
                }
            }
        }
    }

    /// True if a text-search operator appears anywhere in the predicate.
    pub fn contains_text(&self) -> bool {
        match self {
            Predicate::Text { .. } => true,
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().any(Predicate::contains_text)
            }
            _ => false,
        }
    }

    /// True if an existence check applies to a path overlapping `path`.
    pub fn has_existence_predicate_on(&self, path: &FieldPath) -> bool {
        match self {
            Predicate::Exists { path: checked, .. } => checked.overlaps(path),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().any(|p| p.has_existence_predicate_on(path))
            }
            _ => false,
        }
    }

    /// Rewrite every referenced path through `f`. Returns `None` if any path
    /// cannot be mapped, or if the predicate contains a text operator (text
    /// predicates are never relocated).
    pub fn map_paths(&self, f: &impl Fn(&FieldPath) -> Option<FieldPath>) -> Option<Predicate> {
        match self {
            Predicate::Compare { path, op, value } => Some(Predicate::Compare {
                path: f(path)?,
                op: *op,
                value: value.clone(),
            }),
            Predicate::Exists { path, exists } => Some(Predicate::Exists {
                path: f(path)?,
                exists: *exists,
            }),
            Predicate::Text { .. } => None,
            Predicate::And(parts) => Some(Predicate::And(
                parts
                    .iter()
                    .map(|p| p.map_paths(f))
                    .collect::<Option<Vec<_>>>()?,
            )),
            Predicate::Or(parts) => Some(Predicate::Or(
                parts
                    .iter()
                    .map(|p| p.map_paths(f))
                    .collect::<Option<Vec<_>>>()?,
            )),
        }
    }

    /// Serialize back to the one-document form.
    pub fn serialize(&self) -> Value {
        match self {
            Predicate::Compare { path, op, value } => {
                let mut doc = Map::new();
                if *op == CmpOp::Eq {
                    doc.insert(path.to_string(), value.clone());
                } else {
                    doc.insert(path.to_string(), json!({ op.name(): value }));
                }
                Value::Object(doc)
            }
            Predicate::Exists { path, exists } => {
                json!({ path.to_string(): { "$exists": exists } })
            }
            Predicate::Text { search } => json!({ "$text": { "$search": search } }),
            Predicate::And(parts) => {
                json!({ "$and": parts.iter().map(Predicate::serialize).collect::<Vec<_>>() })
            }
            Predicate::Or(parts) => {
                json!({ "$or": parts.iter().map(Predicate::serialize).collect::<Vec<_>>() })
            }
        }
    }
}
