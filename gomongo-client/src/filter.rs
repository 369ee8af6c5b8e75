//! Evaluation of filter, update and sort documents against in-memory documents.
//!
//! Only the subset the in-memory driver supports is understood here: top-level
//! fields, comparison operators, and `$set`/`$unset`/`$inc` updates.

use std::cmp::Ordering;

use bson::{Bson, Document};

use crate::error::{GoMongoError, GoMongoResult};

/// Check whether `document` matches `filter`. An empty filter matches everything.
pub fn matches(document: &Document, filter: &Document) -> GoMongoResult<bool> {
    for (field, condition) in filter {
        if field.starts_with('$') {
            return Err(GoMongoError::query(format!(
                "unsupported top-level operator {field}"
            )));
        }

        let value = document.get(field);
        let matched = match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                matches_operators(value, operators)?
            }
            expected => value == Some(expected),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn matches_operators(value: Option<&Bson>, operators: &Document) -> GoMongoResult<bool> {
    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => value == Some(operand),
            "$ne" => value != Some(operand),
            "$gt" => compare_present(value, operand) == Some(Ordering::Greater),
            "$gte" => matches!(
                compare_present(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => compare_present(value, operand) == Some(Ordering::Less),
            "$lte" => matches!(
                compare_present(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" => array_operand(operator, operand)?.iter().any(|c| value == Some(c)),
            "$nin" => !array_operand(operator, operand)?.iter().any(|c| value == Some(c)),
            "$exists" => {
                let wanted = match operand {
                    Bson::Boolean(b) => *b,
                    other => as_f64(other).is_some_and(|n| n != 0.0),
                };
                value.is_some() == wanted
            }
            other => {
                return Err(GoMongoError::query(format!(
                    "unsupported query operator {other}"
                )));
            }
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn array_operand<'a>(operator: &str, operand: &'a Bson) -> GoMongoResult<&'a Vec<Bson>> {
    match operand {
        Bson::Array(values) => Ok(values),
        _ => Err(GoMongoError::query(format!("{operator} needs an array"))),
    }
}

fn compare_present(value: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    value.and_then(|value| compare(value, operand))
}

/// Order two BSON values of comparable types.
///
/// Numbers compare across integer and double representations. Values of
/// unrelated types are unordered.
pub fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) {
        return l.partial_cmp(&r);
    }

    match (left, right) {
        (Bson::String(l), Bson::String(r)) => Some(l.cmp(r)),
        (Bson::Boolean(l), Bson::Boolean(r)) => Some(l.cmp(r)),
        (Bson::DateTime(l), Bson::DateTime(r)) => Some(l.cmp(r)),
        (Bson::ObjectId(l), Bson::ObjectId(r)) => Some(l.cmp(r)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Sort documents by a `{ field: 1 | -1, ... }` specification.
///
/// Missing fields sort first in ascending order.
pub fn sort(documents: &mut [Document], order: &Document) -> GoMongoResult<()> {
    let mut keys = Vec::with_capacity(order.len());
    for (field, direction) in order {
        let descending = match as_f64(direction) {
            Some(d) if d == 1.0 => false,
            Some(d) if d == -1.0 => true,
            _ => {
                return Err(GoMongoError::query(format!(
                    "sort direction for {field} must be 1 or -1"
                )));
            }
        };
        keys.push((field.as_str(), descending));
    }

    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = match (a.get(*field), b.get(*field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => compare(l, r).unwrap_or(Ordering::Equal),
            };
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

/// Apply an operator update document to `document`.
///
/// Returns whether the document changed.
pub fn apply_update(document: &mut Document, update: &Document) -> GoMongoResult<bool> {
    if update.is_empty() || !is_operator_document(update) {
        return Err(GoMongoError::query(
            "update document requires atomic operators",
        ));
    }

    let before = document.clone();

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(GoMongoError::query(format!(
                "{operator} needs a document of fields"
            )));
        };

        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    reject_id_change(document, field, Some(value))?;
                    document.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for field in fields.keys() {
                    reject_id_change(document, field, None)?;
                    document.remove(field);
                }
            }
            "$inc" => {
                for (field, amount) in fields {
                    reject_id_change(document, field, None)?;
                    let current = document.get(field).cloned().unwrap_or(Bson::Int32(0));
                    document.insert(field.clone(), increment(field, &current, amount)?);
                }
            }
            other => {
                return Err(GoMongoError::query(format!(
                    "unsupported update operator {other}"
                )));
            }
        }
    }

    Ok(*document != before)
}

fn reject_id_change(document: &Document, field: &str, value: Option<&Bson>) -> GoMongoResult<()> {
    if field == "_id" && document.get("_id") != value {
        return Err(GoMongoError::query("the _id field is immutable"));
    }
    Ok(())
}

fn increment(field: &str, current: &Bson, amount: &Bson) -> GoMongoResult<Bson> {
    let sum = match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(n) => Bson::Int32(n),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => {
                return Err(GoMongoError::query(format!(
                    "cannot apply $inc to non-numeric field {field}"
                )));
            }
        },
    };
    Ok(sum)
}
