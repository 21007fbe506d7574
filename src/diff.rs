//! Structural comparison of two settlement batch representations.
//!
//! Visits every field of the batch and order schemas, skipping only those
//! whose declared [`FieldRole`](crate::batch::FieldRole) is not `Compared`.
//! Comparison stops at the first difference and names the offending field,
//! ring or order.
//!
//! A batch parsed by the simulator arrives as untyped JSON and goes through
//! [`diff_parsed`] first, so keys the parser added or dropped are reported
//! by name instead of disappearing during deserialization.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::batch::{
    BatchField, BatchValue, FieldValue, OrderDescriptor, OrderField, RingDescriptor,
    SettlementBatch,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralMismatch {
    #[error("field {field} differs: expected {expected}, actual {actual}")]
    Field {
        field: BatchField,
        expected: FieldValue,
        actual: FieldValue,
    },
    #[error("field {field} has a different shape on each side")]
    Shape { field: BatchField },
    #[error("ring count differs: expected {expected}, actual {actual}")]
    RingCount { expected: usize, actual: usize },
    #[error("ring {ring} length differs: expected {expected}, actual {actual}")]
    RingLength {
        ring: usize,
        expected: usize,
        actual: usize,
    },
    #[error("ring {ring} position {position} references order {actual}, expected order {expected}")]
    RingMember {
        ring: usize,
        position: usize,
        expected: usize,
        actual: usize,
    },
    #[error("order count differs: expected {expected}, actual {actual}")]
    OrderCount { expected: usize, actual: usize },
    #[error("order {order} field {field} differs: expected {expected}, actual {actual}")]
    OrderField {
        order: usize,
        field: OrderField,
        expected: FieldValue,
        actual: FieldValue,
    },
    #[error("unexpected field {field}")]
    UnknownField { field: String },
    #[error("order {order} has unexpected field {field}")]
    UnknownOrderField { order: usize, field: String },
    #[error("batch cannot be read: {reason}")]
    Unreadable { reason: String },
}

/// Requires `actual` to describe the same settlement intent as `expected`.
pub fn diff_batches(
    expected: &SettlementBatch,
    actual: &SettlementBatch,
) -> Result<(), StructuralMismatch> {
    for field in BatchField::ALL
        .iter()
        .copied()
        .filter(|field| field.role().is_compared())
    {
        match (expected.value(field), actual.value(field)) {
            (BatchValue::Rings(expected), BatchValue::Rings(actual)) => {
                diff_rings(expected, actual)?;
            }
            (BatchValue::Orders(expected), BatchValue::Orders(actual)) => {
                diff_orders(expected, actual)?;
            }
            (BatchValue::Scalar(expected), BatchValue::Scalar(actual)) => {
                if expected != actual {
                    return Err(StructuralMismatch::Field {
                        field,
                        expected,
                        actual,
                    });
                }
            }
            _ => return Err(StructuralMismatch::Shape { field }),
        }
    }

    Ok(())
}

/// Compares a batch as the simulator parsed it against the batch that was
/// encoded, and returns the parsed batch once both agree.
///
/// Keys are checked over the union of both sides before any typing: a key
/// outside the schema fails with its name, and a compared key the parser
/// dropped fails as an absent value. The typed batch then goes through
/// [`diff_batches`].
pub fn diff_parsed(
    expected: &SettlementBatch,
    parsed: &Value,
) -> Result<SettlementBatch, StructuralMismatch> {
    let encoded = serde_json::to_value(expected).map_err(unreadable)?;
    let (expected_keys, parsed_keys) = (object(&encoded, "batch")?, object(parsed, "batch")?);

    for key in key_union(expected_keys, parsed_keys) {
        let Some(field) = BatchField::from_key(key) else {
            return Err(StructuralMismatch::UnknownField {
                field: key.to_string(),
            });
        };

        if field.role().is_compared()
            && is_set(expected_keys, key)
            && !is_set(parsed_keys, key)
        {
            return Err(match expected.value(field) {
                BatchValue::Scalar(expected) => StructuralMismatch::Field {
                    field,
                    expected,
                    actual: FieldValue::Absent,
                },
                BatchValue::Rings(_) | BatchValue::Orders(_) => {
                    StructuralMismatch::Shape { field }
                }
            });
        }
    }

    let parsed_orders = orders(parsed_keys)?;
    let described = expected.orders.iter().zip(orders(expected_keys)?);

    for (order, ((descriptor, encoded), parsed)) in described.zip(parsed_orders).enumerate() {
        let label = format!("order {order}");
        let (expected_keys, parsed_keys) = (object(encoded, &label)?, object(parsed, &label)?);

        for key in key_union(expected_keys, parsed_keys) {
            let Some(field) = OrderField::from_key(key) else {
                return Err(StructuralMismatch::UnknownOrderField {
                    order,
                    field: key.to_string(),
                });
            };

            if field.role().is_compared()
                && is_set(expected_keys, key)
                && !is_set(parsed_keys, key)
            {
                return Err(StructuralMismatch::OrderField {
                    order,
                    field,
                    expected: descriptor.field(field),
                    actual: FieldValue::Absent,
                });
            }
        }
    }

    let batch: SettlementBatch = serde_json::from_value(parsed.clone()).map_err(unreadable)?;
    diff_batches(expected, &batch)?;

    Ok(batch)
}

fn unreadable(error: serde_json::Error) -> StructuralMismatch {
    StructuralMismatch::Unreadable {
        reason: error.to_string(),
    }
}

fn object<'a>(
    value: &'a Value,
    label: &str,
) -> Result<&'a Map<String, Value>, StructuralMismatch> {
    value.as_object().ok_or_else(|| StructuralMismatch::Unreadable {
        reason: format!("{label} is not a JSON object"),
    })
}

fn orders(fields: &Map<String, Value>) -> Result<&[Value], StructuralMismatch> {
    fields
        .get(BatchField::Orders.key())
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or(StructuralMismatch::Shape {
            field: BatchField::Orders,
        })
}

fn key_union<'a>(
    expected: &'a Map<String, Value>,
    parsed: &'a Map<String, Value>,
) -> BTreeSet<&'a str> {
    expected
        .keys()
        .chain(parsed.keys())
        .map(String::as_str)
        .collect()
}

/// Explicit `null` counts as absent, like an omitted optional field.
fn is_set(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).is_some_and(|value| !value.is_null())
}

/// Rings describe directed cycles: a rotated or reversed index sequence is
/// a different ring.
fn diff_rings(
    expected: &[RingDescriptor],
    actual: &[RingDescriptor],
) -> Result<(), StructuralMismatch> {
    if expected.len() != actual.len() {
        return Err(StructuralMismatch::RingCount {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    for (ring, (expected, actual)) in expected.iter().zip(actual).enumerate() {
        if expected.len() != actual.len() {
            return Err(StructuralMismatch::RingLength {
                ring,
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        let members = expected.order_indices().iter().zip(actual.order_indices());
        for (position, (expected, actual)) in members.enumerate() {
            if expected != actual {
                return Err(StructuralMismatch::RingMember {
                    ring,
                    position,
                    expected: *expected,
                    actual: *actual,
                });
            }
        }
    }

    Ok(())
}

fn diff_orders(
    expected: &[OrderDescriptor],
    actual: &[OrderDescriptor],
) -> Result<(), StructuralMismatch> {
    if expected.len() != actual.len() {
        return Err(StructuralMismatch::OrderCount {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    for (order, (expected, actual)) in expected.iter().zip(actual).enumerate() {
        for field in OrderField::ALL
            .iter()
            .copied()
            .filter(|field| field.role().is_compared())
        {
            let (expected, actual) = (expected.field(field), actual.field(field));

            if expected != actual {
                return Err(StructuralMismatch::OrderField {
                    order,
                    field,
                    expected,
                    actual,
                });
            }
        }
    }

    Ok(())
}
