//! Conversion between table entities and DynamoDB items.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::storage::{PropertyValue, Result, StorageError, TableEntity};

/// Partition key attribute.
pub const PK: &str = "pk";
/// Sort key attribute.
pub const RK: &str = "rk";

pub type Item = HashMap<String, AttributeValue>;

pub fn key(partition_key: &str, row_key: &str) -> Item {
    HashMap::from([
        (PK.to_string(), AttributeValue::S(partition_key.to_string())),
        (RK.to_string(), AttributeValue::S(row_key.to_string())),
    ])
}

fn to_attribute(value: &PropertyValue) -> AttributeValue {
    match value {
        PropertyValue::String(s) => AttributeValue::S(s.clone()),
        PropertyValue::Binary(b) => AttributeValue::B(Blob::new(b.clone())),
        PropertyValue::Bool(b) => AttributeValue::Bool(*b),
        PropertyValue::I64(n) => AttributeValue::N(n.to_string()),
    }
}

fn from_attribute(name: &str, value: &AttributeValue) -> Result<PropertyValue> {
    match value {
        AttributeValue::S(s) => Ok(PropertyValue::String(s.clone())),
        AttributeValue::B(b) => Ok(PropertyValue::Binary(b.as_ref().to_vec())),
        AttributeValue::Bool(b) => Ok(PropertyValue::Bool(*b)),
        AttributeValue::N(n) => n.parse().map(PropertyValue::I64).map_err(|_| {
            StorageError::CorruptRecord(format!("attribute {} is not an i64: {}", name, n))
        }),
        other => Err(StorageError::CorruptRecord(format!(
            "attribute {} has unsupported type {:?}",
            name, other
        ))),
    }
}

pub fn to_item(entity: &TableEntity) -> Item {
    let mut item = key(&entity.partition_key, &entity.row_key);
    for (name, value) in &entity.properties {
        item.insert(name.clone(), to_attribute(value));
    }
    item
}

pub fn from_item(item: &Item) -> Result<TableEntity> {
    let key_of = |name: &str| match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        _ => Err(StorageError::CorruptRecord(format!(
            "item missing string key {}",
            name
        ))),
    };

    let mut entity = TableEntity::new(key_of(PK)?, key_of(RK)?);
    for (name, value) in item {
        if name == PK || name == RK {
            continue;
        }
        entity.set(name, from_attribute(name, value)?);
    }
    Ok(entity)
}
