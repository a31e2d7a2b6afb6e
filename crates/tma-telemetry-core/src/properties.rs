// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event property bags.
//!
//! Properties are an open key/value map, but values are restricted to a closed
//! set of scalar and nested variants so every bag is guaranteed to serialize.
//! Keys are kept in sorted order; the wire format does not depend on order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	List(Vec<PropertyValue>),
	Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			PropertyValue::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			PropertyValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			PropertyValue::Bool(b) => Some(*b),
			_ => None,
		}
	}
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		PropertyValue::Bool(value)
	}
}

impl From<i32> for PropertyValue {
	fn from(value: i32) -> Self {
		PropertyValue::Int(value.into())
	}
}

impl From<i64> for PropertyValue {
	fn from(value: i64) -> Self {
		PropertyValue::Int(value)
	}
}

impl From<u32> for PropertyValue {
	fn from(value: u32) -> Self {
		PropertyValue::Int(value.into())
	}
}

impl From<u64> for PropertyValue {
	fn from(value: u64) -> Self {
		match i64::try_from(value) {
			Ok(i) => PropertyValue::Int(i),
			Err(_) => PropertyValue::Float(value as f64),
		}
	}
}

impl From<usize> for PropertyValue {
	fn from(value: usize) -> Self {
		PropertyValue::from(value as u64)
	}
}

impl From<f32> for PropertyValue {
	fn from(value: f32) -> Self {
		PropertyValue::Float(value.into())
	}
}

impl From<f64> for PropertyValue {
	fn from(value: f64) -> Self {
		PropertyValue::Float(value)
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		PropertyValue::Text(value.to_string())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		PropertyValue::Text(value)
	}
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
	fn from(values: Vec<T>) -> Self {
		PropertyValue::List(values.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(PropertyValue::Null, Into::into)
	}
}

impl From<Properties> for PropertyValue {
	fn from(props: Properties) -> Self {
		PropertyValue::Map(props.inner)
	}
}

/// Converts arbitrary JSON into the closed value set.
///
/// Numbers that fit in `i64` stay integral; everything else numeric becomes a
/// float.
impl From<Value> for PropertyValue {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => PropertyValue::Null,
			Value::Bool(b) => PropertyValue::Bool(b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => PropertyValue::Int(i),
				None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			Value::String(s) => PropertyValue::Text(s),
			Value::Array(items) => PropertyValue::List(items.into_iter().map(Into::into).collect()),
			Value::Object(map) => {
				PropertyValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
			}
		}
	}
}

/// A builder for constructing event properties.
///
/// # Example
///
/// ```
/// use tma_telemetry_core::Properties;
///
/// let props = Properties::new()
///     .insert("button", "checkout")
///     .insert("screen", "/cart")
///     .insert("price", 99.99)
///     .insert("is_premium", true);
/// assert_eq!(props.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: BTreeMap<String, PropertyValue>,
}

impl Properties {
	/// Creates a new empty Properties builder.
	pub fn new() -> Self {
		Self {
			inner: BTreeMap::new(),
		}
	}

	/// Inserts a key-value pair, returning the updated bag.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<PropertyValue>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a key-value pair in place.
	pub fn set<K, V>(&mut self, key: K, value: V)
	where
		K: Into<String>,
		V: Into<PropertyValue>,
	{
		self.inner.insert(key.into(), value.into());
	}

	/// Merges another Properties into this one.
	///
	/// If both contain the same key, the value from `other` takes precedence.
	pub fn merge(mut self, other: Properties) -> Self {
		self.inner.extend(other.inner);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&PropertyValue> {
		self.inner.get(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
		self.inner.iter()
	}
}

impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match PropertyValue::from(value) {
			PropertyValue::Map(inner) => Self { inner },
			_ => Self::new(),
		}
	}
}

impl From<BTreeMap<String, PropertyValue>> for Properties {
	fn from(inner: BTreeMap<String, PropertyValue>) -> Self {
		Self { inner }
	}
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			inner: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}
