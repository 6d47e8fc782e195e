//! Composite key formatting
//!
//! Group keys and entity keys are built from ordered field-name schemas and
//! a mapping of field values. Formatting is pure: the same schema and
//! parameters always produce the same string.

use crate::errors::GroupCacheError;
use cache_system::KeyValue;
use config::GroupCacheOptions;
use std::collections::BTreeMap;

/// Placeholder emitted for entity fields without a value
pub const WILDCARD: &str = "*";

const SEPARATOR: &str = ":";

/// Field values used to build a key
///
/// ```rust
/// use grouphash::{KeyParams, params};
///
/// let explicit = KeyParams::new().with("userId", 42).with("region", "eu");
/// let shorthand = params! { "userId" => 42, "region" => "eu" };
/// assert_eq!(explicit, shorthand);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams(BTreeMap<String, String>);

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field value, consuming and returning the params
    pub fn with(mut self, field: impl Into<String>, value: impl ToString) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl ToString) {
        self.0.insert(field.into(), value.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for KeyParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (field, value) in iter {
            params.insert(field, value);
        }
        params
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for KeyParams {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Builds group and entity keys from fixed schemas
#[derive(Debug, Clone)]
pub struct KeyFormatter {
    group_fields: Vec<String>,
    entity_fields: Vec<String>,
    options: GroupCacheOptions,
}

impl KeyFormatter {
    pub fn new(
        group_fields: Vec<String>,
        entity_fields: Vec<String>,
        options: GroupCacheOptions,
    ) -> Self {
        Self {
            group_fields,
            entity_fields,
            options,
        }
    }

    pub fn group_fields(&self) -> &[String] {
        &self.group_fields
    }

    pub fn entity_fields(&self) -> &[String] {
        &self.entity_fields
    }

    pub fn options(&self) -> &GroupCacheOptions {
        &self.options
    }

    /// Concatenate `<field>:<value>` for every group field in schema order.
    ///
    /// Segments are joined without a separator, so `["a", "b"]` with
    /// `{a: 1, b: 2}` yields `a:1b:2`.
    pub fn format_group_body(&self, params: &KeyParams) -> Result<String, GroupCacheError> {
        if params.len() != self.group_fields.len() {
            return Err(GroupCacheError::InvalidParameterCount {
                expected: self.group_fields.len(),
                actual: params.len(),
            });
        }

        let mut body = String::new();
        for field in &self.group_fields {
            let value = params
                .get(field)
                .ok_or_else(|| GroupCacheError::MissingGroupField(field.clone()))?;
            body.push_str(field);
            body.push_str(SEPARATOR);
            body.push_str(value);
        }
        Ok(body)
    }

    /// `<prefix>:<body>:<suffix>`
    pub fn format_group_key(&self, params: &KeyParams) -> Result<String, GroupCacheError> {
        let body = self.format_group_body(params)?;
        Ok(format!(
            "{}{sep}{}{sep}{}",
            self.options.prefix,
            body,
            self.options.suffix,
            sep = SEPARATOR
        ))
    }

    /// Entity key, or a match pattern when some fields are left out.
    ///
    /// Missing or empty fields become `*`. Empty entity prefix/suffix
    /// segments are omitted.
    pub fn format_entity_key(&self, params: &KeyParams) -> String {
        let mut segments = Vec::with_capacity(self.entity_fields.len() + 2);

        if !self.options.entity_prefix.is_empty() {
            segments.push(self.options.entity_prefix.clone());
        }

        for field in &self.entity_fields {
            let value = params
                .get(field)
                .filter(|value| !value.is_empty())
                .unwrap_or(WILDCARD);
            segments.push(format!("{}{}{}", field, SEPARATOR, value));
        }

        if !self.options.entity_suffix.is_empty() {
            segments.push(self.options.entity_suffix.clone());
        }

        segments.join(SEPARATOR)
    }

    pub fn format_key_value(&self, params: &KeyParams, value: impl Into<String>) -> KeyValue {
        KeyValue {
            key: self.format_entity_key(params),
            value: value.into(),
        }
    }
}
