use crate::error::PropertyError;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Flat `key=value` experiment configuration with typed lookups
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    values: HashMap<String, String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, PropertyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PropertyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parses properties text. Comment, blank and `=`-less lines are skipped.
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Result<&str, PropertyError> {
        self.get_opt_str(key)
            .ok_or_else(|| PropertyError::Missing(key.to_string()))
    }

    pub fn get_opt_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_int(&self, key: &str) -> Result<i64, PropertyError> {
        self.parse_value(key, self.get_str(key)?, "integer")
    }

    pub fn get_opt_int(&self, key: &str) -> Result<Option<i64>, PropertyError> {
        self.get_opt_str(key)
            .map(|v| self.parse_value(key, v, "integer"))
            .transpose()
    }

    pub fn get_float(&self, key: &str) -> Result<f64, PropertyError> {
        self.parse_value(key, self.get_str(key)?, "float")
    }

    pub fn get_opt_float(&self, key: &str) -> Result<Option<f64>, PropertyError> {
        self.get_opt_str(key)
            .map(|v| self.parse_value(key, v, "float"))
            .transpose()
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, PropertyError> {
        parse_bool(key, self.get_str(key)?)
    }

    pub fn get_opt_bool(&self, key: &str) -> Result<Option<bool>, PropertyError> {
        self.get_opt_str(key).map(|v| parse_bool(key, v)).transpose()
    }

    /// Comma-separated list; all spaces are dropped before splitting
    pub fn get_array(&self, key: &str) -> Result<Vec<String>, PropertyError> {
        Ok(split_array(self.get_str(key)?))
    }

    pub fn get_opt_array(&self, key: &str) -> Option<Vec<String>> {
        self.get_opt_str(key).map(split_array)
    }

    pub fn get_int_array(&self, key: &str) -> Result<Vec<i64>, PropertyError> {
        self.get_array(key)?
            .iter()
            .map(|v| self.parse_value(key, v, "integer array"))
            .collect()
    }

    pub fn get_opt_int_array(&self, key: &str) -> Result<Option<Vec<i64>>, PropertyError> {
        if !self.contains(key) {
            return Ok(None);
        }
        self.get_int_array(key).map(Some)
    }

    fn parse_value<T: FromStr>(
        &self,
        key: &str,
        value: &str,
        expected: &'static str,
    ) -> Result<T, PropertyError> {
        value.parse().map_err(|_| PropertyError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PropertyError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(PropertyError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected: "boolean",
        }),
    }
}

fn split_array(value: &str) -> Vec<String> {
    let compact: String = value.chars().filter(|c| *c != ' ').collect();
    if compact.is_empty() {
        return Vec::new();
    }
    compact.split(',').map(str::to_string).collect()
}
