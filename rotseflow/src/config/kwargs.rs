//! Stage keyword arguments and context references.

use crate::errors::ParameterError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Prefix marking a context reference in YAML.
pub const REFERENCE_PREFIX: &str = "%%";

/// One keyword argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum KwArg {
    /// A value looked up in the run's context mapping by key.
    Ref(String),
    /// A literal value.
    Literal(serde_json::Value),
}

impl KwArg {
    /// Creates a reference to a context key.
    #[must_use]
    pub fn reference(key: impl Into<String>) -> Self {
        Self::Ref(key.into())
    }

    /// Creates a literal.
    #[must_use]
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Classifies a raw value, turning `"%%key"` strings into references.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Self {
        if let Some(key) = value
            .as_str()
            .and_then(|s| s.strip_prefix(REFERENCE_PREFIX))
            .filter(|key| !key.is_empty())
        {
            return Self::Ref(key.to_string());
        }
        Self::Literal(value)
    }

    /// Converts back to the raw value form.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Ref(key) => serde_json::Value::String(format!("{REFERENCE_PREFIX}{key}")),
            Self::Literal(value) => value.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for KwArg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl Serialize for KwArg {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// The configured keyword arguments of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KwArgs(BTreeMap<String, KwArg>);

impl KwArgs {
    /// Creates empty keyword arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument, returning self for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: KwArg) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Inserts an argument.
    pub fn insert(&mut self, key: impl Into<String>, value: KwArg) {
        self.0.insert(key.into(), value);
    }

    /// Gets an argument.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&KwArg> {
        self.0.get(key)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the arguments in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &KwArg)> {
        self.0.iter()
    }

    /// Overlays `overrides` on top of these arguments; the overrides win.
    #[must_use]
    pub fn overlaid_with(mut self, overrides: Self) -> Self {
        self.0.extend(overrides.0);
        self
    }

    /// Only the literal arguments, references left out.
    #[must_use]
    pub fn literals(&self) -> StageArgs {
        StageArgs(
            self.0
                .iter()
                .filter_map(|(name, arg)| match arg {
                    KwArg::Literal(value) => Some((name.clone(), value.clone())),
                    KwArg::Ref(_) => None,
                })
                .collect(),
        )
    }

    /// Substitutes context references.
    ///
    /// A reference whose key is absent from `values` is dropped with a
    /// warning; the stage still runs and decides for itself whether the
    /// argument was required.
    #[must_use]
    pub fn resolve(&self, values: &serde_json::Map<String, serde_json::Value>, stage: &str) -> StageArgs {
        let mut resolved = serde_json::Map::new();
        for (name, arg) in &self.0 {
            match arg {
                KwArg::Literal(value) => {
                    resolved.insert(name.clone(), value.clone());
                }
                KwArg::Ref(key) => match values.get(key) {
                    Some(value) => {
                        resolved.insert(name.clone(), value.clone());
                    }
                    None => {
                        warn!(stage, argument = %name, key = %key, "Can't find key in context mapping, skipping");
                    }
                },
            }
        }
        debug!(stage, arguments = ?resolved.keys().collect::<Vec<_>>(), "Resolved keyword arguments");
        StageArgs(resolved)
    }
}

impl FromIterator<(String, KwArg)> for KwArgs {
    fn from_iter<T: IntoIterator<Item = (String, KwArg)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Keyword arguments after reference substitution, as a stage sees them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageArgs(serde_json::Map<String, serde_json::Value>);

impl StageArgs {
    /// Creates empty arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, returning self for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Gets a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Returns true if the argument is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Gets a string argument.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    /// Gets a numeric argument, accepting numeric strings.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Gets a boolean argument.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Gets a path argument.
    #[must_use]
    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get_str(key).map(PathBuf::from)
    }

    /// Gets a list of strings; a single string counts as a one-element list.
    #[must_use]
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            serde_json::Value::String(s) => Some(vec![s.clone()]),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Gets a required value, formatted as a string.
    ///
    /// Numbers are accepted and rendered, since nights and telescope ids are
    /// often written unquoted in YAML.
    ///
    /// # Errors
    ///
    /// Returns `ParameterError` if the argument is missing or not a scalar.
    pub fn require_string(&self, stage: &str, key: &str) -> Result<String, ParameterError> {
        match self.0.get(key) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(ParameterError::new(format!(
                "{stage}: keyword argument '{key}' must be a string, got {other}"
            ))),
            None => Err(ParameterError::missing(stage, key)),
        }
    }

    /// Gets a required path.
    ///
    /// # Errors
    ///
    /// Returns `ParameterError` if the argument is missing or not a string.
    pub fn require_path(&self, stage: &str, key: &str) -> Result<PathBuf, ParameterError> {
        match self.0.get(key) {
            Some(serde_json::Value::String(s)) => Ok(PathBuf::from(s)),
            Some(other) => Err(ParameterError::new(format!(
                "{stage}: keyword argument '{key}' must be a path, got {other}"
            ))),
            None => Err(ParameterError::missing(stage, key)),
        }
    }

    /// Gets a required object argument.
    ///
    /// # Errors
    ///
    /// Returns `ParameterError` if the argument is missing or not a mapping.
    pub fn require_object(
        &self,
        stage: &str,
        key: &str,
    ) -> Result<&serde_json::Map<String, serde_json::Value>, ParameterError> {
        match self.0.get(key) {
            Some(serde_json::Value::Object(map)) => Ok(map),
            Some(other) => Err(ParameterError::new(format!(
                "{stage}: keyword argument '{key}' must be a mapping, got {other}"
            ))),
            None => Err(ParameterError::missing(stage, key)),
        }
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for StageArgs {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_parsed_once_at_deserialization() {
        let kwargs: KwArgs = serde_yaml::from_str(
            r"
night: '%%night'
outdir: /data/out
program: coadd
empty: '%%'
",
        )
        .unwrap();

        assert_eq!(kwargs.get("night"), Some(&KwArg::reference("night")));
        assert_eq!(kwargs.get("outdir"), Some(&KwArg::literal("/data/out")));
        assert_eq!(kwargs.get("empty"), Some(&KwArg::literal("%%")));
    }

    #[test]
    fn test_reference_serializes_with_prefix() {
        let kwargs = KwArgs::new().with("telescope", KwArg::reference("telescope"));
        let json = serde_json::to_value(&kwargs).unwrap();
        assert_eq!(json, serde_json::json!({"telescope": "%%telescope"}));
    }

    #[test]
    fn test_resolve_substitutes_and_drops_unresolved() {
        let kwargs = KwArgs::new()
            .with("night", KwArg::reference("night"))
            .with("field", KwArg::reference("field"))
            .with("outdir", KwArg::literal("/tmp/out"));

        let mut values = serde_json::Map::new();
        values.insert("night".to_string(), serde_json::json!("20130119"));

        let args = kwargs.resolve(&values, "Coaddition");

        assert_eq!(args.get_str("night"), Some("20130119"));
        assert_eq!(args.get_str("outdir"), Some("/tmp/out"));
        assert!(!args.contains("field"));
    }

    #[test]
    fn test_overlay_user_wins() {
        let defaults = KwArgs::new()
            .with("outdir", KwArg::reference("outdir"))
            .with("program", KwArg::literal("coadd"));
        let user = KwArgs::new().with("program", KwArg::literal("mycoadd"));

        let merged = defaults.overlaid_with(user);

        assert_eq!(merged.get("program"), Some(&KwArg::literal("mycoadd")));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_stage_args_accessors() {
        let args = StageArgs::new()
            .with("night", 20_130_119)
            .with("ra", "41.56")
            .with("dump", true)
            .with("keys", serde_json::json!(["EXPTIME", "IMAGETYP"]));

        assert_eq!(args.require_string("PA", "night").unwrap(), "20130119");
        assert_eq!(args.get_f64("ra"), Some(41.56));
        assert_eq!(args.get_bool("dump"), Some(true));
        assert_eq!(
            args.get_string_list("keys"),
            Some(vec!["EXPTIME".to_string(), "IMAGETYP".to_string()])
        );
        assert!(args.require_path("PA", "outdir").is_err());
    }
}
