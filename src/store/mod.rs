//! File-backed flag store.
//!
//! # Responsibilities
//! - Parse flag definition documents (`{"flags": {key: {state, variants, defaultVariant}}}`)
//! - Swap the active flag set atomically on reload
//! - Report which keys were written, updated or deleted by a reload
//! - Resolve flags to their default variant as the service's [`Evaluator`]
//!
//! # Design Decisions
//! - Readers never block: the flag set sits behind an `ArcSwap`
//! - The store is ready once a document has been loaded successfully
//! - Targeting rules are carried but not evaluated; every enabled flag
//!   resolves statically to its default variant

pub mod watcher;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::eval::{
    AnyResolution, ErrorCode, EvaluationContext, EvaluationError, Evaluator, FlagValue,
    ObjectValue, Reason, Resolution, ResolveResult,
};

/// Whether a flag may be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagState {
    Enabled,
    Disabled,
}

/// One flag definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    pub state: FlagState,
    pub variants: Map<String, Value>,
    pub default_variant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Value>,
}

/// Top-level flag definition document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FlagDocument {
    #[serde(default)]
    pub flags: HashMap<String, FlagDefinition>,
}

impl FlagDocument {
    pub fn parse(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

/// Errors loading a flag definition file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read flag file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse flag file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read and parse a flag definition file.
pub fn read_document(path: &Path) -> Result<FlagDocument, StoreError> {
    let source = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FlagDocument::parse(&source).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// How a reload affected one flag key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Write,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Write => "write",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-key changes produced by a reload, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagChanges(BTreeMap<String, ChangeType>);

impl FlagChanges {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<ChangeType> {
        self.0.get(key).copied()
    }

    /// Payload carried by a configuration change notification:
    /// `{"flags": {key: {"type": "write" | "update" | "delete"}}}`.
    pub fn to_data(&self) -> Map<String, Value> {
        let flags: Map<String, Value> = self
            .0
            .iter()
            .map(|(key, change)| {
                let mut entry = Map::new();
                entry.insert("type".into(), Value::from(change.as_str()));
                (key.clone(), Value::Object(entry))
            })
            .collect();

        let mut data = Map::new();
        data.insert("flags".into(), Value::Object(flags));
        data
    }
}

fn diff(
    old: &HashMap<String, FlagDefinition>,
    new: &HashMap<String, FlagDefinition>,
) -> FlagChanges {
    let mut changes = BTreeMap::new();
    for (key, definition) in new {
        match old.get(key) {
            None => {
                changes.insert(key.clone(), ChangeType::Write);
            }
            Some(previous) if previous != definition => {
                changes.insert(key.clone(), ChangeType::Update);
            }
            Some(_) => {}
        }
    }
    for key in old.keys().filter(|key| !new.contains_key(*key)) {
        changes.insert(key.clone(), ChangeType::Delete);
    }
    FlagChanges(changes)
}

/// In-memory flag set, resolvable as an [`Evaluator`].
#[derive(Debug, Default)]
pub struct FlagStore {
    flags: ArcSwap<HashMap<String, FlagDefinition>>,
    loaded: AtomicBool,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` into a new store.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let store = Self::new();
        store.replace(read_document(path)?);
        Ok(store)
    }

    /// Swap in a new flag set and report what changed.
    pub fn replace(&self, document: FlagDocument) -> FlagChanges {
        let next = Arc::new(document.flags);
        let previous = self.flags.swap(Arc::clone(&next));
        self.loaded.store(true, Ordering::Release);
        diff(&previous, &next)
    }

    /// Whether a flag document has been loaded.
    pub fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.flags.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn default_variant(&self, flag_key: &str) -> Result<(String, Value), EvaluationError> {
        let flags = self.flags.load();
        let flag = flags
            .get(flag_key)
            .ok_or(EvaluationError::from(ErrorCode::FlagNotFound))?;
        evaluate(flag)
    }

    fn resolve_typed<T>(
        &self,
        request_id: &str,
        flag_key: &str,
        convert: impl FnOnce(Value) -> Option<T>,
    ) -> ResolveResult<T> {
        let (variant, value) = self.default_variant(flag_key)?;
        let value = convert(value).ok_or_else(|| {
            tracing::debug!(request_id, flag_key, "Variant value has the wrong type");
            EvaluationError::from(ErrorCode::TypeMismatch)
        })?;
        Ok(Resolution {
            value,
            variant,
            reason: Reason::Static,
        })
    }
}

fn evaluate(flag: &FlagDefinition) -> Result<(String, Value), EvaluationError> {
    if flag.state == FlagState::Disabled {
        return Err(ErrorCode::Disabled.into());
    }
    let value = flag
        .variants
        .get(&flag.default_variant)
        .cloned()
        .ok_or(EvaluationError::from(ErrorCode::ParseError))?;
    Ok((flag.default_variant.clone(), value))
}

fn as_object(value: Value) -> Option<ObjectValue> {
    match value {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Whole numbers as-is, fractional numbers truncated toward zero.
fn as_integer(value: Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn flag_value(value: Value) -> Option<FlagValue> {
    match value {
        Value::Bool(b) => Some(FlagValue::Boolean(b)),
        Value::String(s) => Some(FlagValue::String(s)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(FlagValue::Integer(i)),
            None => n.as_f64().map(FlagValue::Float),
        },
        Value::Object(o) => Some(FlagValue::Object(o)),
        Value::Null | Value::Array(_) => None,
    }
}

impl Evaluator for FlagStore {
    fn resolve_boolean(
        &self,
        request_id: &str,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> ResolveResult<bool> {
        self.resolve_typed(request_id, flag_key, |v| v.as_bool())
    }

    fn resolve_string(
        &self,
        request_id: &str,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> ResolveResult<String> {
        self.resolve_typed(request_id, flag_key, as_string)
    }

    fn resolve_int(
        &self,
        request_id: &str,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> ResolveResult<i64> {
        self.resolve_typed(request_id, flag_key, as_integer)
    }

    fn resolve_float(
        &self,
        request_id: &str,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> ResolveResult<f64> {
        self.resolve_typed(request_id, flag_key, |v| v.as_f64())
    }

    fn resolve_object(
        &self,
        request_id: &str,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> ResolveResult<ObjectValue> {
        self.resolve_typed(request_id, flag_key, as_object)
    }

    fn resolve_all(&self, request_id: &str, _context: &EvaluationContext) -> Vec<AnyResolution> {
        let flags = self.flags.load();
        let mut resolutions: Vec<AnyResolution> = flags
            .iter()
            .filter_map(|(key, flag)| {
                let (variant, value) = match evaluate(flag) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        tracing::debug!(request_id, flag_key = %key, error = %err, "Skipping flag");
                        return None;
                    }
                };
                Some(AnyResolution {
                    flag_key: key.clone(),
                    variant,
                    reason: Reason::Static,
                    value: flag_value(value)?,
                })
            })
            .collect();
        resolutions.sort_by(|a, b| a.flag_key.cmp(&b.flag_key));
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAGS: &str = r##"{
        "flags": {
            "new-welcome-banner": {
                "state": "ENABLED",
                "variants": { "on": true, "off": false },
                "defaultVariant": "off"
            },
            "header-color": {
                "state": "ENABLED",
                "variants": { "red": "#FF0000", "blue": "#0000FF" },
                "defaultVariant": "red"
            },
            "retries": {
                "state": "ENABLED",
                "variants": { "few": 3, "many": 10 },
                "defaultVariant": "many"
            },
            "ratio": {
                "state": "ENABLED",
                "variants": { "half": 0.5 },
                "defaultVariant": "half"
            },
            "theme": {
                "state": "ENABLED",
                "variants": { "dark": { "background": "black" } },
                "defaultVariant": "dark"
            },
            "legacy-checkout": {
                "state": "DISABLED",
                "variants": { "on": true },
                "defaultVariant": "on"
            },
            "broken": {
                "state": "ENABLED",
                "variants": { "on": true },
                "defaultVariant": "missing"
            }
        }
    }"##;

    fn store() -> FlagStore {
        let store = FlagStore::new();
        store.replace(FlagDocument::parse(FLAGS).unwrap());
        store
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new()
    }

    #[test]
    fn resolves_each_type_to_default_variant() {
        let store = store();

        let boolean = store.resolve_boolean("r", "new-welcome-banner", &ctx()).unwrap();
        assert_eq!((boolean.value, boolean.variant.as_str()), (false, "off"));
        assert_eq!(boolean.reason, Reason::Static);

        let string = store.resolve_string("r", "header-color", &ctx()).unwrap();
        assert_eq!(string.value, "#FF0000");

        assert_eq!(store.resolve_int("r", "retries", &ctx()).unwrap().value, 10);
        assert_eq!(store.resolve_float("r", "ratio", &ctx()).unwrap().value, 0.5);

        let object = store.resolve_object("r", "theme", &ctx()).unwrap();
        assert_eq!(object.value["background"], "black");
    }

    #[test]
    fn floats_truncate_when_resolved_as_integers() {
        assert_eq!(store().resolve_int("r", "ratio", &ctx()).unwrap().value, 0);
    }

    #[test]
    fn integers_resolve_as_floats() {
        assert_eq!(store().resolve_float("r", "retries", &ctx()).unwrap().value, 10.0);
    }

    #[test]
    fn errors_carry_domain_codes() {
        let store = store();
        let code = |r: ResolveResult<bool>| r.unwrap_err().code;

        assert_eq!(code(store.resolve_boolean("r", "nope", &ctx())), ErrorCode::FlagNotFound);
        assert_eq!(code(store.resolve_boolean("r", "header-color", &ctx())), ErrorCode::TypeMismatch);
        assert_eq!(code(store.resolve_boolean("r", "legacy-checkout", &ctx())), ErrorCode::Disabled);
        assert_eq!(code(store.resolve_boolean("r", "broken", &ctx())), ErrorCode::ParseError);
    }

    #[test]
    fn resolve_all_skips_unresolvable_flags() {
        let all = store().resolve_all("r", &ctx());
        let keys: Vec<_> = all.iter().map(|r| r.flag_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["header-color", "new-welcome-banner", "ratio", "retries", "theme"]
        );
        assert_eq!(all[3].value, FlagValue::Integer(10));
    }

    #[test]
    fn readiness_follows_first_load() {
        let store = FlagStore::new();
        assert!(!store.is_ready());
        store.replace(FlagDocument::default());
        assert!(store.is_ready());
        assert!(store.is_empty());
    }

    #[test]
    fn reload_reports_changes_per_key() {
        let store = store();
        let mut next = FlagDocument::parse(FLAGS).unwrap();
        next.flags.remove("ratio");
        next.flags.get_mut("retries").unwrap().default_variant = "few".into();
        next.flags.insert(
            "fresh".into(),
            FlagDefinition {
                state: FlagState::Enabled,
                variants: Map::new(),
                default_variant: String::new(),
                targeting: None,
            },
        );

        let changes = store.replace(next);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.get("fresh"), Some(ChangeType::Write));
        assert_eq!(changes.get("retries"), Some(ChangeType::Update));
        assert_eq!(changes.get("ratio"), Some(ChangeType::Delete));

        let data = changes.to_data();
        assert_eq!(data["flags"]["ratio"]["type"], "delete");
    }

    #[test]
    fn identical_reload_reports_nothing() {
        let store = store();
        assert!(store.replace(FlagDocument::parse(FLAGS).unwrap()).is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FlagStore::from_file(Path::new("/nonexistent/flags.json")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
