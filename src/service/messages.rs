//! Request and response messages of `schema.v1.Service` in JSON form.
//!
//! Field names are camelCase. 64-bit integers are encoded as JSON strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::eval::{AnyResolution, EvaluationContext, FlagValue, ObjectValue, Reason};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveRequest {
    pub flag_key: String,
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolveAllRequest {
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EventStreamRequest {}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveBooleanResponse {
    pub value: bool,
    pub reason: Reason,
    pub variant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveStringResponse {
    pub value: String,
    pub reason: Reason,
    pub variant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveIntResponse {
    #[serde(with = "int64")]
    pub value: i64,
    pub reason: Reason,
    pub variant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveFloatResponse {
    pub value: f64,
    pub reason: Reason,
    pub variant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveObjectResponse {
    pub value: ObjectValue,
    pub reason: Reason,
    pub variant: String,
}

/// Value of one flag in a bulk response. Integers are widened to doubles.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyFlagValue {
    BoolValue(bool),
    StringValue(String),
    DoubleValue(f64),
    ObjectValue(ObjectValue),
}

impl From<FlagValue> for AnyFlagValue {
    fn from(value: FlagValue) -> Self {
        match value {
            FlagValue::Boolean(b) => AnyFlagValue::BoolValue(b),
            FlagValue::String(s) => AnyFlagValue::StringValue(s),
            FlagValue::Integer(i) => AnyFlagValue::DoubleValue(i as f64),
            FlagValue::Float(f) => AnyFlagValue::DoubleValue(f),
            FlagValue::Object(o) => AnyFlagValue::ObjectValue(o),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnyFlag {
    pub reason: Reason,
    pub variant: String,
    #[serde(flatten)]
    pub value: AnyFlagValue,
}

impl From<AnyResolution> for AnyFlag {
    fn from(resolution: AnyResolution) -> Self {
        Self {
            reason: resolution.reason,
            variant: resolution.variant,
            value: resolution.value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResolveAllResponse {
    pub flags: BTreeMap<String, AnyFlag>,
}

/// Decimal-string encoding for `i64`, accepting numbers on input too.
mod int64 {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        struct Int64Visitor;

        impl Visitor<'_> for Int64Visitor {
            type Value = i64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a decimal string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
                i64::try_from(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Int64Visitor)
    }
}
