//! # Type Catalog
//!
//! Registration tables that turn a `type` tag plus a property map into a
//! strongly typed payload.
//!
//! Each entity kind with several concrete forms is a closed enum whose
//! variants wrap one payload struct. A payload knows its tag and its own
//! checks ([`Payload`]). The [`tagged_kind!`] macro builds the enum together
//! with its [`Catalog`], a table of `(tag, constructor)` entries populated once
//! on first use. The constructor parses the property map and runs the payload
//! checks, so a payload that exists has already passed them.
//!
//! Emitters for the same tags live in
//! [`EmitterRegistry`](crate::codegen::EmitterRegistry), keyed by tag and
//! dialect.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{ModelError, ModelResult};
use crate::model::{EntityId, EntityKind};

/// Property mapping of an entity record.
pub type Properties = Map<String, Value>;

/// A payload check that failed, naming the property at fault.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProblem {
    pub field: String,
    pub message: String,
}

impl FieldProblem {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldProblem {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A strongly typed property payload for one `type` tag.
pub trait Payload: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Into<Self::Kind> {
    /// The tagged enum this payload is a variant of
    type Kind;

    /// Tag written to the `type` field of project records
    const TAG: &'static str;

    /// Type-specific value checks. Missing required properties are caught
    /// earlier, when the property map is parsed.
    fn check(&self) -> Vec<FieldProblem> {
        Vec::new()
    }
}

/// One row of a registration table.
pub struct CatalogEntry<K> {
    pub tag: &'static str,
    construct: fn(&Properties) -> Result<K, Vec<FieldProblem>>,
}

impl<K> CatalogEntry<K> {
    /// Entry for payload type `P`
    pub fn of<P: Payload<Kind = K>>() -> Self {
        CatalogEntry {
            tag: P::TAG,
            construct: construct_payload::<P>,
        }
    }
}

fn construct_payload<P: Payload>(properties: &Properties) -> Result<P::Kind, Vec<FieldProblem>> {
    let payload: P = serde_json::from_value(Value::Object(properties.clone()))
        .map_err(|e| vec![FieldProblem::new("properties", e.to_string())])?;
    let problems = payload.check();
    if !problems.is_empty() {
        return Err(problems);
    }
    Ok(payload.into())
}

/// Registration table for one entity kind.
pub struct Catalog<K> {
    kind: EntityKind,
    entries: Vec<CatalogEntry<K>>,
}

impl<K> Catalog<K> {
    pub fn new(kind: EntityKind, entries: Vec<CatalogEntry<K>>) -> Self {
        Catalog { kind, entries }
    }

    /// The entity kind this table builds payloads for
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Registered tags, in registration order
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|entry| entry.tag == tag)
    }

    /// Build the payload for entity `id` from its tag and properties.
    ///
    /// An unknown tag is an `InvalidInput` error; a property map that does not
    /// parse or fails the payload checks is a `ValidationError` naming the
    /// first offending property.
    pub fn construct(&self, id: EntityId, tag: &str, properties: &Properties) -> ModelResult<K> {
        let entry = self.entries.iter().find(|entry| entry.tag == tag).ok_or_else(|| {
            let known: Vec<&str> = self.tags().collect();
            ModelError::invalid_input(
                format!("{}.type", self.kind.name().to_lowercase()),
                tag,
                format!("Unknown {} type; expected one of: {}", self.kind, known.join(", ")),
            )
        })?;

        (entry.construct)(properties).map_err(|problems| match problems.into_iter().next() {
            Some(problem) => ModelError::validation(self.kind, id, problem.field, problem.message),
            None => ModelError::validation(self.kind, id, "properties", "rejected"),
        })
    }
}

/// Serialize a payload into a property map.
pub fn to_properties<P: Serialize>(payload: &P) -> Properties {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Properties::new(),
    }
}

/// Reject a typed payload the way [`Catalog::construct`] rejects a property
/// map: the first problem becomes a `ValidationError` on the entity.
pub(crate) fn check_payload(kind: EntityKind, id: EntityId, problems: Vec<FieldProblem>) -> ModelResult<()> {
    match problems.into_iter().next() {
        Some(problem) => Err(ModelError::validation(kind, id, problem.field, problem.message)),
        None => Ok(()),
    }
}

/// Remove a required structural property (references, activation lists)
/// before the remainder is handed to the payload constructor.
pub(crate) fn take_property<T: DeserializeOwned>(
    properties: &mut Properties,
    kind: EntityKind,
    id: EntityId,
    key: &str,
) -> ModelResult<T> {
    let value = properties
        .remove(key)
        .ok_or_else(|| ModelError::validation(kind, id, key, format!("missing required property '{key}'")))?;
    serde_json::from_value(value).map_err(|e| ModelError::validation(kind, id, key, e.to_string()))
}

/// Optional counterpart of [`take_property`].
pub(crate) fn take_optional_property<T: DeserializeOwned>(
    properties: &mut Properties,
    kind: EntityKind,
    id: EntityId,
    key: &str,
) -> ModelResult<Option<T>> {
    match properties.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ModelError::validation(kind, id, key, e.to_string())),
    }
}

/// Check that a numeric property is strictly positive and finite.
pub(crate) fn require_positive(problems: &mut Vec<FieldProblem>, field: &str, value: f64) {
    if !(value.is_finite() && value > 0.0) {
        problems.push(FieldProblem::new(field, format!("{field} must be positive, got {value}")));
    }
}

/// Check that a numeric property is finite.
pub(crate) fn require_finite(problems: &mut Vec<FieldProblem>, field: &str, value: f64) {
    if !value.is_finite() {
        problems.push(FieldProblem::new(field, format!("{field} must be a finite number")));
    }
}

/// Declare a closed tagged enum over payload types and its registration table.
///
/// ```text
/// tagged_kind! {
///     pub enum MaterialKind for EntityKind::Material {
///         Elastic(Elastic),
///         Steel01(Steel01),
///     }
/// }
/// ```
macro_rules! tagged_kind {
    (
        $(#[$meta:meta])*
        $vis:vis enum $kind:ident for $category:path {
            $( $(#[$vmeta:meta])* $variant:ident($payload:ty) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $kind {
            $( $(#[$vmeta])* $variant($payload), )+
        }

        impl $kind {
            /// The `type` tag of the active variant
            pub fn type_tag(&self) -> &'static str {
                match self {
                    $( $kind::$variant(_) => <$payload as $crate::model::catalog::Payload>::TAG, )+
                }
            }

            /// The payload as a property map
            pub fn properties(&self) -> $crate::model::catalog::Properties {
                match self {
                    $( $kind::$variant(payload) => $crate::model::catalog::to_properties(payload), )+
                }
            }

            /// Type-specific checks on the payload
            pub fn problems(&self) -> Vec<$crate::model::catalog::FieldProblem> {
                match self {
                    $( $kind::$variant(payload) => $crate::model::catalog::Payload::check(payload), )+
                }
            }

            /// Registration table for this kind
            pub fn catalog() -> &'static $crate::model::catalog::Catalog<$kind> {
                static CATALOG: ::once_cell::sync::Lazy<$crate::model::catalog::Catalog<$kind>> =
                    ::once_cell::sync::Lazy::new(|| {
                        $crate::model::catalog::Catalog::new(
                            $category,
                            vec![ $( $crate::model::catalog::CatalogEntry::of::<$payload>(), )+ ],
                        )
                    });
                &CATALOG
            }
        }

        $(
            impl From<$payload> for $kind {
                fn from(payload: $payload) -> Self {
                    $kind::$variant(payload)
                }
            }
        )+
    };
}

pub(crate) use tagged_kind;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::material::{MaterialKind, Steel01};

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_construct_known_tag() {
        let kind = MaterialKind::catalog()
            .construct(1, "Steel01", &props(json!({"Fy": 250.0, "E0": 200000.0, "b": 0.01})))
            .unwrap();
        assert_eq!(
            kind,
            MaterialKind::Steel01(Steel01 {
                fy: 250.0,
                e0: 200000.0,
                b: 0.01
            })
        );
        assert_eq!(kind.type_tag(), "Steel01");
    }

    #[test]
    fn test_unknown_tag_is_invalid_input() {
        let err = MaterialKind::catalog()
            .construct(1, "Unobtainium", &Properties::new())
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(err.to_string().contains("Steel01"));
    }

    #[test]
    fn test_missing_property_is_validation_error() {
        let err = MaterialKind::catalog()
            .construct(4, "Steel01", &props(json!({"Fy": 250.0})))
            .unwrap_err();
        match err {
            ModelError::ValidationError { entity_kind, id, field, .. } => {
                assert_eq!(entity_kind, EntityKind::Material);
                assert_eq!(id, 4);
                assert_eq!(field, "properties");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_payload_check_runs_at_construction() {
        let err = MaterialKind::catalog()
            .construct(2, "Elastic", &props(json!({"E": -1.0})))
            .unwrap_err();
        match err {
            ModelError::ValidationError { field, .. } => assert_eq!(field, "E"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_properties_roundtrip_through_catalog() {
        let original = MaterialKind::Steel01(Steel01 {
            fy: 345.0,
            e0: 210000.0,
            b: 0.02,
        });
        let rebuilt = MaterialKind::catalog()
            .construct(1, original.type_tag(), &original.properties())
            .unwrap();
        assert_eq!(original, rebuilt);
    }
}
