//! Detached, serializable snapshots of runtime values.
//!
//! A [`Payload`] is what a call record keeps of an argument or a return
//! value. It owns no `Rc` into the runtime, so a record can outlive the
//! objects it describes and travel to storage as JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::value::Value;

/// Nesting limit for [`Payload::snapshot`]. Self-referencing instances
/// hit this instead of recursing forever.
///
/// An object level encodes as three nested JSON containers and the
/// decoder stops at 128, so every payload this accepts must still fit
/// under that with room for the enclosing argument map.
pub const MAX_SNAPSHOT_DEPTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Payload>),
    Dict(IndexMap<String, Payload>),
    Object {
        class: String,
        fields: IndexMap<String, Payload>,
    },
    Callable {
        module: String,
        qualname: String,
    },
    Class {
        module: String,
        qualname: String,
    },
    Module {
        name: String,
    },
    Opaque {
        type_name: String,
    },
}

impl Payload {
    /// Snapshots `value` as it is right now.
    pub fn snapshot(value: &Value) -> Result<Payload, SnapshotError> {
        Self::snapshot_at(value, 0)
    }

    fn snapshot_at(value: &Value, depth: usize) -> Result<Payload, SnapshotError> {
        if depth >= MAX_SNAPSHOT_DEPTH {
            return Err(SnapshotError::TooDeep {
                limit: MAX_SNAPSHOT_DEPTH,
            });
        }
        let payload = match value {
            Value::None => Payload::None,
            Value::Bool(b) => Payload::Bool(*b),
            Value::Int(v) => Payload::Int(*v),
            Value::Float(v) if v.is_finite() => Payload::Float(*v),
            Value::Float(v) => return Err(SnapshotError::NonFiniteFloat(v.to_string())),
            Value::Str(s) => Payload::Str(s.clone()),
            Value::List(items) => Payload::List(
                items
                    .iter()
                    .map(|item| Self::snapshot_at(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Dict(map) => Payload::Dict(Self::snapshot_map(map, depth)?),
            Value::Instance(inst) => Payload::Object {
                class: format!("{}.{}", inst.class().module(), inst.class().qualname()),
                fields: Self::snapshot_map(&inst.fields(), depth)?,
            },
            Value::Function(f) => Payload::Callable {
                module: f.module().to_string(),
                qualname: f.qualname().to_string(),
            },
            Value::BoundMethod(m) => Payload::Callable {
                module: m.function().module().to_string(),
                qualname: m.function().qualname().to_string(),
            },
            Value::Class(c) => Payload::Class {
                module: c.module().to_string(),
                qualname: c.qualname().to_string(),
            },
            Value::Module(m) => Payload::Module {
                name: m.name().to_string(),
            },
            Value::Native(_) | Value::Generator(_) => Payload::Opaque {
                type_name: value.type_name().to_string(),
            },
        };
        Ok(payload)
    }

    fn snapshot_map(
        map: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<IndexMap<String, Payload>, SnapshotError> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), Self::snapshot_at(v, depth + 1)?)))
            .collect()
    }

    /// Field of an `Object` payload.
    pub fn field(&self, name: &str) -> Option<&Payload> {
        match self {
            Payload::Object { fields, .. } => fields.get(name),
            _ => None,
        }
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::object::{Class, Instance};

    #[test]
    fn instances_snapshot_their_fields() {
        let class = Class::new("shapes", "Point", Vec::new()).unwrap();
        let inst = Instance::new(class);
        inst.set("x", Value::Int(1));
        inst.set("tags", Value::List(vec![Value::from("a")]));

        let payload = Payload::snapshot(&Value::Instance(inst)).unwrap();
        assert_eq!(payload.field("x"), Some(&Payload::Int(1)));
        match payload {
            Payload::Object { class, fields } => {
                assert_eq!(class, "shapes.Point");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected object payload, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let class = Class::new("m", "Box", Vec::new()).unwrap();
        let inst = Instance::new(class);
        inst.set("n", Value::Int(1));
        let payload = Payload::snapshot(&Value::Instance(inst.clone())).unwrap();
        inst.set("n", Value::Int(2));
        assert_eq!(payload.field("n"), Some(&Payload::Int(1)));
    }

    #[test]
    fn self_reference_exceeds_depth_limit() {
        let class = Class::new("m", "Node", Vec::new()).unwrap();
        let node = Instance::new(class);
        node.set("next", Value::Instance(node.clone()));

        let err = Payload::snapshot(&Value::Instance(node.clone())).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::TooDeep {
                limit: MAX_SNAPSHOT_DEPTH
            }
        );
        // Break the cycle so the test does not leak.
        node.set("next", Value::None);
    }

    /// `levels` instances linked through `next`, innermost holding `value`.
    fn chain(levels: usize) -> Rc<Instance> {
        let class = Class::new("m", "Node", Vec::new()).unwrap();
        let mut node = Instance::new(class.clone());
        node.set("value", Value::Int(0));
        for _ in 1..levels {
            let outer = Instance::new(class.clone());
            outer.set("next", Value::Instance(node));
            node = outer;
        }
        node
    }

    #[test]
    fn depth_limit_is_exact() {
        // The innermost field sits one level below its instance.
        let fits = chain(MAX_SNAPSHOT_DEPTH - 1);
        let payload = Payload::snapshot(&Value::Instance(fits.clone())).unwrap();

        let json = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);

        let wrapper = Instance::new(fits.class().clone());
        wrapper.set("next", Value::Instance(fits));
        assert_eq!(
            Payload::snapshot(&Value::Instance(wrapper)).unwrap_err(),
            SnapshotError::TooDeep {
                limit: MAX_SNAPSHOT_DEPTH
            }
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(matches!(
            Payload::snapshot(&Value::Float(f64::NAN)),
            Err(SnapshotError::NonFiniteFloat(_))
        ));
        assert_eq!(
            Payload::snapshot(&Value::Float(1.5)).unwrap(),
            Payload::Float(1.5)
        );
    }

    #[test]
    fn json_shape_is_tagged() {
        let json = serde_json::to_value(Payload::Int(7)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "int", "value": 7}));
        let none = serde_json::to_value(Payload::None).unwrap();
        assert_eq!(none, serde_json::json!({"kind": "none"}));
    }
}
