//! Flat wire encoding of patches.
//!
//! A patch is a JSON array `[opcode, args.., opcode, args..]`. Every opcode
//! has a fixed arity; absent optional arguments are encoded as `null`.
//!
//! | opcode | args |
//! |---|---|
//! | 0 `CreateElement` | type, id, slotIndex? |
//! | 1 `InsertBefore` | parentId, childId, beforeId? |
//! | 2 `RemoveChild` | parentId, childId |
//! | 3 `SetAttribute` | id, key, value |
//! | 4 `SetAttributes` | id, values |
//! | 100 `AddDefinition` | templateId, elements, updaters, slot, styleScopeId?, entryName? |
//!
//! An opcode 100 whose arguments do not form a [`Definition`] decodes to
//! `OpaqueDefinition` instead of failing the patch.

use crate::definition::Definition;
use crate::patch::{PatchBatch, PatchList, PatchOp, opcode};
use crate::value::{AttrKey, Value};
use core_types::{FlushOptions, InstanceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum WireError {
    UnknownOpcode { at: usize, opcode: Value },
    Truncated { at: usize, opcode: u8 },
    InvalidArgument { at: usize, opcode: u8, arg: &'static str },
    Json(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::UnknownOpcode { at, opcode } => {
                write!(f, "unknown opcode {opcode} at {at}")
            }
            WireError::Truncated { at, opcode } => {
                write!(f, "opcode {opcode} at {at} is missing arguments")
            }
            WireError::InvalidArgument { at, opcode, arg } => {
                write!(f, "opcode {opcode} at {at} has an invalid {arg}")
            }
            WireError::Json(msg) => write!(f, "malformed patch payload: {msg}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        WireError::Json(err.to_string())
    }
}

fn arity(op: u8) -> Option<usize> {
    match op {
        opcode::CREATE_ELEMENT => Some(3),
        opcode::INSERT_BEFORE => Some(3),
        opcode::REMOVE_CHILD => Some(2),
        opcode::SET_ATTRIBUTE => Some(3),
        opcode::SET_ATTRIBUTES => Some(2),
        opcode::DEV_ONLY_ADD_DEFINITION => Some(6),
        _ => None,
    }
}

fn id_value(id: InstanceId) -> Value {
    Value::from(id.0)
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

pub fn encode(ops: &[PatchOp]) -> Result<Vec<Value>, WireError> {
    let mut out = Vec::with_capacity(ops.len() * 4);
    for op in ops {
        out.push(Value::from(op.opcode()));
        match op {
            PatchOp::CreateElement {
                template,
                id,
                slot_index,
            } => {
                out.push(Value::from(template.as_ref()));
                out.push(id_value(*id));
                out.push(opt(*slot_index));
            }
            PatchOp::InsertBefore {
                parent,
                child,
                before,
            } => {
                out.push(id_value(*parent));
                out.push(id_value(*child));
                out.push(opt(before.map(|b| b.0)));
            }
            PatchOp::RemoveChild { parent, child } => {
                out.push(id_value(*parent));
                out.push(id_value(*child));
            }
            PatchOp::SetAttribute { id, key, value } => {
                out.push(id_value(*id));
                out.push(serde_json::to_value(key)?);
                out.push(value.clone());
            }
            PatchOp::SetAttributes { id, values } => {
                out.push(id_value(*id));
                out.push(Value::Array(values.clone()));
            }
            PatchOp::AddDefinition(def) => {
                out.push(Value::from(def.template_id.as_ref()));
                out.push(serde_json::to_value(&def.elements)?);
                out.push(serde_json::to_value(&def.updaters)?);
                out.push(serde_json::to_value(&def.slot)?);
                out.push(opt(def.style_scope_id));
                out.push(opt(def.entry_name.as_deref()));
            }
            PatchOp::OpaqueDefinition(args) => {
                let n = arity(opcode::DEV_ONLY_ADD_DEFINITION).unwrap_or(0);
                out.extend(args.iter().cloned().chain(std::iter::repeat(Value::Null)).take(n));
            }
        }
    }
    Ok(out)
}

pub fn decode(flat: &[Value]) -> Result<Vec<PatchOp>, WireError> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < flat.len() {
        let at = i;
        let code = flat[i]
            .as_u64()
            .and_then(|c| u8::try_from(c).ok())
            .filter(|c| arity(*c).is_some())
            .ok_or_else(|| WireError::UnknownOpcode {
                at,
                opcode: flat[i].clone(),
            })?;
        let n = arity(code).unwrap_or(0);
        let args = flat
            .get(i + 1..i + 1 + n)
            .ok_or(WireError::Truncated { at, opcode: code })?;
        let id_arg = |index: usize, arg: &'static str| -> Result<InstanceId, WireError> {
            args[index]
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(InstanceId)
                .ok_or(WireError::InvalidArgument {
                    at,
                    opcode: code,
                    arg,
                })
        };
        let invalid = |arg: &'static str| WireError::InvalidArgument {
            at,
            opcode: code,
            arg,
        };
        let op = match code {
            opcode::CREATE_ELEMENT => PatchOp::CreateElement {
                template: Arc::from(args[0].as_str().ok_or_else(|| invalid("type"))?),
                id: id_arg(1, "id")?,
                slot_index: match &args[2] {
                    Value::Null => None,
                    v => Some(
                        v.as_u64()
                            .and_then(|s| u32::try_from(s).ok())
                            .ok_or_else(|| invalid("slotIndex"))?,
                    ),
                },
            },
            opcode::INSERT_BEFORE => PatchOp::InsertBefore {
                parent: id_arg(0, "parentId")?,
                child: id_arg(1, "childId")?,
                before: match &args[2] {
                    Value::Null => None,
                    _ => Some(id_arg(2, "beforeId")?),
                },
            },
            opcode::REMOVE_CHILD => PatchOp::RemoveChild {
                parent: id_arg(0, "parentId")?,
                child: id_arg(1, "childId")?,
            },
            opcode::SET_ATTRIBUTE => PatchOp::SetAttribute {
                id: id_arg(0, "id")?,
                key: match &args[1] {
                    Value::String(name) => AttrKey::Name(Arc::from(name.as_str())),
                    v => AttrKey::Index(
                        v.as_u64()
                            .and_then(|k| usize::try_from(k).ok())
                            .ok_or_else(|| invalid("key"))?,
                    ),
                },
                value: args[2].clone(),
            },
            opcode::SET_ATTRIBUTES => PatchOp::SetAttributes {
                id: id_arg(0, "id")?,
                values: args[1]
                    .as_array()
                    .cloned()
                    .ok_or_else(|| invalid("values"))?,
            },
            _ => match decode_definition(args) {
                Ok(def) => PatchOp::AddDefinition(Box::new(def)),
                Err(err) => {
                    log::debug!(target: "wire", "definition at {at} kept opaque: {err}");
                    PatchOp::OpaqueDefinition(args.to_vec())
                }
            },
        };
        ops.push(op);
        i += 1 + n;
    }
    Ok(ops)
}

fn decode_definition(args: &[Value]) -> Result<Definition, serde_json::Error> {
    let template_id: String = serde_json::from_value(args[0].clone())?;
    let mut def = Definition::new(template_id.as_str());
    def.elements = serde_json::from_value(args[1].clone())?;
    def.updaters = serde_json::from_value(args[2].clone())?;
    def.slot = serde_json::from_value(args[3].clone())?;
    def.style_scope_id = serde_json::from_value(args[4].clone())?;
    def.entry_name = args[5].as_str().map(Arc::from);
    Ok(def)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBatch {
    id: u64,
    snapshot_patch: Vec<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePatchList {
    patch_list: Vec<WireBatch>,
    #[serde(default)]
    flush_options: FlushOptions,
}

/// Serializes a patch list into the opaque string carried across threads.
pub fn encode_patch_list(list: &PatchList) -> Result<String, WireError> {
    let wire = WirePatchList {
        patch_list: list
            .batches
            .iter()
            .map(|batch| {
                Ok(WireBatch {
                    id: batch.id,
                    snapshot_patch: encode(&batch.ops)?,
                })
            })
            .collect::<Result<_, WireError>>()?,
        flush_options: list.flush_options.clone(),
    };
    Ok(serde_json::to_string(&wire)?)
}

pub fn decode_patch_list(data: &str) -> Result<PatchList, WireError> {
    let wire: WirePatchList = serde_json::from_str(data)?;
    let batches = wire
        .patch_list
        .into_iter()
        .map(|batch| {
            Ok(PatchBatch {
                id: batch.id,
                ops: decode(&batch.snapshot_patch)?,
            })
        })
        .collect::<Result<_, WireError>>()?;
    Ok(PatchList {
        batches,
        flush_options: wire.flush_options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ElementTemplate, SlotKind, Updater};
    use serde_json::json;

    #[test]
    fn encodes_fixed_arity() {
        let ops = vec![
            PatchOp::CreateElement {
                template: Arc::from("view"),
                id: InstanceId(2),
                slot_index: None,
            },
            PatchOp::InsertBefore {
                parent: InstanceId(1),
                child: InstanceId(2),
                before: None,
            },
            PatchOp::SetAttribute {
                id: InstanceId(2),
                key: AttrKey::name("class"),
                value: json!("a"),
            },
        ];
        let flat = encode(&ops).unwrap();
        assert_eq!(
            Value::Array(flat.clone()),
            json!([0, "view", 2, null, 1, 1, 2, null, 3, 2, "class", "a"])
        );
        assert_eq!(decode(&flat).unwrap(), ops);
    }

    #[test]
    fn decodes_numeric_keys_as_indexes() {
        let ops = decode(&[json!(3), json!(5), json!(1), json!({"a": 1})]).unwrap();
        assert_eq!(
            ops,
            vec![PatchOp::SetAttribute {
                id: InstanceId(5),
                key: AttrKey::Index(1),
                value: json!({"a": 1}),
            }]
        );
    }

    #[test]
    fn rejects_unknown_opcode() {
        let err = decode(&[json!(7), json!(1)]).unwrap_err();
        assert_eq!(
            err,
            WireError::UnknownOpcode {
                at: 0,
                opcode: json!(7)
            }
        );
    }

    #[test]
    fn rejects_truncated_op() {
        let err = decode(&[json!(2), json!(1)]).unwrap_err();
        assert_eq!(err, WireError::Truncated { at: 0, opcode: 2 });
    }

    #[test]
    fn rejects_bad_id() {
        let err = decode(&[json!(2), json!("x"), json!(1)]).unwrap_err();
        assert!(matches!(
            err,
            WireError::InvalidArgument {
                arg: "parentId",
                ..
            }
        ));
    }

    #[test]
    fn add_definition_carries_declarative_parts() {
        let def = Definition::new("card")
            .with_element(ElementTemplate::element("view"))
            .with_updater(Updater::Text { element: 0 })
            .with_slot(SlotKind::Children, 0)
            .with_entry_name("lazy");
        let flat = encode(&[PatchOp::AddDefinition(Box::new(def.clone()))]).unwrap();
        assert_eq!(flat.len(), 7);
        let decoded = decode(&flat).unwrap();
        assert_eq!(decoded, vec![PatchOp::AddDefinition(Box::new(def))]);
    }

    #[test]
    fn unreadable_definition_stays_opaque() {
        let flat = [
            json!(100),
            json!("card"),
            json!("not a list"),
            json!([]),
            json!(null),
            json!(null),
            json!(null),
            json!(2),
            json!(-1),
            json!(4),
        ];
        let ops = decode(&flat).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], PatchOp::OpaqueDefinition(args) if args.len() == 6));
        assert_eq!(
            ops[1],
            PatchOp::RemoveChild {
                parent: InstanceId(-1),
                child: InstanceId(4),
            }
        );
        assert_eq!(encode(&ops).unwrap(), flat);
    }

    #[test]
    fn custom_updaters_cannot_be_sent() {
        fn noop(_: &mut crate::definition::UpdateContext<'_>) {}
        let def = Definition::new("card").with_updater(Updater::Custom(noop));
        assert!(encode(&[PatchOp::AddDefinition(Box::new(def))]).is_err());
    }

    #[test]
    fn patch_list_round_trips_through_a_string() {
        let list = PatchList {
            batches: vec![PatchBatch {
                id: 3,
                ops: vec![PatchOp::RemoveChild {
                    parent: InstanceId(-1),
                    child: InstanceId(4),
                }],
            }],
            flush_options: FlushOptions {
                trigger_layout: true,
                ..FlushOptions::default()
            },
        };
        let data = encode_patch_list(&list).unwrap();
        assert!(data.contains("\"snapshotPatch\":[2,-1,4]"));
        assert_eq!(decode_patch_list(&data).unwrap(), list);
    }
}
