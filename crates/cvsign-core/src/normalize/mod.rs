//! Rule-driven normalization of semi-structured documents.
//!
//! A document (any `serde_json::Value`) is first reduced by a [`Rule`] tree
//! to the parts that take part in a digest, then serialized by one of two
//! back-ends:
//!
//! - [`Normalization::Entry`]: every object becomes a list of single-key
//!   objects ordered by key (legacy format, `jsonNormalisation/v1`).
//! - [`Normalization::Jcs`]: RFC 8785 canonical JSON.
//!
//! Both back-ends order object keys independently of insertion order. List
//! order is preserved.

mod entry;
mod jcs;
mod rules;


use serde_json::{Map, Value};

pub use entry::{to_entry_bytes, to_entry_value};
pub use jcs::to_canonical_jcs_bytes;
pub use rules::{
    ignore_access_types, label_without_signing, signing_labels, strip_field_for_access_types,
    Conditional, Rule, ValueChecker, ValueMapper,
};

use crate::error::{CoreError, CoreResult};

/// Serialization back-end for normalized documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    Entry,
    Jcs,
}

impl Normalization {
    /// Apply `rule` to `value` and serialize the result.
    pub fn normalize(self, value: &Value, rule: &Rule) -> CoreResult<Vec<u8>> {
        let prepared = prepare(value, rule)?;
        self.serialize(&prepared)
    }

    /// Serialize an already prepared value.
    pub fn serialize(self, value: &Value) -> CoreResult<Vec<u8>> {
        match self {
            Normalization::Entry => to_entry_bytes(value),
            Normalization::Jcs => to_canonical_jcs_bytes(value),
        }
    }
}

/// Apply a rule tree to a document.
pub fn prepare(value: &Value, rule: &Rule) -> CoreResult<Value> {
    apply(value.clone(), rule, "")
}

fn apply(value: Value, rule: &Rule, path: &str) -> CoreResult<Value> {
    match value {
        Value::Object(map) => apply_map(map, rule, path),
        Value::Array(list) => apply_list(list, rule, path),
        scalar => Ok(scalar),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(l) => l.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn field_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn invalid(path: &str, reason: &str) -> CoreError {
    CoreError::InvalidRule {
        path: if path.is_empty() { "<root>".into() } else { path.into() },
        reason: reason.into(),
    }
}

/// Normalize a child; `None` if an `ExcludeEmpty` rule removed it.
fn child(value: Value, rule: &Rule, path: &str) -> CoreResult<Option<Value>> {
    let out = apply(value, rule, path)?;
    if matches!(rule, Rule::ExcludeEmpty(_)) && is_empty(&out) {
        return Ok(None);
    }
    Ok(Some(out))
}

fn insert_child(
    out: &mut Map<String, Value>,
    name: String,
    value: Value,
    rule: &Rule,
    path: &str,
) -> CoreResult<()> {
    if let Some(v) = child(value, rule, &field_path(path, &name))? {
        out.insert(name, v);
    }
    Ok(())
}

fn apply_map(mut map: Map<String, Value>, rule: &Rule, path: &str) -> CoreResult<Value> {
    let mut out = Map::new();
    match rule {
        Rule::NoExcludes => {
            for (k, v) in map {
                insert_child(&mut out, k, v, &Rule::NoExcludes, path)?;
            }
        }
        Rule::MapExcludes(fields) => {
            for (k, v) in map {
                match fields.get(&k) {
                    Some(None) => {}
                    Some(Some(r)) => insert_child(&mut out, k, v, r, path)?,
                    None => insert_child(&mut out, k, v, &Rule::NoExcludes, path)?,
                }
            }
        }
        Rule::MapIncludes(fields) => {
            for (k, v) in map {
                match fields.get(&k) {
                    None => {}
                    Some(None) => insert_child(&mut out, k, v, &Rule::NoExcludes, path)?,
                    Some(Some(r)) => insert_child(&mut out, k, v, r, path)?,
                }
            }
        }
        Rule::ConditionalMapExcludes(fields) => {
            for (k, v) in map {
                let Some(cond) = fields.get(&k) else {
                    insert_child(&mut out, k, v, &Rule::NoExcludes, path)?;
                    continue;
                };
                let chosen = if (cond.checker)(&v) {
                    &cond.if_true
                } else {
                    &cond.if_false
                };
                if let Some(r) = chosen {
                    insert_child(&mut out, k, v, r, path)?;
                }
            }
        }
        Rule::DefaultedMapFields { fields, next } => {
            for (k, d) in fields {
                if !map.contains_key(k) {
                    map.insert(k.clone(), d.clone());
                }
            }
            return apply_map(map, next, path);
        }
        Rule::ExcludeEmpty(inner) => {
            if matches!(**inner, Rule::NoExcludes) {
                for (k, v) in map {
                    insert_child(&mut out, k, v, rule, path)?;
                }
            } else {
                let v = apply_map(map, inner, path)?;
                return Ok(drop_empty_children(v));
            }
        }
        Rule::ArrayExcludes(_)
        | Rule::DynamicArrayExcludes { .. }
        | Rule::ConditionalArrayExcludes { .. }
        | Rule::DefaultedListEntries { .. } => {
            return Err(invalid(path, "list rule applied to a map"));
        }
    }
    Ok(Value::Object(out))
}

fn apply_list(list: Vec<Value>, rule: &Rule, path: &str) -> CoreResult<Value> {
    let mut out = Vec::with_capacity(list.len());
    let elem_path = |i: usize| format!("{path}[{i}]");
    match rule {
        Rule::NoExcludes => {
            for (i, v) in list.into_iter().enumerate() {
                out.push(apply(v, &Rule::NoExcludes, &elem_path(i))?);
            }
        }
        Rule::ArrayExcludes(r) => {
            for (i, v) in list.into_iter().enumerate() {
                out.extend(child(v, r, &elem_path(i))?);
            }
        }
        Rule::DynamicArrayExcludes {
            checker,
            mapper,
            next,
        } => {
            for (i, v) in list.into_iter().enumerate() {
                if checker.as_ref().is_some_and(|c| c(&v)) {
                    continue;
                }
                let v = match mapper {
                    Some(m) => m(v),
                    None => v,
                };
                out.extend(child(v, next, &elem_path(i))?);
            }
        }
        Rule::ConditionalArrayExcludes {
            checker,
            if_true,
            if_false,
        } => {
            for (i, v) in list.into_iter().enumerate() {
                let r = if checker(&v) { if_true } else { if_false };
                out.extend(child(v, r, &elem_path(i))?);
            }
        }
        Rule::DefaultedListEntries { default, next } => {
            let list: Vec<Value> = list
                .into_iter()
                .map(|v| if v.is_null() { default.clone() } else { v })
                .collect();
            return apply_elements(list, next, path);
        }
        Rule::DefaultedMapFields { fields, next } => {
            let list: Vec<Value> = list
                .into_iter()
                .map(|mut v| {
                    if let Value::Object(m) = &mut v {
                        for (k, d) in fields {
                            if !m.contains_key(k) {
                                m.insert(k.clone(), d.clone());
                            }
                        }
                    }
                    v
                })
                .collect();
            return apply_elements(list, next, path);
        }
        Rule::ExcludeEmpty(inner) => {
            if matches!(**inner, Rule::NoExcludes) {
                for (i, v) in list.into_iter().enumerate() {
                    out.extend(child(v, rule, &elem_path(i))?);
                }
            } else {
                let v = apply_list(list, inner, path)?;
                return Ok(drop_empty_children(v));
            }
        }
        Rule::MapExcludes(_) | Rule::MapIncludes(_) | Rule::ConditionalMapExcludes(_) => {
            return Err(invalid(path, "map rule applied to a list"));
        }
    }
    Ok(Value::Array(out))
}

/// Continue a defaulting rule either on the list or on its elements.
fn apply_elements(list: Vec<Value>, next: &Rule, path: &str) -> CoreResult<Value> {
    if next.is_list_rule() || matches!(next, Rule::NoExcludes | Rule::ExcludeEmpty(_)) {
        return apply_list(list, next, path);
    }
    let mut out = Vec::with_capacity(list.len());
    for (i, v) in list.into_iter().enumerate() {
        out.extend(child(v, next, &format!("{path}[{i}]"))?);
    }
    Ok(Value::Array(out))
}

fn drop_empty_children(value: Value) -> Value {
    match value {
        Value::Object(m) => Value::Object(m.into_iter().filter(|(_, v)| !is_empty(v)).collect()),
        Value::Array(l) => Value::Array(l.into_iter().filter(|v| !is_empty(v)).collect()),
        other => other,
    }
}
