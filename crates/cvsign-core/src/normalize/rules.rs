//! Normalization rule tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Predicate over a raw (not yet normalized) value.
pub type ValueChecker = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Rewrites a raw value before it is normalized.
pub type ValueMapper = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Per-field choice of [`Rule::ConditionalMapExcludes`].
///
/// `None` drops the field.
#[derive(Clone)]
pub struct Conditional {
    pub checker: ValueChecker,
    pub if_true: Option<Rule>,
    pub if_false: Option<Rule>,
}

/// Rule describing which parts of a document take part in normalization.
#[derive(Clone, Default)]
pub enum Rule {
    /// Keep everything.
    #[default]
    NoExcludes,
    /// Listed fields are recursed with their rule, `None` drops them.
    MapExcludes(BTreeMap<String, Option<Rule>>),
    /// Only listed fields are kept, `None` keeps them unchanged.
    MapIncludes(BTreeMap<String, Option<Rule>>),
    /// One rule for every list element.
    ArrayExcludes(Box<Rule>),
    /// Elements matching `checker` are skipped, the others are mapped and recursed.
    DynamicArrayExcludes {
        checker: Option<ValueChecker>,
        mapper: Option<ValueMapper>,
        next: Box<Rule>,
    },
    /// Choose the element rule by predicate.
    ConditionalArrayExcludes {
        checker: ValueChecker,
        if_true: Box<Rule>,
        if_false: Box<Rule>,
    },
    /// Choose the field rule by predicate over the field value.
    ConditionalMapExcludes(BTreeMap<String, Conditional>),
    /// Inject fields missing from a map (or from each map of a list).
    DefaultedMapFields {
        fields: BTreeMap<String, Value>,
        next: Box<Rule>,
    },
    /// Replace null list entries by a default element.
    DefaultedListEntries { default: Value, next: Box<Rule> },
    /// Drop null and empty children, and the value itself if it ends up empty.
    ExcludeEmpty(Box<Rule>),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::NoExcludes => f.write_str("NoExcludes"),
            Rule::MapExcludes(m) => f.debug_tuple("MapExcludes").field(m).finish(),
            Rule::MapIncludes(m) => f.debug_tuple("MapIncludes").field(m).finish(),
            Rule::ArrayExcludes(r) => f.debug_tuple("ArrayExcludes").field(r).finish(),
            Rule::DynamicArrayExcludes {
                checker,
                mapper,
                next,
            } => f
                .debug_struct("DynamicArrayExcludes")
                .field("checker", &checker.is_some())
                .field("mapper", &mapper.is_some())
                .field("next", next)
                .finish(),
            Rule::ConditionalArrayExcludes {
                if_true, if_false, ..
            } => f
                .debug_struct("ConditionalArrayExcludes")
                .field("if_true", if_true)
                .field("if_false", if_false)
                .finish(),
            Rule::ConditionalMapExcludes(m) => f
                .debug_tuple("ConditionalMapExcludes")
                .field(&m.keys().collect::<Vec<_>>())
                .finish(),
            Rule::DefaultedMapFields { fields, next } => f
                .debug_struct("DefaultedMapFields")
                .field("fields", fields)
                .field("next", next)
                .finish(),
            Rule::DefaultedListEntries { default, next } => f
                .debug_struct("DefaultedListEntries")
                .field("default", default)
                .field("next", next)
                .finish(),
            Rule::ExcludeEmpty(r) => f.debug_tuple("ExcludeEmpty").field(r).finish(),
        }
    }
}

impl Rule {
    /// Start a [`Rule::MapExcludes`].
    pub fn map_excludes() -> Self {
        Rule::MapExcludes(BTreeMap::new())
    }

    /// Start a [`Rule::MapIncludes`].
    pub fn map_includes() -> Self {
        Rule::MapIncludes(BTreeMap::new())
    }

    /// Add a field to a map rule; `None` drops (excludes) or keeps (includes) it.
    ///
    /// Ignored for other rule kinds.
    pub fn field(mut self, name: &str, rule: Option<Rule>) -> Self {
        if let Rule::MapExcludes(m) | Rule::MapIncludes(m) = &mut self {
            m.insert(name.to_string(), rule);
        }
        self
    }

    /// Drop a field of a [`Rule::MapExcludes`].
    pub fn exclude(self, name: &str) -> Self {
        self.field(name, None)
    }

    pub fn array(rule: Rule) -> Self {
        Rule::ArrayExcludes(Box::new(rule))
    }

    pub fn dynamic_array(checker: Option<ValueChecker>, mapper: Option<ValueMapper>, next: Rule) -> Self {
        Rule::DynamicArrayExcludes {
            checker,
            mapper,
            next: Box::new(next),
        }
    }

    pub fn exclude_empty(rule: Rule) -> Self {
        Rule::ExcludeEmpty(Box::new(rule))
    }

    /// Wrap a rule with field defaulting.
    pub fn defaulted(next: Rule) -> Self {
        Rule::DefaultedMapFields {
            fields: BTreeMap::new(),
            next: Box::new(next),
        }
    }

    /// Inject `name: value` where missing.
    pub fn enforce(mut self, name: &str, value: Value) -> Self {
        if let Rule::DefaultedMapFields { fields, .. } = &mut self {
            fields.insert(name.to_string(), value);
        }
        self
    }

    /// Inject `name: null` where missing.
    pub fn enforce_null(self, name: &str) -> Self {
        self.enforce(name, Value::Null)
    }

    /// Inject `name: []` where missing.
    pub fn enforce_empty_list(self, name: &str) -> Self {
        self.enforce(name, Value::Array(Vec::new()))
    }

    /// Inject `name: {}` where missing.
    pub fn enforce_empty_map(self, name: &str) -> Self {
        self.enforce(name, Value::Object(serde_json::Map::new()))
    }

    /// True for rules that operate on a list as a whole.
    pub(crate) fn is_list_rule(&self) -> bool {
        matches!(
            self,
            Rule::ArrayExcludes(_)
                | Rule::DynamicArrayExcludes { .. }
                | Rule::ConditionalArrayExcludes { .. }
                | Rule::DefaultedListEntries { .. }
        )
    }
}

/// Checker matching elements whose `access.type` is one of `kinds`, or that have no access.
pub fn ignore_access_types(kinds: &[&str]) -> ValueChecker {
    let kinds: Vec<String> = kinds.iter().map(|k| (*k).to_string()).collect();
    Arc::new(move |v: &Value| has_access_type(v, &kinds))
}

/// Mapper removing `field` from elements whose access is of one of `kinds`, or missing.
pub fn strip_field_for_access_types(field: &str, kinds: &[&str]) -> ValueMapper {
    let field = field.to_string();
    let kinds: Vec<String> = kinds.iter().map(|k| (*k).to_string()).collect();
    Arc::new(move |mut v: Value| {
        if has_access_type(&v, &kinds) {
            if let Value::Object(m) = &mut v {
                m.remove(&field);
            }
        }
        v
    })
}

fn has_access_type(v: &Value, kinds: &[String]) -> bool {
    match v.get("access") {
        None | Some(Value::Null) => true,
        Some(access) => access
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| kinds.iter().any(|k| k == t)),
    }
}

/// Checker matching labels that are not signature relevant.
pub fn label_without_signing() -> ValueChecker {
    Arc::new(|v: &Value| !matches!(v.get("signing"), Some(Value::Bool(true))))
}

/// Rule keeping only signing labels; the field disappears if none remain.
pub fn signing_labels() -> Rule {
    Rule::exclude_empty(Rule::dynamic_array(
        Some(label_without_signing()),
        None,
        Rule::map_includes()
            .field("name", None)
            .field("value", None)
            .field("version", None)
            .field("signing", None),
    ))
}
