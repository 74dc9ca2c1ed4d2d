//! Schema resolution - turns a schema node into something a field can render.
//!
//! Resolution dereferences `$ref`, merges `allOf`, evaluates `if`/`then`/`else`
//! and `dependencies` against the current data, stubs in schemas for
//! additional properties present in the data, and settles the node's `type`.
//! Only the node itself is resolved: child schemas keep their `$ref`s until
//! their own field resolves them, which keeps recursive schemas finite.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ResolveError;
use crate::loader::navigate_fragment;
use crate::merge::merge_schemas;
use crate::types::{guess_type, ADDITIONAL_PROPERTY_FLAG};
use crate::validator::{JsonSchemaValidator, SchemaValidator};

/// Resolves schema nodes against a root schema.
#[derive(Clone, Copy)]
pub struct SchemaResolver<'a> {
    root: &'a Value,
    validator: &'a dyn SchemaValidator,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(root: &'a Value, validator: &'a dyn SchemaValidator) -> Self {
        Self { root, validator }
    }

    pub fn root(&self) -> &'a Value {
        self.root
    }

    pub fn validator(&self) -> &'a dyn SchemaValidator {
        self.validator
    }

    /// Resolve `schema` for the given data.
    ///
    /// The result has no `$ref`, `allOf`, `if`/`then`/`else` or
    /// `dependencies`, and carries a `type` whenever one can be determined.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` for unresolvable, external or circular `$ref`s.
    pub fn resolve(&self, schema: &Value, data: Option<&Value>) -> Result<Value, ResolveError> {
        let mut resolved = self.retrieve(schema, data, &mut Vec::new())?;
        if let Value::Object(map) = &mut resolved {
            if let Some(Value::Object(obj)) = data {
                stub_additional_properties(map, obj);
            }
            if !map.contains_key("type") {
                if let Some(inferred) = infer_type(map) {
                    map.insert("type".to_string(), Value::String(inferred.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    /// Dereference `$ref`s anywhere inside `schema`.
    ///
    /// References already being expanded are left in place, so recursive
    /// definitions stop after one level.
    pub fn resolve_all_refs(&self, schema: &Value) -> Result<Value, ResolveError> {
        self.resolve_all_refs_inner(schema, &mut Vec::new())
    }

    fn resolve_all_refs_inner(
        &self,
        schema: &Value,
        stack: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        match schema {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    if !stack.iter().any(|r| r == reference) {
                        let target = self.lookup(reference)?;
                        let mut merged = target.as_object().cloned().unwrap_or_default();
                        for (k, v) in map {
                            if k != "$ref" {
                                merged.insert(k.clone(), v.clone());
                            }
                        }
                        stack.push(reference.to_string());
                        let result = self.resolve_all_refs_inner(&Value::Object(merged), stack);
                        stack.pop();
                        return result;
                    }
                }
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_all_refs_inner(v, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(arr) => arr
                .iter()
                .map(|item| self.resolve_all_refs_inner(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn lookup(&self, reference: &str) -> Result<&'a Value, ResolveError> {
        let local = match self.root.get("$id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() && reference.starts_with(id) => &reference[id.len()..],
            _ => reference,
        };
        if local.is_empty() {
            return Ok(self.root);
        }
        if !local.starts_with('#') {
            return Err(ResolveError::ExternalRef {
                reference: reference.to_string(),
            });
        }
        navigate_fragment(self.root, local)
    }

    fn retrieve(
        &self,
        schema: &Value,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        let Some(map) = schema.as_object() else {
            return Ok(schema.clone());
        };

        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            return self.retrieve_ref(reference, map, data, stack);
        }

        let mut current = map.clone();
        if let Some(branches) = current.remove("allOf") {
            current = self.merge_all_of(current, &branches, data, stack)?;
        }
        if current.contains_key("if") {
            current = self.apply_condition(current, data, stack)?;
        }
        self.apply_dependencies(&mut current, data, stack)?;

        Ok(Value::Object(current))
    }

    fn retrieve_ref(
        &self,
        reference: &str,
        map: &Map<String, Value>,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<Value, ResolveError> {
        if stack.iter().any(|r| r == reference) {
            return Err(ResolveError::RefCycle {
                reference: reference.to_string(),
            });
        }
        let target = self.lookup(reference)?;

        stack.push(reference.to_string());
        let resolved = self.retrieve(target, data, stack);
        stack.pop();

        // Keywords next to the $ref override the referenced definition.
        let mut merged = match resolved? {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        let mut has_siblings = false;
        for (k, v) in map {
            if k != "$ref" {
                merged.insert(k.clone(), v.clone());
                has_siblings = true;
            }
        }
        if !has_siblings {
            return Ok(Value::Object(merged));
        }
        // Siblings may carry their own allOf or if.
        stack.push(reference.to_string());
        let result = self.retrieve(&Value::Object(merged), data, stack);
        stack.pop();
        result
    }

    fn merge_all_of(
        &self,
        base: Map<String, Value>,
        branches: &Value,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<Map<String, Value>, ResolveError> {
        let mut merged = Value::Object(base);
        for (index, branch) in branches.as_array().into_iter().flatten().enumerate() {
            let branch = self.retrieve(branch, data, stack)?;
            match merge_schemas(&merged, &branch) {
                Ok(next) => merged = next,
                Err(conflict) => {
                    warn!(index, %conflict, "ignoring incompatible allOf branch");
                }
            }
        }
        Ok(match merged {
            Value::Object(map) => map,
            _ => Map::new(),
        })
    }

    fn apply_condition(
        &self,
        mut schema: Map<String, Value>,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<Map<String, Value>, ResolveError> {
        let condition = schema.remove("if").unwrap_or(Value::Bool(true));
        let then_branch = schema.remove("then");
        let else_branch = schema.remove("else");

        let empty = Value::Object(Map::new());
        let matched = self
            .validator
            .is_valid(&condition, data.unwrap_or(&empty), self.root);

        let Some(branch) = (if matched { then_branch } else { else_branch }) else {
            return Ok(schema);
        };
        let branch = self.retrieve(&branch, data, stack)?;
        match merge_schemas(&Value::Object(schema.clone()), &branch) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(schema),
            Err(conflict) => {
                warn!(%conflict, matched, "ignoring incompatible conditional branch");
                Ok(schema)
            }
        }
    }

    fn apply_dependencies(
        &self,
        schema: &mut Map<String, Value>,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        for key in ["dependencies", "dependentRequired", "dependentSchemas"] {
            if let Some(Value::Object(deps)) = schema.remove(key) {
                entries.extend(deps);
            }
        }
        let Some(Value::Object(data_map)) = data else {
            return Ok(());
        };

        for (trigger, dependency) in entries {
            let Some(trigger_value) = data_map.get(&trigger) else {
                continue;
            };
            match dependency {
                Value::Array(names) => {
                    let required = schema
                        .entry("required".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(list) = required {
                        for name in names {
                            if !list.contains(&name) {
                                list.push(name);
                            }
                        }
                    }
                }
                dep @ Value::Object(_) => {
                    let mut dep = match self.retrieve(&dep, data, stack)? {
                        Value::Object(map) => map,
                        _ => continue,
                    };
                    let one_of = dep.remove("oneOf");
                    self.merge_dependency(schema, Value::Object(dep), &trigger);
                    if let Some(Value::Array(options)) = one_of {
                        self.merge_one_of_dependency(
                            schema,
                            &options,
                            &trigger,
                            trigger_value,
                            data,
                            stack,
                        )?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn merge_one_of_dependency(
        &self,
        schema: &mut Map<String, Value>,
        options: &[Value],
        trigger: &str,
        trigger_value: &Value,
        data: Option<&Value>,
        stack: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        for option in options {
            let option = self.retrieve(option, data, stack)?;
            let Some(condition) = option.get("properties").and_then(|p| p.get(trigger)) else {
                continue;
            };
            if !self.validator.is_valid(condition, trigger_value, self.root) {
                continue;
            }
            let mut option = option.as_object().cloned().unwrap_or_default();
            if let Some(Value::Object(props)) = option.get_mut("properties") {
                props.shift_remove(trigger);
            }
            self.merge_dependency(schema, Value::Object(option), trigger);
            break;
        }
        Ok(())
    }

    fn merge_dependency(&self, schema: &mut Map<String, Value>, dependency: Value, trigger: &str) {
        match merge_schemas(&Value::Object(schema.clone()), &dependency) {
            Ok(Value::Object(map)) => *schema = map,
            Ok(_) => {}
            Err(conflict) => warn!(trigger, %conflict, "ignoring incompatible dependency"),
        }
    }
}

/// Resolve `schema` with the default `jsonschema`-backed validator.
///
/// # Errors
///
/// Returns `ResolveError` for unresolvable, external or circular `$ref`s.
pub fn resolve(schema: &Value, root: &Value, data: Option<&Value>) -> Result<Value, ResolveError> {
    SchemaResolver::new(root, &JsonSchemaValidator).resolve(schema, data)
}

/// The schema's `type` keyword, inferred when missing.
///
/// A two-entry type list containing `null` collapses to the other entry.
pub fn schema_type(schema: &Value) -> Option<Value> {
    let map = schema.as_object()?;
    match map.get("type") {
        Some(Value::Array(types)) if types.len() == 2 && types.contains(&Value::from("null")) => {
            types.iter().find(|t| t.as_str() != Some("null")).cloned()
        }
        Some(t @ (Value::String(_) | Value::Array(_))) => Some(t.clone()),
        _ => infer_type(map).map(Value::from),
    }
}

/// The first type a field should render as.
pub fn primary_type(schema: &Value) -> Option<String> {
    match schema_type(schema)? {
        Value::String(s) => Some(s),
        Value::Array(types) => types.first().and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn infer_type(map: &Map<String, Value>) -> Option<&'static str> {
    if let Some(constant) = map.get("const") {
        return Some(guess_type(constant));
    }
    if map.contains_key("enum") {
        return Some("string");
    }
    if map.contains_key("properties") || map.contains_key("additionalProperties") {
        return Some("object");
    }
    if map.contains_key("items") {
        return Some("array");
    }
    None
}

/// Whether the schema enumerates constant choices (rendered as a select).
pub fn is_select(schema: &Value) -> bool {
    if schema.get("enum").is_some_and(Value::is_array) {
        return true;
    }
    ["oneOf", "anyOf"].iter().any(|key| {
        schema
            .get(*key)
            .and_then(Value::as_array)
            .is_some_and(|opts| !opts.is_empty() && opts.iter().all(|o| o.get("const").is_some()))
    })
}

fn stub_additional_properties(schema: &mut Map<String, Value>, data: &Map<String, Value>) {
    let additional = schema.get("additionalProperties").cloned();
    let patterns = schema
        .get("patternProperties")
        .and_then(Value::as_object)
        .cloned();
    if patterns.is_none() && matches!(additional, None | Some(Value::Bool(false))) {
        return;
    }

    let properties = schema
        .entry("properties".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(properties) = properties else {
        return;
    };

    for (key, value) in data {
        if properties.contains_key(key) {
            continue;
        }
        let from_pattern = patterns.iter().flatten().find_map(|(pattern, sub)| {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(key) => Some(sub.clone()),
                Ok(_) => None,
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid patternProperties regex");
                    None
                }
            }
        });
        let stub = match (from_pattern, &additional) {
            (Some(sub), _) => sub,
            (None, Some(Value::Object(sub))) if sub.contains_key("$ref") || sub.contains_key("type") => {
                Value::Object(sub.clone())
            }
            (None, Some(Value::Bool(false))) => continue,
            (None, _) => serde_json::json!({ "type": guess_type(value) }),
        };
        let mut stub = match stub {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        stub.insert(ADDITIONAL_PROPERTY_FLAG.to_string(), Value::Bool(true));
        properties.insert(key.clone(), Value::Object(stub));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_root(root: &Value, data: Option<&Value>) -> Value {
        resolve(root, root, data).unwrap()
    }

    #[test]
    fn dereferences_with_sibling_overrides() {
        let root = json!({
            "definitions": { "name": { "type": "string", "title": "Name" } },
            "properties": {}
        });
        let schema = json!({ "$ref": "#/definitions/name", "title": "Nickname" });
        let resolved = resolve(&schema, &root, None).unwrap();
        assert_eq!(resolved, json!({ "type": "string", "title": "Nickname" }));
    }

    #[test]
    fn follows_ref_chains() {
        let root = json!({
            "definitions": {
                "a": { "$ref": "#/definitions/b" },
                "b": { "type": "number" }
            }
        });
        let resolved = resolve(&json!({ "$ref": "#/definitions/a" }), &root, None).unwrap();
        assert_eq!(resolved["type"], "number");
    }

    #[test]
    fn missing_ref_is_an_error() {
        let root = json!({});
        let result = resolve(&json!({ "$ref": "#/definitions/nope" }), &root, None);
        assert!(matches!(result, Err(ResolveError::InvalidRef { .. })));
    }

    #[test]
    fn external_ref_is_an_error() {
        let root = json!({});
        let result = resolve(&json!({ "$ref": "other.json#/a" }), &root, None);
        assert!(matches!(result, Err(ResolveError::ExternalRef { .. })));
    }

    #[test]
    fn circular_ref_is_an_error() {
        let root = json!({
            "definitions": {
                "a": { "$ref": "#/definitions/b" },
                "b": { "$ref": "#/definitions/a" }
            }
        });
        let result = resolve(&json!({ "$ref": "#/definitions/a" }), &root, None);
        assert!(matches!(result, Err(ResolveError::RefCycle { .. })));
    }

    #[test]
    fn recursive_definitions_resolve_one_level() {
        let root = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "children": { "type": "array", "items": { "$ref": "#/definitions/node" } }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });
        let resolved = resolve_root(&root, None);
        assert_eq!(resolved["type"], "object");
        assert_eq!(
            resolved["properties"]["children"]["items"],
            json!({ "$ref": "#/definitions/node" })
        );
    }

    #[test]
    fn merges_all_of() {
        let root = json!({
            "allOf": [
                { "type": "object", "properties": { "a": { "type": "string" } } },
                { "properties": { "b": { "type": "boolean" } }, "required": ["b"] }
            ]
        });
        let resolved = resolve_root(&root, None);
        assert!(resolved.get("allOf").is_none());
        assert_eq!(resolved["type"], "object");
        assert_eq!(resolved["properties"]["b"]["type"], "boolean");
        assert_eq!(resolved["required"], json!(["b"]));
    }

    #[test]
    fn incompatible_all_of_branch_is_ignored() {
        let root = json!({
            "allOf": [
                { "type": "string", "minLength": 2 },
                { "type": "boolean" },
                { "maxLength": 5 }
            ]
        });
        let resolved = resolve_root(&root, None);
        assert_eq!(resolved["type"], "string");
        assert_eq!(resolved["minLength"], 2);
        assert_eq!(resolved["maxLength"], 5);
    }

    #[test]
    fn evaluates_if_then_else() {
        let root = json!({
            "type": "object",
            "properties": { "country": { "type": "string" } },
            "if": { "properties": { "country": { "const": "US" } } },
            "then": { "properties": { "zip": { "type": "string" } } },
            "else": { "properties": { "postcode": { "type": "string" } } }
        });

        let us = resolve_root(&root, Some(&json!({ "country": "US" })));
        assert!(us["properties"].get("zip").is_some());
        assert!(us["properties"].get("postcode").is_none());
        assert!(us.get("if").is_none());

        let other = resolve_root(&root, Some(&json!({ "country": "NL" })));
        assert!(other["properties"].get("postcode").is_some());
    }

    #[test]
    fn array_dependencies_extend_required() {
        let root = json!({
            "type": "object",
            "properties": { "card": { "type": "string" }, "billing": { "type": "string" } },
            "dependencies": { "card": ["billing"] }
        });
        let with_card = resolve_root(&root, Some(&json!({ "card": "4111" })));
        assert_eq!(with_card["required"], json!(["billing"]));
        assert!(with_card.get("dependencies").is_none());

        let without = resolve_root(&root, Some(&json!({})));
        assert!(without.get("required").is_none());
    }

    #[test]
    fn one_of_dependency_picks_matching_branch() {
        let root = json!({
            "type": "object",
            "properties": { "kind": { "enum": ["dog", "cat"] } },
            "dependencies": {
                "kind": {
                    "oneOf": [
                        {
                            "properties": {
                                "kind": { "const": "dog" },
                                "barks": { "type": "boolean" }
                            }
                        },
                        {
                            "properties": {
                                "kind": { "const": "cat" },
                                "lives": { "type": "integer" }
                            }
                        }
                    ]
                }
            }
        });
        let resolved = resolve_root(&root, Some(&json!({ "kind": "cat" })));
        assert!(resolved["properties"].get("lives").is_some());
        assert!(resolved["properties"].get("barks").is_none());
        assert_eq!(resolved["properties"]["kind"], json!({ "enum": ["dog", "cat"] }));
    }

    #[test]
    fn stubs_additional_properties_from_data() {
        let root = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "patternProperties": { "^x-": { "type": "number" } },
            "additionalProperties": true
        });
        let data = json!({ "name": "a", "x-size": 3, "extra": true });
        let resolved = resolve_root(&root, Some(&data));

        assert_eq!(
            resolved["properties"]["x-size"],
            json!({ "type": "number", "__additional_property": true })
        );
        assert_eq!(
            resolved["properties"]["extra"],
            json!({ "type": "boolean", "__additional_property": true })
        );
        assert!(resolved["properties"]["name"].get("__additional_property").is_none());
    }

    #[test]
    fn infers_missing_type() {
        assert_eq!(resolve_root(&json!({ "const": 3 }), None)["type"], "integer");
        assert_eq!(resolve_root(&json!({ "enum": ["a"] }), None)["type"], "string");
        assert_eq!(resolve_root(&json!({ "properties": {} }), None)["type"], "object");
        assert!(resolve_root(&json!({ "oneOf": [{}] }), None).get("type").is_none());
    }

    #[test]
    fn schema_type_collapses_nullable_pairs() {
        assert_eq!(schema_type(&json!({ "type": ["string", "null"] })), Some(json!("string")));
        assert_eq!(
            schema_type(&json!({ "type": ["string", "number"] })),
            Some(json!(["string", "number"]))
        );
        assert_eq!(primary_type(&json!({ "type": ["null", "integer"] })).as_deref(), Some("integer"));
        assert_eq!(primary_type(&json!({})), None);
    }

    #[test]
    fn resolve_all_refs_stops_at_recursion() {
        let root = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": { "next": { "$ref": "#/definitions/node" } }
                }
            }
        });
        let resolver = SchemaResolver::new(&root, &JsonSchemaValidator);
        let resolved = resolver
            .resolve_all_refs(&json!({ "$ref": "#/definitions/node" }))
            .unwrap();
        assert_eq!(resolved["type"], "object");
        assert_eq!(
            resolved["properties"]["next"],
            json!({ "$ref": "#/definitions/node" })
        );
    }

    #[test]
    fn detects_select_schemas() {
        assert!(is_select(&json!({ "enum": ["a", "b"] })));
        assert!(is_select(&json!({ "oneOf": [{ "const": 1 }, { "const": 2 }] })));
        assert!(!is_select(&json!({ "oneOf": [{ "type": "string" }, { "const": 2 }] })));
    }
}
