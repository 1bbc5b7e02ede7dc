//! Deep merge for YAML-derived configuration trees.
//!
//! [`deep_merge`] is the plain last-writer-wins merge. [`merge_with_rules`]
//! consults a per-field strategy table first, which is how plugin layers keep
//! `handler_script` from the first layer that set it and leave CSS handling
//! to the asset resolver.

use serde_json::{Map, Value};

/// Deep merge two values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
///
/// # Example
/// ```
/// use serde_json::json;
/// use docplug::config::deep_merge;
///
/// let base = json!({"pdf_options": {"format": "A4", "margin": {"top": "1cm"}}});
/// let overlay = json!({"pdf_options": {"margin": {"bottom": "2cm"}}});
/// let merged = deep_merge(base, overlay);
/// assert_eq!(
///     merged,
///     json!({"pdf_options": {"format": "A4", "margin": {"top": "1cm", "bottom": "2cm"}}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

/// How a top-level field behaves when a later layer also sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Recursive last-writer-wins merge (the default for unlisted keys).
    DeepMerge,
    /// Keep the value from the first layer that set it.
    FirstWriterWins,
    /// Not touched by the generic merge; the caller owns this field.
    Managed,
}

/// A named strategy for one top-level key.
pub type FieldRule = (&'static str, FieldStrategy);

/// Field exceptions applied when folding plugin configuration layers.
pub const PLUGIN_LAYER_RULES: &[FieldRule] = &[
    ("handler_script", FieldStrategy::FirstWriterWins),
    ("css_files", FieldStrategy::Managed),
    ("inherit_css", FieldStrategy::Managed),
];

/// Look up the strategy for `key`, defaulting to [`FieldStrategy::DeepMerge`].
pub fn strategy_for(rules: &[FieldRule], key: &str) -> FieldStrategy {
    rules
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, strategy)| *strategy)
        .unwrap_or(FieldStrategy::DeepMerge)
}

/// Merge `overlay` into `base` key by key using the strategy table.
///
/// Non-object inputs fall back to [`deep_merge`]. `Managed` keys keep whatever
/// `base` holds, so a caller that wants them must write them afterwards.
pub fn merge_with_rules(base: Value, overlay: Value, rules: &[FieldRule]) -> Value {
    let (mut base_map, overlay_map) = match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => (b, o),
        (Value::Null, Value::Object(o)) => (Map::new(), o),
        (base, overlay) => return deep_merge(base, overlay),
    };

    for (key, overlay_value) in overlay_map {
        match strategy_for(rules, &key) {
            FieldStrategy::Managed => {}
            FieldStrategy::FirstWriterWins => {
                let already_set = base_map.get(&key).is_some_and(|v| !v.is_null());
                if !already_set && !overlay_value.is_null() {
                    base_map.insert(key, overlay_value);
                }
            }
            FieldStrategy::DeepMerge => {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
        }
    }
    Value::Object(base_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_nested_objects() {
        let base = json!({
            "pdf_options": {"format": "Letter", "margin": {"top": "1in", "left": "1in"}},
            "description": "base"
        });
        let overlay = json!({
            "pdf_options": {"margin": {"top": "2in"}}
        });
        let result = deep_merge(base, overlay);
        assert_eq!(
            result,
            json!({
                "pdf_options": {"format": "Letter", "margin": {"top": "2in", "left": "1in"}},
                "description": "base"
            })
        );
    }

    #[test]
    fn test_arrays_replaced_not_merged() {
        let base = json!({"items": [1, 2, 3]});
        let overlay = json!({"items": [4, 5]});
        assert_eq!(deep_merge(base, overlay), json!({"items": [4, 5]}));
    }

    #[test]
    fn test_null_preserves_base() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let overlay = json!({"a": null, "b": {"c": null}});
        assert_eq!(deep_merge(base, overlay), json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_merge_all() {
        let values = vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3, "c": 4})];
        assert_eq!(deep_merge_all(values), json!({"a": 3, "b": 2, "c": 4}));
    }

    #[test]
    fn test_handler_script_first_writer_wins() {
        let base = json!({"handler_script": "index.js", "description": "one"});
        let overlay = json!({"handler_script": "other.js", "description": "two"});
        let result = merge_with_rules(base, overlay, PLUGIN_LAYER_RULES);
        assert_eq!(result["handler_script"], json!("index.js"));
        assert_eq!(result["description"], json!("two"));
    }

    #[test]
    fn test_handler_script_filled_when_base_lacks_it() {
        let result = merge_with_rules(
            json!({"description": "one"}),
            json!({"handler_script": "late.js"}),
            PLUGIN_LAYER_RULES,
        );
        assert_eq!(result["handler_script"], json!("late.js"));
    }

    #[test]
    fn test_managed_fields_are_left_to_caller() {
        let base = json!({"css_files": ["a.css"], "inherit_css": false});
        let overlay = json!({"css_files": ["b.css"], "inherit_css": true});
        let result = merge_with_rules(base, overlay, PLUGIN_LAYER_RULES);
        assert_eq!(result, json!({"css_files": ["a.css"], "inherit_css": false}));
    }

    #[test]
    fn test_strategy_lookup_defaults_to_deep_merge() {
        assert_eq!(strategy_for(PLUGIN_LAYER_RULES, "pdf_options"), FieldStrategy::DeepMerge);
        assert_eq!(
            strategy_for(PLUGIN_LAYER_RULES, "handler_script"),
            FieldStrategy::FirstWriterWins
        );
    }

    #[test]
    fn test_null_base_accepts_overlay() {
        let result = merge_with_rules(Value::Null, json!({"x": 1}), PLUGIN_LAYER_RULES);
        assert_eq!(result, json!({"x": 1}));
    }
}
