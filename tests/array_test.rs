//! Integration tests for array editing: item identity and error remapping.

use schema_form::{
    ArrayMinItems, ArrayOperation, ChangeValue, DefaultsBehavior, ErrorSchema, Form, FormAction,
    FormChange, FormError, FormOptions, PathSegment, Registry, RenderNode, ValidateError,
};
use serde_json::{json, Value};

const REQUIRED_TEXT: &str = "must have required property 'text'";

fn todo_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }
    })
}

/// A form over `[{}, {text: 'y'}]` that has been validated once.
fn validated_form() -> Form {
    let mut form = Form::new(
        todo_schema(),
        json!({}),
        Some(json!([{}, { "text": "y" }])),
        Registry::new(),
    )
    .unwrap();
    let err = form.validate().unwrap_err();
    assert!(matches!(err, ValidateError::Invalid { .. }));
    form
}

fn errors_json(form: &Form) -> Value {
    serde_json::to_value(form.errors()).unwrap()
}

fn edit(form: &mut Form, operation: ArrayOperation) -> Result<FormChange, FormError> {
    form.apply(FormAction::Array {
        path: Vec::new(),
        operation,
    })
}

fn row_keys(tree: &RenderNode) -> Vec<String> {
    tree.children
        .iter()
        .filter(|row| row.kind == "ArrayItem")
        .filter_map(|row| row.key.clone())
        .collect()
}

mod error_remapping {
    use super::*;

    #[test]
    fn validation_places_required_error_under_property() {
        let form = validated_form();
        assert_eq!(
            errors_json(&form),
            json!({ "0": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
    }

    #[test]
    fn move_carries_errors_with_the_item() {
        let mut form = validated_form();
        let change = edit(&mut form, ArrayOperation::Move { from: 1, to: 0 }).unwrap();

        assert_eq!(form.data(), Some(&json!([{ "text": "y" }, {}])));
        assert_eq!(
            errors_json(&form),
            json!({ "1": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
        assert_eq!(change.id, "root");
        assert_eq!(change.value, ChangeValue::Set(json!([{ "text": "y" }, {}])));
        assert_eq!(change.error_schema.as_ref(), Some(form.errors()));
    }

    #[test]
    fn move_swaps_only_the_two_positions() {
        let mut form = Form::new(
            todo_schema(),
            json!({}),
            Some(json!([{}, { "text": "b" }, {}, { "text": "d" }])),
            Registry::new(),
        )
        .unwrap();
        let _ = form.validate();
        assert_eq!(
            errors_json(&form),
            json!({
                "0": { "text": { "__errors": [REQUIRED_TEXT] } },
                "2": { "text": { "__errors": [REQUIRED_TEXT] } }
            })
        );

        edit(&mut form, ArrayOperation::Move { from: 0, to: 3 }).unwrap();
        assert_eq!(
            errors_json(&form),
            json!({
                "2": { "text": { "__errors": [REQUIRED_TEXT] } },
                "3": { "text": { "__errors": [REQUIRED_TEXT] } }
            })
        );
    }

    #[test]
    fn removing_a_clean_item_keeps_errors() {
        let mut form = validated_form();
        edit(&mut form, ArrayOperation::Remove { index: 1 }).unwrap();

        assert_eq!(form.data(), Some(&json!([{}])));
        assert_eq!(
            errors_json(&form),
            json!({ "0": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
    }

    #[test]
    fn removing_the_failing_item_drops_its_errors() {
        let mut form = validated_form();
        let change = edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap();

        assert_eq!(form.data(), Some(&json!([{ "text": "y" }])));
        assert_eq!(errors_json(&form), json!({}));
        assert_eq!(change.error_schema, Some(ErrorSchema::new()));
    }

    #[test]
    fn insert_after_the_failing_item_leaves_it_in_place() {
        let mut form = validated_form();
        edit(&mut form, ArrayOperation::Insert { index: Some(1) }).unwrap();

        assert_eq!(form.data(), Some(&json!([{}, {}, { "text": "y" }])));
        assert_eq!(
            errors_json(&form),
            json!({ "0": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
    }

    #[test]
    fn insert_at_the_failing_item_shifts_it() {
        let mut form = validated_form();
        edit(&mut form, ArrayOperation::Insert { index: Some(0) }).unwrap();

        assert_eq!(form.data(), Some(&json!([{}, {}, { "text": "y" }])));
        assert_eq!(
            errors_json(&form),
            json!({ "1": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
    }

    #[test]
    fn copy_starts_clean() {
        let mut form = Form::new(
            todo_schema(),
            json!({ "ui:options": { "copyable": true } }),
            Some(json!([{}, { "text": "y" }])),
            Registry::new(),
        )
        .unwrap();
        let _ = form.validate();
        edit(&mut form, ArrayOperation::Duplicate { index: 0 }).unwrap();

        assert_eq!(form.data(), Some(&json!([{}, {}, { "text": "y" }])));
        assert_eq!(
            errors_json(&form),
            json!({ "0": { "text": { "__errors": [REQUIRED_TEXT] } } })
        );
    }

    #[test]
    fn array_level_errors_stay_put() {
        let mut form = Form::new(
            json!({ "type": "array", "minItems": 3, "items": { "type": "string" } }),
            json!({}),
            Some(json!(["a", "b"])),
            Registry::new().with_options(FormOptions::new().defaults(DefaultsBehavior {
                array_min_items: ArrayMinItems::Never,
                ..Default::default()
            })),
        )
        .unwrap();
        let _ = form.validate();
        assert!(!form.errors().errors().is_empty());

        edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap();
        assert_eq!(form.data(), Some(&json!(["b"])));
        assert!(!form.errors().errors().is_empty());
    }
}

mod item_identity {
    use super::*;

    #[test]
    fn rerender_with_unchanged_data_keeps_keys() {
        let mut form = validated_form();
        let first = row_keys(&form.render());
        let second = row_keys(&form.render());

        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
        assert_eq!(first, second);
    }

    #[test]
    fn keys_follow_items_through_move_and_remove() {
        let mut form = validated_form();
        let keys = row_keys(&form.render());

        edit(&mut form, ArrayOperation::Move { from: 1, to: 0 }).unwrap();
        assert_eq!(row_keys(&form.render()), vec![keys[1].clone(), keys[0].clone()]);

        edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap();
        assert_eq!(row_keys(&form.render()), vec![keys[0].clone()]);
    }

    #[test]
    fn insert_and_copy_mint_fresh_keys_only_for_the_new_item() {
        let mut form = Form::new(
            todo_schema(),
            json!({ "ui:copyable": true }),
            Some(json!([{ "text": "a" }, { "text": "b" }])),
            Registry::new(),
        )
        .unwrap();
        let keys = row_keys(&form.render());

        edit(&mut form, ArrayOperation::Insert { index: Some(1) }).unwrap();
        let after_insert = row_keys(&form.render());
        assert_eq!(after_insert.len(), 3);
        assert_eq!(after_insert[0], keys[0]);
        assert_eq!(after_insert[2], keys[1]);
        assert!(!keys.contains(&after_insert[1]));

        edit(&mut form, ArrayOperation::Duplicate { index: 0 }).unwrap();
        let after_copy = row_keys(&form.render());
        assert_eq!(after_copy.len(), 4);
        assert_eq!(form.data().unwrap()[1], json!({ "text": "a" }));
        assert!(!after_insert.contains(&after_copy[1]));
    }

    #[test]
    fn in_place_edit_keeps_keys() {
        let mut form = validated_form();
        let keys = row_keys(&form.render());

        form.apply(FormAction::SetValue {
            path: vec![PathSegment::from(0), PathSegment::from("text")],
            value: ChangeValue::Set(json!("x")),
        })
        .unwrap();
        assert_eq!(form.data(), Some(&json!([{ "text": "x" }, { "text": "y" }])));
        assert_eq!(row_keys(&form.render()), keys);
    }

    fn tagged_rows(rows: &[&str]) -> Form {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            }
        });
        let data: Vec<Value> = rows.iter().map(|tag| json!({ "tags": [tag] })).collect();
        Form::new(schema, json!({}), Some(Value::Array(data)), Registry::new()).unwrap()
    }

    fn tag_key(tree: &RenderNode, row: usize) -> String {
        let tags = tree.find("ArrayField", &format!("root_{}_tags", row)).unwrap();
        row_keys(tags).remove(0)
    }

    #[test]
    fn nested_keys_survive_removing_an_earlier_row() {
        let mut form = tagged_rows(&["a", "b"]);
        let tree = form.render();
        let b = tag_key(&tree, 1);
        assert_ne!(tag_key(&tree, 0), b);

        edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap();
        assert_eq!(form.data(), Some(&json!([{ "tags": ["b"] }])));
        assert!(form.state().keyed("root_1_tags").is_none());
        assert_eq!(tag_key(&form.render(), 0), b);
    }

    #[test]
    fn nested_keys_follow_a_moved_row() {
        let mut form = tagged_rows(&["a", "b", "c"]);
        let tree = form.render();
        let before: Vec<String> = (0..3).map(|row| tag_key(&tree, row)).collect();

        edit(&mut form, ArrayOperation::Move { from: 2, to: 0 }).unwrap();
        assert_eq!(
            form.data(),
            Some(&json!([{ "tags": ["c"] }, { "tags": ["a"] }, { "tags": ["b"] }]))
        );
        let tree = form.render();
        let after: Vec<String> = (0..3).map(|row| tag_key(&tree, row)).collect();
        assert_eq!(after, vec![before[2].clone(), before[0].clone(), before[1].clone()]);
    }

    fn selected(tree: &RenderNode, row: usize) -> Option<Value> {
        tree.find("MultiSchemaField", &format!("root_{}", row))
            .and_then(|node| node.prop("selected"))
            .cloned()
    }

    #[test]
    fn chosen_branch_moves_with_its_row() {
        let schema = json!({
            "type": "array",
            "items": {
                "anyOf": [
                    { "title": "Plain", "type": "object", "properties": { "label": { "type": "string" } } },
                    {
                        "title": "Rich",
                        "type": "object",
                        "properties": { "label": { "type": "string" }, "note": { "type": "string" } }
                    }
                ]
            }
        });
        let data = json!([{ "label": "a" }, { "label": "b" }, { "label": "c" }]);
        let mut form = Form::new(schema, json!({}), Some(data), Registry::new()).unwrap();
        assert_eq!(selected(&form.render(), 2), Some(json!(0)));

        form.apply(FormAction::SelectBranch {
            path: vec![PathSegment::from(2)],
            index: 1,
        })
        .unwrap();
        assert_eq!(selected(&form.render(), 2), Some(json!(1)));

        edit(&mut form, ArrayOperation::Move { from: 2, to: 0 }).unwrap();
        let tree = form.render();
        assert_eq!(selected(&tree, 0), Some(json!(1)));
        assert_eq!(selected(&tree, 1), Some(json!(0)));
        assert_eq!(selected(&tree, 2), Some(json!(0)));

        edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap();
        assert_eq!(form.data(), Some(&json!([{ "label": "a" }, { "label": "b" }])));
        let tree = form.render();
        assert_eq!(selected(&tree, 0), Some(json!(0)));
        assert_eq!(selected(&tree, 1), Some(json!(0)));
    }

    #[test]
    fn rows_carry_item_controls() {
        let mut form = validated_form();
        let tree = form.render();
        let rows: Vec<&RenderNode> = tree.children.iter().filter(|r| r.kind == "ArrayItem").collect();

        assert_eq!(rows[0].id, "root_0");
        assert_eq!(rows[0].prop("canMoveUp"), Some(&json!(false)));
        assert_eq!(rows[0].prop("canMoveDown"), Some(&json!(true)));
        assert_eq!(rows[1].prop("canMoveDown"), Some(&json!(false)));
        assert_eq!(rows[1].prop("hasRemove"), Some(&json!(true)));
        assert!(rows[0].find("ObjectField", "root_0").is_some());
    }
}

mod refused_operations {
    use super::*;

    #[test]
    fn out_of_range_index() {
        let mut form = validated_form();
        let err = edit(&mut form, ArrayOperation::Remove { index: 5 }).unwrap_err();
        assert!(matches!(err, FormError::IndexOutOfRange { index: 5, len: 2, .. }));
        assert_eq!(form.data(), Some(&json!([{}, { "text": "y" }])));
    }

    #[test]
    fn copy_is_off_by_default() {
        let mut form = validated_form();
        let err = edit(&mut form, ArrayOperation::Duplicate { index: 0 }).unwrap_err();
        assert!(matches!(err, FormError::NotAllowed { .. }));
    }

    #[test]
    fn max_items_blocks_insert() {
        let mut form = Form::new(
            json!({ "type": "array", "maxItems": 2, "items": { "type": "string" } }),
            json!({}),
            Some(json!(["a", "b"])),
            Registry::new(),
        )
        .unwrap();
        let err = edit(&mut form, ArrayOperation::Insert { index: None }).unwrap_err();
        assert!(matches!(err, FormError::NotAllowed { .. }));
    }

    #[test]
    fn fixed_items_cannot_be_removed_or_moved() {
        let schema = json!({
            "type": "array",
            "items": [{ "type": "string" }, { "type": "number" }],
            "additionalItems": { "type": "boolean" }
        });
        let mut form = Form::new(schema, json!({}), Some(json!(["a", 1, true])), Registry::new()).unwrap();

        let err = edit(&mut form, ArrayOperation::Remove { index: 0 }).unwrap_err();
        assert!(matches!(err, FormError::NotAllowed { .. }));
        let err = edit(&mut form, ArrayOperation::Move { from: 2, to: 1 }).unwrap_err();
        assert!(matches!(err, FormError::NotAllowed { .. }));

        edit(&mut form, ArrayOperation::Insert { index: None }).unwrap();
        assert_eq!(form.data(), Some(&json!(["a", 1, true, false])));

        edit(&mut form, ArrayOperation::Remove { index: 2 }).unwrap();
        assert_eq!(form.data(), Some(&json!(["a", 1, false])));
    }

    #[test]
    fn failed_action_notifies_nobody() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let mut form = validated_form();
        let seen = Arc::clone(&calls);
        form.on_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(edit(&mut form, ArrayOperation::Remove { index: 9 }).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        edit(&mut form, ArrayOperation::Remove { index: 1 }).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
