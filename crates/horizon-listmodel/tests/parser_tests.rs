//! Tests for compiling declared list elements and replaying them.

mod common;

use std::collections::BTreeMap;

use common::with_captured_logs;
use horizon_listmodel::list::parser::{DeclaredObject, DeclaredProperty, Location};
use horizon_listmodel::{CompileError, CompiledListModel, Error, ListModel, ListModelParser, UidGenerator, Value};
use serde_json::json;

const EMPTY_ELEMENTS: &str =
    "All ListElement declarations are empty, no roles can be created unless dynamicRoles is set.";

fn declare(objects: Vec<DeclaredObject>) -> Vec<DeclaredProperty> {
    vec![DeclaredProperty::default_property(objects)]
}

fn build(objects: Vec<DeclaredObject>) -> (std::sync::Arc<ListModel>, String) {
    let compiled = ListModelParser::new().compile(&declare(objects)).unwrap();
    with_captured_logs(|| ListModel::from_compiled_with_uids(&compiled, UidGenerator::new()).unwrap())
}

#[test]
fn test_empty_element_next_to_populated_one() {
    let (model, logs) = build(vec![
        DeclaredObject::element(),
        DeclaredObject::element().with(DeclaredProperty::literal("a", 1.0)),
    ]);

    assert_eq!(model.count(), 2);
    assert_eq!(model.role_names(), BTreeMap::from([(0, "a".to_string())]));
    assert_eq!(model.data(0, 0), Value::from(0.0));
    assert_eq!(model.data(1, 0), Value::from(1.0));
    assert!(!logs.contains(EMPTY_ELEMENTS), "{logs}");
}

#[test]
fn test_all_empty_elements_are_reported() {
    let (model, logs) = build(vec![DeclaredObject::element(), DeclaredObject::element()]);
    assert_eq!(model.count(), 2);
    assert!(model.role_names().is_empty());
    assert!(logs.contains(EMPTY_ELEMENTS), "{logs}");
}

#[test]
fn test_declared_model_with_nested_elements() {
    let parser = ListModelParser::new();
    let declared = declare(vec![
        DeclaredObject::element()
            .with(DeclaredProperty::literal("name", "Apples"))
            .with(DeclaredProperty::literal("cost", 2.45))
            .with(DeclaredProperty::objects(
                "attributes",
                vec![
                    DeclaredObject::element().with(DeclaredProperty::literal("description", "Core")),
                    DeclaredObject::element().with(DeclaredProperty::literal("description", "Deciduous")),
                ],
            )),
        DeclaredObject::new("QtQml.Models.ListElement")
            .with(DeclaredProperty::script("name", r#"QT_TR_NOOP("Oranges")"#))
            .with(DeclaredProperty::literal("cost", 3.25))
            .with(DeclaredProperty::script("attributes", "[]"))
            .with(DeclaredProperty::literal("seasonal", true)),
    ]);

    let bytes = parser.compile(&declared).unwrap().to_bytes();
    let compiled = CompiledListModel::from_bytes(&bytes).unwrap();
    let model = ListModel::from_compiled_with_uids(&compiled, UidGenerator::new()).unwrap();

    assert_eq!(
        model.to_value().to_json(),
        json!([
            {
                "name": "Apples",
                "cost": 2.45,
                "attributes": [{"description": "Core"}, {"description": "Deciduous"}],
                "seasonal": false
            },
            {"name": "Oranges", "cost": 3.25, "attributes": [], "seasonal": true}
        ])
    );
    let attributes = model.data(0, 2);
    assert_eq!(attributes.as_model().map(|nested| nested.count()), Some(2));
}

#[test]
fn test_compile_errors_carry_location() {
    let parser = ListModelParser::new();

    let err = parser
        .compile(&declare(vec![
            DeclaredObject::element().with(DeclaredProperty::script("cost", "price * 2").at(12, 27)),
        ]))
        .unwrap_err();
    assert_eq!(err.location(), Location::new(12, 27));
    assert_eq!(err.to_string(), "12:27: ListElement: cannot use script for property value");

    let err = parser
        .compile(&declare(vec![
            DeclaredObject::element().with(DeclaredProperty::script("name", "QT_TR_NOOP(name)").at(3, 4)),
        ]))
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::ImproperTranslation {
            function: "QT_TR_NOOP".to_string(),
            location: Location::new(3, 4),
        }
    );

    let err: Error = parser
        .compile(&declare(vec![DeclaredObject::element().with(
            DeclaredProperty::objects("nested", vec![DeclaredObject::new("Item").at(5, 9)]),
        )]))
        .unwrap_err()
        .into();
    assert_eq!(err.to_string(), "5:9: ListElement: cannot contain nested elements");
}

#[test]
fn test_serde_round_trip_replays_rows() {
    let compiled = ListModelParser::new()
        .compile(&declare(vec![
            DeclaredObject::element().with(DeclaredProperty::literal("n", 1.5)),
            DeclaredObject::element().with(DeclaredProperty::literal("n", -2.0)),
        ]))
        .unwrap();

    let text = serde_json::to_string(&compiled).unwrap();
    let restored: CompiledListModel = serde_json::from_str(&text).unwrap();
    assert_eq!(restored, compiled);

    let model = ListModel::from_compiled_with_uids(&restored, UidGenerator::new()).unwrap();
    assert_eq!(model.to_value().to_json(), json!([{"n": 1.5}, {"n": -2.0}]));
}
