//! export(import(T)) re-imported keeps accessor names, namespaces and
//! nullability.
use xsd_map::annotations::{XmlAttributes, XmlElementAttribute};
use xsd_map::mapping::MappingGraph;
use xsd_map::mapping::dump::Shape;
use xsd_map::model::{ReflectedModel, ReflectedType};
use xsd_map::{ExportOptions, ImportOptions, ReflectionImporter, SchemaExporter, SchemaImporter};

fn reflect(model: &ReflectedModel, types: &[&str]) -> MappingGraph {
    let mut importer = ReflectionImporter::new(model, ImportOptions::default());
    for ty in types {
        importer.import_element(ty, None).unwrap();
    }
    importer.finish()
}

fn shapes(graph: &MappingGraph) -> Vec<Shape> {
    let mut shapes = graph.element_shapes();
    shapes.sort_by(|a, b| a.name.cmp(&b.name));
    shapes
}

fn assert_round_trips(model: &ReflectedModel, types: &[&str]) {
    let reflected = reflect(model, types);
    let mut exporter = SchemaExporter::new(&reflected, ExportOptions::default());
    exporter.export_graph().unwrap();
    let set = exporter.finish();

    let mut importer = SchemaImporter::new(&set, ImportOptions::default());
    importer.import_all_elements().unwrap();
    let reimported = importer.finish();
    assert_eq!(shapes(&reflected), shapes(&reimported));
}

#[test]
fn plain_struct() {
    let model = ReflectedModel::new().with_type(ReflectedType::class("Order").member("Id", "i32").member("Note", "string"));
    assert_round_trips(&model, &["Order"]);
}

#[test]
fn struct_with_base_class() {
    let model = ReflectedModel::new()
        .with_type(ReflectedType::class("Base").member("Name", "string"))
        .with_type(ReflectedType::class("Derived").extends("Base").member("Extra", "i32"));
    assert_round_trips(&model, &["Derived"]);
}

#[test]
fn array_of_struct() {
    let model = ReflectedModel::new()
        .with_type(ReflectedType::class("Line").member("Sku", "string"))
        .with_type(ReflectedType::class("Order").member("Lines", "Line[]"));
    assert_round_trips(&model, &["Order"]);
}

#[test]
fn nullable_primitive() {
    let model = ReflectedModel::new().with_type(ReflectedType::class("Reading").member("Value", "i32?"));
    assert_round_trips(&model, &["Reading"]);
}

#[test]
fn enums_with_and_without_flags() {
    let model = ReflectedModel::new()
        .with_type(ReflectedType::enumeration("Color", &["Red", "Green"], false))
        .with_type(ReflectedType::enumeration("Perm", &["Read", "Write", "Exec"], true))
        .with_type(ReflectedType::class("Style").member("Color", "Color").member("Perm", "Perm"));
    assert_round_trips(&model, &["Style"]);
}

#[test]
fn choice_member() {
    let choice = XmlAttributes {
        elements: vec![
            XmlElementAttribute { element_name: Some("count".into()), type_name: Some("i32".into()), ..Default::default() },
            XmlElementAttribute { element_name: Some("label".into()), type_name: Some("string".into()), ..Default::default() },
        ],
        ..Default::default()
    };
    let model = ReflectedModel::new().with_type(ReflectedType::class("Holder").member_with("Value", "object", choice));
    assert_round_trips(&model, &["Holder"]);
}
