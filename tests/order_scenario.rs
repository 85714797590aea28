use xsd_map::mapping::MappingKind;
use xsd_map::model::{ReflectedModel, ReflectedType};
use xsd_map::names::QualifiedName;
use xsd_map::xsd::{Particle, SchemaType};
use xsd_map::{ExportOptions, ImportOptions, ReflectionImporter, SchemaExporter};

fn order_model() -> ReflectedModel {
    ReflectedModel::new().with_type(ReflectedType::class("Order").member("Id", "i32").member("Items", "string[]"))
}

#[test]
fn order_imports_as_struct_with_primitive_and_array_members() {
    let model = order_model();
    let mut importer = ReflectionImporter::new(&model, ImportOptions::default());
    let element = importer.import_element("Order", None).unwrap();
    let graph = importer.finish();

    assert_eq!(element.name, "Order");
    assert_eq!(element.namespace, None);
    let order = graph.get(element.mapping);
    assert!(order.is_struct());

    let members = graph.members_of(element.mapping);
    assert_eq!(members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), vec!["Id", "Items"]);

    let id = &members[0].elements[0];
    assert_eq!(id.name, "Id");
    let id_mapping = graph.get(id.mapping);
    assert!(matches!(id_mapping.kind, MappingKind::Primitive(_)));
    assert_eq!(id_mapping.type_name, "int");

    let items = &members[1].elements[0];
    assert_eq!(items.name, "Items");
    let array = graph.get(items.mapping);
    assert_eq!(array.type_name, "ArrayOfString");
    let item_elements = &array.as_array().unwrap().elements;
    assert_eq!(item_elements.len(), 1);
    assert_eq!(item_elements[0].name, "string");
    assert_eq!(graph.get(graph.unwrap_nullable(item_elements[0].mapping)).type_name, "string");
}

#[test]
fn order_exports_as_a_sequence_of_both_particles() {
    let model = order_model();
    let mut importer = ReflectionImporter::new(&model, ImportOptions::default());
    importer.import_element("Order", None).unwrap();
    let graph = importer.finish();

    let mut exporter = SchemaExporter::new(&graph, ExportOptions::default());
    exporter.export_graph().unwrap();
    let set = exporter.finish();

    let element = set.find_element(&QualifiedName::local("Order")).unwrap();
    assert_eq!(element.type_name, Some(QualifiedName::local("Order")));

    let Some(SchemaType::Complex(order)) = set.find_type(&QualifiedName::local("Order")) else {
        panic!("Order is not a complex type");
    };
    let Some(Particle::Sequence(sequence)) = &order.particle else { panic!("Order has no sequence") };
    let particles: Vec<(&str, Option<&QualifiedName>)> = sequence
        .items
        .iter()
        .map(|p| match p {
            Particle::Element(e) => (e.name.as_deref().unwrap_or_default(), e.type_name.as_ref()),
            other => panic!("unexpected particle {other:?}"),
        })
        .collect();
    assert_eq!(
        particles,
        vec![
            ("Id", Some(&QualifiedName::xsd("int"))),
            ("Items", Some(&QualifiedName::local("ArrayOfString"))),
        ]
    );
    assert!(matches!(set.find_type(&QualifiedName::local("ArrayOfString")), Some(SchemaType::Complex(_))));
}
