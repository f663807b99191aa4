use std::rc::Rc;

use super::{RecordingDatabase, adapter, load_class, select};
use crate::{
    BlockContainer, BlockItem, ErrorDetail,
    config::Settings,
    db::{Database, SqlValue},
    object::DataObject,
};

#[test]
fn creates_main_and_localized_tables() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let report = blocks.sync_schema(&class.id).unwrap();
    assert_eq!(
        report.created_tables,
        ["object_eb_Product_blocks", "object_eb_Product_blocks_localized"]
    );
    assert!(report.added_columns.is_empty());
    assert_eq!(
        db.columns("object_eb_Product_blocks").unwrap(),
        [
            "id", "o_id", "fieldname", "index", "type", "title", "published", "caption", "image",
            "ratio"
        ]
    );
    assert_eq!(
        db.columns("object_eb_Product_blocks_localized").unwrap(),
        ["id", "ooo_id", "language", "headline"]
    );
    let indexes = select(
        &db,
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?",
        &["object_eb_Product_blocks".into()],
    );
    assert_eq!(
        indexes[0].get("name"),
        Some(&SqlValue::from("object_eb_Product_blocks_o_id_fieldname"))
    );
}

#[test]
fn second_sync_is_a_no_op() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    blocks.sync_schema(&class.id).unwrap();
    db.clear();
    let report = blocks.sync_schema(&class.id).unwrap();
    assert!(report.is_unchanged());
    assert_eq!(db.count_matching("ALTER TABLE"), 0);
    assert!(db.statements().is_empty());
}

#[test]
fn removed_fields_keep_their_columns_and_data() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut product = DataObject::new(7, "Product");
    product.set_blocks(
        "blocks",
        BlockContainer::with_items(
            Some(7),
            "blocks",
            vec![
                BlockItem::new("image")
                    .with_value("caption", "Front")
                    .with_value("ratio", 1.5),
            ],
        ),
    );
    blocks.save(&mut product).unwrap();

    let evolved = load_class("src/tests/fixtures/product_evolved.yaml");
    let blocks = adapter(&evolved, "blocks", db.clone(), Settings::default());
    db.clear();
    let report = blocks.sync_schema(&evolved.id).unwrap();
    assert!(report.created_tables.is_empty());
    assert_eq!(
        report
            .added_columns
            .iter()
            .map(|(_, column)| column.as_str())
            .collect::<Vec<_>>(),
        ["subtitle", "released", "related__id", "related__type"]
    );
    assert_eq!(db.count_matching("ALTER TABLE"), 4);
    assert_eq!(db.count_matching("ALTER TABLE \"object_eb_Product_blocks\" ADD COLUMN"), 4);

    let columns = db.columns("object_eb_Product_blocks").unwrap();
    for kept in ["published", "image", "ratio"] {
        assert!(columns.iter().any(|column| column == kept), "{kept} was dropped");
    }
    let rows = select(
        &db,
        "SELECT \"caption\", \"ratio\" FROM \"object_eb_Product_blocks\" WHERE \"o_id\" = ?",
        &[SqlValue::Integer(7)],
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("caption"), Some(&SqlValue::from("Front")));
    assert_eq!(rows[0].get("ratio"), Some(&SqlValue::Real(1.5)));

    db.clear();
    assert!(blocks.sync_schema(&evolved.id).unwrap().is_unchanged());
    assert_eq!(db.count_matching("ALTER TABLE"), 0);
}

#[test]
fn definition_prefix_overrides_settings() {
    let mut class = load_class("src/tests/fixtures/product.yaml");
    for field in &mut class.fields {
        if let crate::config::Kind::ExtendedBlock(definition) = &mut field.kind {
            definition.table_prefix = Some("eb_".into());
        }
    }
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());
    blocks.sync_schema(&class.id).unwrap();
    assert!(db.table_exists("eb_Product_blocks").unwrap());
    assert!(!db.table_exists("object_eb_Product_blocks").unwrap());
}

#[test]
fn unsafe_prefix_is_rejected_before_any_statement() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let settings = Settings {
        table_prefix: "eb; DROP TABLE x; --".into(),
        ..Settings::default()
    };
    let result = crate::ExtendedBlock::new(
        "blocks",
        super::field_definition(&class, "blocks"),
        Rc::new(crate::field::FieldKindRegistry::builtin()),
        db.clone(),
        settings,
    );
    let Err(e) = result else {
        panic!("prefix must be rejected");
    };
    assert!(matches!(e.detail(), ErrorDetail::InvalidIdentifier(_)));
    assert!(db.statements().is_empty());
}

#[test]
fn ddl_renders_without_touching_the_database() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());
    let statements = blocks.ddl(&class.id).unwrap();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"object_eb_Product_blocks\" ("));
    assert!(statements[1].starts_with("CREATE INDEX IF NOT EXISTS"));
    assert!(statements[2].contains("UNIQUE (\"ooo_id\", \"language\")"));
    assert!(db.statements().is_empty());
    assert!(!db.table_exists("object_eb_Product_blocks").unwrap());
}
