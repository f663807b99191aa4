use std::rc::Rc;

use serde_json::json;

use super::{RecordingDatabase, adapter, load_class, select};
use crate::{
    BlockContainer, BlockItem, ErrorDetail,
    block::LoadState,
    config::Settings,
    db::{Database, SqlValue},
    object::{DataObject, FieldData, ParentObject},
};

const ROWS: &str = "SELECT * FROM \"object_eb_Product_blocks\" ORDER BY \"o_id\", \"index\"";

fn product(id: i64, items: Vec<BlockItem>) -> DataObject {
    let mut product = DataObject::new(id, "Product");
    product.set_blocks(
        "blocks",
        BlockContainer::with_items(Some(id), "blocks", items),
    );
    product
}

#[test]
fn save_then_delete() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(
        1,
        vec![
            BlockItem::new("text")
                .with_value("title", "A")
                .with_value("published", true),
            BlockItem::new("image")
                .with_value("caption", "B")
                .with_value("image", 42),
        ],
    );
    blocks.save(&mut parent).unwrap();

    assert!(db.table_exists("object_eb_Product_blocks").unwrap());
    let rows = select(&db, ROWS, &[]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("index"), Some(&SqlValue::Integer(0)));
    assert_eq!(rows[0].get("type"), Some(&SqlValue::from("text")));
    assert_eq!(rows[0].get("fieldname"), Some(&SqlValue::from("blocks")));
    assert_eq!(rows[0].get("title"), Some(&SqlValue::from("A")));
    assert_eq!(rows[0].get("published"), Some(&SqlValue::Integer(1)));
    assert_eq!(rows[0].get("caption"), Some(&SqlValue::Null));
    assert_eq!(rows[1].get("index"), Some(&SqlValue::Integer(1)));
    assert_eq!(rows[1].get("type"), Some(&SqlValue::from("image")));
    assert_eq!(rows[1].get("caption"), Some(&SqlValue::from("B")));
    assert_eq!(rows[1].get("image"), Some(&SqlValue::Integer(42)));
    assert_eq!(rows[1].get("title"), Some(&SqlValue::Null));

    let container = parent.blocks_mut("blocks").unwrap();
    assert_eq!(container.state(), LoadState::Persisted);
    let items = container.items().unwrap();
    assert_eq!(items[0].id(), rows[0].get("id").and_then(as_integer));
    assert_eq!(items[1].id(), rows[1].get("id").and_then(as_integer));
    assert!(items.iter().all(|item| !item.is_modified()));

    blocks.delete(&parent).unwrap();
    assert!(select(&db, ROWS, &[]).is_empty());
}

fn as_integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(i) => Some(*i),
        _ => None,
    }
}

#[test]
fn resave_replaces_rows_and_reassigns_ids() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(
        1,
        vec![
            BlockItem::new("text").with_value("title", "A"),
            BlockItem::new("text").with_value("title", "B"),
            BlockItem::new("text").with_value("title", "C"),
        ],
    );
    blocks.save(&mut parent).unwrap();
    let first_ids = parent
        .blocks_mut("blocks")
        .unwrap()
        .iter()
        .unwrap()
        .filter_map(BlockItem::id)
        .collect::<Vec<_>>();

    let container = parent.blocks_mut("blocks").unwrap();
    container.remove_item(1).unwrap();
    container.move_item(1, 0).unwrap();
    blocks.save(&mut parent).unwrap();

    let rows = select(&db, ROWS, &[]);
    assert_eq!(
        rows.iter()
            .map(|row| (row.get("index").cloned(), row.get("title").cloned()))
            .collect::<Vec<_>>(),
        [
            (Some(SqlValue::Integer(0)), Some(SqlValue::from("C"))),
            (Some(SqlValue::Integer(1)), Some(SqlValue::from("A"))),
        ]
    );
    let second_ids = parent
        .blocks_mut("blocks")
        .unwrap()
        .iter()
        .unwrap()
        .filter_map(BlockItem::id)
        .collect::<Vec<_>>();
    assert_eq!(second_ids.len(), 2);
    assert!(second_ids.iter().all(|id| !first_ids.contains(id)));
}

#[test]
fn owners_do_not_interfere() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut first = product(1, vec![BlockItem::new("text").with_value("title", "one")]);
    let mut second = product(2, vec![BlockItem::new("text").with_value("title", "two")]);
    blocks.save(&mut first).unwrap();
    blocks.save(&mut second).unwrap();
    blocks.delete(&first).unwrap();

    let rows = select(&db, ROWS, &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("o_id"), Some(&SqlValue::Integer(2)));

    let loaded = blocks.load_block_data(&second).unwrap();
    assert_eq!(loaded.loaded_items().unwrap()[0].get("title"), Some(&json!("two")));
}

#[test]
fn reload_decodes_every_kind() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(
        5,
        vec![
            BlockItem::new("image")
                .with_value("caption", "Cover")
                .with_value("image", 9)
                .with_value("ratio", 0.75),
            BlockItem::new("text")
                .with_value("title", "Intro")
                .with_value("published", false),
        ],
    );
    blocks.save(&mut parent).unwrap();

    let mut loaded = blocks.load_block_data(&parent).unwrap();
    let items = loaded.items().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].block_type(), "image");
    assert_eq!(items[0].get("caption"), Some(&json!("Cover")));
    assert_eq!(items[0].get("image"), Some(&json!(9)));
    assert_eq!(items[0].get("ratio"), Some(&json!(0.75)));
    assert_eq!(items[1].get("title"), Some(&json!("Intro")));
    assert_eq!(items[1].get("published"), Some(&json!(false)));
    assert_eq!(items[1].index(), 1);
    assert_eq!(items[1].object_id(), Some(5));

    let mut original = BlockContainer::with_items(
        Some(5),
        "blocks",
        parent.blocks_mut("blocks").unwrap().items().unwrap().to_vec(),
    );
    assert!(blocks.is_equal(&mut original, &mut loaded).unwrap());
}

#[test]
fn missing_table_loads_empty_and_delete_is_a_no_op() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let parent = DataObject::new(3, "Product");
    let mut container = blocks.load_block_data(&parent).unwrap();
    assert!(container.is_empty().unwrap());
    blocks.delete(&parent).unwrap();
    assert!(db.statements().is_empty());
}

#[test]
fn rows_of_removed_block_types_are_skipped() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(
        1,
        vec![
            BlockItem::new("text").with_value("title", "kept"),
            BlockItem::new("image").with_value("caption", "gone"),
        ],
    );
    blocks.save(&mut parent).unwrap();

    let evolved = load_class("src/tests/fixtures/product_lazy.yaml");
    let text_only = adapter(&evolved, "blocks", db.clone(), Settings::default());
    let mut loaded = text_only.load_block_data(&parent).unwrap();
    let items = loaded.items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("title"), Some(&json!("kept")));
    assert_eq!(items[0].index(), 0);
}

#[test]
fn invalid_value_aborts_save_without_writing() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(1, vec![BlockItem::new("text").with_value("title", "A")]);
    blocks.save(&mut parent).unwrap();

    let mut broken = product(
        1,
        vec![BlockItem::new("image").with_value("image", "not an asset")],
    );
    let e = blocks.save(&mut broken).unwrap_err();
    assert!(matches!(e.detail(), ErrorDetail::TypeMismatch { .. }));
    let rows = select(&db, ROWS, &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&SqlValue::from("A")));
}

#[test]
fn failed_insert_rolls_back_the_delete() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = product(1, vec![BlockItem::new("text").with_value("title", "A")]);
    blocks.save(&mut parent).unwrap();
    db.execute(
        "CREATE TRIGGER reject_b BEFORE INSERT ON \"object_eb_Product_blocks\" \
         WHEN NEW.\"title\" = 'B' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        &[],
    )
    .unwrap();

    let mut replacement = product(
        1,
        vec![
            BlockItem::new("text").with_value("title", "Z"),
            BlockItem::new("text").with_value("title", "B"),
        ],
    );
    let e = blocks.save(&mut replacement).unwrap_err();
    assert!(matches!(e.detail(), ErrorDetail::Persistence(_)));
    let rows = select(&db, ROWS, &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&SqlValue::from("A")));
}

#[test]
fn fields_differing_in_case_share_a_column() {
    let definition: crate::config::FieldTypeDefinition = serde_yaml::from_str(
        r#"
block_definitions:
  text:
    fields:
      - { name: title, type: Input }
  quote:
    fields:
      - { name: Title, type: Input }
"#,
    )
    .unwrap();
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = crate::ExtendedBlock::new(
        "blocks",
        definition,
        Rc::new(crate::field::FieldKindRegistry::builtin()),
        db.clone(),
        Settings::default(),
    )
    .unwrap();
    blocks.validate().unwrap();

    let mut parent = product(
        1,
        vec![
            BlockItem::new("text").with_value("title", "lower"),
            BlockItem::new("quote").with_value("Title", "upper"),
        ],
    );
    blocks.save(&mut parent).unwrap();
    assert_eq!(
        db.columns("object_eb_Product_blocks").unwrap(),
        ["id", "o_id", "fieldname", "index", "type", "title"]
    );

    let mut loaded = blocks.load_block_data(&parent).unwrap();
    let items = loaded.items().unwrap();
    assert_eq!(items[0].get("title"), Some(&json!("lower")));
    assert_eq!(items[1].get("Title"), Some(&json!("upper")));

    db.clear();
    assert!(blocks.sync_schema("Product").unwrap().is_unchanged());
    assert_eq!(db.count_matching("ALTER TABLE"), 0);
}

#[test]
fn plain_values_under_the_field_name_are_not_saved() {
    let class = load_class("src/tests/fixtures/product.yaml");
    let db = Rc::new(RecordingDatabase::in_memory());
    let blocks = adapter(&class, "blocks", db.clone(), Settings::default());

    let mut parent = DataObject::new(1, "Product");
    parent.set_value("blocks", json!([{ "type": "text" }]));
    blocks.save(&mut parent).unwrap();
    assert!(db.statements().is_empty());
    assert!(!db.table_exists("object_eb_Product_blocks").unwrap());

    parent.set_blocks(
        "blocks",
        BlockContainer::with_items(Some(1), "blocks", vec![BlockItem::new("text")]),
    );
    blocks.save(&mut parent).unwrap();
    let Some(FieldData::Blocks(mut saved)) = parent.take("blocks") else {
        panic!("blocks field must hold a container");
    };
    assert_eq!(saved.state(), LoadState::Persisted);
    assert!(saved.get(0).unwrap().unwrap().id().is_some());
    assert!(parent.blocks_mut("blocks").is_none());
}
