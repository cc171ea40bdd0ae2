use jetdb::{
    ColumnSpec, Cursor, DataType, Index, IndexDefinition, RowId, Value,
    index::{
        ForeignKeyReference, IndexKind, add_row_to_indexes, add_rows_to_indexes,
        delete_row_from_indexes, update_row_in_indexes,
    },
    types::error::{ConstraintKind, DatabaseError},
    utils::mock::{SAMPLE_TABLE_PAGE, big_int_index_definition, memory_database, text_index_definition},
};

fn values_in_order(index: &Index) -> Vec<Vec<Value>> {
    let mut cursor = index.cursor();
    let mut values = Vec::new();
    while cursor.move_to_next_row().unwrap() {
        values.push(cursor.current_entry_values().unwrap().unwrap());
    }
    values
}

fn row_ids_in_order(index: &Index) -> Vec<RowId> {
    index.cursor().remaining_row_ids().unwrap()
}

#[test]
fn test_case_insensitive_text_order() {
    let mut database = memory_database().unwrap();
    let ascending = database.create_index(text_index_definition("name_asc")).unwrap();
    let descending = database
        .create_index(
            IndexDefinition::new("name_desc", "people", SAMPLE_TABLE_PAGE)
                .with_index_number(1)
                .column(ColumnSpec::new(0, "name", DataType::Text).descending()),
        )
        .unwrap();
    assert!(!ascending.shares_data_with(&descending));

    let rows = [("bar", 1), ("baz", 2), ("Bar", 3), ("BAR", 4)];
    for (text, row) in rows {
        let row_id = RowId::new(20, row);
        ascending.add_row(&[Value::text(text)], row_id).unwrap();
        descending.add_row(&[Value::text(text)], row_id).unwrap();
    }

    // equal keys keep row-id order, which here is insertion order
    assert_eq!(
        row_ids_in_order(&ascending),
        vec![RowId::new(20, 1), RowId::new(20, 3), RowId::new(20, 4), RowId::new(20, 2)]
    );
    assert_eq!(
        row_ids_in_order(&descending),
        vec![RowId::new(20, 2), RowId::new(20, 1), RowId::new(20, 3), RowId::new(20, 4)]
    );
    assert_eq!(
        values_in_order(&descending),
        vec![
            vec![Value::text("baz")],
            vec![Value::text("bar")],
            vec![Value::text("bar")],
            vec![Value::text("bar")],
        ]
    );
    assert_eq!(ascending.unique_entry_count().unwrap(), 2);
}

#[test]
fn test_signed_numbers_in_order() {
    let mut database = memory_database().unwrap();
    let big_int = database.create_index(big_int_index_definition("by_big_int")).unwrap();
    let numeric = database
        .create_index(
            IndexDefinition::new("by_numeric", "numbers", SAMPLE_TABLE_PAGE)
                .with_index_number(1)
                .column(ColumnSpec::new(1, "amount", DataType::Numeric)),
        )
        .unwrap();

    let inputs: [i64; 4] = [0, -10, 3844, -45309590834];
    for (row, value) in inputs.iter().enumerate() {
        let row_values = [Value::BigInt(*value), Value::BigInt(*value)];
        add_row_to_indexes(&[&big_int, &numeric], &row_values, RowId::new(30, row as u8)).unwrap();
    }

    let expected: [i64; 4] = [-45309590834, -10, 0, 3844];
    assert_eq!(
        values_in_order(&big_int),
        expected.iter().map(|v| vec![Value::BigInt(*v)]).collect::<Vec<_>>()
    );
    assert_eq!(
        values_in_order(&numeric),
        expected
            .iter()
            .map(|v| vec![Value::Numeric { unscaled: *v as i128, scale: 0 }])
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_primary_and_foreign_key_share_data() {
    let mut database = memory_database().unwrap();
    let primary = database
        .create_index(text_index_definition("pk_people").primary_key())
        .unwrap();
    let foreign = database
        .create_index(
            text_index_definition("fk_people_orders")
                .with_index_number(1)
                .foreign_key(ForeignKeyReference {
                    other_table_page: 40,
                    other_index_number: 0,
                    is_primary_table: true,
                    cascade_updates: false,
                    cascade_deletes: true,
                    cascade_null_on_delete: false,
                }),
        )
        .unwrap();

    assert!(primary.shares_data_with(&foreign));
    assert_eq!(primary.root_page(), foreign.root_page());
    assert_eq!(primary.kind(), IndexKind::PrimaryKey);
    assert!(foreign.is_foreign_key());
    assert!(!foreign.is_unique());

    primary.add_row(&[Value::text("ann")], RowId::new(5, 0)).unwrap();
    assert_eq!(foreign.entry_count().unwrap(), 1);

    // the shared data enforces the primary key's constraints for every view
    assert!(matches!(
        foreign.add_row(&[Value::text("ANN")], RowId::new(5, 1)),
        Err(DatabaseError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            ..
        })
    ));
    assert!(matches!(
        foreign.add_row(&[Value::Null], RowId::new(5, 2)),
        Err(DatabaseError::ConstraintViolation {
            kind: ConstraintKind::Required,
            ..
        })
    ));

    // rows reach shared data once even when both views are listed
    add_row_to_indexes(&[&primary, &foreign], &[Value::text("bob")], RowId::new(5, 3)).unwrap();
    assert_eq!(primary.entry_count().unwrap(), 2);
    delete_row_from_indexes(&[&primary, &foreign], &[Value::text("bob")], RowId::new(5, 3)).unwrap();
    assert_eq!(primary.entry_count().unwrap(), 1);
}

#[test]
fn test_referenced_index_lookup() {
    let mut database = memory_database().unwrap();
    let orders_table = 40;
    let target = database
        .create_index(
            IndexDefinition::new("pk_orders", "orders", orders_table)
                .column(ColumnSpec::new(0, "id", DataType::Long))
                .primary_key(),
        )
        .unwrap();
    let referencing = database
        .create_index(
            IndexDefinition::new("fk_people_orders", "people", SAMPLE_TABLE_PAGE)
                .column(ColumnSpec::new(3, "order_id", DataType::Long))
                .foreign_key(ForeignKeyReference {
                    other_table_page: orders_table,
                    other_index_number: 0,
                    is_primary_table: false,
                    cascade_updates: false,
                    cascade_deletes: false,
                    cascade_null_on_delete: false,
                }),
        )
        .unwrap();
    let plain = database.create_index(text_index_definition("by_name").with_index_number(2)).unwrap();

    let found = database.referenced_index(&referencing).unwrap().unwrap();
    assert_eq!(found.name(), "pk_orders");
    assert!(found.shares_data_with(&target));
    assert!(database.referenced_index(&plain).unwrap().is_none());
}

#[test]
fn test_multi_index_insert_is_all_or_nothing() {
    let mut database = memory_database().unwrap();
    let by_name = database.create_index(text_index_definition("by_name")).unwrap();
    let by_id = database
        .create_index(
            IndexDefinition::new("by_id", "people", SAMPLE_TABLE_PAGE)
                .with_index_number(1)
                .column(ColumnSpec::new(1, "id", DataType::Long))
                .unique(),
        )
        .unwrap();
    let indexes = [&by_name, &by_id];

    add_row_to_indexes(&indexes, &[Value::text("ann"), Value::Long(1)], RowId::new(5, 0)).unwrap();
    let result = add_row_to_indexes(&indexes, &[Value::text("bob"), Value::Long(1)], RowId::new(5, 1));
    assert!(result.unwrap_err().is_constraint_violation());
    assert_eq!(by_name.entry_count().unwrap(), 1);
    assert_eq!(by_id.entry_count().unwrap(), 1);
}

#[test]
fn test_batch_insert_reports_rows_applied() {
    let mut database = memory_database().unwrap();
    let index = database
        .create_index(big_int_index_definition("by_value").unique())
        .unwrap();
    let rows: Vec<(Vec<Value>, RowId)> = [1i64, 2, 3, 2, 5]
        .iter()
        .enumerate()
        .map(|(i, v)| (vec![Value::BigInt(*v)], RowId::new(6, i as u8)))
        .collect();

    match add_rows_to_indexes(&[&index], &rows) {
        Err(DatabaseError::BatchUpdate { updated, source }) => {
            assert_eq!(updated, 3);
            assert!(source.is_constraint_violation());
        }
        other => panic!("expected a batch failure, got {:?}", other),
    }
    assert_eq!(index.entry_count().unwrap(), 3);

    assert_eq!(add_rows_to_indexes(&[&index], &rows[4..]).unwrap(), 1);
    assert_eq!(index.entry_count().unwrap(), 4);
}

#[test]
fn test_update_across_indexes() {
    let mut database = memory_database().unwrap();
    let by_name = database.create_index(text_index_definition("by_name")).unwrap();
    let by_id = database
        .create_index(
            IndexDefinition::new("by_id", "people", SAMPLE_TABLE_PAGE)
                .with_index_number(1)
                .column(ColumnSpec::new(1, "id", DataType::Long))
                .unique(),
        )
        .unwrap();
    let indexes = [&by_name, &by_id];
    let ann = vec![Value::text("ann"), Value::Long(1)];
    let bob = vec![Value::text("bob"), Value::Long(2)];
    add_row_to_indexes(&indexes, &ann, RowId::new(5, 0)).unwrap();
    add_row_to_indexes(&indexes, &bob, RowId::new(5, 1)).unwrap();

    // id clash rejects the update in both indexes
    let clash = vec![Value::text("anna"), Value::Long(2)];
    assert!(update_row_in_indexes(&indexes, &ann, &clash, RowId::new(5, 0)).is_err());
    assert_eq!(values_in_order(&by_name), vec![vec![Value::text("ann")], vec![Value::text("bob")]]);

    let renamed = vec![Value::text("cy"), Value::Long(1)];
    update_row_in_indexes(&indexes, &ann, &renamed, RowId::new(5, 0)).unwrap();
    assert_eq!(values_in_order(&by_name), vec![vec![Value::text("bob")], vec![Value::text("cy")]]);
    assert_eq!(by_id.entry_count().unwrap(), 2);
}
