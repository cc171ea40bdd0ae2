use jetdb::{
    Cursor, Database, RowId,
    storage::usage_map::SharedUsageMap,
    types::error::DatabaseError,
    utils::mock::{SAMPLE_TABLE_PAGE, memory_database},
};

const ROW_SIZE: usize = 1000;

fn row_bytes(tag: u8) -> Vec<u8> {
    vec![tag; ROW_SIZE]
}

fn table_with_rows(database: &mut Database, count: u8) -> (SharedUsageMap, Vec<RowId>) {
    let location = database.create_usage_map(SAMPLE_TABLE_PAGE).unwrap();
    let map = database.usage_map(location).unwrap();
    let row_ids = (0..count)
        .map(|tag| database.add_raw_row(&map, SAMPLE_TABLE_PAGE, &row_bytes(tag)).unwrap())
        .collect();
    (map, row_ids)
}

fn current_tag(cursor: &jetdb::TableScanCursor) -> u8 {
    cursor.current_row().unwrap().unwrap()[0]
}

#[test]
fn test_rows_spread_over_pages() {
    let mut database = memory_database().unwrap();
    let (map, row_ids) = table_with_rows(&mut database, 12);

    assert!(map.borrow().len() >= 3);
    assert_eq!(row_ids[0].row_number, 0);
    assert_ne!(row_ids[0].page_number, row_ids[11].page_number);
    for (tag, row_id) in row_ids.iter().enumerate() {
        assert_eq!(database.read_raw_row(*row_id).unwrap(), row_bytes(tag as u8));
    }
}

#[test]
fn test_scan_visits_rows_in_order() {
    let mut database = memory_database().unwrap();
    let (map, row_ids) = table_with_rows(&mut database, 12);

    let mut cursor = database.table_scan(&map);
    let mut tags = Vec::new();
    while cursor.move_to_next_row().unwrap() {
        tags.push(current_tag(&cursor));
    }
    assert_eq!(tags, (0..12).collect::<Vec<u8>>());
    assert!(cursor.is_after_last());

    cursor.reset();
    assert_eq!(cursor.remaining_row_ids().unwrap(), row_ids);
}

#[test]
fn test_scan_backward() {
    let mut database = memory_database().unwrap();
    let (map, _) = table_with_rows(&mut database, 9);

    let mut cursor = database.table_scan(&map);
    cursor.after_last();
    let mut tags = Vec::new();
    while cursor.move_to_previous_row().unwrap() {
        tags.push(current_tag(&cursor));
    }
    assert_eq!(tags, (0..9).rev().collect::<Vec<u8>>());
    assert!(cursor.is_before_first());
}

#[test]
fn test_scan_skips_deleted_rows() {
    let mut database = memory_database().unwrap();
    let (map, row_ids) = table_with_rows(&mut database, 10);

    for row_id in row_ids.iter().step_by(3) {
        assert!(database.delete_raw_row(*row_id).unwrap());
    }
    assert!(!database.delete_raw_row(row_ids[0]).unwrap());

    let mut cursor = database.table_scan(&map);
    let remaining = cursor.remaining_row_ids().unwrap();
    let expected: Vec<RowId> = row_ids
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(_, row_id)| *row_id)
        .collect();
    assert_eq!(remaining, expected);
}

#[test]
fn test_empty_table_scan() {
    let mut database = memory_database().unwrap();
    let (map, _) = table_with_rows(&mut database, 0);
    let mut cursor = database.table_scan(&map);
    assert!(!cursor.move_to_next_row().unwrap());
    assert!(cursor.is_after_last());
    assert_eq!(cursor.current_row().unwrap(), None);
}

#[test]
fn test_current_row_deleted_under_cursor() {
    let mut database = memory_database().unwrap();
    let (map, row_ids) = table_with_rows(&mut database, 3);

    let mut cursor = database.table_scan(&map);
    cursor.move_to_next_row().unwrap();
    cursor.move_to_next_row().unwrap();
    assert!(!cursor.is_current_row_deleted().unwrap());

    database.delete_raw_row(row_ids[1]).unwrap();
    assert!(cursor.is_current_row_deleted().unwrap());
    assert_eq!(cursor.current_row().unwrap(), None);
    assert!(cursor.move_to_next_row().unwrap());
    assert_eq!(cursor.current_row_id(), Some(row_ids[2]));
}

#[test]
fn test_table_scan_savepoints() {
    let mut database = memory_database().unwrap();
    let (map, row_ids) = table_with_rows(&mut database, 8);

    let mut cursor = database.table_scan(&map);
    for _ in 0..5 {
        cursor.move_to_next_row().unwrap();
    }
    let savepoint = cursor.savepoint();
    cursor.before_first();
    assert!(cursor.restore_savepoint(&savepoint).unwrap());
    assert_eq!(cursor.current_row_id(), Some(row_ids[4]));
    assert!(cursor.move_to_next_row().unwrap());
    assert_eq!(current_tag(&cursor), 5);

    database.delete_raw_row(row_ids[4]).unwrap();
    cursor.after_last();
    assert!(!cursor.restore_savepoint(&savepoint).unwrap());
    assert!(cursor.is_after_last());

    let other = database.table_scan(&map);
    assert!(matches!(
        cursor.restore_savepoint(&other.savepoint()),
        Err(DatabaseError::InvalidSavepoint { .. })
    ));
}

#[test]
fn test_tables_do_not_see_each_other() {
    let mut database = memory_database().unwrap();
    let (first, _) = table_with_rows(&mut database, 4);
    let (second, _) = table_with_rows(&mut database, 2);

    assert_eq!(database.table_scan(&first).remaining_row_ids().unwrap().len(), 4);
    assert_eq!(database.table_scan(&second).remaining_row_ids().unwrap().len(), 2);
}

#[test]
fn test_read_missing_row() {
    let mut database = memory_database().unwrap();
    let (_, row_ids) = table_with_rows(&mut database, 1);
    let missing = RowId::new(row_ids[0].page_number, 7);
    assert!(database.read_raw_row(missing).is_err());
}
