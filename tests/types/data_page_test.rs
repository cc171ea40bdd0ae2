use jetdb::{
    storage::format::FileFormat,
    types::{
        error::DatabaseError,
        page::{DataPage, MAX_ROWS_PER_PAGE, PageType},
    },
};

#[test]
fn test_empty_page_round_trip() {
    let format = FileFormat::Jet4.jet_format();
    let page = DataPage::new(3, 9);
    let bytes = page.to_bytes(format).unwrap();

    assert_eq!(bytes.len(), format.page_size);
    assert_eq!(bytes[0], PageType::Data.as_u8());
    assert_eq!(DataPage::from_bytes(&bytes, 3, format).unwrap(), page);
    assert_eq!(page.free_space(format), format.page_size - format.offset_row_start);
}

#[test]
fn test_rows_round_trip_with_deleted_flag() {
    let format = FileFormat::Jet4.jet_format();
    let mut page = DataPage::new(4, 2);
    assert_eq!(page.add_row(b"first row", format).unwrap(), 0);
    assert_eq!(page.add_row(b"second", format).unwrap(), 1);
    assert_eq!(page.add_row(b"", format).unwrap(), 2);
    assert!(page.delete_row(1).unwrap());

    let bytes = page.to_bytes(format).unwrap();
    let decoded = DataPage::from_bytes(&bytes, 4, format).unwrap();
    assert_eq!(decoded.owner, 2);
    assert_eq!(decoded.row_count(), 3);
    assert_eq!(decoded.row(0).unwrap(), b"first row");
    assert!(decoded.is_row_deleted(1));
    assert_eq!(decoded.row(2).unwrap(), b"");
    assert!(matches!(
        decoded.row(1),
        Err(DatabaseError::InvalidRow {
            page_number: 4,
            row_number: 1
        })
    ));
}

#[test]
fn test_jet3_layout_round_trip() {
    let format = FileFormat::Jet3.jet_format();
    let mut page = DataPage::new(7, 1);
    page.add_row(&[1, 2, 3, 4], format).unwrap();
    let bytes = page.to_bytes(format).unwrap();
    assert_eq!(bytes.len(), 2048);
    assert_eq!(DataPage::from_bytes(&bytes, 7, format).unwrap(), page);
}

#[test]
fn test_delete_twice_reports_false() {
    let format = FileFormat::Jet4.jet_format();
    let mut page = DataPage::new(5, 0);
    page.add_row(b"row", format).unwrap();
    assert!(page.delete_row(0).unwrap());
    assert!(!page.delete_row(0).unwrap());
    assert!(page.delete_row(9).is_err());
}

#[test]
fn test_page_full() {
    let format = FileFormat::Jet4.jet_format();
    let mut page = DataPage::new(6, 0);
    let big = vec![0x55u8; 3000];
    page.add_row(&big, format).unwrap();
    let result = page.add_row(&big, format);
    assert!(matches!(result, Err(DatabaseError::PageFull { page_number: 6, .. })));
    assert_eq!(page.row_count(), 1);
}

#[test]
fn test_row_count_limit() {
    let format = FileFormat::Jet4.jet_format();
    let mut page = DataPage::new(6, 0);
    for _ in 0..MAX_ROWS_PER_PAGE {
        page.add_row(&[1], format).unwrap();
    }
    assert!(matches!(
        page.add_row(&[1], format),
        Err(DatabaseError::PageFull { .. })
    ));
}

#[test]
fn test_set_row_requires_same_length() {
    let format = FileFormat::Jet4.jet_format();
    let mut page = DataPage::new(8, 0);
    page.add_row(&[0u8; 4], format).unwrap();
    page.set_row(0, &[9u8; 4]).unwrap();
    assert_eq!(page.row(0).unwrap(), &[9u8; 4]);
    assert!(page.set_row(0, &[1u8; 5]).is_err());
}

#[test]
fn test_wrong_page_type_rejected() {
    let format = FileFormat::Jet4.jet_format();
    let mut bytes = vec![0u8; format.page_size];
    bytes[0] = PageType::IndexLeaf.as_u8();
    assert!(matches!(
        DataPage::from_bytes(&bytes, 10, format),
        Err(DatabaseError::UnexpectedPageType {
            page_number: 10,
            actual: 0x04,
            ..
        })
    ));
    assert!(matches!(
        DataPage::from_bytes(&bytes[..100], 10, format),
        Err(DatabaseError::InvalidPageSize { .. })
    ));
}

#[test]
fn test_page_type_codes() {
    for page_type in [
        PageType::Data,
        PageType::TableDefinition,
        PageType::IndexNode,
        PageType::IndexLeaf,
        PageType::UsageMap,
    ] {
        assert_eq!(PageType::from_u8(page_type.as_u8()).unwrap(), page_type);
    }
    assert!(PageType::from_u8(0x42).is_err());
}
