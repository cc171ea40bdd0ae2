use chrono::NaiveDate;
use jetdb::types::{
    row_id::{ROW_ID_SIZE, RowId},
    value::{
        DataType, Value, date_to_jet_days, guid_from_stored, guid_to_stored, jet_days_to_date,
    },
};

#[test]
fn test_data_type_codes() {
    for data_type in [
        DataType::Boolean,
        DataType::Byte,
        DataType::Int,
        DataType::Long,
        DataType::Money,
        DataType::Float,
        DataType::Double,
        DataType::DateTime,
        DataType::Binary,
        DataType::Text,
        DataType::Memo,
        DataType::Guid,
        DataType::Numeric,
        DataType::BigInt,
    ] {
        assert_eq!(DataType::from_u8(data_type.as_u8()).unwrap(), data_type);
    }
    assert!(DataType::from_u8(0x0B).is_err());
    assert!(DataType::Memo.is_textual());
    assert!(!DataType::Binary.is_textual());
    assert_eq!(DataType::BigInt.to_string(), "BIG_INT");
}

#[test]
fn test_value_helpers() {
    assert!(Value::Null.is_null());
    assert!(!Value::Int(0).is_null());
    assert_eq!(Value::text("abc"), Value::Text("abc".to_string()));
    assert_eq!(Value::Byte(200).as_i64(), Some(200));
    assert_eq!(Value::Long(-5).as_i64(), Some(-5));
    assert_eq!(Value::Double(1.0).as_i64(), None);
    assert_eq!(Value::Money(0).type_name(), "MONEY");
}

#[test]
fn test_guid_parsing() {
    let guid = Value::guid_from_str("{00112233-4455-6677-8899-AABBCCDDEEFF}").unwrap();
    assert_eq!(
        guid,
        Value::Guid([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF
        ])
    );
    assert!(Value::guid_from_str("not-a-guid").is_err());
    assert!(Value::guid_from_str("{0011223G-4455-6677-8899-AABBCCDDEEFF}").is_err());
}

#[test]
fn test_guid_stored_order() {
    let canonical: [u8; 16] = core::array::from_fn(|i| i as u8);
    let stored = guid_to_stored(canonical);
    assert_eq!(&stored[..8], &[3, 2, 1, 0, 5, 4, 7, 6]);
    assert_eq!(&stored[8..], &canonical[8..]);
    assert_eq!(guid_from_stored(stored), canonical);
}

#[test]
fn test_jet_day_conversion() {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(date_to_jet_days(&epoch), 0.0);

    let noon = NaiveDate::from_ymd_opt(1900, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    assert_eq!(date_to_jet_days(&noon), 2.5);
    assert_eq!(jet_days_to_date(2.5).unwrap(), noon);

    let before = NaiveDate::from_ymd_opt(1850, 6, 15)
        .unwrap()
        .and_hms_milli_opt(8, 30, 15, 250)
        .unwrap();
    assert_eq!(jet_days_to_date(date_to_jet_days(&before)).unwrap(), before);

    assert!(jet_days_to_date(f64::NAN).is_err());
}

#[test]
fn test_row_id_layout() {
    let row_id = RowId::new(0x012345, 7);
    let mut bytes = Vec::new();
    row_id.write_to(&mut bytes);
    assert_eq!(bytes, vec![0x01, 0x23, 0x45, 0x07]);
    assert_eq!(bytes.len(), ROW_ID_SIZE);
    assert_eq!(RowId::read_from(&bytes).unwrap(), row_id);
    assert!(RowId::read_from(&bytes[..3]).is_err());
    assert_eq!(row_id.to_string(), "74565:7");
}

#[test]
fn test_row_id_order() {
    assert!(RowId::FIRST < RowId::new(1, 0));
    assert!(RowId::new(1, 200) < RowId::new(2, 0));
    assert!(RowId::new(0xFF_FFFE, 255) < RowId::LAST);
    assert!(!RowId::FIRST.is_valid());
    assert!(RowId::new(3, 1).is_valid());
}
