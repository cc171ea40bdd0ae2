use chrono::NaiveDate;
use jetdb::{
    index::{char_table::CharTable, column::ColumnSpec},
    types::{
        error::DatabaseError,
        value::{DataType, Value},
    },
};
use proptest::prelude::*;

fn encode(spec: &ColumnSpec, value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    spec.encode(value, CharTable::general(), &mut out).unwrap();
    out
}

fn round_trip(spec: &ColumnSpec, value: Value) {
    let encoded = encode(spec, &value);
    let (decoded, consumed) = spec.decode(&encoded, CharTable::general()).unwrap();
    assert_eq!(decoded, value, "{} round trip", spec.data_type);
    assert_eq!(consumed, encoded.len());
}

#[test]
fn test_round_trip_every_type() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_milli_opt(13, 45, 10, 125)
        .unwrap();
    let cases = vec![
        (DataType::Boolean, Value::Boolean(true)),
        (DataType::Boolean, Value::Boolean(false)),
        (DataType::Byte, Value::Byte(250)),
        (DataType::Int, Value::Int(-1234)),
        (DataType::Long, Value::Long(i32::MIN)),
        (DataType::BigInt, Value::BigInt(-45309590834)),
        (DataType::Money, Value::Money(-1_2345)),
        (DataType::Float, Value::Float(-3.5)),
        (DataType::Double, Value::Double(1.0e300)),
        (DataType::DateTime, Value::DateTime(date)),
        (DataType::Binary, Value::Binary(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9])),
        (DataType::Binary, Value::Binary(vec![0xFF; 8])),
        (DataType::Guid, Value::Guid(core::array::from_fn(|i| (i * 17) as u8))),
        (DataType::Text, Value::text("hello world")),
        (DataType::Memo, Value::text("caf\u{e9} \u{fc}ber stra\u{df}e")),
        (DataType::Text, Value::text("co-op")),
        (DataType::Text, Value::text("\u{436}\u{443}\u{43a}")),
        (DataType::Long, Value::Null),
    ];
    for (data_type, value) in cases {
        round_trip(&ColumnSpec::new(0, "c", data_type), value.clone());
        round_trip(&ColumnSpec::new(0, "c", data_type).descending(), value);
    }

    let numeric = ColumnSpec::new(0, "amount", DataType::Numeric).with_scale(2);
    round_trip(&numeric, Value::Numeric { unscaled: -123456, scale: 2 });
}

#[test]
fn test_numeric_rescales_to_column_scale() {
    let spec = ColumnSpec::new(0, "amount", DataType::Numeric).with_scale(2);
    let from_integer = encode(&spec, &Value::Long(5));
    let exact = encode(&spec, &Value::Numeric { unscaled: 500, scale: 2 });
    let wider = encode(&spec, &Value::Numeric { unscaled: 50009, scale: 4 });
    assert_eq!(from_integer, exact);
    assert_eq!(wider, exact);
}

#[test]
fn test_boolean_never_null() {
    let spec = ColumnSpec::new(0, "flag", DataType::Boolean);
    assert!(!spec.is_null(&Value::Null));
    assert_eq!(encode(&spec, &Value::Null), vec![0xFF]);
    assert_eq!(encode(&spec, &Value::Boolean(true)), vec![0x00]);
    assert!(encode(&spec, &Value::Boolean(true)) < encode(&spec, &Value::Boolean(false)));
}

#[test]
fn test_null_sorts_first_ascending_and_last_descending() {
    let ascending = ColumnSpec::new(0, "c", DataType::Long);
    let descending = ascending.clone().descending();
    assert!(encode(&ascending, &Value::Null) < encode(&ascending, &Value::Long(i32::MIN)));
    assert!(encode(&descending, &Value::Null) > encode(&descending, &Value::Long(i32::MIN)));
}

#[test]
fn test_type_mismatch_and_overflow() {
    let spec = ColumnSpec::new(0, "small", DataType::Int);
    let mut out = Vec::new();
    assert!(matches!(
        spec.encode(&Value::text("x"), CharTable::general(), &mut out),
        Err(DatabaseError::TypeMismatch { .. })
    ));
    assert!(matches!(
        spec.encode(&Value::Long(70000), CharTable::general(), &mut out),
        Err(DatabaseError::TypeMismatch { .. })
    ));
    assert!(spec.encode(&Value::Long(700), CharTable::general(), &mut out).is_ok());
}

#[test]
fn test_text_collation_groups_case() {
    let spec = ColumnSpec::new(0, "name", DataType::Text);
    let bar = encode(&spec, &Value::text("bar"));
    assert_eq!(bar, vec![0x7F, 0x61, 0x60, 0x71, 0x01, 0x00]);
    assert_eq!(encode(&spec, &Value::text("Bar")), bar);
    assert_eq!(encode(&spec, &Value::text("BAR")), bar);
    assert!(bar < encode(&spec, &Value::text("baz")));

    // decoding yields the collation-normal form
    let (decoded, _) = spec.decode(&encode(&spec, &Value::text("BAR")), CharTable::general()).unwrap();
    assert_eq!(decoded, Value::text("bar"));
}

#[test]
fn test_text_weights_follow_collation_classes() {
    let spec = ColumnSpec::new(0, "name", DataType::Text);
    let ordered = [" ", "!", "0", "9", "a", "e", "\u{e9}", "f", "z", "\u{fe}"];
    for pair in ordered.windows(2) {
        assert!(
            encode(&spec, &Value::text(pair[0])) < encode(&spec, &Value::text(pair[1])),
            "{:?} < {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_decode_rejects_bad_flag() {
    let spec = ColumnSpec::new(0, "c", DataType::Long);
    assert!(matches!(
        spec.decode(&[0x42, 0, 0, 0, 0], CharTable::general()),
        Err(DatabaseError::EntryDecode { .. })
    ));
    assert!(spec.decode(&[0x7F, 0x80], CharTable::general()).is_err());
}

fn key_of(specs: &[ColumnSpec], values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for (spec, value) in specs.iter().zip(values) {
        spec.encode(value, CharTable::general(), &mut out).unwrap();
    }
    out
}

proptest! {
    #[test]
    fn prop_big_int_order(a in any::<i64>(), b in any::<i64>()) {
        let spec = ColumnSpec::new(0, "n", DataType::BigInt);
        let (ka, kb) = (encode(&spec, &Value::BigInt(a)), encode(&spec, &Value::BigInt(b)));
        prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));

        let descending = spec.descending();
        let (ka, kb) = (encode(&descending, &Value::BigInt(a)), encode(&descending, &Value::BigInt(b)));
        prop_assert_eq!(ka.cmp(&kb), b.cmp(&a));
    }

    #[test]
    fn prop_double_order(a in -1.0e12f64..1.0e12, b in -1.0e12f64..1.0e12) {
        prop_assume!(a != b);
        let spec = ColumnSpec::new(0, "d", DataType::Double);
        let (ka, kb) = (encode(&spec, &Value::Double(a)), encode(&spec, &Value::Double(b)));
        prop_assert_eq!(ka < kb, a < b);
    }

    #[test]
    fn prop_text_order_is_case_insensitive(a in "[a-zA-Z0-9 ]{0,12}", b in "[a-zA-Z0-9 ]{0,12}") {
        let spec = ColumnSpec::new(0, "t", DataType::Text);
        let (ka, kb) = (encode(&spec, &Value::text(a.clone())), encode(&spec, &Value::text(b.clone())));
        prop_assert_eq!(ka.cmp(&kb), a.to_lowercase().cmp(&b.to_lowercase()));
    }

    #[test]
    fn prop_composite_order(
        a in ("[a-z]{0,6}", any::<i32>()),
        b in ("[a-z]{0,6}", any::<i32>()),
    ) {
        let specs = [
            ColumnSpec::new(0, "name", DataType::Text),
            ColumnSpec::new(1, "age", DataType::Long).descending(),
        ];
        let ka = key_of(&specs, &[Value::text(a.0.clone()), Value::Long(a.1)]);
        let kb = key_of(&specs, &[Value::text(b.0.clone()), Value::Long(b.1)]);
        let expected = a.0.cmp(&b.0).then(b.1.cmp(&a.1));
        prop_assert_eq!(ka.cmp(&kb), expected);
    }

    #[test]
    fn prop_binary_round_trip(bytes in proptest::collection::vec(any::<u8>(), 1..40)) {
        let spec = ColumnSpec::new(0, "b", DataType::Binary);
        let encoded = encode(&spec, &Value::Binary(bytes.clone()));
        let (decoded, consumed) = spec.decode(&encoded, CharTable::general()).unwrap();
        prop_assert_eq!(decoded, Value::Binary(bytes));
        prop_assert_eq!(consumed, encoded.len());
    }
}
