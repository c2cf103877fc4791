use buoy_etl::{
    data::Value,
    error::PipelineError,
    frame::Column,
    identity::{IdentityKeyBuilder, UNIQUE_ID_COLUMN},
    schema::ColumnType,
};
use proptest::prelude::*;

mod common;
use common::{datetime_column, day, frame, string_column};

fn keys_of(table: &buoy_etl::frame::Frame) -> Vec<String> {
    table
        .column(UNIQUE_ID_COLUMN)
        .expect("key column")
        .non_null()
        .map(Value::key_token)
        .collect()
}

#[test]
fn station_and_hour_form_the_key() {
    let table = frame(vec![
        string_column("Station ID", &["46025", "46026"]),
        datetime_column("Datetime", &[day(2024, 1, 10), day(2024, 1, 11)]),
    ]);
    let builder = IdentityKeyBuilder::new(vec!["Station ID".into(), "Datetime".into()]);
    let keyed = builder.build(table).expect("build");

    assert_eq!(keyed.column_names()[0], UNIQUE_ID_COLUMN);
    assert_eq!(
        keys_of(&keyed),
        vec!["4602520240110000000", "4602620240111000000"]
    );
}

#[test]
fn undelimited_keys_collide_on_ambiguous_boundaries() {
    let table = frame(vec![
        string_column("a", &["12", "1"]),
        string_column("b", &["3", "23"]),
    ]);
    let keys = ["a", "b"].map(String::from).to_vec();

    let plain = IdentityKeyBuilder::new(keys.clone())
        .build(table.clone())
        .expect("build");
    let plain_keys = keys_of(&plain);
    assert_eq!(plain_keys[0], plain_keys[1]);

    let delimited = IdentityKeyBuilder::new(keys)
        .with_delimiter(Some("|".into()))
        .build(table)
        .expect("build");
    assert_eq!(keys_of(&delimited), vec!["12|3", "1|23"]);
}

#[test]
fn null_key_cell_is_rejected() {
    let table = frame(vec![
        Column::new(
            "Station ID",
            ColumnType::String,
            vec![Some(Value::String("46025".into())), None],
        )
        .unwrap(),
    ]);
    let err = IdentityKeyBuilder::new(vec!["Station ID".into()])
        .build(table)
        .unwrap_err();
    assert!(matches!(err, PipelineError::NullKeyValue { row: 1, .. }));
}

#[test]
fn missing_key_column_is_rejected() {
    let table = frame(vec![string_column("Station ID", &["46025"])]);
    let err = IdentityKeyBuilder::new(vec!["Datetime".into()])
        .build(table)
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "Datetime"));
}

proptest! {
    #[test]
    fn delimited_keys_are_injective(
        pairs in prop::collection::hash_set(("[0-9]{1,4}", "[0-9]{1,4}"), 1..20)
    ) {
        let (left, right): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        let left_refs: Vec<&str> = left.iter().map(String::as_str).collect();
        let right_refs: Vec<&str> = right.iter().map(String::as_str).collect();
        let table = frame(vec![
            string_column("a", &left_refs),
            string_column("b", &right_refs),
        ]);
        let keyed = IdentityKeyBuilder::new(vec!["a".into(), "b".into()])
            .with_delimiter(Some("|".into()))
            .build(table)
            .expect("build");
        let keys = keys_of(&keyed);
        let distinct: std::collections::HashSet<&String> = keys.iter().collect();
        prop_assert_eq!(distinct.len(), keys.len());
    }
}
