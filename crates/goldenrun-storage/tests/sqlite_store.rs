use indexmap::IndexMap;
use proptest::prelude::*;
use rusqlite::{params, Connection};

use goldenrun_core::payload::MAX_SNAPSHOT_DEPTH;
use goldenrun_core::{
    CallRecord, CallableIdentity, Class, Instance, Payload, RecordLogger, SnapshotError, Value,
};
use goldenrun_storage::{RecordStore, SqliteStore, StorageError, StoreLogger, DEFAULT_QUERY_LIMIT};

fn point(x: i64, y: i64) -> Payload {
    let mut fields = IndexMap::new();
    fields.insert("x".to_string(), Payload::Int(x));
    fields.insert("y".to_string(), Payload::Int(y));
    Payload::Object {
        class: "geo.Point".to_string(),
        fields,
    }
}

fn make_record(a: i64, b: i64) -> CallRecord {
    let mut args = IndexMap::new();
    args.insert("a".to_string(), Payload::Int(a));
    args.insert("b".to_string(), Payload::Int(b));
    CallRecord::new(CallableIdentity::new("geo", "make_point", true), args)
        .with_return(point(a, b))
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("golden.sqlite3");

    {
        let mut store = SqliteStore::new(&path).unwrap();
        store.add(&[make_record(1, 2)]).unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    let rows = store.get_records("make_point", DEFAULT_QUERY_LIMIT).unwrap();
    assert_eq!(rows.len(), 1);

    let decoded = rows[0].to_record().unwrap();
    let original = make_record(1, 2);
    assert_eq!(decoded.args, original.args);
    assert_eq!(decoded.return_value, original.return_value);
    assert!(decoded.captured);
    assert_eq!(decoded.to_call_record(), original);
}

#[test]
fn corrupted_payload_is_isolated_to_its_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("golden.sqlite3");

    let mut store = SqliteStore::new(&path).unwrap();
    store
        .add(&[make_record(1, 1), make_record(2, 2), make_record(3, 3)])
        .unwrap();

    // Damage the middle row behind the store's back.
    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE records SET serialized_return = ?1 WHERE id = 2",
        params![b"{broken".to_vec()],
    )
    .unwrap();
    drop(raw);

    let rows = store.get_records("make_point", DEFAULT_QUERY_LIMIT).unwrap();
    assert_eq!(rows.len(), 3);

    let results: Vec<_> = rows.iter().map(|row| row.to_record()).collect();
    let good: Vec<i64> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.id)
        .collect();
    assert_eq!(good, vec![3, 1]);

    let bad = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        bad,
        StorageError::Decode {
            id: 2,
            column: "serialized_return",
            ..
        }
    ));
}

#[test]
fn logger_flushes_one_batch_into_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("golden.sqlite3");

    let mut logger = StoreLogger::new(SqliteStore::new(&path).unwrap());
    for i in 0..4 {
        logger.log(make_record(i, i + 1));
    }
    logger.flush().unwrap();

    let store = logger.into_store();
    assert_eq!(store.get_records("make_point", 10).unwrap().len(), 4);
    assert_eq!(store.list_modules().unwrap(), vec!["geo"]);
}

fn measure(x: f64) -> CallRecord {
    let mut args = IndexMap::new();
    args.insert("x".to_string(), Payload::Float(x));
    CallRecord::new(CallableIdentity::new("geo", "measure", true), args)
        .with_return(Payload::Float(x))
}

proptest! {
    #[test]
    fn floats_come_back_bit_exact(
        xs in prop::collection::vec(any::<f64>().prop_filter("finite", |x| x.is_finite()), 1..32),
    ) {
        let mut store = SqliteStore::in_memory().unwrap();
        let records: Vec<CallRecord> = xs.iter().map(|&x| measure(x)).collect();
        store.add(&records).unwrap();

        let rows = store.get_records("measure", xs.len()).unwrap();
        prop_assert_eq!(rows.len(), xs.len());
        // Newest first.
        for (row, &x) in rows.iter().zip(xs.iter().rev()) {
            let decoded = row.to_record().unwrap();
            let arg = match decoded.args.get("x") {
                Some(Payload::Float(v)) => *v,
                other => return Err(TestCaseError::fail(format!("unexpected arg {:?}", other))),
            };
            prop_assert_eq!(arg.to_bits(), x.to_bits());
            prop_assert_eq!(decoded.return_value, Some(Payload::Float(x)));
        }
    }
}

#[test]
fn deepest_snapshot_is_readable() {
    let class = Class::new("geo", "Node", Vec::new()).unwrap();
    let mut node = Instance::new(class.clone());
    node.set("value", Value::Float(0.1));
    // Innermost field at depth MAX_SNAPSHOT_DEPTH - 1.
    for _ in 2..MAX_SNAPSHOT_DEPTH {
        let outer = Instance::new(class.clone());
        outer.set("next", Value::Instance(node));
        node = outer;
    }
    let deep = Payload::snapshot(&Value::Instance(node.clone())).unwrap();

    let mut args = IndexMap::new();
    args.insert("head".to_string(), deep.clone());
    let record =
        CallRecord::new(CallableIdentity::new("geo", "walk", true), args).with_return(deep);

    let mut store = SqliteStore::in_memory().unwrap();
    store.add(&[record.clone()]).unwrap();
    let rows = store.get_records("walk", 1).unwrap();
    assert_eq!(rows[0].to_record().unwrap().to_call_record(), record);

    let wrapper = Instance::new(class);
    wrapper.set("next", Value::Instance(node));
    assert!(matches!(
        Payload::snapshot(&Value::Instance(wrapper)),
        Err(SnapshotError::TooDeep { .. })
    ));
}
