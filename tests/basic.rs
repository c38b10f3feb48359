use flexdb::command::make_command;
use flexdb::value::Access;
use flexdb::{CommandHandler, Database};

fn call(db: &Database, args: &[&str]) -> Option<flexdb::Value> {
    db.call(&make_command(args.iter().map(|s| s.to_string()))).unwrap()
}

fn as_string(v: Option<flexdb::Value>) -> Vec<u8> {
    Access::new(v.as_ref()).to_string().unwrap()
}

fn as_int(v: Option<flexdb::Value>) -> i32 {
    Access::new(v.as_ref()).to_integer().unwrap()
}

#[test]
fn set_get_del_cycle() {
    let db = Database::new();
    assert_eq!(as_string(call(&db, &["SET", "a", "1"])), b"OK");
    assert_eq!(as_string(call(&db, &["GET", "a"])), b"1");
    assert_eq!(as_int(call(&db, &["DEL", "a"])), 1);
    assert!(call(&db, &["GET", "a"]).is_none());
}

#[test]
fn rename_exists_incr() {
    let db = Database::new();
    call(&db, &["SET", "x", "41"]);
    assert_eq!(as_int(call(&db, &["EXISTS", "x"])), 1);
    assert_eq!(as_int(call(&db, &["INCR", "x"])), 42);
    assert_eq!(as_string(call(&db, &["RENAME", "x", "y"])), b"OK");
    assert_eq!(as_string(call(&db, &["GET", "y"])), b"42");
}

#[test]
fn hash_roundtrip() {
    let db = Database::new();
    assert_eq!(as_int(call(&db, &["HSET", "h", "f", "v"])), 1);
    assert_eq!(as_string(call(&db, &["HGET", "h", "f"])), b"v");
    assert_eq!(as_int(call(&db, &["HEXISTS", "h", "f"])), 1);
    assert_eq!(as_int(call(&db, &["HDEL", "h", "f"])), 1);
    assert!(call(&db, &["HGET", "h", "f"]).is_none());
}

#[test]
fn list_push_pop_range() {
    let db = Database::new();
    call(&db, &["RPUSH", "l", "a", "b", "c"]);
    assert_eq!(as_int(call(&db, &["LLEN", "l"])), 3);
    let r = call(&db, &["LRANGE", "l", "0", "-1"]).unwrap();
    let a = Access::new(Some(&r));
    assert_eq!(a.get_array_size().unwrap(), 3);
    assert_eq!(as_string(call(&db, &["LPOP", "l"])), b"a");
}

#[test]
fn set_algebra_store() {
    let db = Database::new();
    call(&db, &["SADD", "s1", "a", "b", "c"]);
    call(&db, &["SADD", "s2", "b", "c", "d"]);
    assert_eq!(as_int(call(&db, &["SINTERSTORE", "dest", "s1", "s2"])), 2);
    assert_eq!(as_int(call(&db, &["SCARD", "dest"])), 2);
}

#[test]
fn unknown_command_is_rejected() {
    let db = Database::new();
    let err = db.call(&make_command(["BOGUS"])).unwrap_err();
    assert_eq!(err.wire_message(), "Invalid command");
}

#[test]
fn type_mismatch_is_rejected() {
    let db = Database::new();
    call(&db, &["SET", "k", "v"]);
    let err = db.call(&make_command(["LPUSH", "k", "x"])).unwrap_err();
    assert_eq!(err.wire_message(), "Invalid type");
}

#[test]
fn sort_end_to_end() {
    let db = Database::new();
    call(&db, &["RPUSH", "l", "3", "1", "2"]);
    let r = call(&db, &["SORT", "l"]).unwrap();
    let a = Access::new(Some(&r));
    assert_eq!(a.index(0).unwrap().to_string().unwrap(), b"1");
    assert_eq!(a.index(2).unwrap().to_string().unwrap(), b"3");
}
