use std::ffi::OsString;
use std::fs;
use std::path::Path;

use tasklist_core::codec::{self, Format, ImportError};
use tasklist_core::dashboard::summarize;
use tasklist_core::datastore::DataStore;
use tasklist_core::ops::delete_todo;
use tasklist_core::task::Todo;
use tasklist_core::view::{SortKey, ViewSpec, build_view};
use tempfile::tempdir;

fn todo(title: &str, detail: Option<&str>, checked: bool) -> Todo {
    let mut t = Todo::new(title.to_string());
    t.detail = detail.map(str::to_string);
    t.checked = checked;
    t
}

#[test]
fn store_roundtrip_and_delete() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut a = todo("A", Some("first"), false);
    a.tags = vec!["home".to_string()];
    a.due_date = Some("2026-03-01".to_string());
    store
        .save_todos(&[a.clone(), todo("B", None, true)])
        .expect("save");

    let mut todos = store.load_todos().expect("load");
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0], a);

    let removed = delete_todo(&mut todos, 0).expect("delete");
    assert_eq!(removed.title, "A");
    store.save_todos(&todos).expect("save");

    let todos = store.load_todos().expect("reload");
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].title, "B");
    assert!(todos[0].checked);
}

#[test]
fn csv_import_into_empty_store_then_duplicate_is_noop() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(&temp.path().join("data")).expect("open datastore");
    let file = temp.path().join("in.csv");
    fs::write(&file, "title,detail,checked\n\"X\",\"Y\",true\n").expect("write csv");

    let decoded = codec::read_import_file(&file).expect("decode");
    let mut todos = store.load_todos().expect("load");
    let report = codec::merge_imported(&mut todos, decoded.candidates);
    assert_eq!(report.added, 1);
    store.save_todos(&todos).expect("save");

    let stored = store.load_todos().expect("reload");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "X");
    assert_eq!(stored[0].detail.as_deref(), Some("Y"));
    assert!(stored[0].checked);
    assert!(stored[0].id.is_some());

    let again = codec::read_import_file(&file).expect("decode again");
    let mut todos = store.load_todos().expect("load");
    let report = codec::merge_imported(&mut todos, again.candidates);
    assert_eq!(report.added, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(todos, stored);
}

#[test]
fn csv_export_reimports_into_fresh_store() {
    let temp = tempdir().expect("tempdir");
    let original = vec![
        todo("plain", None, false),
        todo("with \"quotes\", and comma", Some("line detail"), true),
    ];

    let text = codec::encode(&original, Format::Csv).expect("encode");
    let file = temp.path().join(Format::Csv.default_file_name());
    fs::write(&file, text).expect("write export");

    let decoded = codec::read_import_file(&file).expect("decode");
    let mut fresh = Vec::new();
    let report = codec::merge_imported(&mut fresh, decoded.candidates);
    assert_eq!(report.added, 2);

    let triples: Vec<(String, String, bool)> = fresh
        .iter()
        .map(|t| (t.title.clone(), t.detail_text().to_string(), t.checked))
        .collect();
    assert_eq!(
        triples,
        vec![
            ("plain".to_string(), String::new(), false),
            (
                "with \"quotes\", and comma".to_string(),
                "line detail".to_string(),
                true
            ),
        ]
    );
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let file = temp.path().join("todos.txt");
    fs::write(&file, "[]").expect("write");

    let err = codec::read_import_file(&file).expect_err("txt should fail");
    assert!(matches!(err, ImportError::UnsupportedExtension { .. }));
}

#[test]
fn dashboard_and_sorted_views() {
    let mut todos = vec![
        todo("a", None, true),
        todo("b", None, false),
        todo("c", None, true),
        todo("d", None, false),
    ];
    assert_eq!(summarize(&todos).completion_rate, 50);

    todos[0].due_date = Some("2026-05-01".to_string());
    todos[2].due_date = Some("2026-04-01".to_string());
    todos[1].priority = Some("low".to_string());
    todos[3].priority = Some("high".to_string());

    let by_due = ViewSpec {
        sort: SortKey::Due,
        ..ViewSpec::default()
    };
    let order: Vec<usize> = build_view(&todos, &by_due).iter().map(|r| r.index).collect();
    assert_eq!(order, vec![2, 0, 1, 3]);

    let by_priority = ViewSpec {
        sort: SortKey::Priority,
        ..ViewSpec::default()
    };
    let order: Vec<usize> = build_view(&todos, &by_priority)
        .iter()
        .map(|r| r.index)
        .collect();
    assert_eq!(order, vec![3, 0, 2, 1]);
}

fn run_in(rc: &Path, data: &Path, args: &[&str]) -> anyhow::Result<()> {
    let mut argv: Vec<OsString> = vec![
        "todo".into(),
        "--config".into(),
        rc.into(),
        "--data".into(),
        data.into(),
    ];
    argv.extend(args.iter().map(OsString::from));
    tasklist_core::run(argv)
}

#[test]
fn commands_require_login_then_mutate_store() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("rc");
    fs::write(&rc, "color=off\n").expect("write rc");
    let data = temp.path().join("data");

    let err = run_in(&rc, &data, &["list"]).expect_err("gate");
    assert!(format!("{err:#}").contains("not logged in"));

    assert!(run_in(&rc, &data, &["login", "user", "nope"]).is_err());
    run_in(&rc, &data, &["login", "user", "pass"]).expect("login");

    run_in(
        &rc,
        &data,
        &["add", "Buy milk", "--priority", "high", "--tag", "home,errand"],
    )
    .expect("add");
    run_in(&rc, &data, &["add", "Call mom"]).expect("add");
    run_in(&rc, &data, &["toggle", "1"]).expect("toggle");
    run_in(&rc, &data, &["toggle", "9"]).expect("out of range is a no-op");

    let store = DataStore::open(&data).expect("open");
    let todos = store.load_todos().expect("load");
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0].priority.as_deref(), Some("high"));
    assert_eq!(todos[0].tags, vec!["home", "errand"]);
    assert!(!todos[0].checked);
    assert!(todos[1].checked);

    run_in(&rc, &data, &["delete", "0", "--yes"]).expect("delete");
    let todos = store.load_todos().expect("load");
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].title, "Call mom");

    run_in(&rc, &data, &["logout"]).expect("logout");
    assert!(run_in(&rc, &data, &["dashboard"]).is_err());
}
