//! End-to-end engine scenarios over the public API: a dataset with two
//! coordinate variables and one dependent variable, edited the way file
//! tools would.

use ncfs::dataset::{AttrValue, DatasetStore, InMemoryDataset};
use ncfs::repr::FlatTextVardata;
use ncfs::vfs::{FsError, NcFs};

use std::sync::{Arc, Mutex};

fn dataset() -> Arc<Mutex<InMemoryDataset>> {
    let mut ds = InMemoryDataset::new();
    ds.create_dimension("x", 3).unwrap();
    ds.create_dimension("y", 3).unwrap();
    ds.create_variable("x", &["x"]).unwrap();
    ds.create_variable("y", &["y"]).unwrap();
    ds.set_variable_data("x", vec![1.0, 2.0, 3.0]).unwrap();
    ds.set_variable_data("y", vec![4.0, 5.0, 6.0]).unwrap();
    ds.create_variable("foovar", &["x", "y"]).unwrap();
    ds.set_variable_attr("foovar", "fooattr", AttrValue::Text("abc".into()))
        .unwrap();
    ds.set_global_attr("attr1", AttrValue::Text("abcdefgh".into()))
        .unwrap();
    Arc::new(Mutex::new(ds))
}

fn engine(ds: Arc<Mutex<InMemoryDataset>>) -> NcFs<InMemoryDataset> {
    NcFs::with_shared(ds, Box::new(FlatTextVardata::new()))
}

fn read_to_string(fs: &NcFs<InMemoryDataset>, path: &str) -> String {
    String::from_utf8(fs.read(path, u32::MAX, 0).unwrap().to_vec()).unwrap()
}

#[test]
fn a_session_of_ordinary_file_edits() {
    let shared = dataset();
    let fs = engine(shared.clone());

    // Inspect the tree.
    assert_eq!(fs.readdir("/"), vec![".", "..", "x", "y", "foovar", "attr1"]);
    assert_eq!(
        fs.readdir("/foovar"),
        vec![".", "..", "fooattr", "DATA_REPR", "DIMENSIONS"]
    );
    assert_eq!(read_to_string(&fs, "/foovar/DIMENSIONS"), "x\ny\n");
    assert_eq!(read_to_string(&fs, "/x/DATA_REPR"), "1.000000\n2.000000\n3.000000\n");

    // Overwrite an attribute the way `echo abc > file` would: truncate,
    // then write from offset zero.
    fs.truncate("/foovar/fooattr", 0).unwrap();
    fs.write("/foovar/fooattr", b"overwritten\n", 0).unwrap();
    assert_eq!(read_to_string(&fs, "/foovar/fooattr"), "overwritten\n");

    // Append.
    fs.write("/attr1", b"-more", 8).unwrap();
    assert_eq!(read_to_string(&fs, "/attr1"), "abcdefgh-more\n");

    // Create, rename, delete.
    fs.create("/foovar/units", 0o644).unwrap();
    assert_eq!(read_to_string(&fs, "/foovar/units"), "");
    fs.write("/foovar/units", b"K\n", 0).unwrap();
    fs.rename("/foovar/units", "/foovar/unit").unwrap();
    assert_eq!(read_to_string(&fs, "/foovar/unit"), "K\n");
    fs.unlink("/foovar/unit").unwrap();
    assert_eq!(fs.getattr("/foovar/unit"), Err(FsError::NotFound));
}

#[test]
fn swapping_dimensions_swaps_coordinate_data() {
    let shared = dataset();
    let fs = engine(shared.clone());

    fs.write("/foovar/DIMENSIONS", b"y\nx\n", 0).unwrap();

    assert_eq!(read_to_string(&fs, "/foovar/DIMENSIONS"), "y\nx\n");
    assert_eq!(read_to_string(&fs, "/x/DATA_REPR"), "4.000000\n5.000000\n6.000000\n");
    assert_eq!(read_to_string(&fs, "/y/DATA_REPR"), "1.000000\n2.000000\n3.000000\n");

    let ds = shared.lock().unwrap();
    assert_eq!(
        ds.variable_dimensions("foovar").unwrap(),
        vec!["y".to_string(), "x".to_string()]
    );
    // No reservation placeholders survive the two-phase rename.
    for name in ds.dimension_names() {
        assert!(!name.contains('~'), "leaked placeholder: {name}");
    }
}

#[test]
fn rejected_dimension_edits_leave_no_trace() {
    let shared = dataset();
    let fs = engine(shared.clone());

    let before = shared.lock().unwrap().revision();
    // Length mismatch: a one-line file for a two-dimensional variable.
    fs.write("/foovar/DIMENSIONS", b"onlyonedimname\n", 0)
        .unwrap();
    // Collision: renaming y onto the untouched x.
    fs.write("/foovar/DIMENSIONS", b"x\nx\n", 0).unwrap();

    let ds = shared.lock().unwrap();
    assert_eq!(ds.revision(), before);
    assert_eq!(
        ds.variable_dimensions("foovar").unwrap(),
        vec!["x".to_string(), "y".to_string()]
    );
}

#[test]
fn truncate_pads_global_attributes_with_spaces() {
    let shared = dataset();
    let fs = engine(shared);

    fs.truncate("/attr1", 10).unwrap();
    let st = fs.getattr("/attr1").unwrap();
    // Ten characters plus the display newline.
    assert_eq!(st.size, 11);
    assert_eq!(read_to_string(&fs, "/attr1"), "abcdefgh  \n");
}

#[test]
fn renaming_a_coordinate_variable_carries_its_dimension() {
    let shared = dataset();
    let fs = engine(shared.clone());

    fs.rename("/x", "/longitude").unwrap();

    assert_eq!(read_to_string(&fs, "/foovar/DIMENSIONS"), "longitude\ny\n");
    let ds = shared.lock().unwrap();
    assert!(ds.has_dimension("longitude"));
    assert!(!ds.has_variable("x"));
    assert_eq!(ds.dimension_size("longitude"), Some(3));
}
