use camino::Utf8PathBuf;

use vahan_harvest::config::DEFAULT_STATES;
use vahan_harvest::manifest::{self, Manifest};

fn stored_manifest(states: &[String]) -> Manifest {
    let mut manifest = Manifest::new();
    for state in states {
        manifest.insert(state.clone(), vec![format!("{state} - AB1( 01-JAN-2004 )")]);
    }
    manifest
}

fn manifest_file(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("manifests").join("rto_manifest.json")).unwrap()
}

#[test]
fn partial_fetch_leaves_stored_file_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let path = manifest_file(&temp);
    let states = DEFAULT_STATES[..34]
        .iter()
        .map(|state| state.to_string())
        .collect::<Vec<_>>();
    stored_manifest(&states).save(&path).unwrap();
    let before = std::fs::read(path.as_std_path()).unwrap();

    let mut fresh = Manifest::new();
    for state in &states[..10] {
        fresh.insert(state.clone(), vec![format!("{state} - NEW9( 01-APR-2024 )")]);
    }

    let outcome = manifest::refresh(&path, &fresh, &states).unwrap();

    assert!(!outcome.persisted);
    assert_eq!(outcome.fetched.len(), 10);
    assert_eq!(outcome.fell_back.len(), 24);
    assert!(outcome.missing.is_empty());
    assert_eq!(outcome.manifest.len(), 34);
    assert_eq!(
        outcome.manifest.get(&states[0]).unwrap()[0],
        format!("{} - NEW9( 01-APR-2024 )", states[0])
    );
    assert_eq!(
        outcome.manifest.get(&states[33]).unwrap()[0],
        format!("{} - AB1( 01-JAN-2004 )", states[33])
    );
    assert_eq!(std::fs::read(path.as_std_path()).unwrap(), before);
}

#[test]
fn narrowed_state_list_keeps_other_stored_parents() {
    let temp = tempfile::tempdir().unwrap();
    let path = manifest_file(&temp);
    let states = DEFAULT_STATES[..34]
        .iter()
        .map(|state| state.to_string())
        .collect::<Vec<_>>();
    stored_manifest(&states).save(&path).unwrap();

    let mut fresh = Manifest::new();
    fresh.insert("Goa", vec!["PANAJI - GA1( 01-JAN-2004 )".to_string()]);

    let outcome = manifest::refresh(&path, &fresh, &["Goa".to_string()]).unwrap();

    assert!(outcome.persisted);
    assert_eq!(outcome.manifest.len(), 1);
    let stored = Manifest::load(&path).unwrap();
    assert_eq!(stored.len(), 34);
    assert_eq!(stored.get("Goa").unwrap(), ["PANAJI - GA1( 01-JAN-2004 )"]);
    assert_eq!(
        stored.get("Kerala").unwrap(),
        ["Kerala - AB1( 01-JAN-2004 )"]
    );
}

#[test]
fn complete_fetch_replaces_stored_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = manifest_file(&temp);
    let states = vec!["Goa".to_string(), "Kerala".to_string()];
    stored_manifest(&states).save(&path).unwrap();

    let mut fresh = Manifest::new();
    fresh.insert("Goa", vec!["PANAJI - GA1( 01-JAN-2004 )".to_string()]);
    fresh.insert("Kerala", vec!["KOCHI - KL7( 01-JAN-2004 )".to_string()]);

    let outcome = manifest::refresh(&path, &fresh, &states).unwrap();

    assert!(outcome.persisted);
    assert_eq!(Manifest::load(&path).unwrap(), fresh);
}

#[test]
fn first_partial_fetch_creates_no_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = manifest_file(&temp);
    let states = vec!["Goa".to_string(), "Kerala".to_string()];

    let mut fresh = Manifest::new();
    fresh.insert("Goa", vec!["PANAJI - GA1( 01-JAN-2004 )".to_string()]);

    let outcome = manifest::refresh(&path, &fresh, &states).unwrap();

    assert!(!outcome.persisted);
    assert_eq!(outcome.missing, ["Kerala"]);
    assert!(!path.as_std_path().exists());
}
