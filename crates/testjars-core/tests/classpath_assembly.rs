use std::path::PathBuf;
use std::time::Duration;

use include_dir::{Dir, include_dir};
use testjars_core::classpath::ClasspathEntry;
use testjars_core::{
    Classpath, ExtractedResourceEntry, FileEntry, HarnessBuilder, HarnessConfig, HarnessError,
    RecursiveScanEntry, ResourceBundle,
};

static BUNDLE: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures/bundle");

fn config() -> HarnessConfig {
    HarnessConfig {
        port_timeout: Some(Duration::from_secs(5)),
        shutdown_grace: Duration::from_millis(200),
        executable: Some(PathBuf::from("java")),
        debug: None,
    }
}

#[test]
fn mixed_entries_keep_insertion_order() {
    let jars = tempfile::tempdir().unwrap();
    let jar = jars.path().join("app.jar");
    std::fs::write(&jar, b"PK").unwrap();
    let bundle = ResourceBundle::embedded(&BUNDLE);

    let mut classpath = Classpath::new();
    classpath
        .entry(FileEntry::new(&jar).unwrap())
        .entry(ExtractedResourceEntry::new(bundle.clone(), "app/config.yml", "config.yml"))
        .entry(RecursiveScanEntry::new(bundle, "app/static"));

    let paths = classpath.resolve().unwrap();
    assert_eq!(paths.len(), 3);
    assert_eq!(paths[0], jar.canonicalize().unwrap());
    assert!(paths[1].join("config.yml").is_file());
    assert!(paths[2].join("css/site.css").is_file());

    let joined = classpath.build().unwrap();
    assert_eq!(
        joined,
        std::env::join_paths(&paths).unwrap().into_string().unwrap()
    );

    classpath.cleanup().unwrap();
    assert!(jar.exists());
    assert!(!paths[1].exists());
    assert!(!paths[2].exists());
}

#[test]
fn default_configuration_adds_existing_files_only() {
    let bundle = ResourceBundle::embedded(&BUNDLE);
    let harness = HarnessBuilder::with_config(config())
        .default_configuration(&bundle, "petclinic")
        .build()
        .unwrap();

    // yml and properties exist in the fixture, yaml does not.
    let classpath = harness.classpath().to_vec();
    assert_eq!(classpath.len(), 2);
    assert!(classpath[0].join("application.yml").is_file());
    assert!(classpath[1].join("application.properties").is_file());

    drop(harness);
    assert!(classpath.iter().all(|dir| !dir.exists()));
}

#[test]
fn unknown_application_adds_nothing() {
    let bundle = ResourceBundle::embedded(&BUNDLE);
    let harness = HarnessBuilder::with_config(config())
        .default_configuration(&bundle, "no-such-app")
        .build()
        .unwrap();
    assert!(harness.classpath().is_empty());
}

#[test]
fn missing_resource_aborts_build() {
    let bundle = ResourceBundle::embedded(&BUNDLE);
    let err = HarnessBuilder::with_config(config())
        .resource(&bundle, "app/missing.yml", "missing.yml")
        .build()
        .unwrap_err();
    assert!(matches!(err, HarnessError::ResourceNotFound(_)));
}

#[test]
fn missing_jar_aborts_build() {
    let jars = tempfile::tempdir().unwrap();
    let jar = jars.path().join("gone.jar");
    std::fs::write(&jar, b"PK").unwrap();
    let builder = HarnessBuilder::with_config(config()).file(&jar).unwrap();
    std::fs::remove_file(&jar).unwrap();

    assert!(matches!(builder.build(), Err(HarnessError::MissingFile(_))));
}

#[test]
fn extracted_entry_is_idempotent_through_trait_object() {
    let mut entry: Box<dyn ClasspathEntry> = Box::new(ExtractedResourceEntry::for_same_path(
        ResourceBundle::embedded(&BUNDLE),
        "app/config.yml",
    ));
    let first = entry.resolve().unwrap();
    let second = entry.resolve().unwrap();
    assert_eq!(first, second);
    assert!(first[0].join("app/config.yml").is_file());
    entry.cleanup().unwrap();
}
