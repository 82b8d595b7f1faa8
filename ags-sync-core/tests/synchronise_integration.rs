use ags_sync_core::config::SyncConfig;
use ags_sync_core::contract::{
    MockServiceDirectory, MockToolchain, RawAnalysis, RawIssue, ServiceEntry, ServiceListing,
};
use ags_sync_core::error::PublishError;
use ags_sync_core::history::{read_table, HistoryRecord};
use ags_sync_core::synchronise::{synchronise, Action, Outcome};
use std::fs::{self, write, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

const BASE: &str = "https://gis.example.com/arcgis";

const DRAFT_XML: &str =
    "<SVCManifest><Name>a</Name><Type>esriServiceDefinitionType_New</Type></SVCManifest>";

fn make_old(path: &Path) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(100))
        .unwrap();
}

/// A root with `a.mxd` and a history file naming `a` and the server-side
/// leftover `Utilities/Water`.
fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("maps");
    fs::create_dir_all(&root).unwrap();
    let source = root.join("a.mxd");
    write(&source, b"map").unwrap();
    make_old(&source);
    let history = dir.path().join("history.csv");
    write(
        &history,
        format!(
            "source_path,service_folder,service_name\n{},,a\n,Utilities,Water\n",
            source.display()
        ),
    )
    .unwrap();
    (dir, source, history)
}

fn config(root: &Path, history: &Path, dry_run: bool) -> SyncConfig {
    SyncConfig {
        root_directory: Some(root.to_path_buf()),
        history_file: Some(history.to_path_buf()),
        server_url: Some(BASE.to_string()),
        admin_username: Some("admin".into()),
        admin_password: Some("secret".into()),
        dry_run,
        ..Default::default()
    }
}

fn drafting_toolchain() -> MockToolchain {
    let mut toolchain = MockToolchain::new();
    toolchain.expect_create_draft().times(1).returning(|request| {
        fs::write(&request.draft, DRAFT_XML).unwrap();
        Ok(RawAnalysis {
            messages: vec![RawIssue {
                key: ("Ready".into(), 0),
                layers: vec![],
            }],
            ..Default::default()
        })
    });
    toolchain
}

fn directory(root_services: Vec<&'static str>) -> MockServiceDirectory {
    let mut directory = MockServiceDirectory::new();
    directory
        .expect_list_services()
        .withf(|_, folder| folder.is_none())
        .returning(move |_, _| {
            Ok(ServiceListing {
                folders: Some(vec!["Utilities".into()]),
                services: root_services
                    .iter()
                    .map(|name| ServiceEntry {
                        name: name.to_string(),
                        service_type: "MapServer".into(),
                    })
                    .collect(),
            })
        });
    directory
        .expect_list_services()
        .withf(|_, folder| folder.as_deref() == Some("Utilities"))
        .returning(|_, _| {
            Ok(ServiceListing {
                folders: None,
                services: vec![ServiceEntry {
                    name: "Utilities/Water".into(),
                    service_type: "MapServer".into(),
                }],
            })
        });
    directory
        .expect_generate_token()
        .returning(|_, _| Ok("token".into()));
    directory
}

#[tokio::test]
async fn dry_run_reports_intended_changes_only() {
    let (dir, _source, history) = workspace();
    let before = fs::read_to_string(&history).unwrap();

    let mut toolchain = drafting_toolchain();
    toolchain.expect_stage_service().times(0);
    toolchain.expect_upload_service().times(0);
    let mut directory = directory(vec!["a"]);
    directory.expect_delete_service().times(0);

    let report = synchronise(&config(&dir.path().join("maps"), &history, true), &toolchain, &directory)
        .await
        .expect("run completes");

    assert_eq!(report.documents.len(), 2);
    let publish = &report.documents[0];
    assert_eq!(publish.action, Action::Publish);
    assert_eq!(
        publish.outcome,
        Outcome::WouldPublish {
            issues: "MESSAGES:\n  Ready (code 0)\n".into()
        }
    );
    let unpublish = &report.documents[1];
    assert_eq!(unpublish.action, Action::Unpublish);
    assert_eq!(unpublish.service_path().as_deref(), Some("Utilities/Water"));
    assert_eq!(
        unpublish.outcome,
        Outcome::WouldUnpublish {
            server_url: BASE.into()
        }
    );
    assert_eq!(report.history_written, None);
    assert_eq!(fs::read_to_string(&history).unwrap(), before);
}

#[tokio::test]
async fn real_run_publishes_unpublishes_and_rewrites_history() {
    let (dir, source, history) = workspace();

    let mut toolchain = drafting_toolchain();
    toolchain
        .expect_stage_service()
        .times(1)
        .returning(|_, staged| {
            fs::write(staged, b"sd").unwrap();
            Ok(())
        });
    toolchain
        .expect_upload_service()
        .times(1)
        .returning(|_, _| Ok(()));
    let mut directory = directory(vec![]);
    directory
        .expect_delete_service()
        .withf(|_, path, _, _| path == "Utilities/Water")
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let report = synchronise(&config(&dir.path().join("maps"), &history, false), &toolchain, &directory)
        .await
        .expect("run completes");

    assert_eq!(report.documents[0].outcome, Outcome::Published);
    assert_eq!(report.documents[1].outcome, Outcome::Unpublished);
    assert_eq!(report.failures(), 0);
    assert_eq!(report.history_written.as_deref(), Some(history.as_path()));
    assert_eq!(
        read_table(&history),
        Some(vec![HistoryRecord {
            source_path: Some(source),
            service_folder: None,
            service_name: "a".into(),
        }])
    );
}

#[tokio::test]
async fn one_failing_document_does_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    for name in ["a.mxd", "b.mxd"] {
        let path = dir.path().join(name);
        write(&path, b"map").unwrap();
        make_old(&path);
    }

    let mut toolchain = MockToolchain::new();
    toolchain.expect_create_draft().returning(|request| {
        if request.service_name == "a" {
            return Err("draft creation crashed".into());
        }
        fs::write(&request.draft, DRAFT_XML).unwrap();
        Ok(RawAnalysis::default())
    });
    toolchain
        .expect_stage_service()
        .times(1)
        .returning(|_, staged| {
            fs::write(staged, b"sd").unwrap();
            Ok(())
        });
    toolchain
        .expect_upload_service()
        .times(1)
        .returning(|_, _| Ok(()));
    let directory = MockServiceDirectory::new();

    let config = SyncConfig {
        root_directory: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let report = synchronise(&config, &toolchain, &directory)
        .await
        .expect("run completes");

    assert_eq!(report.documents.len(), 2);
    assert!(matches!(report.documents[0].outcome, Outcome::NotPublishable { .. }));
    assert_eq!(report.documents[1].outcome, Outcome::Published);
    assert_eq!(report.failures(), 1);
}

#[tokio::test]
async fn missing_root_setting_is_a_configuration_error() {
    let toolchain = MockToolchain::new();
    let directory = MockServiceDirectory::new();

    let err = synchronise(&SyncConfig::default(), &toolchain, &directory)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Configuration { .. }));
}
