use ags_sync_core::config::SyncConfig;
use ags_sync_core::contract::{DocumentKind, MockServiceDirectory, ServiceEntry, ServiceListing};
use ags_sync_core::document::PublishOptions;
use ags_sync_core::finder::{merge_service_list, scan_root, DocumentFinder, SourceDocument};
use ags_sync_core::history::{read_table, write_table, HistoryRecord};
use ags_sync_core::server::ServerReference;
use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).unwrap();
    }
    write(path, b"doc").unwrap();
}

fn paths(documents: &[SourceDocument]) -> Vec<PathBuf> {
    documents.iter().map(|d| d.path.clone()).collect()
}

#[test]
fn scan_picks_recognized_files_one_level_deep() {
    let root = tempdir().unwrap();
    let r = root.path();
    touch(&r.join("map1.mxd"));
    touch(&r.join("Layer.LYR"));
    touch(&r.join("notes.txt"));
    touch(&r.join("sub/map2.mxd"));
    touch(&r.join("sub/deeper/map3.mxd"));
    create_dir_all(r.join("folder.mxd")).unwrap();

    let documents = scan_root(r);

    assert_eq!(
        paths(&documents),
        vec![r.join("Layer.LYR"), r.join("map1.mxd"), r.join("sub/map2.mxd")]
    );
    let nested = &documents[2];
    assert_eq!(nested.folder.as_deref(), Some("sub"));
    assert_eq!(nested.base_name, "map2");
    assert_eq!(nested.identity().service_path(), "sub/map2");
    assert_eq!(documents[1].identity().service_path(), "map1");
    assert_eq!(documents[1].kind, DocumentKind::Map);
}

#[test]
fn missing_root_scans_nothing() {
    assert!(scan_root(Path::new("/definitely/not/here")).is_empty());
}

#[test]
fn history_table_round_trips_empty_cells() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let records = vec![
        HistoryRecord {
            source_path: Some(PathBuf::from("/data/a.mxd")),
            service_folder: None,
            service_name: "a".into(),
        },
        HistoryRecord::from_server(Some("f1".into()), "stale".into()),
    ];

    write_table(&path, &records).unwrap();

    assert_eq!(read_table(&path), Some(records));
}

#[test]
fn malformed_history_is_rejected_whole() {
    let dir = tempdir().unwrap();
    let narrow = dir.path().join("narrow.csv");
    write(&narrow, "source_path,service_name\n/a.mxd,a\n").unwrap();
    assert_eq!(read_table(&narrow), None);

    let short_row = dir.path().join("short.csv");
    write(&short_row, "source_path,service_folder,service_name\n/a.mxd,,a\n/b.mxd\n").unwrap();
    assert_eq!(read_table(&short_row), None);

    let no_name = dir.path().join("noname.csv");
    write(&no_name, "source_path,service_folder,service_name\n/a.mxd,f,\n").unwrap();
    assert_eq!(read_table(&no_name), None);
}

fn finder_with(documents: Vec<SourceDocument>, history: Option<Vec<HistoryRecord>>) -> DocumentFinder {
    DocumentFinder::from_parts(
        PathBuf::from("/root"),
        documents,
        history,
        ServerReference::default(),
        PublishOptions::default(),
    )
}

#[test]
fn unpublishes_only_services_no_longer_backed_by_a_source() {
    let root = tempdir().unwrap();
    let path_a = root.path().join("a.mxd");
    let path_b = root.path().join("f1/b.mxd");
    touch(&path_a);
    touch(&path_b);

    let documents = vec![
        SourceDocument::new(path_a.clone(), None),
        SourceDocument::new(path_b, Some("f1".into())),
    ];
    let history = vec![
        HistoryRecord {
            source_path: Some(path_a),
            service_folder: None,
            service_name: "a".into(),
        },
        HistoryRecord::from_server(Some("f1".into()), "stale".into()),
    ];

    let finder = finder_with(documents, Some(history));
    let unpublish: Vec<String> = finder
        .items_to_unpublish()
        .iter()
        .filter_map(|d| d.service_path())
        .collect();

    assert_eq!(unpublish, vec!["f1/stale".to_string()]);
    assert_eq!(finder.items_to_publish().len(), 2);
}

#[test]
fn server_seeded_history_matches_publish_paths_case_insensitively() {
    let root = tempdir().unwrap();
    let path = root.path().join("Roads/Highways.mxd");
    touch(&path);

    let documents = vec![SourceDocument::new(path, Some("Roads".into()))];
    let history = vec![HistoryRecord::from_server(Some("roads".into()), "HIGHWAYS".into())];

    assert!(finder_with(documents, Some(history)).items_to_unpublish().is_empty());
}

#[test]
fn recorded_source_that_was_removed_is_unpublished() {
    let root = tempdir().unwrap();
    let kept = root.path().join("kept.mxd");
    touch(&kept);

    let history = vec![HistoryRecord {
        source_path: Some(root.path().join("removed.mxd")),
        service_folder: None,
        service_name: "removed".into(),
    }];

    let finder = finder_with(vec![SourceDocument::new(kept, None)], Some(history));
    let unpublish = finder.items_to_unpublish();
    assert_eq!(unpublish.len(), 1);
    assert_eq!(unpublish[0].service_path().as_deref(), Some("removed"));
    assert!(unpublish[0].source().is_none());
}

#[test]
fn empty_scan_never_unpublishes() {
    let history = vec![HistoryRecord::from_server(None, "everything".into())];
    assert!(finder_with(vec![], Some(history)).items_to_unpublish().is_empty());
}

#[test]
fn no_history_means_nothing_to_unpublish() {
    let root = tempdir().unwrap();
    let path = root.path().join("a.mxd");
    touch(&path);
    assert!(finder_with(vec![SourceDocument::new(path, None)], None)
        .items_to_unpublish()
        .is_empty());
}

#[test]
fn service_list_overrides_and_adds_documents() {
    let root = tempdir().unwrap();
    let scanned = root.path().join("parcels.mxd");
    let extra = root.path().join("elsewhere/elevation.tif");
    touch(&scanned);
    touch(&extra);

    let mut documents = vec![SourceDocument::new(scanned.clone(), None)];
    merge_service_list(
        &mut documents,
        vec![
            HistoryRecord {
                source_path: Some(scanned),
                service_folder: Some("Cadastre".into()),
                service_name: "Parcels 2024".into(),
            },
            HistoryRecord {
                source_path: Some(extra.clone()),
                service_folder: None,
                service_name: "Elevation".into(),
            },
            HistoryRecord {
                source_path: Some(root.path().join("missing.mxd")),
                service_folder: None,
                service_name: "Missing".into(),
            },
        ],
    );

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].identity().service_path(), "Cadastre/Parcels_2024");
    assert_eq!(documents[1].path, extra);
    assert_eq!(documents[1].kind, DocumentKind::Image);
    assert_eq!(documents[1].identity().service_path(), "Elevation");
}

#[tokio::test]
async fn missing_history_file_is_a_first_run() {
    let root = tempdir().unwrap();
    touch(&root.path().join("a.mxd"));
    let config = SyncConfig {
        root_directory: Some(root.path().to_path_buf()),
        history_file: Some(root.path().join("history.csv")),
        ..Default::default()
    };
    let directory = MockServiceDirectory::new();

    let finder = DocumentFinder::new(&config, &directory).await;

    assert_eq!(finder.history(), Some(&[][..]));
    assert!(finder.items_to_unpublish().is_empty());
}

#[tokio::test]
async fn history_is_seeded_from_server_without_history_file() {
    let root = tempdir().unwrap();
    touch(&root.path().join("current.mxd"));
    let config = SyncConfig {
        root_directory: Some(root.path().to_path_buf()),
        server_url: Some("https://gis.example.com/arcgis".into()),
        ..Default::default()
    };
    let mut directory = MockServiceDirectory::new();
    directory
        .expect_list_services()
        .withf(|_, folder| folder.is_none())
        .times(1)
        .returning(|_, _| {
            Ok(ServiceListing {
                folders: Some(vec![]),
                services: vec![
                    ServiceEntry {
                        name: "current".into(),
                        service_type: "MapServer".into(),
                    },
                    ServiceEntry {
                        name: "orphan".into(),
                        service_type: "MapServer".into(),
                    },
                ],
            })
        });

    let finder = DocumentFinder::new(&config, &directory).await;

    assert_eq!(finder.history().map(<[HistoryRecord]>::len), Some(2));
    let unpublish: Vec<String> = finder
        .items_to_unpublish()
        .iter()
        .filter_map(|d| d.service_path())
        .collect();
    assert_eq!(unpublish, vec!["orphan".to_string()]);
}

#[tokio::test]
async fn unreachable_server_means_no_history() {
    let root = tempdir().unwrap();
    touch(&root.path().join("current.mxd"));
    let config = SyncConfig {
        root_directory: Some(root.path().to_path_buf()),
        server_url: Some("https://gis.example.com/arcgis".into()),
        ..Default::default()
    };
    let mut directory = MockServiceDirectory::new();
    directory
        .expect_list_services()
        .returning(|_, _| Err("connection refused".into()));

    let finder = DocumentFinder::new(&config, &directory).await;

    assert_eq!(finder.history(), None);
    assert!(finder.items_to_unpublish().is_empty());
}
