use ags_sync::rest::{parse_delete_response, parse_token_response, services_url};
use ags_sync::toolchain::{CommandToolchain, ToolchainConfig};
use ags_sync_core::contract::{DocumentKind, DraftRequest, Toolchain};
use ags_sync_core::server::ServerTarget;
use std::ffi::OsString;
use std::path::PathBuf;

fn request() -> DraftRequest {
    DraftRequest {
        source: PathBuf::from("/maps/Utilities/water.mxd"),
        draft: PathBuf::from("/maps/Utilities/water.sddraft"),
        kind: DocumentKind::Map,
        service_name: "water".into(),
        service_folder: Some("Utilities".into()),
        server: ServerTarget::ConnectionFile(PathBuf::from("/conn/prod.ags")),
        copy_data_to_server: true,
        summary: None,
        tags: Some("water,pipes".into()),
    }
}

#[test]
fn token_response_yields_token() {
    let token = parse_token_response(r#"{"token":"abc","expires":1700000000000}"#).unwrap();
    assert_eq!(token, "abc");
}

#[test]
fn token_error_carries_server_message() {
    let err = parse_token_response(
        r#"{"error":{"code":400,"message":"Unable to generate token.","details":["Invalid username or password."]}}"#,
    )
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Unable to generate token."), "got {msg}");
    assert!(msg.contains("Invalid username or password."), "got {msg}");
}

#[test]
fn delete_status_error_is_a_failure() {
    assert!(parse_delete_response(r#"{"status":"success"}"#).is_ok());
    let err = parse_delete_response(r#"{"status":"error","messages":["Service not found"]}"#)
        .unwrap_err();
    assert!(err.to_string().contains("Service not found"));
    assert!(parse_delete_response("<html>").is_err());
}

#[test]
fn services_url_handles_folders_and_trailing_slash() {
    assert_eq!(
        services_url("https://gis/arcgis/", None),
        "https://gis/arcgis/rest/services"
    );
    assert_eq!(
        services_url("https://gis/arcgis", Some("Utilities")),
        "https://gis/arcgis/rest/services/Utilities"
    );
}

#[test]
fn create_draft_arguments_cover_every_option() {
    let args = CommandToolchain::create_draft_args(&request());
    let expected: Vec<OsString> = [
        "create-draft",
        "--source",
        "/maps/Utilities/water.mxd",
        "--draft",
        "/maps/Utilities/water.sddraft",
        "--name",
        "water",
        "--folder",
        "Utilities",
        "--kind",
        "map",
        "--server-type",
        "FROM_CONNECTION_FILE",
        "--connection",
        "/conn/prod.ags",
        "--copy-data",
        "--tags",
        "water,pipes",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    assert_eq!(args, expected);
}

#[cfg(unix)]
#[tokio::test]
async fn helper_output_and_failures_are_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("helper.sh");
    std::fs::write(
        &script,
        r#"
case "$1" in
  analyze) printf '{"errors":[{"key":["Broken layer",7],"layers":[{"name":"L"}]}]}' ;;
  stage) echo "staging tool unavailable" >&2; exit 3 ;;
  *) printf 'not json' ;;
esac
"#,
    )
    .unwrap();
    let toolchain = CommandToolchain::new(ToolchainConfig {
        command: "sh".into(),
        args: vec![script.display().to_string()],
    });

    let analysis = toolchain
        .analyze_draft(&dir.path().join("x.sddraft"))
        .await
        .unwrap();
    assert_eq!(analysis.errors[0].key, ("Broken layer".to_string(), 7));

    let err = toolchain
        .stage_service(&dir.path().join("x.sddraft"), &dir.path().join("x.sd"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("staging tool unavailable"));

    let err = toolchain.create_draft(&request()).await.unwrap_err();
    assert!(err.to_string().contains("invalid analysis JSON"));
}
