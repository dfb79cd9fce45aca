//! Job-file error messages, validation, atomic-write safety and listing.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;

use tally_core::{
    config, ConfigError, CursorMode, JobConfig, KeyColumns, ReconcileConfig, SourceConfig,
    UploadMode,
};

const PAYMENTS_YAML: &str = r#"
name: payments
source_endpoint: https://app.example.com/api/1.1/obj/Payments
key_columns: [admissions-group-name, payment-date, payment-type, payment-category]
batch_size: 1000
page_size: 100
inter_batch_delay_seconds: 1
cursor: accumulated
schema:
  - { name: admissions-group-name }
  - { name: paid-amount, kind: number }
  - { name: payment-type }
  - { name: payment-date, kind: date }
  - { name: payment-category }
  - { name: counsellor }
source:
  kind: sheet
  spreadsheet_id: 1AiLS3sSiAJHGGVA
  range: Testing!A:E
markers:
  columns: F:G
  log_range: Logs!A:B
lookups:
  - fields: [counsellor]
    endpoint: https://app.example.com/api/1.1/obj/User
    match_field: name
"#;

fn write_job(home: &assert_fs::TempDir, name: &str, yaml: &str) {
    home.child(".tally")
        .child("jobs")
        .child(format!("{name}.yaml"))
        .write_str(yaml)
        .expect("write job");
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

#[test]
fn hand_written_job_loads_with_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_job(&home, "payments", PAYMENTS_YAML);

    let job = config::load_job_at(home.path(), "payments").expect("load");
    assert_eq!(job.reconcile.key_columns.names().len(), 4);
    assert_eq!(job.cursor, CursorMode::Accumulated);
    assert_eq!(job.upload_mode, UploadMode::Bulk);
    assert_eq!(job.token_env, "TALLY_API_TOKEN");
    assert_eq!(job.reconcile.inter_batch_delay_seconds, 1.0);
    match &job.source {
        SourceConfig::Sheet { token_env, .. } => assert_eq!(token_env, "TALLY_GOOGLE_TOKEN"),
        other => panic!("expected sheet source, got {other:?}"),
    }
    let markers = job.markers.expect("markers");
    assert_eq!(markers.status, "Inserted");
    assert_eq!(job.lookups[0].id_field, "_id");
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_job(&home, "broken", ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_job_at(home.path(), "broken").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn load_missing_job_names_the_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_job_at(home.path(), "students").unwrap_err();
    assert!(err.to_string().contains("job not found"));
    assert!(err.to_string().contains("students.yaml"));
}

#[rstest]
#[case("batch_size: 1000", "batch_size: 0", "batch_size")]
#[case("page_size: 100", "page_size: 0", "page_size")]
#[case("inter_batch_delay_seconds: 1", "inter_batch_delay_seconds: -2", "inter_batch_delay_seconds")]
#[case(
    "source_endpoint: https://app.example.com/api/1.1/obj/Payments",
    "source_endpoint: ftp://example.com",
    "source_endpoint"
)]
#[case("columns: F:G", "columns: F:H", "markers.columns")]
#[case("inter_batch_delay_seconds: 1", "inter_batch_delay_seconds: 1e20", "inter_batch_delay_seconds")]
#[case("fields: [counsellor]", "fields: [counsellor, payment-type]", "lookups[0].fields")]
fn invalid_values_name_the_field(#[case] from: &str, #[case] to: &str, #[case] field: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_job(&home, "payments", &PAYMENTS_YAML.replace(from, to));

    let err = config::load_job_at(home.path(), "payments").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
    assert!(err.to_string().contains(field), "got: {err}");
}

#[test]
fn empty_key_list_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let yaml = PAYMENTS_YAML.replace(
        "key_columns: [admissions-group-name, payment-date, payment-type, payment-category]",
        "key_columns: []",
    );
    write_job(&home, "payments", &yaml);

    let err = config::load_job_at(home.path(), "payments").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("key_columns"));
}

#[test]
fn key_columns_must_be_in_schema() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_job(
        &home,
        "payments",
        &PAYMENTS_YAML.replace("payment-category]", "payment-category, lead-name]"),
    );
    let err = config::load_job_at(home.path(), "payments").unwrap_err();
    assert!(err.to_string().contains("lead-name"), "got: {err}");
}

#[rstest]
#[case("")]
#[case("has space")]
#[case("../escape")]
fn job_names_must_be_file_safe(#[case] name: &str) {
    assert!(config::validate_job_name(name).is_err());
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

fn tree_job(name: &str) -> JobConfig {
    JobConfig::new(
        name,
        ReconcileConfig::new(
            "https://app.example.com/api/1.1/obj/docs",
            KeyColumns::new(["admissions-group-name", "fileorfolder-id"]).unwrap(),
        ),
        SourceConfig::FolderTree {
            root_folder_id: "root-folder".into(),
            group_size: 10,
            token_env: "TALLY_GOOGLE_TOKEN".into(),
        },
    )
}

#[test]
fn save_cleans_up_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_job_at(home.path(), &tree_job("docs")).expect("save");

    home.child(".tally/jobs/docs.yaml").assert(predicate::path::exists());
    home.child(".tally/jobs/docs.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn invalid_job_is_never_written() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut job = tree_job("docs");
    job.reconcile.batch_size = 0;
    assert!(config::save_job_at(home.path(), &job).is_err());
    home.child(".tally/jobs/docs.yaml")
        .assert(predicate::path::missing());
}

#[test]
fn saved_file_has_private_mode() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_job_at(home.path(), &tree_job("docs")).expect("save");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = config::job_path_at(home.path(), "docs");
        let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

// ---------------------------------------------------------------------------
// 3. Listing
// ---------------------------------------------------------------------------

#[test]
fn list_jobs_is_sorted_and_skips_tmp_files() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_job_at(home.path(), &tree_job("zeta")).expect("save zeta");
    config::save_job_at(home.path(), &tree_job("alpha")).expect("save alpha");
    home.child(".tally/jobs/orphan.yaml.tmp")
        .write_str("CRASH - INCOMPLETE WRITE")
        .expect("orphan");

    let names = config::list_job_names_at(home.path()).expect("names");
    assert_eq!(names, ["alpha", "zeta"]);
    let jobs = config::list_jobs_at(home.path()).expect("jobs");
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].name, "alpha");
}

#[test]
fn list_is_empty_without_jobs_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    assert!(config::list_job_names_at(home.path()).unwrap().is_empty());
}

#[test]
fn folder_tree_jobs_reject_markers() {
    let mut job = tree_job("docs");
    job.markers = Some(tally_core::MarkerConfig {
        columns: "F:G".into(),
        status: "Inserted".into(),
        log_range: None,
        match_columns: None,
    });
    let err = job.validate().unwrap_err();
    assert!(err.to_string().contains("markers"));
}

#[test]
fn drive_json_source_loads_with_default_token() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_job(
        &home,
        "credits",
        r#"
name: credits
source_endpoint: https://app.example.com/api/1.1/obj/scholarship-credits
key_columns: [admissions-group-name, lead-name, project-name]
source:
  kind: drive_json
  file_id: 1pt89q5AsFqyVPmTwMmN20vtXhM1VQThY
"#,
    );

    let job = config::load_job_at(home.path(), "credits").expect("load");
    assert_eq!(job.source.token_env(), "TALLY_GOOGLE_TOKEN");
    assert!(matches!(job.source, SourceConfig::DriveJson { ref file_id, .. } if file_id.starts_with("1pt89")));
}

#[test]
fn drive_json_jobs_reject_markers_and_blank_ids() {
    let mut job = tree_job("credits");
    job.source = SourceConfig::DriveJson {
        file_id: " ".into(),
        token_env: "TALLY_GOOGLE_TOKEN".into(),
    };
    assert!(job.validate().unwrap_err().to_string().contains("source.file_id"));

    job.source = SourceConfig::DriveJson {
        file_id: "file-1".into(),
        token_env: "TALLY_GOOGLE_TOKEN".into(),
    };
    job.validate().expect("valid");
    job.markers = Some(tally_core::MarkerConfig {
        columns: "F:G".into(),
        status: "Inserted".into(),
        log_range: None,
        match_columns: None,
    });
    assert!(job.validate().unwrap_err().to_string().contains("markers"));
}
