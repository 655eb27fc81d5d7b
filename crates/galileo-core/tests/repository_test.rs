#![allow(clippy::unwrap_used)]
// Integration tests for the repositories using wiremock.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use galileo_api::models::UpdateMachineRequest;
use galileo_api::{ApiBase, Credential, HttpTransport, Query, RequestExecutor, TokenStore, TransportConfig};
use galileo_core::{
    CoreError, Family, Galileo, JobFilter, JobStatus, JobsRepository, LandingRequestStatus,
    MachineFilter, MachineStatus, MachinesRepository, ProfilesRepository, ProjectFilter,
    ProjectsRepository, Repository, RequestFilter, RequestsRepository, SdkConfig, SdkCredentials,
    SnapshotSource, StationStatus, StationsRepository,
};
use url::Url;

// ── Helpers ─────────────────────────────────────────────────────────

fn api(suffix: &str) -> String {
    format!("/galileo/user_interface/v1/{suffix}")
}

async fn setup() -> (MockServer, RequestExecutor) {
    let server = MockServer::start().await;
    let base = ApiBase::parse(&server.uri()).unwrap();
    let transport = Arc::new(HttpTransport::new(&TransportConfig::default()).unwrap());
    let credential = Credential::new(
        SecretString::from("access".to_owned()),
        SecretString::from("refresh".to_owned()),
        None,
    )
    .unwrap();
    let tokens = TokenStore::new(transport, base).with_credential(credential);
    (server, RequestExecutor::new(Arc::new(tokens)))
}

fn machine(mid: &str, status: &str) -> Value {
    json!({
        "mid": mid, "name": format!("lz-{mid}"), "userid": "u1", "status": status,
        "gpu": "1", "cpu": "8", "os": "linux", "arch": "x86_64",
        "memory": "16GB", "running_jobs_limit": 2
    })
}

fn request(id: &str, status: &str) -> Value {
    json!({
        "id": id, "mid": "m1", "userid": "u9", "status": status,
        "time_created": 1_700_000_000
    })
}

// ── Machines ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_machines_passes_filter_and_paging() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines")))
        .and(query_param("mids", "m1,m2"))
        .and(query_param("page", "2"))
        .and(query_param("items", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m2", "online"), machine("m1", "offline")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = MachinesRepository::new(executor);
    let filter = MachineFilter {
        mids: vec!["m1".into(), "m2".into()],
        ..MachineFilter::default()
    };
    let machines = repo.list(&filter, Some(2), Some(25)).await.unwrap();

    // Backend order is kept.
    let mids: Vec<&str> = machines.iter().map(|m| m.mid.as_str()).collect();
    assert_eq!(mids, vec!["m2", "m1"]);
    assert_eq!(machines[1].status, MachineStatus::Offline);
}

#[tokio::test]
async fn test_list_fails_on_one_malformed_record() {
    let (server, executor) = setup().await;

    let mut broken = machine("m2", "online");
    broken.as_object_mut().unwrap().remove("running_jobs_limit");
    Mock::given(method("GET"))
        .and(path(api("machines")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m1", "online"), broken]
        })))
        .mount(&server)
        .await;

    let err = MachinesRepository::new(executor)
        .list(&MachineFilter::default(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::MalformedPayload { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unknown_status_is_malformed() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines/m1")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "machine": machine("m1", "hibernating") })),
        )
        .mount(&server)
        .await;

    let err = MachinesRepository::new(executor).get("m1").await.unwrap_err();
    assert!(matches!(err, CoreError::MalformedPayload { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_get_missing_machine_is_not_found() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines/ghost")))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such machine"))
        .mount(&server)
        .await;

    let err = MachinesRepository::new(executor).get("ghost").await.unwrap_err();
    match err {
        CoreError::NotFound { entity, id } => {
            assert_eq!(entity, "machine");
            assert_eq!(id, "ghost");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_update_machine_sends_only_set_fields() {
    let (server, executor) = setup().await;

    Mock::given(method("PUT"))
        .and(path(api("machines/m1")))
        .and(body_json(json!({ "running_jobs_limit": 4 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machine": machine("m1", "online")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut update = UpdateMachineRequest::new("m1");
    update.running_jobs_limit = Some(4);
    let machine = MachinesRepository::new(executor).update(&update).await.unwrap();
    assert_eq!(machine.mid, "m1");
}

#[tokio::test]
async fn test_snapshot_paginates_and_skips_malformed_records() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines")))
        .and(query_param("page", "1"))
        .and(query_param("items", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m1", "online"), machine("m2", "warp-speed")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("machines")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m3", "offline")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = MachinesRepository::new(executor).with_page_size(2);
    assert_eq!(SnapshotSource::family(&repo), Family::Machine);

    let records = repo.snapshot().await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["m1", "m3"]);
}

#[tokio::test]
async fn test_snapshot_stops_when_backend_ignores_paging() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m1", "online"), machine("m2", "online")]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let records = MachinesRepository::new(executor)
        .with_page_size(2)
        .snapshot()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_snapshot_stops_after_short_first_page() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("machines")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "machines": [machine("m1", "online"), machine("m2", "offline")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = MachinesRepository::new(executor)
        .with_page_size(3)
        .snapshot()
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

// ── Jobs ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_jobs_by_status() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("jobs")))
        .and(query_param("statuses", "running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [{
                "jobid": "j1", "receiverid": "m1", "project_id": "p1",
                "time_created": 1_700_000_000, "last_updated": 1_700_000_050,
                "status": "running", "name": "train", "stationid": "s1",
                "userid": "u2", "archived": false,
                "status_history": [
                    { "time": 1_700_000_000, "status": "uploaded" },
                    { "time": 1_700_000_050, "status": "running" }
                ]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = JobFilter {
        statuses: vec![JobStatus::Running],
        ..JobFilter::default()
    };
    let jobs = JobsRepository::new(executor).list(&filter, None, None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status_history.len(), 2);
    assert_eq!(jobs[0].status_history[0].status, JobStatus::Uploaded);
}

#[tokio::test]
async fn test_job_lifecycle_endpoints() {
    let (server, executor) = setup().await;

    for action in ["run", "stop", "pause", "start", "results/download_complete"] {
        Mock::given(method("PUT"))
            .and(path(api(&format!("jobs/j1/{action}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": action })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let jobs = JobsRepository::new(executor);
    assert_eq!(jobs.submit("j1").await.unwrap(), json!({ "ok": "run" }));
    assert_eq!(jobs.stop("j1").await.unwrap(), json!({ "ok": "stop" }));
    assert_eq!(jobs.pause("j1").await.unwrap(), json!({ "ok": "pause" }));
    assert_eq!(jobs.start("j1").await.unwrap(), json!({ "ok": "start" }));
    jobs.download_complete("j1").await.unwrap();
}

#[tokio::test]
async fn test_job_upload_and_results() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("job/upload_request")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "location": "s3://x" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api("jobs")))
        .and(body_json(json!({
            "destination_mid": "m1", "filename": "job.tar", "stationid": "s1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobid": "j9" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("jobs/j9/results")))
        .and(query_param("path", "out"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("jobs/j9/logs")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "logs": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let jobs = JobsRepository::new(executor);
    jobs.upload_request().await.unwrap();
    let created = jobs.upload_completed("m1", "job.tar", "s1").await.unwrap();
    assert_eq!(created["jobid"], "j9");
    jobs.results("j9", Some(&Query::new().push("path", "out")))
        .await
        .unwrap();
    assert_eq!(jobs.logs("j9").await.unwrap()["logs"], "ok");
}

// ── Stations, requests, profiles ────────────────────────────────────

#[tokio::test]
async fn test_get_station() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("stations/s1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "station": {
                "stationid": "s1", "name": "lab", "status": "active",
                "mids": ["m1"], "users": [{ "userid": "u1", "status": "owner" }]
            }
        })))
        .mount(&server)
        .await;

    let station = StationsRepository::new(executor).get("s1").await.unwrap();
    assert_eq!(station.status, StationStatus::Active);
    assert_eq!(station.mids, vec!["m1".to_owned()]);
    assert_eq!(station.users.len(), 1);
}

#[tokio::test]
async fn test_pending_requests_and_accept() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("requests")))
        .and(query_param("statuses", "pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "requests": [request("r1", "pending")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(api("requests/r1/accept")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "accepted" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(api("requests/r1/reject")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "rejected" })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = RequestsRepository::new(executor);
    let pending = repo.list(&RequestFilter::pending(), None, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, LandingRequestStatus::Pending);

    repo.accept("r1").await.unwrap();
    repo.reject("r1").await.unwrap();
}

#[tokio::test]
async fn test_profiles() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("users/self")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "userid": "u1", "username": "ada", "mids": ["m1"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("users")))
        .and(query_param("username", "grace"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "userid": "u2", "username": "grace" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("users/invites")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stations": [{ "stationid": "s2", "name": "shared", "status": "active" }]
        })))
        .mount(&server)
        .await;

    let profiles = ProfilesRepository::new(executor);
    let me = profiles.self_profile().await.unwrap();
    assert_eq!(me.username, "ada");

    let users = profiles
        .list_users(Some(&Query::new().push("username", "grace")))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert!(users[0].mids.is_empty());

    let invites = profiles.invites().await.unwrap();
    assert_eq!(invites[0].stationid, "s2");
}

// ── Projects ────────────────────────────────────────────────────────

fn project(id: &str, name: &str) -> Value {
    json!({
        "id": id, "name": name, "user_id": "u1", "description": "",
        "creation_timestamp": 1_700_000_000
    })
}

fn job(jobid: &str, project_id: &str) -> Value {
    json!({
        "jobid": jobid, "receiverid": "m1", "project_id": project_id,
        "time_created": 1_700_000_000, "last_updated": 1_700_000_000,
        "status": "uploaded", "name": "render", "stationid": "s1", "userid": "u1",
        "archived": false, "status_history": []
    })
}

#[tokio::test]
async fn test_list_projects_passes_filter_and_paging() {
    let (server, executor) = setup().await;

    Mock::given(method("GET"))
        .and(path(api("projects")))
        .and(query_param("names", "render"))
        .and(query_param("user_ids", "u1"))
        .and(query_param("page", "1"))
        .and(query_param("items", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project("p2", "render"), project("p1", "render")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = ProjectFilter {
        names: vec!["render".into()],
        user_ids: vec!["u1".into()],
        ..ProjectFilter::default()
    };
    let projects = ProjectsRepository::new(executor)
        .list(&filter, Some(1), Some(25))
        .await
        .unwrap();
    let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "p1"]);
    assert_eq!(projects[0].created.timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn test_create_and_run_uploads_every_file() {
    let (server, executor) = setup().await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM python:3").unwrap();
    std::fs::write(dir.path().join("src").join("main.py"), "print(1)").unwrap();

    Mock::given(method("POST"))
        .and(path(api("projects")))
        .and(body_json(json!({ "name": "render", "description": "frames" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": project("p1", "render")
        })))
        .expect(1)
        .mount(&server)
        .await;
    for (file, contents) in [("Dockerfile", "FROM python:3"), ("src/main.py", "print(1)")] {
        Mock::given(method("PUT"))
            .and(path(api("projects/p1/files")))
            .and(query_param("path", file))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(contents.as_bytes().to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(api("projects/p1/run")))
        .and(body_json(json!({ "station_id": "s1", "machine_id": "m1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job": job("j1", "p1") })))
        .expect(1)
        .mount(&server)
        .await;

    let job = ProjectsRepository::new(executor)
        .create_and_run("render", Some("frames"), dir.path(), "s1", Some("m1"))
        .await
        .unwrap();
    assert_eq!(job.jobid, "j1");
    assert_eq!(job.project_id, "p1");
    assert_eq!(job.status, JobStatus::Uploaded);
}

#[tokio::test]
async fn test_create_and_upload_with_missing_directory_creates_nothing() {
    let (server, executor) = setup().await;

    Mock::given(method("POST"))
        .and(path(api("projects")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": project("p1", "render")
        })))
        .expect(0)
        .mount(&server)
        .await;

    let missing = std::env::temp_dir().join("galileo-no-such-project-dir");
    let err = ProjectsRepository::new(executor)
        .create_and_upload("render", None, &missing)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::LocalIo { .. }), "{err:?}");
}

#[tokio::test]
async fn test_run_on_station_and_inspect() {
    let (server, executor) = setup().await;

    Mock::given(method("POST"))
        .and(path(api("projects/p1/run")))
        .and(body_json(json!({ "station_id": "s1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job": job("j2", "p1") })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("projects/p1/files")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "path": "Dockerfile", "size": 13, "modified": 1_700_000_100 },
                { "path": "src/main.py", "size": 8 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let projects = ProjectsRepository::new(executor);
    let job = projects.run_on_station("p1", "s1").await.unwrap();
    assert_eq!(job.jobid, "j2");

    let files = projects.inspect("p1").await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].size, 13);
    assert!(files[1].modified.is_none());
}

#[tokio::test]
async fn test_facade_exposes_projects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("projects/gone")))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such project"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = SdkConfig::new(
        Url::parse(&server.uri()).unwrap(),
        SdkCredentials::Password {
            username: "ada".into(),
            password: SecretString::from("hunter2".to_owned()),
        },
    );
    config.push_enabled = false;
    let galileo = Galileo::new(config).unwrap();
    galileo.tokens().set_credential(
        Credential::new(
            SecretString::from("access".to_owned()),
            SecretString::from("refresh".to_owned()),
            None,
        )
        .unwrap(),
    );

    let err = galileo.projects().get("gone").await.unwrap_err();
    match err {
        CoreError::NotFound { entity, id } => {
            assert_eq!(entity, "project");
            assert_eq!(id, "gone");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}
