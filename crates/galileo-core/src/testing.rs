// Fixtures shared by unit tests.

use chrono::DateTime;

use crate::model::{Job, JobStatus, LandingRequest, LandingRequestStatus, Machine, MachineStatus};

pub(crate) fn machine(mid: &str, status: MachineStatus) -> Machine {
    Machine {
        mid: mid.into(),
        name: format!("lz-{mid}"),
        userid: "u1".into(),
        status,
        gpu: "1".into(),
        cpu: "8".into(),
        os: "linux".into(),
        arch: "x86_64".into(),
        memory: "16GB".into(),
        running_jobs_limit: 2,
    }
}

pub(crate) fn job(jobid: &str, archived: bool) -> Job {
    let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    Job {
        jobid: jobid.into(),
        receiverid: "m1".into(),
        project_id: "p1".into(),
        time_created: created,
        last_updated: created,
        status: JobStatus::Running,
        name: "train".into(),
        stationid: "s1".into(),
        userid: "u2".into(),
        archived,
        status_history: Vec::new(),
        container: None,
        state: None,
        oaid: None,
        pay_status: None,
        pay_interval: None,
        total_runtime: None,
    }
}

pub(crate) fn request(id: &str, status: LandingRequestStatus) -> LandingRequest {
    LandingRequest {
        id: id.into(),
        mid: "m1".into(),
        userid: "u9".into(),
        status,
        time_created: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        stationid: None,
    }
}
