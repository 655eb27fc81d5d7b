// Jobs: list, get, lifecycle actions and result retrieval.
//
// Lifecycle calls return the backend's acknowledgement body unchanged; the
// job's new status arrives separately as a push event or on the next resync.

use async_trait::async_trait;
use serde_json::{Value, json};

use galileo_api::models::JobPayload;
use galileo_api::{Query, RequestExecutor};

use super::{Repository, SNAPSHOT_PAGE_SIZE};
use crate::error::CoreError;
use crate::model::{Family, Job, JobStatus};

/// Filter for `GET /jobs`. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub jobids: Vec<String>,
    /// Machines the jobs were sent to.
    pub receiverids: Vec<String>,
    pub stationids: Vec<String>,
    pub userids: Vec<String>,
    pub statuses: Vec<JobStatus>,
}

#[derive(Debug, Clone)]
pub struct JobsRepository {
    executor: RequestExecutor,
    page_size: u32,
}

impl JobsRepository {
    pub fn new(executor: RequestExecutor) -> Self {
        Self {
            executor,
            page_size: SNAPSHOT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Ask the backend for an upload slot.
    pub async fn upload_request(&self) -> Result<Value, CoreError> {
        Ok(self.executor.get("job/upload_request", None).await?)
    }

    /// Report a finished upload, creating the job.
    pub async fn upload_completed(
        &self,
        destination_mid: &str,
        filename: &str,
        stationid: &str,
    ) -> Result<Value, CoreError> {
        let body = json!({
            "destination_mid": destination_mid,
            "filename": filename,
            "stationid": stationid,
        });
        Ok(self.executor.post("jobs", &body).await?)
    }

    pub async fn results_location(&self, jobid: &str) -> Result<Value, CoreError> {
        Ok(self
            .executor
            .get(&job_path(jobid, "results/location"), None)
            .await?)
    }

    pub async fn download_complete(&self, jobid: &str) -> Result<Value, CoreError> {
        self.action(jobid, "results/download_complete").await
    }

    /// Start a job that has been uploaded.
    pub async fn submit(&self, jobid: &str) -> Result<Value, CoreError> {
        self.action(jobid, "run").await
    }

    pub async fn stop(&self, jobid: &str) -> Result<Value, CoreError> {
        self.action(jobid, "stop").await
    }

    pub async fn pause(&self, jobid: &str) -> Result<Value, CoreError> {
        self.action(jobid, "pause").await
    }

    /// Resume a paused job.
    pub async fn start(&self, jobid: &str) -> Result<Value, CoreError> {
        self.action(jobid, "start").await
    }

    /// Process listing of the job's container.
    pub async fn top(&self, jobid: &str) -> Result<Value, CoreError> {
        Ok(self.executor.get(&job_path(jobid, "top"), None).await?)
    }

    pub async fn logs(&self, jobid: &str) -> Result<Value, CoreError> {
        Ok(self.executor.get(&job_path(jobid, "logs"), None).await?)
    }

    /// Result files. `query` is passed through untouched.
    pub async fn results(&self, jobid: &str, query: Option<&Query>) -> Result<Value, CoreError> {
        Ok(self
            .executor
            .get(&job_path(jobid, "results"), query)
            .await?)
    }

    async fn action(&self, jobid: &str, action: &str) -> Result<Value, CoreError> {
        Ok(self.executor.put(&job_path(jobid, action), None).await?)
    }
}

fn job_path(jobid: &str, tail: &str) -> String {
    format!("jobs/{jobid}/{tail}")
}

#[async_trait]
impl Repository for JobsRepository {
    type Payload = JobPayload;
    type Entity = Job;
    type Filter = JobFilter;

    const FAMILY: Family = Family::Job;
    const COLLECTION: &'static str = "jobs";
    const ITEM: &'static str = "job";

    fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn filter_query(filter: &JobFilter) -> Query {
        let statuses: Vec<&str> = filter.statuses.iter().map(AsRef::as_ref).collect();
        Query::new()
            .push_list("jobids", filter.jobids.as_slice())
            .push_list("receiverids", filter.receiverids.as_slice())
            .push_list("stationids", filter.stationids.as_slice())
            .push_list("userids", filter.userids.as_slice())
            .push_list("statuses", statuses.as_slice())
    }

    fn snapshot_page_size(&self) -> u32 {
        self.page_size
    }
}
