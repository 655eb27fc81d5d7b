// Projects: create, upload, inspect and run. Not a synced family; jobs
// started from a project reach the entity table through the job topics.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info};

use galileo_api::models::{JobPayload, ProjectFilePayload, ProjectPayload, RunProjectRequest};
use galileo_api::{Query, RequestExecutor};

use super::not_found;
use crate::convert::{envelope_item, envelope_list, parse_entity};
use crate::error::CoreError;
use crate::model::{Job, Project, ProjectFile};

/// Filter for `GET /projects`.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub ids: Vec<String>,
    pub names: Vec<String>,
    pub user_ids: Vec<String>,
}

impl ProjectFilter {
    fn query(&self) -> Query {
        Query::new()
            .push_list("ids", self.ids.as_slice())
            .push_list("names", self.names.as_slice())
            .push_list("user_ids", self.user_ids.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct ProjectsRepository {
    executor: RequestExecutor,
}

impl ProjectsRepository {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// One page of projects, in backend order.
    pub async fn list(
        &self,
        filter: &ProjectFilter,
        page: Option<u32>,
        items: Option<u32>,
    ) -> Result<Vec<Project>, CoreError> {
        let query = filter.query().page(page, items);
        let body = self.executor.get("projects", Some(&query)).await?;
        envelope_list(body, "projects")?
            .into_iter()
            .map(|raw| parse_entity::<ProjectPayload, Project>("project", raw))
            .collect()
    }

    pub async fn get(&self, id: &str) -> Result<Project, CoreError> {
        let body = self
            .executor
            .get(&project_path(id, ""), None)
            .await
            .map_err(|e| not_found(e.into(), "project", id))?;
        parse_entity::<ProjectPayload, Project>("project", envelope_item(body, "project")?)
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Project, CoreError> {
        let body = json!({ "name": name, "description": description.unwrap_or_default() });
        let resp = self.executor.post("projects", &body).await?;
        let project =
            parse_entity::<ProjectPayload, Project>("project", envelope_item(resp, "project")?)?;
        info!(project = %project.id, name, "project created");
        Ok(project)
    }

    /// Store one file under `path` (relative, `/`-separated) in the project.
    pub async fn upload_file(&self, id: &str, path: &str, data: Vec<u8>) -> Result<(), CoreError> {
        let query = Query::new().push("path", path);
        debug!(project = id, path, bytes = data.len(), "uploading file");
        self.executor
            .upload(&project_path(id, "files"), Some(&query), data)
            .await
            .map_err(|e| not_found(e.into(), "project", id))?;
        Ok(())
    }

    /// Upload every regular file below `dir`, keeping the tree layout.
    /// Returns the number of files sent.
    pub async fn upload(&self, id: &str, dir: &Path) -> Result<usize, CoreError> {
        let files = collect_files(dir).await?;
        for (relative, absolute) in &files {
            let data = tokio::fs::read(absolute).await.map_err(|e| local_io(absolute, e))?;
            self.upload_file(id, relative, data).await?;
        }
        info!(project = id, files = files.len(), "project directory uploaded");
        Ok(files.len())
    }

    /// Files currently stored in the project.
    pub async fn inspect(&self, id: &str) -> Result<Vec<ProjectFile>, CoreError> {
        let body = self
            .executor
            .get(&project_path(id, "files"), None)
            .await
            .map_err(|e| not_found(e.into(), "project", id))?;
        envelope_list(body, "files")?
            .into_iter()
            .map(|raw| parse_entity::<ProjectFilePayload, ProjectFile>("project_file", raw))
            .collect()
    }

    /// Start a job from the project on any machine of the station.
    pub async fn run_on_station(&self, id: &str, station_id: &str) -> Result<Job, CoreError> {
        self.run(id, station_id, None).await
    }

    /// Start a job from the project on one machine of the station.
    pub async fn run_on_machine(
        &self,
        id: &str,
        station_id: &str,
        machine_id: &str,
    ) -> Result<Job, CoreError> {
        self.run(id, station_id, Some(machine_id)).await
    }

    /// Create a project and upload `dir` into it.
    pub async fn create_and_upload(
        &self,
        name: &str,
        description: Option<&str>,
        dir: &Path,
    ) -> Result<Project, CoreError> {
        // Read the tree first so a bad path leaves no empty project behind.
        collect_files(dir).await?;
        let project = self.create(name, description).await?;
        self.upload(&project.id, dir).await?;
        Ok(project)
    }

    /// Create a project, upload `dir`, and start a job from it.
    pub async fn create_and_run(
        &self,
        name: &str,
        description: Option<&str>,
        dir: &Path,
        station_id: &str,
        machine_id: Option<&str>,
    ) -> Result<Job, CoreError> {
        let project = self.create_and_upload(name, description, dir).await?;
        self.run(&project.id, station_id, machine_id).await
    }

    async fn run(
        &self,
        id: &str,
        station_id: &str,
        machine_id: Option<&str>,
    ) -> Result<Job, CoreError> {
        let request = RunProjectRequest {
            station_id: station_id.to_owned(),
            machine_id: machine_id.map(str::to_owned),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| CoreError::Internal(format!("cannot encode run request: {e}")))?;
        let resp = self
            .executor
            .post(&project_path(id, "run"), &body)
            .await
            .map_err(|e| not_found(e.into(), "project", id))?;
        let job = parse_entity::<JobPayload, Job>("job", envelope_item(resp, "job")?)?;
        info!(project = id, job = %job.jobid, station = station_id, "project job started");
        Ok(job)
    }
}

fn project_path(id: &str, tail: &str) -> String {
    if tail.is_empty() {
        format!("projects/{id}")
    } else {
        format!("projects/{id}/{tail}")
    }
}

fn local_io(path: &Path, source: std::io::Error) -> CoreError {
    CoreError::LocalIo {
        path: path.display().to_string(),
        source,
    }
}

/// Regular files below `root` as `(relative "/"-joined path, absolute path)`,
/// sorted by relative path. Symlinks are skipped.
async fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>, CoreError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| local_io(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| local_io(&dir, e))? {
            let path = entry.path();
            let kind = entry.file_type().await.map_err(|e| local_io(&path, e))?;
            if kind.is_dir() {
                pending.push(path);
            } else if kind.is_file() {
                files.push((relative_path(root, &path), path));
            } else {
                debug!(path = %path.display(), "skipping non-regular file");
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_snake_case_list_keys() {
        let filter = ProjectFilter {
            ids: vec!["p1".into(), "p2".into()],
            user_ids: vec!["u1".into()],
            ..ProjectFilter::default()
        };
        assert_eq!(filter.query().encode(), "ids=p1%2Cp2&user_ids=u1");
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/tmp/project");
        let nested = root.join("src").join("lib").join("main.py");
        assert_eq!(relative_path(root, &nested), "src/lib/main.py");
    }

    #[tokio::test]
    async fn missing_directory_is_local_io_error() {
        let err = collect_files(Path::new("/nonexistent/galileo/project"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::LocalIo { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn files_are_collected_recursively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo").unwrap();
        std::fs::write(dir.path().join("src").join("main.py"), "print(1)").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let files = collect_files(dir.path()).await.unwrap();
        let names: Vec<&str> = files.iter().map(|(rel, _)| rel.as_str()).collect();
        assert_eq!(names, ["run.sh", "src/main.py"]);
    }
}
