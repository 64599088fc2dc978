//! Upload of dependency files and polling for the scan verdict.
//!
//! [`Uploader`] is a single call from the scanner's point of view: it blocks
//! until the service returns a result, the polling budget runs out (soft
//! timeout, `Ok(None)`), or an error occurs.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{DebClient, decode};
use crate::discovery::{FileGroup, relative_path};
use crate::error::UploadError;
use crate::git::MetaObject;
use crate::workdir::BaseDir;

const UPLOAD_FILES_PATH: &str = "/api/1.0/open/uploads/dependencies/files";
const FINISH_PATH: &str = "/api/1.0/open/finishes/dependencies/files/uploads";
const STATUS_PATH: &str = "/api/1.0/open/ci/upload/status";

/// Scan verdict returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    #[serde(default)]
    pub vulnerabilities_found: u64,
    #[serde(default)]
    pub automation_rules: Vec<AutomationRule>,
    #[serde(default)]
    pub details_url: String,
}

/// A server-side policy evaluated against the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    #[serde(default)]
    pub rule_description: String,
    #[serde(default)]
    pub rule_actions: Vec<String>,
    #[serde(default)]
    pub rule_link: String,
    #[serde(default)]
    pub has_cves: bool,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub trigger_events: Vec<TriggerEvent>,
}

impl AutomationRule {
    /// Rule action that asks for the pipeline to fail.
    pub const FAIL_PIPELINE: &'static str = "failPipeline";

    /// Whether this rule, once triggered, demands pipeline failure.
    pub fn fail_pipeline(&self) -> bool {
        self.rule_actions
            .iter()
            .any(|action| action == Self::FAIL_PIPELINE)
    }
}

/// A dependency that triggered a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    #[serde(default)]
    pub dependency: String,
    #[serde(default)]
    pub dependency_link: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub cve: String,
    #[serde(default)]
    pub cvss2: Option<f64>,
    #[serde(default)]
    pub cvss3: Option<f64>,
    #[serde(default)]
    pub cve_link: String,
}

/// Everything one upload needs.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub base: &'a BaseDir,
    pub groups: &'a [FileGroup],
    pub meta: &'a MetaObject,
    pub integration_name: &'a str,
}

/// Upload seam used by the scanner.
///
/// `Ok(None)` is a soft timeout: the service is still scanning.
/// [`UploadError::NoResponse`] means the service never answered.
pub trait Uploader {
    fn upload(
        &self,
        request: UploadRequest<'_>,
    ) -> impl Future<Output = Result<Option<UploadResult>, UploadError>> + Send;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    ci_upload_id: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishRequest<'a> {
    ci_upload_id: u64,
    repository_url: &'a str,
    integration_name: &'a str,
    commit_author: &'a str,
}

#[derive(Deserialize)]
struct Progress {
    #[serde(default)]
    progress: Option<i64>,
}

/// [`Uploader`] backed by the scanning service HTTP API.
pub struct HttpUploader {
    client: DebClient,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl HttpUploader {
    pub fn new(client: DebClient, poll_interval: Duration, poll_timeout: Duration) -> Self {
        Self {
            client,
            poll_interval,
            poll_timeout,
        }
    }

    async fn upload_file(
        &self,
        base: &BaseDir,
        file: &Path,
        meta: &MetaObject,
        ci_upload_id: Option<u64>,
    ) -> Result<u64, UploadError> {
        let content = tokio::fs::read(file)
            .await
            .map_err(|source| UploadError::Read {
                path: file.display().to_string(),
                source,
            })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = file
            .parent()
            .map(|dir| relative_path(base.path(), dir))
            .unwrap_or_default();

        let mut form = Form::new()
            .text("repositoryName", meta.repository_name.clone().unwrap_or_default())
            .text("commitName", meta.commit_name.clone().unwrap_or_default())
            .text("fileRelativePath", directory)
            .part("fileData", Part::bytes(content).file_name(file_name));
        if let Some(branch) = meta.branch_name.clone() {
            form = form.text("branchName", branch);
        }
        if let Some(id) = ci_upload_id {
            form = form.text("ciUploadId", id.to_string());
        }

        let response = self.client.post_multipart(UPLOAD_FILES_PATH, form).await?;
        let uploaded: UploadedFile = decode(UPLOAD_FILES_PATH, response).await?;
        debug!(file = %file.display(), ci_upload_id = uploaded.ci_upload_id, "file uploaded");
        Ok(uploaded.ci_upload_id)
    }

    async fn poll(&self, ci_upload_id: u64) -> Result<Option<UploadResult>, UploadError> {
        let deadline = Instant::now() + self.poll_timeout;
        let path = format!("{STATUS_PATH}?ciUploadId={ci_upload_id}");

        loop {
            let response = self.client.get(&path).await?;
            match response.status().as_u16() {
                200 => {
                    let result: UploadResult = decode(STATUS_PATH, response).await?;
                    return Ok(Some(result));
                }
                202 => {
                    let progress = decode::<Progress>(STATUS_PATH, response)
                        .await
                        .ok()
                        .and_then(|p| p.progress);
                    debug!(ci_upload_id, ?progress, "scan in progress");
                }
                status => {
                    return Err(UploadError::Status {
                        endpoint: STATUS_PATH.to_owned(),
                        status,
                        body: response.text().await.unwrap_or_default(),
                    });
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                warn!(
                    ci_upload_id,
                    timeout_secs = self.poll_timeout.as_secs(),
                    "polling budget exhausted"
                );
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Uploader for HttpUploader {
    async fn upload(
        &self,
        request: UploadRequest<'_>,
    ) -> Result<Option<UploadResult>, UploadError> {
        let files: Vec<&Path> = request.groups.iter().flat_map(FileGroup::files).collect();
        if files.is_empty() {
            return Err(UploadError::NoFiles);
        }

        info!(files = files.len(), host = self.client.host(), "uploading dependency files");

        let mut ci_upload_id = None;
        for file in files {
            let id = self
                .upload_file(request.base, file, request.meta, ci_upload_id)
                .await?;
            ci_upload_id.get_or_insert(id);
        }
        let ci_upload_id = ci_upload_id.ok_or(UploadError::NoFiles)?;

        let finish = FinishRequest {
            ci_upload_id,
            repository_url: request.meta.repository_url.as_deref().unwrap_or_default(),
            integration_name: request.integration_name,
            commit_author: request.meta.author.as_deref().unwrap_or_default(),
        };
        self.client.post_json(FINISH_PATH, &finish).await?;

        info!(ci_upload_id, "upload finished, waiting for scan result");
        self.poll(ci_upload_id).await
    }
}
