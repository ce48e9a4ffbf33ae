use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{CaptionEntry, PipelineResult, PipelineStatus, SceneDescriptor};

/// Status reported over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl From<PipelineStatus> for JobStatus {
    fn from(status: PipelineStatus) -> Self {
        match status {
            PipelineStatus::Pending => Self::Processing,
            PipelineStatus::Completed => Self::Completed,
            PipelineStatus::Failed => Self::Failed,
        }
    }
}

/// Response shape shared by the generate and status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub script: String,
    pub scenes: Vec<SceneDescriptor>,
    pub captions: Vec<CaptionEntry>,
    pub video_url: Option<String>,
    pub status: JobStatus,
}

impl JobResponse {
    pub fn processing(id: &Uuid) -> Self {
        Self {
            id: id.to_string(),
            script: String::new(),
            scenes: Vec::new(),
            captions: Vec::new(),
            video_url: None,
            status: JobStatus::Processing,
        }
    }

    pub fn failed(id: &Uuid) -> Self {
        Self {
            status: JobStatus::Failed,
            ..Self::processing(id)
        }
    }

    pub fn from_result(result: &PipelineResult, public_base_url: Option<&str>) -> Self {
        Self {
            id: result.id.clone(),
            script: result.script.clone(),
            scenes: result.scenes.clone(),
            captions: result.captions.clone(),
            video_url: result
                .video
                .as_deref()
                .and_then(|p| video_url(p, public_base_url)),
            status: result.status.into(),
        }
    }
}

/// Public URL of a promoted video: `<base>/public/videos/<name>`.
pub fn video_url(path: &Path, public_base_url: Option<&str>) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let url_path = format!("/public/videos/{}", name);
    Some(match public_base_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), url_path),
        None => url_path,
    })
}

/// Jobs kept when no capacity is given.
pub const DEFAULT_JOB_CAPACITY: usize = 1000;

#[derive(Default)]
struct Jobs {
    entries: HashMap<Uuid, JobResponse>,
    order: VecDeque<Uuid>,
}

/// In-memory record of recent requests. Once `capacity` jobs are held the
/// oldest one is evicted on each new insert.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<RwLock<Jobs>>,
    capacity: usize,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOB_CAPACITY)
    }
}

impl JobStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Jobs::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, id: Uuid, response: JobResponse) {
        let mut jobs = self.inner.write().await;
        if jobs.entries.insert(id, response).is_some() {
            return;
        }
        jobs.order.push_back(id);
        while jobs.order.len() > self.capacity {
            if let Some(oldest) = jobs.order.pop_front() {
                jobs.entries.remove(&oldest);
            }
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<JobResponse> {
        self.inner.read().await.entries.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) {
        let mut jobs = self.inner.write().await;
        if jobs.entries.remove(id).is_some() {
            jobs.order.retain(|held| held != id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_video_url() {
        let path = Path::new("/srv/public/videos/story-1a2b3c4d.mp4");
        assert_eq!(
            video_url(path, Some("http://localhost:8000/")).unwrap(),
            "http://localhost:8000/public/videos/story-1a2b3c4d.mp4"
        );
        assert_eq!(video_url(path, None).unwrap(), "/public/videos/story-1a2b3c4d.mp4");
    }

    #[test]
    fn test_pending_maps_to_processing() {
        assert_eq!(JobStatus::from(PipelineStatus::Pending), JobStatus::Processing);
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = JobStore::default();
        let id = Uuid::new_v4();
        store.insert(id, JobResponse::processing(&id)).await;
        assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Processing);

        let mut result = PipelineResult::pending(id.to_string());
        result.status = PipelineStatus::Completed;
        result.video = Some(PathBuf::from("/p/videos/story-x.mp4"));
        store.insert(id, JobResponse::from_result(&result, None)).await;
        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.video_url.as_deref(), Some("/public/videos/story-x.mp4"));

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_store_evicts_oldest() {
        let store = JobStore::with_capacity(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.insert(*id, JobResponse::processing(id)).await;
        }
        assert_eq!(store.len().await, 2);
        assert!(store.get(&ids[0]).await.is_none());
        assert!(store.get(&ids[1]).await.is_some());
        assert!(store.get(&ids[2]).await.is_some());

        // updating a held job does not push anything out
        store.insert(ids[1], JobResponse::failed(&ids[1])).await;
        assert_eq!(store.get(&ids[1]).await.unwrap().status, JobStatus::Failed);
        assert!(store.get(&ids[2]).await.is_some());

        store.remove(&ids[1]).await;
        let fresh = Uuid::new_v4();
        store.insert(fresh, JobResponse::processing(&fresh)).await;
        assert_eq!(store.len().await, 2);
        assert!(store.get(&ids[2]).await.is_some());
    }
}
