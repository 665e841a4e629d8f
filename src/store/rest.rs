//! Remote-HTTP store: one request/response pair per operation against the
//! task API described in the server module.
//!
//! Any 2xx is success; 401/404/409 map to their typed failures and everything
//! else, including transport errors, surfaces as `Network`.

use super::{TaskStore, sort_newest_first};
use crate::error::{StoreError, StoreResult};
use crate::filter::tags_intersect;
use crate::types::{Quadrant, SyncResponse, Task, TaskCreate, TaskPatch};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Supplies the bearer token for outgoing requests. The auth collaborator is
/// opaque to this layer; `None` sends no Authorization header.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, for configs that carry one literally.
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// HTTP-backed task store.
pub struct RestStore {
    base_url: String,
    client: reqwest::Client,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            token_provider: None,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token_provider.as_ref().and_then(|p| p.token()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Translate a non-2xx status into the typed failure for `id`.
    fn check(response: Response, id: Option<Uuid>) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match (status, id) {
            (StatusCode::UNAUTHORIZED, _) => Err(StoreError::Unauthorized),
            (StatusCode::NOT_FOUND, Some(id)) => Err(StoreError::TaskNotFound(id)),
            (StatusCode::CONFLICT, Some(id)) => Err(StoreError::DuplicateId(id)),
            _ => Err(StoreError::Network(format!(
                "unexpected status {status} from task API"
            ))),
        }
    }

    async fn get_tasks(&self, path: &str) -> StoreResult<Vec<Task>> {
        let response = self
            .authorize(self.client.get(self.endpoint(path)))
            .send()
            .await?;
        let response = Self::check(response, None)?;
        let mut tasks: Vec<Task> = response.json().await?;
        // Ordering is part of the store contract, not the server's.
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for RestStore {
    async fn create_task(&self, task: Task) -> StoreResult<Task> {
        task.validate()?;
        let body = TaskCreate::from(&task);
        let response = self
            .authorize(self.client.post(self.endpoint("/tasks")))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, Some(task.id))?;
        Ok(response.json().await?)
    }

    async fn update_task(&self, task: Task) -> StoreResult<Task> {
        task.validate()?;
        // Full replace expressed as a patch carrying every field.
        let body = TaskPatch::replace(&task);
        let response = self
            .authorize(
                self.client
                    .put(self.endpoint(&format!("/tasks/{}", task.id))),
            )
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, Some(task.id))?;
        Ok(response.json().await?)
    }

    async fn delete_task(&self, id: Uuid) -> StoreResult<()> {
        let response = self
            .authorize(self.client.delete(self.endpoint(&format!("/tasks/{id}"))))
            .send()
            .await?;
        Self::check(response, Some(id))?;
        Ok(())
    }

    async fn fetch_tasks(&self) -> StoreResult<Vec<Task>> {
        self.get_tasks("/tasks").await
    }

    async fn fetch_in_quadrant(&self, quadrant: Quadrant) -> StoreResult<Vec<Task>> {
        self.get_tasks(&format!("/tasks/quadrant/{}", u8::from(quadrant)))
            .await
    }

    async fn fetch_with_tags(&self, tags: &BTreeSet<String>) -> StoreResult<Vec<Task>> {
        // The API has no tag endpoint; filter after a full fetch.
        let tasks = self.fetch_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| tags_intersect(&t.tags, tags))
            .collect())
    }

    async fn fetch_changed_since(&self, since_ms: i64) -> StoreResult<Vec<Task>> {
        let response = self
            .authorize(self.client.get(self.endpoint("/sync")))
            .query(&[("lastSyncTime", since_ms)])
            .send()
            .await?;
        let response = Self::check(response, None)?;
        let body: SyncResponse = response.json().await?;
        let mut tasks = body.tasks;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }
}
