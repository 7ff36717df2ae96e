//! Saved request lifecycle.
//!
//! Every mutation except [`RequestManager::touch_last_checked`] publishes a
//! snapshot once the store has been written.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use tracing::{debug, info};

use super::models::*;
use super::store::RequestStore;
use crate::content_source::SearchQuery;
use crate::error::{ServiceError, ServiceResult};
use crate::updates::UpdateBroadcaster;

pub struct RequestManager {
    store: Arc<dyn RequestStore>,
    updates: Arc<UpdateBroadcaster>,
    mutations: Mutex<()>,
}

/// Trim every field, dropping optional ones that end up empty.
fn normalize_query(query: SearchQuery) -> SearchQuery {
    fn clean(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
    SearchQuery {
        query: query.query.trim().to_string(),
        author: clean(query.author),
        format: clean(query.format),
        language: clean(query.language),
    }
}

impl RequestManager {
    pub fn new(store: Arc<dyn RequestStore>, updates: Arc<UpdateBroadcaster>) -> Self {
        Self {
            store,
            updates,
            mutations: Mutex::new(()),
        }
    }

    fn lock_mutations(&self) -> ServiceResult<MutexGuard<'_, ()>> {
        self.mutations
            .lock()
            .map_err(|_| anyhow!("request mutation lock poisoned").into())
    }

    fn load(&self, id: i64) -> ServiceResult<SavedRequest> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("request {}", id)))
    }

    pub fn create_request(&self, query: SearchQuery) -> ServiceResult<SavedRequest> {
        let query = normalize_query(query);
        if query.query.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let request = {
            let _guard = self.lock_mutations()?;
            if let Some(existing) = self.store.find_active_by_query(&query)? {
                return Err(ServiceError::DuplicateRequest(existing));
            }
            self.store.create(&query, crate::now_millis())?
        };

        info!("Created request {} for '{}'", request.id, request.query_params.query);
        self.updates.publish();
        Ok(request)
    }

    pub fn get_request(&self, id: i64) -> ServiceResult<SavedRequest> {
        self.load(id)
    }

    pub fn list_requests(&self) -> ServiceResult<Vec<SavedRequest>> {
        Ok(self.store.list_all()?)
    }

    /// Active requests in the order the checker processes them.
    pub fn list_active(&self) -> ServiceResult<Vec<SavedRequest>> {
        Ok(self.store.list_active()?)
    }

    /// active -> cancelled
    pub fn cancel_request(&self, id: i64) -> ServiceResult<SavedRequest> {
        let request = {
            let _guard = self.lock_mutations()?;
            let mut request = self.load(id)?;
            if request.status != RequestStatus::Active {
                return Err(ServiceError::invalid_transition(request.status, "active"));
            }
            request.status = RequestStatus::Cancelled;
            self.write(&request)?;
            request
        };

        info!("Cancelled request {}", id);
        self.updates.publish();
        Ok(request)
    }

    /// cancelled -> active
    pub fn reactivate_request(&self, id: i64) -> ServiceResult<SavedRequest> {
        let request = {
            let _guard = self.lock_mutations()?;
            let mut request = self.load(id)?;
            if request.status != RequestStatus::Cancelled {
                return Err(ServiceError::invalid_transition(request.status, "cancelled"));
            }
            if let Some(existing) = self.store.find_active_by_query(&request.query_params)? {
                return Err(ServiceError::DuplicateRequest(existing));
            }
            request.status = RequestStatus::Active;
            self.write(&request)?;
            request
        };

        info!("Reactivated request {}", id);
        self.updates.publish();
        Ok(request)
    }

    /// active -> fulfilled, recording the fingerprint that satisfied it.
    pub fn mark_fulfilled(&self, id: i64, fingerprint: &str) -> ServiceResult<SavedRequest> {
        let request = {
            let _guard = self.lock_mutations()?;
            let mut request = self.load(id)?;
            if request.status != RequestStatus::Active {
                return Err(ServiceError::invalid_transition(request.status, "active"));
            }
            request.status = RequestStatus::Fulfilled;
            request.fulfilled_book_fingerprint = Some(fingerprint.to_string());
            request.fulfilled_at = Some(crate::now_millis());
            self.write(&request)?;
            request
        };

        info!("Request {} fulfilled by {}", id, fingerprint);
        self.updates.publish();
        Ok(request)
    }

    /// Permanently remove a request in any status.
    pub fn delete_request(&self, id: i64) -> ServiceResult<bool> {
        let deleted = {
            let _guard = self.lock_mutations()?;
            self.store.delete(id)?
        };
        if deleted {
            info!("Deleted request {}", id);
            self.updates.publish();
        }
        Ok(deleted)
    }

    /// Record that the checker looked at a request. Not broadcast.
    pub fn touch_last_checked(&self, id: i64) -> ServiceResult<bool> {
        let touched = self.store.set_last_checked(id, crate::now_millis())?;
        debug!("Touched last_checked_at of request {}: {}", id, touched);
        Ok(touched)
    }

    fn write(&self, request: &SavedRequest) -> ServiceResult<()> {
        if !self.store.update(request)? {
            return Err(ServiceError::NotFound(format!("request {}", request.id)));
        }
        Ok(())
    }
}
