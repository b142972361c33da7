//! Read-side library operations for the rest of the backend

use crate::error::{LibraryError, Result};
use crate::models::{Library, LibraryItem, ReleaseId};
use crate::repositories::{
    ItemFilter, LibraryItemRepository, LibraryRepository, Page, PageRequest,
};
use core_auth::UserId;
use std::sync::Arc;
use tracing::debug;

pub struct LibraryService {
    libraries: Arc<dyn LibraryRepository>,
    items: Arc<dyn LibraryItemRepository>,
}

impl LibraryService {
    pub fn new(libraries: Arc<dyn LibraryRepository>, items: Arc<dyn LibraryItemRepository>) -> Self {
        Self { libraries, items }
    }

    /// The user's live library.
    ///
    /// # Errors
    /// [`LibraryError::NotFound`] if the user was never synchronized.
    pub async fn get_library(&self, user: UserId) -> Result<Library> {
        self.libraries
            .find_by_owner(user)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Library".to_string(),
                id: user.to_string(),
            })
    }

    pub async fn list_items(
        &self,
        user: UserId,
        request: PageRequest,
        filter: ItemFilter,
    ) -> Result<Page<LibraryItem>> {
        self.items.list_active(user, request, filter).await
    }

    /// Record that a release was placed into one of the user's crates.
    pub async fn tag_into_collection(&self, user: UserId, release_id: ReleaseId) -> Result<bool> {
        let tagged = self.items.mark_tagged(user, release_id).await?;
        debug!(user_id = %user, release_id = %release_id, tagged, "Tagged library item");
        Ok(tagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repositories::{SqliteLibraryItemRepository, SqliteLibraryRepository};

    #[tokio::test]
    async fn test_get_library_not_found_then_found() {
        let pool = create_test_pool().await.unwrap();
        let libraries = Arc::new(SqliteLibraryRepository::new(pool.clone()));
        let service = LibraryService::new(
            libraries.clone(),
            Arc::new(SqliteLibraryItemRepository::new(pool)),
        );
        let user = UserId::new();

        assert!(matches!(
            service.get_library(user).await,
            Err(LibraryError::NotFound { .. })
        ));

        let created = libraries.find_or_create(user, 7).await.unwrap();
        assert_eq!(service.get_library(user).await.unwrap(), created);

        let empty = service
            .list_items(user, PageRequest::default(), ItemFilter::default())
            .await
            .unwrap();
        assert!(empty.items.is_empty());
        assert!(!service.tag_into_collection(user, ReleaseId::new()).await.unwrap());
    }
}
