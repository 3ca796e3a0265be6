use std::sync::Arc;

use super::ServiceError;
use crate::auth::ProfileStore;
use crate::database::RecordStore;
use crate::types::Profile;

/// Staff view over customer profiles
#[derive(Clone)]
pub struct CustomerService {
    profiles: ProfileStore,
}

impl CustomerService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            profiles: ProfileStore::new(store),
        }
    }

    /// Every profile, newest first
    pub async fn list(&self) -> Result<Vec<Profile>, ServiceError> {
        Ok(self.profiles.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRecordStore;
    use crate::testing::seed_profile;
    use crate::types::Role;

    #[tokio::test]
    async fn lists_newest_first() {
        let store = Arc::new(MemoryRecordStore::new());
        seed_profile(&*store, "older", Role::Customer, "First").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        seed_profile(&*store, "newer", Role::Admin, "Second").await;

        let customers = CustomerService::new(store).list().await.unwrap();
        let ids: Vec<_> = customers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["newer", "older"]);
    }
}
