//! Bucket provisioning

use crate::cloud::{BucketCreation, ObjectStorage, ServiceError};
use serde::Serialize;
use tracing::info;

/// Bucket created by a run; never deleted by infraboot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedBucket {
    pub name: String,
    pub region: String,
    /// Left over from an earlier run by the same account
    pub already_owned: bool,
}

pub struct StorageProvisioner<'a> {
    storage: &'a dyn ObjectStorage,
}

impl<'a> StorageProvisioner<'a> {
    pub fn new(storage: &'a dyn ObjectStorage) -> Self {
        Self { storage }
    }

    /// Creates the bucket without checking for an existing one first. A
    /// bucket this account already owns counts as provisioned.
    pub async fn create_bucket(
        &self,
        name: &str,
        region: &str,
    ) -> Result<ProvisionedBucket, ServiceError> {
        let already_owned = match self.storage.create_bucket(name, region).await? {
            BucketCreation::Created => {
                info!(bucket = name, region, "Bucket created");
                false
            }
            BucketCreation::AlreadyOwned => {
                info!(bucket = name, region, "Bucket already exists in this account");
                true
            }
        };
        Ok(ProvisionedBucket {
            name: name.to_string(),
            region: region.to_string(),
            already_owned,
        })
    }
}
