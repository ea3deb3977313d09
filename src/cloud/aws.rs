//! AWS implementations of the collaborator traits

use super::{
    BucketCreation, CallerIdentity, IdentityService, ObjectStorage, RegistryService, ServiceError,
    TemporaryCredentials, TokenService,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::fmt::Debug;
use tracing::debug;

/// S3 rejects an explicit location constraint for this region
const DEFAULT_S3_REGION: &str = "us-east-1";

/// IAM, STS, S3 and ECR clients sharing one credential chain
#[derive(Debug, Clone)]
pub struct AwsCloud {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    s3: aws_sdk_s3::Client,
    ecr: aws_sdk_ecr::Client,
}

impl AwsCloud {
    /// Loads the default credential chain.
    ///
    /// IAM, STS and ECR use `client_region`; S3 talks to `storage_region` so
    /// the bucket's location constraint matches the endpoint.
    pub async fn connect(client_region: &str, storage_region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(client_region.to_string()))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .region(Region::new(storage_region.to_string()))
            .build();

        debug!(client_region, storage_region, "AWS clients initialized");

        Self {
            iam: aws_sdk_iam::Client::new(&shared),
            sts: aws_sdk_sts::Client::new(&shared),
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            ecr: aws_sdk_ecr::Client::new(&shared),
        }
    }
}

/// Maps an SDK failure onto [`ServiceError`] using the operation's own
/// not-found / already-exists predicates.
fn classify<E, R>(
    err: SdkError<E, R>,
    entity: &str,
    not_found: impl Fn(&E) -> bool,
    already_exists: impl Fn(&E) -> bool,
) -> ServiceError
where
    E: std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    if let Some(service_err) = err.as_service_error() {
        if not_found(service_err) {
            return ServiceError::NotFound(entity.to_string());
        }
        if already_exists(service_err) {
            return ServiceError::AlreadyExists(entity.to_string());
        }
    }
    if let SdkError::TimeoutError(_) = err {
        return ServiceError::rejected(format!("{}: request timed out", entity));
    }
    ServiceError::Rejected(DisplayErrorContext(&err).to_string())
}

fn never<E>(_: &E) -> bool {
    false
}

#[async_trait]
impl IdentityService for AwsCloud {
    async fn create_policy(&self, name: &str, document: &str) -> Result<String, ServiceError> {
        let entity = format!("policy {}", name);
        let output = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| {
                classify(e, &entity, never, |e| e.is_entity_already_exists_exception())
            })?;

        output
            .policy()
            .and_then(|p| p.arn())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::rejected(format!("{} created without an ARN", entity)))
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), ServiceError> {
        let entity = format!("policy {}", policy_arn);
        self.iam
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify(e, &entity, |e| e.is_no_such_entity_exception(), never))?;
        Ok(())
    }

    async fn create_role(
        &self,
        name: &str,
        trust_document: &str,
        description: &str,
    ) -> Result<String, ServiceError> {
        let entity = format!("role {}", name);
        let output = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_document)
            .description(description)
            .send()
            .await
            .map_err(|e| {
                classify(e, &entity, never, |e| e.is_entity_already_exists_exception())
            })?;

        output
            .role()
            .map(|r| r.arn().to_string())
            .ok_or_else(|| ServiceError::rejected(format!("{} created without an ARN", entity)))
    }

    async fn delete_role(&self, name: &str) -> Result<(), ServiceError> {
        let entity = format!("role {}", name);
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| classify(e, &entity, |e| e.is_no_such_entity_exception(), never))?;
        Ok(())
    }

    async fn attach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), ServiceError> {
        let entity = format!("role {} / policy {}", role_name, policy_arn);
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify(e, &entity, |e| e.is_no_such_entity_exception(), never))?;
        Ok(())
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), ServiceError> {
        let entity = format!("role {} / policy {}", role_name, policy_arn);
        self.iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| classify(e, &entity, |e| e.is_no_such_entity_exception(), never))?;
        Ok(())
    }
}

#[async_trait]
impl TokenService for AwsCloud {
    async fn caller_identity(&self) -> Result<CallerIdentity, ServiceError> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| classify(e, "caller identity", never, never))?;

        match (output.account(), output.arn()) {
            (Some(account), Some(arn)) => Ok(CallerIdentity {
                account_id: account.to_string(),
                arn: arn.to_string(),
            }),
            _ => Err(ServiceError::rejected(
                "caller identity response is missing account or ARN",
            )),
        }
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ServiceError> {
        let entity = format!("role {}", role_arn);
        let output = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|e| classify(e, &entity, never, never))?;

        let creds = output
            .credentials()
            .ok_or_else(|| ServiceError::rejected(format!("{} returned no credentials", entity)))?;

        let expiration = creds.expiration();
        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration: chrono::DateTime::from_timestamp(
                expiration.secs(),
                expiration.subsec_nanos(),
            )
            .map(|t| t.to_rfc3339()),
        })
    }
}

#[async_trait]
impl ObjectStorage for AwsCloud {
    async fn create_bucket(
        &self,
        name: &str,
        region: &str,
    ) -> Result<BucketCreation, ServiceError> {
        let entity = format!("bucket {}", name);
        let mut request = self.s3.create_bucket().bucket(name);
        if region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(BucketCreation::Created),
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                debug!(bucket = name, "Bucket already owned by this account");
                Ok(BucketCreation::AlreadyOwned)
            }
            Err(e) => Err(classify(e, &entity, never, |e| e.is_bucket_already_exists())),
        }
    }
}

#[async_trait]
impl RegistryService for AwsCloud {
    async fn create_repository(&self, name: &str) -> Result<(), ServiceError> {
        let entity = format!("repository {}", name);
        self.ecr
            .create_repository()
            .repository_name(name)
            .send()
            .await
            .map_err(|e| {
                classify(e, &entity, never, |e| {
                    e.is_repository_already_exists_exception()
                })
            })?;
        Ok(())
    }

    async fn put_image(
        &self,
        repository: &str,
        tag: &str,
        manifest: &str,
        media_type: &str,
    ) -> Result<Option<String>, ServiceError> {
        let entity = format!("image {}:{}", repository, tag);
        let output = self
            .ecr
            .put_image()
            .repository_name(repository)
            .image_tag(tag)
            .image_manifest(manifest)
            .image_manifest_media_type(media_type)
            .send()
            .await
            .map_err(|e| {
                classify(
                    e,
                    &entity,
                    |e| e.is_repository_not_found_exception(),
                    |e| e.is_image_already_exists_exception(),
                )
            })?;

        Ok(output
            .image()
            .and_then(|i| i.image_id())
            .and_then(|id| id.image_digest())
            .map(str::to_string))
    }
}
