//! S3 object store adapter using the AWS SDK.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use bucketbridge_common::{BucketRef, Error, ObjectBody, ObjectRef, Result};

use super::federation::FEDERATION_ERROR_MARKER;
use crate::store::{collect_pages, ObjectStore};

/// Region where buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Error codes S3 returns for credentials it no longer accepts.
const CREDENTIAL_ERROR_CODES: [&str; 3] = ["ExpiredToken", "InvalidToken", "InvalidAccessKeyId"];

/// Connection settings for an S3 client.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// AWS region.
    pub region: String,
    /// Endpoint override for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Use path-style URLs (`endpoint/bucket/key`) instead of virtual-hosted style.
    pub force_path_style: bool,
}

impl S3Settings {
    /// Settings for the public AWS endpoint in `region`.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

/// Map an SDK failure onto the common error taxonomy.
fn map_sdk_error<E>(operation: &str, err: SdkError<E>) -> Error
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();

    if detail.contains(FEDERATION_ERROR_MARKER) {
        return Error::Unauthorized(format!(
            "{}: federated credentials could not be resolved: {}",
            operation, detail
        ));
    }

    if err
        .code()
        .is_some_and(|code| CREDENTIAL_ERROR_CODES.contains(&code))
    {
        return Error::Unauthorized(format!("{}: {}", operation, detail));
    }

    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(401) => Error::Unauthorized(format!("{}: {}", operation, detail)),
        Some(403) => Error::Forbidden(format!("{}: {}", operation, detail)),
        Some(404) => Error::NotFound(format!("{}: {}", operation, detail)),
        _ => Error::Network(format!("{}: {}", operation, detail)),
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// S3 object store bound to one set of credentials.
pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Create a store that resolves credentials from `credentials`.
    ///
    /// Credentials are resolved lazily on the first signed request. SDK
    /// retries are disabled: every operation is a single attempt.
    pub fn new(settings: S3Settings, credentials: impl ProvideCredentials + 'static) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .retry_config(RetryConfig::disabled())
            .credentials_provider(credentials);

        if let Some(endpoint_url) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            region: settings.region,
        }
    }

    /// Region this store talks to.
    pub fn region(&self) -> &str {
        &self.region
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            // Another caller created it between our existence check and create.
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                debug!(bucket, "Bucket already owned, treating as created");
                Ok(())
            }
            Err(err) => Err(map_sdk_error("CreateBucket", err)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<BucketRef>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error("ListBuckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                b.name().map(|name| BucketRef {
                    name: name.to_string(),
                    created_at: b.creation_date().and_then(to_chrono),
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectRef>> {
        let objects = collect_pages(|token| async move {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

            let page: Vec<ObjectRef> = output
                .contents()
                .iter()
                .filter_map(|o| {
                    o.key().map(|key| ObjectRef {
                        key: key.to_string(),
                        size: o.size().unwrap_or(0).max(0) as u64,
                        last_modified: o.last_modified().and_then(to_chrono),
                    })
                })
                .collect();

            let next = match output.is_truncated() {
                Some(true) => output.next_continuation_token().map(str::to_string),
                _ => None,
            };

            Ok((page, next))
        })
        .await?;

        debug!(bucket, count = objects.len(), "Listed bucket objects");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn ensure_bucket_exists(&self, bucket: &str) -> Result<()> {
        let err = match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        // HEAD responses carry no body, so the status decides.
        match map_sdk_error("HeadBucket", err) {
            Error::NotFound(_) => {
                info!(bucket, "Bucket does not exist, creating");
                self.create_bucket(bucket).await?;
                info!(bucket, "Bucket created");
                Ok(())
            }
            e @ Error::Forbidden(_) => {
                error!(bucket, "Access denied. Check the identity pool role permissions.");
                Err(e)
            }
            e => {
                error!(bucket, error = %e, "Unexpected error probing bucket");
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", e))?;

        let content_type = output.content_type().map(str::to_string);
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("Failed to read object body: {}", e)))?
            .into_bytes();

        Ok(ObjectBody::new(data, content_type))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObject", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
    use aws_credential_types::Credentials;
    use httpmock::Method::{GET, HEAD, PUT};
    use httpmock::prelude::HttpMockRequest;
    use httpmock::MockServer;

    fn store_for(server: &MockServer) -> S3ObjectStore {
        let settings = S3Settings {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: Some(server.base_url()),
            force_path_style: true,
        };
        let credentials = Credentials::new("AKIDTEST", "secret", None, None, "test");
        S3ObjectStore::new(settings, credentials)
    }

    #[derive(Debug)]
    struct RejectedFederation;

    impl ProvideCredentials for RejectedFederation {
        fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
        where
            Self: 'a,
        {
            ProvideCredentialsFuture::ready(Err(CredentialsError::provider_error(format!(
                "{FEDERATION_ERROR_MARKER}: GetId failed: NotAuthorizedException"
            ))))
        }
    }

    #[tokio::test]
    async fn test_list_buckets() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>owner</ID></Owner>
  <Buckets>
    <Bucket><Name>alpha</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>beta</Name><CreationDate>2024-02-01T00:00:00.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#,
                    );
            })
            .await;

        let buckets = store_for(&server).list_buckets().await.unwrap();

        let names: Vec<_> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(buckets[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_list_objects_single_page() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/alpha")
                    .query_param("list-type", "2");
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>alpha</Name>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.txt</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><Size>3</Size></Contents>
  <Contents><Key>b.png</Key><LastModified>2024-01-02T00:00:00.000Z</LastModified><Size>10</Size></Contents>
</ListBucketResult>"#,
                    );
            })
            .await;

        let objects = store_for(&server).list_objects("alpha").await.unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "a.txt");
        assert_eq!(objects[0].size, 3);
        assert_eq!(objects[1].size, 10);
    }

    fn without_continuation(req: &HttpMockRequest) -> bool {
        !req.query_params
            .as_ref()
            .map(|params| params.iter().any(|(k, _)| k == "continuation-token"))
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_list_objects_follows_continuation_token() {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/alpha")
                    .query_param("list-type", "2")
                    .matches(without_continuation);
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>alpha</Name>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>tok2</NextContinuationToken>
  <Contents><Key>a.txt</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><Size>1</Size></Contents>
  <Contents><Key>b.txt</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><Size>2</Size></Contents>
</ListBucketResult>"#,
                    );
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/alpha")
                    .query_param("list-type", "2")
                    .query_param("continuation-token", "tok2");
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(
                        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>alpha</Name>
  <KeyCount>1</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>c.txt</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><Size>3</Size></Contents>
</ListBucketResult>"#,
                    );
            })
            .await;

        let objects = store_for(&server).list_objects("alpha").await.unwrap();

        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt"]);
        first.assert_hits_async(1).await;
        second.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_ensure_bucket_creates_once() {
        let server = MockServer::start_async().await;
        let missing = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/fresh");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/fresh");
                then.status(200);
            })
            .await;

        let store = store_for(&server);
        store.ensure_bucket_exists("fresh").await.unwrap();
        missing.assert_hits_async(1).await;

        missing.delete_async().await;
        let present = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/fresh");
                then.status(200);
            })
            .await;

        store.ensure_bucket_exists("fresh").await.unwrap();

        present.assert_hits_async(1).await;
        create.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_ensure_existing_bucket_skips_create() {
        let server = MockServer::start_async().await;
        let head = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/alpha");
                then.status(200);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/alpha");
                then.status(200);
            })
            .await;

        let store = store_for(&server);
        store.ensure_bucket_exists("alpha").await.unwrap();
        store.ensure_bucket_exists("alpha").await.unwrap();

        head.assert_hits_async(2).await;
        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_ensure_missing_bucket_creates_it() {
        let server = MockServer::start_async().await;
        let head = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/fresh");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/fresh");
                then.status(200);
            })
            .await;

        store_for(&server).ensure_bucket_exists("fresh").await.unwrap();

        head.assert_hits_async(1).await;
        create.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_ensure_forbidden_bucket_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/locked");
                then.status(403);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/locked");
                then.status(200);
            })
            .await;

        let err = store_for(&server)
            .ensure_bucket_exists("locked")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_get_object_returns_content_type() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/alpha/report.csv");
                then.status(200)
                    .header("content-type", "text/csv")
                    .body("a,b,c");
            })
            .await;

        let body = store_for(&server)
            .get_object("alpha", "report.csv")
            .await
            .unwrap();

        assert_eq!(body.bytes.as_ref(), b"a,b,c");
        assert_eq!(body.content_type, "text/csv");
    }

    #[tokio::test]
    async fn test_put_object_sends_content_type() {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/alpha/notes.pdf")
                    .header("content-type", "application/pdf")
                    .body_contains("%PDF");
                then.status(200);
            })
            .await;

        store_for(&server)
            .put_object(
                "alpha",
                "notes.pdf",
                Bytes::from_static(b"%PDF-1.7"),
                "application/pdf",
            )
            .await
            .unwrap();

        put.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_rejected_federation_is_unauthorized_without_request() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.path_contains("/");
                then.status(200);
            })
            .await;

        let settings = S3Settings {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: Some(server.base_url()),
            force_path_style: true,
        };
        let store = S3ObjectStore::new(settings, RejectedFederation);

        let err = store.list_buckets().await.unwrap_err();

        assert!(matches!(err, Error::Unauthorized(_)));
        any.assert_hits_async(0).await;
    }
}
