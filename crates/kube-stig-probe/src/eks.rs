//! EKS control-plane metadata
//!
//! On a managed control plane the API server's host is out of reach, so
//! checks ask the EKS API instead. A cluster that does not exist is a normal
//! answer (every accessor goes empty); any other provider failure is a hard
//! error, because a credentials or region problem must never read as
//! "compliant".

use aws_config::{BehaviorVersion, Region};
use aws_sdk_eks::error::DisplayErrorContext;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Add-on status reported by EKS for a healthy add-on
pub const ADDON_ACTIVE: &str = "ACTIVE";

/// Outcome of a single provider call that did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The cluster or add-on does not exist
    #[error("resource not found")]
    NotFound,

    /// Any other failure: credentials, region, throttling, network
    #[error("{0}")]
    Provider(String),
}

/// Hard failure while reading managed-cluster metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagedClusterError {
    #[error("aws_eks_cluster({cluster}) error: {message}")]
    Provider { cluster: String, message: String },
}

/// One `logging.clusterLogging` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSetup {
    pub enabled: bool,
    pub types: Vec<String>,
}

/// One `encryptionConfig` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncryptionEntry {
    pub resources: Vec<String>,
    /// KMS key ARN of the provider
    pub provider: Option<String>,
}

/// Cluster attributes returned by describe-cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub name: String,
    pub arn: Option<String>,
    pub version: Option<String>,
    pub platform_version: Option<String>,
    pub status: Option<String>,
    pub endpoint: Option<String>,
    pub logging: Vec<LogSetup>,
    pub encryption: Vec<EncryptionEntry>,
    pub oidc_issuer: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub cluster_security_group_id: Option<String>,
    pub endpoint_public_access: bool,
    pub endpoint_private_access: bool,
    pub public_access_cidrs: Vec<String>,
    pub service_ipv4_cidr: Option<String>,
    pub ip_family: Option<String>,
}

/// Add-on attributes returned by describe-addon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddonDescriptor {
    pub name: String,
    pub status: Option<String>,
    pub version: Option<String>,
    pub arn: Option<String>,
    pub service_account_role_arn: Option<String>,
}

/// The three managed control-plane calls the checks rely on
pub trait ClusterApi: Send + Sync {
    fn describe_cluster<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, Result<ClusterDescriptor, ApiError>>;

    fn list_addons<'a>(&'a self, cluster: &'a str) -> BoxFuture<'a, Result<Vec<String>, ApiError>>;

    fn describe_addon<'a>(
        &'a self,
        cluster: &'a str,
        addon: &'a str,
    ) -> BoxFuture<'a, Result<AddonDescriptor, ApiError>>;
}

/// [`ClusterApi`] backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct EksApi {
    client: aws_sdk_eks::Client,
}

impl EksApi {
    /// Build a client from the standard AWS credential chain
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self {
            client: aws_sdk_eks::Client::new(&config),
        }
    }

    pub fn from_client(client: aws_sdk_eks::Client) -> Self {
        Self { client }
    }
}

impl ClusterApi for EksApi {
    fn describe_cluster<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ClusterDescriptor, ApiError>> {
        Box::pin(async move {
            tracing::debug!("eks:DescribeCluster {}", name);
            let output = match self.client.describe_cluster().name(name).send().await {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_resource_not_found_exception()) =>
                {
                    return Err(ApiError::NotFound);
                }
                Err(err) => return Err(ApiError::Provider(DisplayErrorContext(&err).to_string())),
            };

            let cluster = output.cluster().ok_or(ApiError::NotFound)?;
            Ok(cluster_descriptor(name, cluster))
        })
    }

    fn list_addons<'a>(&'a self, cluster: &'a str) -> BoxFuture<'a, Result<Vec<String>, ApiError>> {
        Box::pin(async move {
            tracing::debug!("eks:ListAddons {}", cluster);
            let mut addons = Vec::new();
            let mut next_token: Option<String> = None;

            loop {
                let output = match self
                    .client
                    .list_addons()
                    .cluster_name(cluster)
                    .set_next_token(next_token.take())
                    .send()
                    .await
                {
                    Ok(output) => output,
                    Err(err)
                        if err
                            .as_service_error()
                            .is_some_and(|e| e.is_resource_not_found_exception()) =>
                    {
                        return Err(ApiError::NotFound);
                    }
                    Err(err) => {
                        return Err(ApiError::Provider(DisplayErrorContext(&err).to_string()));
                    }
                };

                addons.extend(output.addons().iter().cloned());
                match output.next_token() {
                    Some(token) => next_token = Some(token.to_string()),
                    None => break,
                }
            }

            Ok(addons)
        })
    }

    fn describe_addon<'a>(
        &'a self,
        cluster: &'a str,
        addon: &'a str,
    ) -> BoxFuture<'a, Result<AddonDescriptor, ApiError>> {
        Box::pin(async move {
            tracing::debug!("eks:DescribeAddon {} {}", cluster, addon);
            let output = match self
                .client
                .describe_addon()
                .cluster_name(cluster)
                .addon_name(addon)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_resource_not_found_exception()) =>
                {
                    return Err(ApiError::NotFound);
                }
                Err(err) => return Err(ApiError::Provider(DisplayErrorContext(&err).to_string())),
            };

            let found = output.addon().ok_or(ApiError::NotFound)?;
            Ok(AddonDescriptor {
                name: found.addon_name().unwrap_or(addon).to_string(),
                status: found.status().map(|s| s.as_str().to_string()),
                version: found.addon_version().map(str::to_string),
                arn: found.addon_arn().map(str::to_string),
                service_account_role_arn: found.service_account_role_arn().map(str::to_string),
            })
        })
    }
}

fn cluster_descriptor(name: &str, cluster: &aws_sdk_eks::types::Cluster) -> ClusterDescriptor {
    let logging = cluster
        .logging()
        .map(|l| {
            l.cluster_logging()
                .iter()
                .map(|setup| LogSetup {
                    enabled: setup.enabled().unwrap_or(false),
                    types: setup.types().iter().map(|t| t.as_str().to_string()).collect(),
                })
                .collect()
        })
        .unwrap_or_default();

    let encryption = cluster
        .encryption_config()
        .iter()
        .map(|entry| EncryptionEntry {
            resources: entry.resources().to_vec(),
            provider: entry
                .provider()
                .and_then(|p| p.key_arn())
                .map(str::to_string),
        })
        .collect();

    let vpc = cluster.resources_vpc_config();
    let network = cluster.kubernetes_network_config();

    ClusterDescriptor {
        name: cluster.name().unwrap_or(name).to_string(),
        arn: cluster.arn().map(str::to_string),
        version: cluster.version().map(str::to_string),
        platform_version: cluster.platform_version().map(str::to_string),
        status: cluster.status().map(|s| s.as_str().to_string()),
        endpoint: cluster.endpoint().map(str::to_string),
        logging,
        encryption,
        oidc_issuer: cluster
            .identity()
            .and_then(|i| i.oidc())
            .and_then(|o| o.issuer())
            .map(str::to_string),
        vpc_id: vpc.and_then(|v| v.vpc_id()).map(str::to_string),
        subnet_ids: vpc.map(|v| v.subnet_ids().to_vec()).unwrap_or_default(),
        security_group_ids: vpc.map(|v| v.security_group_ids().to_vec()).unwrap_or_default(),
        cluster_security_group_id: vpc
            .and_then(|v| v.cluster_security_group_id())
            .map(str::to_string),
        endpoint_public_access: vpc.is_some_and(|v| v.endpoint_public_access()),
        endpoint_private_access: vpc.is_some_and(|v| v.endpoint_private_access()),
        public_access_cidrs: vpc.map(|v| v.public_access_cidrs().to_vec()).unwrap_or_default(),
        service_ipv4_cidr: network
            .and_then(|n| n.service_ipv4_cidr())
            .map(str::to_string),
        ip_family: network
            .and_then(|n| n.ip_family())
            .map(|f| f.as_str().to_string()),
    }
}

/// Metadata of one managed cluster, fetched once per instance
pub struct ManagedCluster {
    name: String,
    api: Arc<dyn ClusterApi>,
    descriptor: Option<ClusterDescriptor>,
    addons: OnceCell<Vec<String>>,
}

impl std::fmt::Debug for ManagedCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedCluster")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl ManagedCluster {
    /// Describe a cluster by name
    ///
    /// A missing cluster yields an instance with `exists() == false`; any
    /// other provider error is returned.
    pub async fn describe(
        api: Arc<dyn ClusterApi>,
        name: impl Into<String>,
    ) -> Result<Self, ManagedClusterError> {
        let name = name.into();
        let descriptor = match api.describe_cluster(&name).await {
            Ok(descriptor) => Some(descriptor),
            Err(ApiError::NotFound) => {
                tracing::info!("EKS cluster {} not found", name);
                None
            }
            Err(ApiError::Provider(message)) => {
                return Err(ManagedClusterError::Provider {
                    cluster: name,
                    message,
                });
            }
        };

        Ok(Self {
            name,
            api,
            descriptor,
            addons: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn descriptor(&self) -> Option<&ClusterDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn version(&self) -> Option<&str> {
        self.descriptor.as_ref()?.version.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.descriptor.as_ref()?.status.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.descriptor.as_ref()?.endpoint.as_deref()
    }

    pub fn oidc_issuer(&self) -> Option<&str> {
        self.descriptor.as_ref()?.oidc_issuer.as_deref()
    }

    pub fn vpc_id(&self) -> Option<&str> {
        self.descriptor.as_ref()?.vpc_id.as_deref()
    }

    pub fn logging_config(&self) -> &[LogSetup] {
        self.descriptor.as_ref().map_or(&[], |d| &d.logging)
    }

    pub fn encryption_config(&self) -> &[EncryptionEntry] {
        self.descriptor.as_ref().map_or(&[], |d| &d.encryption)
    }

    pub fn subnet_ids(&self) -> &[String] {
        self.descriptor.as_ref().map_or(&[], |d| &d.subnet_ids)
    }

    pub fn security_group_ids(&self) -> &[String] {
        self.descriptor.as_ref().map_or(&[], |d| &d.security_group_ids)
    }

    pub fn public_access_cidrs(&self) -> &[String] {
        self.descriptor.as_ref().map_or(&[], |d| &d.public_access_cidrs)
    }

    pub fn endpoint_public_access(&self) -> bool {
        self.descriptor.as_ref().is_some_and(|d| d.endpoint_public_access)
    }

    pub fn endpoint_private_access(&self) -> bool {
        self.descriptor.as_ref().is_some_and(|d| d.endpoint_private_access)
    }

    /// Whether envelope encryption covers Kubernetes secrets
    pub fn secrets_encrypted(&self) -> bool {
        self.encryption_config()
            .iter()
            .any(|entry| entry.resources.iter().any(|r| r == "secrets"))
    }

    /// Log types of enabled logging entries only
    pub fn enabled_log_types(&self) -> Vec<&str> {
        self.logging_config()
            .iter()
            .filter(|setup| setup.enabled)
            .flat_map(|setup| setup.types.iter().map(String::as_str))
            .collect()
    }

    pub fn audit_logging_enabled(&self) -> bool {
        self.enabled_log_types().contains(&"audit")
    }

    /// Installed add-on names
    ///
    /// Listing failures are logged and read as "no add-ons".
    pub async fn addons(&self) -> &[String] {
        self.addons
            .get_or_init(|| async {
                if !self.exists() {
                    return Vec::new();
                }
                match self.api.list_addons(&self.name).await {
                    Ok(addons) => addons,
                    Err(e) => {
                        tracing::warn!("Failed to list add-ons for {}: {}", self.name, e);
                        Vec::new()
                    }
                }
            })
            .await
    }

    /// Descriptor of an installed add-on, `None` if it is not installed
    pub async fn addon_info(&self, addon: &str) -> Result<Option<AddonDescriptor>, ManagedClusterError> {
        if !self.addons().await.iter().any(|a| a == addon) {
            return Ok(None);
        }
        match self.api.describe_addon(&self.name, addon).await {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(ApiError::NotFound) => Ok(None),
            Err(ApiError::Provider(message)) => Err(ManagedClusterError::Provider {
                cluster: self.name.clone(),
                message,
            }),
        }
    }

    /// Whether an add-on is installed and reports `ACTIVE`
    pub async fn addon_active(&self, addon: &str) -> Result<bool, ManagedClusterError> {
        Ok(self
            .addon_info(addon)
            .await?
            .is_some_and(|info| info.status.as_deref() == Some(ADDON_ACTIVE)))
    }
}
