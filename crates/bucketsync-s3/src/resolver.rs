//! Profile to client resolution
//!
//! [`S3StoreResolver`] turns a profile name into an [`S3ObjectStore`]. Clients
//! are built on first use and cached, so every batch of a watch session
//! shares one connection pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use tokio::sync::Mutex;
use tracing::{debug, info};

use bucketsync_core::config::{Config, ProfileConfig};
use bucketsync_core::domain::ProfileId;
use bucketsync_core::ports::{IObjectStore, IStoreResolver};

use crate::store::S3ObjectStore;
use crate::S3Error;

/// Name of the profile that works without any configuration
pub const DEFAULT_PROFILE: &str = "default";

/// Builds and caches one S3 client per profile
pub struct S3StoreResolver {
    profiles: BTreeMap<String, ProfileConfig>,
    clients: Mutex<HashMap<ProfileId, Arc<S3ObjectStore>>>,
}

impl S3StoreResolver {
    pub fn new(profiles: BTreeMap<String, ProfileConfig>) -> Self {
        Self {
            profiles,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profiles.clone())
    }

    /// Connection settings of `profile`
    ///
    /// # Errors
    /// Returns `S3Error::UnknownProfile` unless the profile is configured or
    /// is the implicit `default` profile
    pub fn profile(&self, profile: &ProfileId) -> Result<ProfileConfig, S3Error> {
        match self.profiles.get(profile.as_str()) {
            Some(settings) => Ok(settings.clone()),
            None if profile.as_str() == DEFAULT_PROFILE => Ok(ProfileConfig::default()),
            None => Err(S3Error::UnknownProfile(profile.to_string())),
        }
    }

    async fn build(&self, profile: &ProfileId, settings: &ProfileConfig) -> S3ObjectStore {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(settings.force_path_style);

        info!(
            profile = %profile,
            endpoint = settings.endpoint.as_deref().unwrap_or("aws"),
            etag_is_md5 = settings.etag_is_md5,
            "Created S3 client"
        );
        S3ObjectStore::new(aws_sdk_s3::Client::from_conf(builder.build()))
            .with_md5_etags(settings.etag_is_md5)
    }
}

#[async_trait::async_trait]
impl IStoreResolver for S3StoreResolver {
    async fn resolve(&self, profile: &ProfileId) -> Result<Arc<dyn IObjectStore>> {
        let mut clients = self.clients.lock().await;
        if let Some(store) = clients.get(profile) {
            debug!(profile = %profile, "Reusing cached S3 client");
            return Ok(Arc::clone(store) as Arc<dyn IObjectStore>);
        }

        let settings = self.profile(profile)?;
        let store = Arc::new(self.build(profile, &settings).await);
        clients.insert(profile.clone(), Arc::clone(&store));
        Ok(store)
    }
}
