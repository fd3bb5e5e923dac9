//! Desired-state description of the running service.

use std::fmt;

use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::PipelineConfig;

/// Network exposure policy of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ingress {
    #[default]
    All,
    Internal,
    InternalAndCloudLoadBalancing,
}

impl Ingress {
    /// Cloud Run Admin API v2 enum value.
    pub fn api_value(self) -> &'static str {
        match self {
            Ingress::All => "INGRESS_TRAFFIC_ALL",
            Ingress::Internal => "INGRESS_TRAFFIC_INTERNAL_ONLY",
            Ingress::InternalAndCloudLoadBalancing => {
                "INGRESS_TRAFFIC_INTERNAL_LOAD_BALANCER"
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvVar")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Everything a deployment target needs to know about the service besides
/// the image. Built once per deployment from [`PipelineConfig`].
///
/// Env var names are unique: [`RawConfig::validate`](crate::RawConfig::validate)
/// rejects extra vars that collide with the ones derived from parameters,
/// and the rest come from a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub project_id: String,
    pub region: String,
    pub service_name: String,
    pub port: u16,
    pub cpu: String,
    pub memory: String,
    pub min_instances: u32,
    pub max_instances: u32,
    pub concurrency: u32,
    pub ingress: Ingress,
    pub service_account: Option<String>,
    pub env: Vec<EnvVar>,
}

impl ServiceSpec {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let service = &config.service;

        let mut env = vec![
            EnvVar {
                name: "DATABASE_URL".to_owned(),
                value: config.database_url.expose_secret().to_owned(),
            },
            EnvVar {
                name: "NTFY_UNKNOWN_MEDIA".to_owned(),
                value: config.ntfy_unknown_media.clone(),
            },
            EnvVar {
                name: "NTFY_UNKNOWN_ERROR".to_owned(),
                value: config.ntfy_unknown_error.clone(),
            },
        ];
        env.extend(service.env.iter().map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        }));

        Self {
            project_id: config.project_id.clone(),
            region: config.region.clone(),
            service_name: config.app_name.clone(),
            port: service.port,
            cpu: service.cpu.clone(),
            memory: service.memory.clone(),
            min_instances: service.min_instances,
            max_instances: service.max_instances,
            concurrency: service.concurrency,
            ingress: service.ingress,
            service_account: service.service_account.clone(),
            env,
        }
    }

    /// Fully qualified Cloud Run service name.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/services/{}",
            self.project_id, self.region, self.service_name
        )
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}
