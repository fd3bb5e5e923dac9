use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::spec::Ingress;

/// Name of the configuration store file in the project directory.
pub const CONFIG_FILE: &str = "gantry.toml";

/// Externally supplied parameters, addressable by store key or env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    ProjectId,
    Region,
    AppName,
    DatabaseName,
    DatabaseUrl,
    NtfyUnknownMedia,
    NtfyUnknownError,
    ApiDomain,
}

impl Parameter {
    pub const ALL: [Parameter; 8] = [
        Parameter::ProjectId,
        Parameter::Region,
        Parameter::AppName,
        Parameter::DatabaseName,
        Parameter::DatabaseUrl,
        Parameter::NtfyUnknownMedia,
        Parameter::NtfyUnknownError,
        Parameter::ApiDomain,
    ];

    /// Key under `[parameters]` in `gantry.toml`.
    pub fn key(self) -> &'static str {
        match self {
            Parameter::ProjectId => "projectId",
            Parameter::Region => "region",
            Parameter::AppName => "appName",
            Parameter::DatabaseName => "databaseName",
            Parameter::DatabaseUrl => "databaseUrl",
            Parameter::NtfyUnknownMedia => "ntfyUnknownMedia",
            Parameter::NtfyUnknownError => "ntfyUnknownError",
            Parameter::ApiDomain => "apiDomain",
        }
    }

    /// Environment variable that overrides the store value.
    pub fn env_var(self) -> &'static str {
        match self {
            Parameter::ProjectId => "GANTRY_PROJECT_ID",
            Parameter::Region => "GANTRY_REGION",
            Parameter::AppName => "GANTRY_APP_NAME",
            Parameter::DatabaseName => "GANTRY_DATABASE_NAME",
            Parameter::DatabaseUrl => "DATABASE_URL",
            Parameter::NtfyUnknownMedia => "NTFY_UNKNOWN_MEDIA",
            Parameter::NtfyUnknownError => "NTFY_UNKNOWN_ERROR",
            Parameter::ApiDomain => "GANTRY_API_DOMAIN",
        }
    }
}

/// The flat key-value parameter store (`[parameters]` table).
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub app_name: Option<String>,
    pub database_name: Option<String>,
    pub database_url: Option<String>,
    pub ntfy_unknown_media: Option<String>,
    pub ntfy_unknown_error: Option<String>,
    pub api_domain: Option<String>,
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .field("app_name", &self.app_name)
            .field("database_name", &self.database_name)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("ntfy_unknown_media", &self.ntfy_unknown_media)
            .field("ntfy_unknown_error", &self.ntfy_unknown_error)
            .field("api_domain", &self.api_domain)
            .finish()
    }
}

impl Parameters {
    fn slot(&mut self, param: Parameter) -> &mut Option<String> {
        match param {
            Parameter::ProjectId => &mut self.project_id,
            Parameter::Region => &mut self.region,
            Parameter::AppName => &mut self.app_name,
            Parameter::DatabaseName => &mut self.database_name,
            Parameter::DatabaseUrl => &mut self.database_url,
            Parameter::NtfyUnknownMedia => &mut self.ntfy_unknown_media,
            Parameter::NtfyUnknownError => &mut self.ntfy_unknown_error,
            Parameter::ApiDomain => &mut self.api_domain,
        }
    }

    /// Returns the parameter value; blank values count as absent.
    pub fn get(&self, param: Parameter) -> Option<&str> {
        let value = match param {
            Parameter::ProjectId => &self.project_id,
            Parameter::Region => &self.region,
            Parameter::AppName => &self.app_name,
            Parameter::DatabaseName => &self.database_name,
            Parameter::DatabaseUrl => &self.database_url,
            Parameter::NtfyUnknownMedia => &self.ntfy_unknown_media,
            Parameter::NtfyUnknownError => &self.ntfy_unknown_error,
            Parameter::ApiDomain => &self.api_domain,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, param: Parameter, value: impl Into<String>) {
        *self.slot(param) = Some(value.into());
    }

    pub fn unset(&mut self, param: Parameter) {
        *self.slot(param) = None;
    }
}

/// Which deployment target adapter a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    /// Direct update of an existing managed Cloud Run service.
    #[default]
    CloudRun,
    /// Declarative provisioning of the service and its backing resources.
    Provision,
    /// Container-declaration metadata update on a Compute Engine instance.
    Instance,
}

impl DeployMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::CloudRun => "cloud-run",
            DeployMode::Provision => "provision",
            DeployMode::Instance => "instance",
        }
    }

    /// Parameters that must be present before the pipeline may advance.
    pub fn required_parameters(self) -> &'static [Parameter] {
        const COMMON: &[Parameter] = &[
            Parameter::ProjectId,
            Parameter::Region,
            Parameter::AppName,
            Parameter::DatabaseUrl,
            Parameter::NtfyUnknownMedia,
            Parameter::NtfyUnknownError,
        ];
        match self {
            DeployMode::CloudRun | DeployMode::Instance => COMMON,
            DeployMode::Provision => &Parameter::ALL,
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud-run" => Ok(DeployMode::CloudRun),
            "provision" => Ok(DeployMode::Provision),
            "instance" => Ok(DeployMode::Instance),
            other => Err(format!(
                "unknown deploy mode '{other}' (expected cloud-run, provision or instance)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Paths (relative to the project root) copied into the build context.
    /// Empty means the whole tree.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// Paths removed from the build context even when included.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    /// Pinned toolchain image the build runs in
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Target platform of the built image
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Binary used as entrypoint (defaults to Cargo discovery)
    #[serde(default)]
    pub binary: Option<String>,
    /// Dockerfile inside the build context used instead of the generated one
    #[serde(default)]
    pub dockerfile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cpu")]
    pub cpu: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    /// Max concurrent requests per instance
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default)]
    pub ingress: Ingress,
    #[serde(default)]
    pub service_account: Option<String>,
    /// Extra container environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub mode: DeployMode,
    /// Registry repository images are pushed to.
    #[serde(default)]
    pub registry: Option<String>,
    /// Log docker into the registry with a gcloud access token before pushing
    #[serde(default = "default_true")]
    pub registry_login: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub zone: Option<String>,
    /// Instance name (defaults to the app name)
    pub name: Option<String>,
    /// Reset the VM once the new declaration is stored. The container
    /// supervisor only reads the declaration at boot.
    #[serde(default = "default_true")]
    pub restart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default = "default_database_version")]
    pub database_version: String,
    #[serde(default = "default_database_tier")]
    pub database_tier: String,
    #[serde(default = "default_true")]
    pub deletion_protection: bool,
    #[serde(default = "default_retained_backups")]
    pub retained_backups: u32,
    #[serde(default = "default_true")]
    pub query_insights: bool,
    #[serde(default)]
    pub authorized_networks: Vec<AuthorizedNetwork>,
    /// Grant `roles/run.invoker` to `allUsers`
    #[serde(default = "default_true")]
    pub public_invoker: bool,
    #[serde(default)]
    pub jobs: Vec<ScheduledJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizedNetwork {
    pub name: String,
    pub value: String,
}

/// A scheduler job that calls the deployed API on a cron schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub schedule: String,
    /// Path on the API domain, e.g. `/league/v1/adp`
    pub path: String,
    #[serde(default = "default_job_method")]
    pub method: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            zone: None,
            name: None,
            restart: true,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
            base_image: default_base_image(),
            platform: default_platform(),
            binary: None,
            dockerfile: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cpu: default_cpu(),
            memory: default_memory(),
            min_instances: 0,
            max_instances: default_max_instances(),
            concurrency: default_concurrency(),
            ingress: Ingress::default(),
            service_account: None,
            env: BTreeMap::new(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            mode: DeployMode::default(),
            registry: None,
            registry_login: true,
            poll_interval_secs: default_poll_interval_secs(),
            instance: InstanceConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            database_version: default_database_version(),
            database_tier: default_database_tier(),
            deletion_protection: true,
            retained_backups: default_retained_backups(),
            query_insights: true,
            authorized_networks: Vec::new(),
            public_invoker: true,
            jobs: Vec::new(),
        }
    }
}

/// Unvalidated configuration as read from `gantry.toml` and the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl RawConfig {
    /// Load from gantry.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Override parameters with non-blank values returned by `lookup`,
    /// which is queried with each parameter's env var name.
    pub fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for param in Parameter::ALL {
            if let Some(value) = lookup(param.env_var()).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(key = param.key(), env = param.env_var(), "parameter from env");
                self.parameters.set(param, value);
            }
        }
        self
    }

    /// Check every value the selected deploy mode needs and freeze the result.
    ///
    /// Fails on the first missing parameter, in [`Parameter::ALL`] order.
    pub fn validate(self) -> crate::Result<PipelineConfig> {
        let mode = self.deploy.mode;

        for param in mode.required_parameters() {
            if self.parameters.get(*param).is_none() {
                return Err(crate::Error::MissingParameter {
                    key: param.key(),
                    env: param.env_var(),
                });
            }
        }

        if mode == DeployMode::Instance
            && self
                .deploy
                .instance
                .zone
                .as_deref()
                .is_none_or(|z| z.trim().is_empty())
        {
            return Err(crate::Error::MissingSetting {
                key: "deploy.instance.zone",
                mode: mode.as_str(),
            });
        }

        validate_service(&self.service)?;

        let required = |param: Parameter| -> crate::Result<String> {
            self.parameters
                .get(param)
                .map(str::to_owned)
                .ok_or(crate::Error::MissingParameter {
                    key: param.key(),
                    env: param.env_var(),
                })
        };
        let optional = |param: Parameter| self.parameters.get(param).map(str::to_owned);

        let config = PipelineConfig {
            project_id: required(Parameter::ProjectId)?,
            region: required(Parameter::Region)?,
            app_name: required(Parameter::AppName)?,
            database_name: optional(Parameter::DatabaseName),
            database_url: SecretString::from(required(Parameter::DatabaseUrl)?),
            ntfy_unknown_media: required(Parameter::NtfyUnknownMedia)?,
            ntfy_unknown_error: required(Parameter::NtfyUnknownError)?,
            api_domain: optional(Parameter::ApiDomain),
            build: self.build,
            service: self.service,
            deploy: self.deploy,
        };

        tracing::debug!(
            mode = %config.deploy.mode,
            project = %config.project_id,
            region = %config.region,
            app = %config.app_name,
            "configuration validated"
        );
        Ok(config)
    }
}

/// Container env vars populated from required parameters.
pub(crate) const RESERVED_ENV: [&str; 3] =
    ["DATABASE_URL", "NTFY_UNKNOWN_MEDIA", "NTFY_UNKNOWN_ERROR"];

fn validate_service(service: &ServiceConfig) -> crate::Result<()> {
    if service.port == 0 {
        return Err(crate::Error::InvalidSetting {
            key: "service.port",
            reason: "must be non-zero".to_owned(),
        });
    }
    if service.max_instances == 0 {
        return Err(crate::Error::InvalidSetting {
            key: "service.max_instances",
            reason: "must be at least 1".to_owned(),
        });
    }
    if service.min_instances > service.max_instances {
        return Err(crate::Error::InvalidSetting {
            key: "service.min_instances",
            reason: format!(
                "{} exceeds max_instances {}",
                service.min_instances, service.max_instances
            ),
        });
    }
    if service.concurrency == 0 {
        return Err(crate::Error::InvalidSetting {
            key: "service.concurrency",
            reason: "must be at least 1".to_owned(),
        });
    }
    if let Some(name) = service.env.keys().find(|k| RESERVED_ENV.contains(&k.as_str())) {
        return Err(crate::Error::DuplicateEnvVar(name.clone()));
    }
    Ok(())
}

/// Validated, immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub project_id: String,
    pub region: String,
    pub app_name: String,
    pub database_name: Option<String>,
    pub database_url: SecretString,
    pub ntfy_unknown_media: String,
    pub ntfy_unknown_error: String,
    pub api_domain: Option<String>,
    pub build: BuildConfig,
    pub service: ServiceConfig,
    pub deploy: DeployConfig,
}

impl PipelineConfig {
    /// Registry repository the image is published to.
    pub fn registry(&self) -> String {
        match &self.deploy.registry {
            Some(registry) => registry.clone(),
            None => format!(
                "{region}-docker.pkg.dev/{project}/{app}/api",
                region = self.region,
                project = self.project_id,
                app = self.app_name,
            ),
        }
    }

    /// Compute Engine instance name for instance mode.
    pub fn instance_name(&self) -> &str {
        self.deploy
            .instance
            .name
            .as_deref()
            .unwrap_or(&self.app_name)
    }
}

fn default_include() -> Vec<String> {
    vec!["src".to_owned(), "Cargo.toml".to_owned(), "Cargo.lock".to_owned()]
}

fn default_exclude() -> Vec<String> {
    vec!["ci".to_owned(), "target".to_owned()]
}

fn default_base_image() -> String {
    "rust:1.73".to_owned()
}

fn default_platform() -> String {
    "linux/amd64".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_cpu() -> String {
    "1".to_owned()
}

fn default_memory() -> String {
    "512Mi".to_owned()
}

fn default_max_instances() -> u32 {
    1
}

fn default_concurrency() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_database_version() -> String {
    "POSTGRES_15".to_owned()
}

fn default_database_tier() -> String {
    "db-custom-4-15360".to_owned()
}

fn default_retained_backups() -> u32 {
    7
}

fn default_job_method() -> String {
    "POST".to_owned()
}
