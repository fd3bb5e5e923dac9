use std::fmt;

use gantry_core::DeployMode;
use secrecy::SecretString;

use crate::command::CommandError;
use crate::executor::{CommandExecutor, RealExecutor, args};

/// gcloud CLI operations, parameterized over the executor for testability.
#[derive(Debug, Clone)]
pub struct GcloudClient<E: CommandExecutor = RealExecutor> {
    executor: E,
}

impl GcloudClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor::gcloud(),
        }
    }
}

impl Default for GcloudClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> GcloudClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// OAuth access token of the active gcloud account.
    pub async fn access_token(&self) -> Result<SecretString, CommandError> {
        let token = self
            .executor
            .exec(&args(["auth", "print-access-token", "--quiet"]))
            .await?;
        Ok(SecretString::from(token.trim().to_owned()))
    }

    // ── Doctor ──

    /// Run all diagnostic checks without early return.
    pub async fn doctor(&self, project_id: Option<&str>, mode: DeployMode) -> DoctorReport {
        let mut report = DoctorReport::default();

        match self.executor.exec(&args(["version"])).await {
            Ok(v) => {
                let version = v
                    .lines()
                    .next()
                    .and_then(|line| line.strip_prefix("Google Cloud SDK "))
                    .unwrap_or(v.trim());
                report.gcloud = CheckResult::ok(version.trim());
            }
            Err(e) => report.gcloud = CheckResult::fail(&e.to_string()),
        }

        match self
            .executor
            .exec(&args(["config", "get-value", "account"]))
            .await
        {
            Ok(a) if !a.trim().is_empty() => report.account = CheckResult::ok(a.trim()),
            _ => report.account = CheckResult::fail("no active account"),
        }

        let Some(pid) = project_id else {
            report.project =
                CheckResult::fail("projectId not set in gantry.toml or GANTRY_PROJECT_ID");
            return report;
        };

        match self
            .executor
            .exec(&args([
                "projects",
                "describe",
                pid,
                "--format",
                "value(name)",
            ]))
            .await
        {
            Ok(name) => {
                report.project = CheckResult::ok(&format!("{pid} ({name})", name = name.trim()))
            }
            Err(_) => {
                report.project = CheckResult::fail(&format!("{pid} — not accessible"));
                return report;
            }
        }

        for (label, api) in required_apis(mode) {
            let enabled = match self
                .executor
                .exec(&args([
                    "services",
                    "list",
                    "--project",
                    pid,
                    "--filter",
                    &format!("config.name={api}"),
                    "--format",
                    "value(config.name)",
                ]))
                .await
            {
                Ok(out) => !out.trim().is_empty(),
                Err(e) => {
                    tracing::debug!(api, error = %e, "service listing failed");
                    false
                }
            };

            report.apis.push(ApiCheck {
                name: (*label).to_owned(),
                result: if enabled {
                    CheckResult::ok("Enabled")
                } else {
                    CheckResult::fail("Not enabled")
                },
            });
        }

        report
    }
}

/// APIs the deploy mode calls, with display labels.
pub fn required_apis(mode: DeployMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        DeployMode::CloudRun => &[
            ("Artifact Registry", "artifactregistry.googleapis.com"),
            ("Cloud Run", "run.googleapis.com"),
        ],
        DeployMode::Provision => &[
            ("Artifact Registry", "artifactregistry.googleapis.com"),
            ("Cloud Run", "run.googleapis.com"),
            ("Cloud SQL Admin", "sqladmin.googleapis.com"),
            ("Cloud Scheduler", "cloudscheduler.googleapis.com"),
        ],
        DeployMode::Instance => &[
            ("Artifact Registry", "artifactregistry.googleapis.com"),
            ("Compute Engine", "compute.googleapis.com"),
        ],
    }
}

// ── Doctor types ──

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub gcloud: CheckResult,
    pub docker: CheckResult,
    pub account: CheckResult,
    pub project: CheckResult,
    pub apis: Vec<ApiCheck>,
    pub config_file: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.gcloud.passed
            && self.docker.passed
            && self.account.passed
            && self.project.passed
            && self.config_file.passed
            && self.apis.iter().all(|a| a.result.passed)
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("gcloud CLI", &self.gcloud),
            ("docker", &self.docker),
            ("Account", &self.account),
            ("Project", &self.project),
            ("gantry.toml", &self.config_file),
        ];
        for (label, check) in rows {
            writeln!(f, "[{}] {label:<20} {}", check.icon(), check.detail)?;
        }
        for api in &self.apis {
            writeln!(f, "[{}] {:<20} {}", api.result.icon(), api.name, api.result.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Clone)]
pub struct ApiCheck {
    pub name: String,
    pub result: CheckResult,
}
