//! Declarative provisioning of the service and its backing resources.
//!
//! The desired [`ResourceGraph`] is diffed against live state into a
//! [`Plan`]; only resources whose desired state differs are touched.
//!
//! Reconcile policy: an optional setting absent from configuration is not
//! part of the desired state. The diff ignores it, and replace-style updates
//! overlay the desired body on the live resource so the live value survives.
//! Objects merge recursively; container and volume lists merge element-wise,
//! other lists are replaced wholesale.
//!
//! A domain mapping routed to another service cannot be re-pointed. Planning
//! fails on it, before anything is written.

use std::fmt;
use std::time::Duration;

use gantry_core::{
    AuthorizedNetwork, ImageReference, Parameter, PipelineConfig, ScheduledJob, ServiceSpec,
};
use serde_json::{Map, Value, json};

use super::DeployError;
use super::cloud_run::service_body;
use crate::api::{
    ApiError, ApiTransport, Method, RUN_API, SCHEDULER_API, SQL_API, domain_mapping_api,
};
use crate::operation::{
    DeploymentOperation, Endpoint, OperationHandle, OperationKind, await_operation,
};

const INVOKER_ROLE: &str = "roles/run.invoker";
const INVOKER_MEMBER: &str = "allUsers";
const CLOUDSQL_VOLUME: &str = "cloudsql";
const CLOUDSQL_MOUNT: &str = "/cloudsql";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Database,
    Service,
    Invoker,
    DomainMapping,
    SchedulerJob,
}

impl ResourceKind {
    fn label(self) -> &'static str {
        match self {
            ResourceKind::Database => "database",
            ResourceKind::Service => "service",
            ResourceKind::Invoker => "invoker",
            ResourceKind::DomainMapping => "domain mapping",
            ResourceKind::SchedulerJob => "scheduler job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything besides the service spec that the resource graph is built from.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub database_name: String,
    pub api_domain: String,
    pub database_version: String,
    pub database_tier: String,
    pub deletion_protection: bool,
    pub retained_backups: u32,
    pub query_insights: bool,
    pub authorized_networks: Vec<AuthorizedNetwork>,
    pub public_invoker: bool,
    pub jobs: Vec<ScheduledJob>,
}

impl ProvisionSettings {
    pub fn from_config(config: &PipelineConfig) -> gantry_core::Result<Self> {
        let required = |value: &Option<String>, param: Parameter| {
            value.clone().ok_or(gantry_core::Error::MissingParameter {
                key: param.key(),
                env: param.env_var(),
            })
        };
        let provision = &config.deploy.provision;

        Ok(Self {
            database_name: required(&config.database_name, Parameter::DatabaseName)?,
            api_domain: required(&config.api_domain, Parameter::ApiDomain)?,
            database_version: provision.database_version.clone(),
            database_tier: provision.database_tier.clone(),
            deletion_protection: provision.deletion_protection,
            retained_backups: provision.retained_backups,
            query_insights: provision.query_insights,
            authorized_networks: provision.authorized_networks.clone(),
            public_invoker: provision.public_invoker,
            jobs: provision.jobs.clone(),
        })
    }
}

/// One node of the desired resource graph.
#[derive(Clone)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
    /// Where the live state is read from.
    pub url: String,
    pub desired: Value,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Desired state of every resource, in dependency order.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    project_id: String,
    region: String,
    resources: Vec<Resource>,
}

impl ResourceGraph {
    pub fn desired(
        image: &ImageReference,
        spec: &ServiceSpec,
        settings: &ProvisionSettings,
    ) -> Self {
        let project = &spec.project_id;
        let region = &spec.region;
        let service = spec.resource_name();

        let mut resources = vec![
            Resource {
                kind: ResourceKind::Database,
                name: settings.database_name.clone(),
                url: format!("{SQL_API}/projects/{project}/instances/{}", settings.database_name),
                desired: database_body(spec, settings),
            },
            Resource {
                kind: ResourceKind::Service,
                name: spec.service_name.clone(),
                url: format!("{RUN_API}/{service}"),
                desired: provisioned_service_body(image, spec, settings),
            },
        ];

        if settings.public_invoker {
            resources.push(Resource {
                kind: ResourceKind::Invoker,
                name: format!("{INVOKER_ROLE} {INVOKER_MEMBER}"),
                url: format!("{RUN_API}/{service}:getIamPolicy"),
                desired: json!({ "role": INVOKER_ROLE, "member": INVOKER_MEMBER }),
            });
        }

        resources.push(Resource {
            kind: ResourceKind::DomainMapping,
            name: settings.api_domain.clone(),
            url: format!(
                "{}/namespaces/{project}/domainmappings/{}",
                domain_mapping_api(region),
                settings.api_domain
            ),
            desired: json!({
                "apiVersion": "domains.cloudrun.com/v1",
                "kind": "DomainMapping",
                "metadata": { "name": settings.api_domain },
                "spec": { "routeName": spec.service_name },
            }),
        });

        for job in &settings.jobs {
            let name = format!("projects/{project}/locations/{region}/jobs/{}", job.name);
            resources.push(Resource {
                kind: ResourceKind::SchedulerJob,
                url: format!("{SCHEDULER_API}/{name}"),
                desired: json!({
                    "name": name,
                    "schedule": job.schedule,
                    "httpTarget": {
                        "uri": format!("https://{}{}", settings.api_domain, job.path),
                        "httpMethod": job.method,
                    },
                }),
                name: job.name.clone(),
            });
        }

        Self {
            project_id: project.clone(),
            region: region.clone(),
            resources,
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, kind: ResourceKind) -> Option<&Resource> {
        self.resources.iter().find(|r| r.kind == kind)
    }
}

fn database_body(spec: &ServiceSpec, settings: &ProvisionSettings) -> Value {
    let mut db_settings = json!({
        "tier": settings.database_tier,
        "deletionProtectionEnabled": settings.deletion_protection,
        "backupConfiguration": {
            "enabled": true,
            "backupRetentionSettings": {
                "retainedBackups": settings.retained_backups,
                "retentionUnit": "COUNT",
            },
        },
        "insightsConfig": { "queryInsightsEnabled": settings.query_insights },
    });
    if !settings.authorized_networks.is_empty() {
        let networks: Vec<Value> = settings
            .authorized_networks
            .iter()
            .map(|n| json!({ "name": n.name, "value": n.value }))
            .collect();
        db_settings["ipConfiguration"] = json!({ "authorizedNetworks": networks });
    }

    json!({
        "name": settings.database_name,
        "region": spec.region,
        "databaseVersion": settings.database_version,
        "settings": db_settings,
    })
}

/// [`service_body`] plus the Cloud SQL socket volume.
fn provisioned_service_body(
    image: &ImageReference,
    spec: &ServiceSpec,
    settings: &ProvisionSettings,
) -> Value {
    let connection = format!(
        "{}:{}:{}",
        spec.project_id, spec.region, settings.database_name
    );
    let mut body = service_body(image, spec);
    body["template"]["volumes"] = json!([{
        "name": CLOUDSQL_VOLUME,
        "cloudSqlInstance": { "instances": [connection] },
    }]);
    body["template"]["containers"][0]["volumeMounts"] = json!([{
        "name": CLOUDSQL_VOLUME,
        "mountPath": CLOUDSQL_MOUNT,
    }]);
    body
}

// ── Plan ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Unchanged,
}

impl Action {
    fn symbol(self) -> char {
        match self {
            Action::Create => '+',
            Action::Update => '~',
            Action::Unchanged => '=',
        }
    }
}

#[derive(Clone)]
pub struct Change {
    pub kind: ResourceKind,
    pub name: String,
    pub url: String,
    pub action: Action,
    pub desired: Value,
    pub live: Option<Value>,
}

// Bodies carry env values, including the database URL.
impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Change")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Resource-graph diff against live state.
#[derive(Debug, Clone)]
pub struct Plan {
    project_id: String,
    region: String,
    pub changes: Vec<Change>,
}

impl Plan {
    pub fn change(&self, kind: ResourceKind) -> Option<&Change> {
        self.changes.iter().find(|c| c.kind == kind)
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action != Action::Unchanged)
    }

    fn live_service_uri(&self) -> Option<String> {
        self.change(ResourceKind::Service)?
            .live
            .as_ref()?
            .get("uri")?
            .as_str()
            .map(str::to_owned)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(
                f,
                "{} {:<15} {}",
                change.action.symbol(),
                change.kind.label(),
                change.name
            )?;
        }
        let count = |action| self.changes.iter().filter(|c| c.action == action).count();
        write!(
            f,
            "{} to create, {} to update, {} unchanged",
            count(Action::Create),
            count(Action::Update),
            count(Action::Unchanged)
        )
    }
}

// ── Target ──

/// Reconciles the full resource graph: Cloud SQL instance, Cloud Run
/// service, public invoker binding, domain mapping and scheduler jobs.
#[derive(Debug, Clone)]
pub struct ProvisionTarget<T: ApiTransport> {
    transport: T,
    settings: ProvisionSettings,
    interval: Duration,
}

impl<T: ApiTransport> ProvisionTarget<T> {
    pub fn new(transport: T, settings: ProvisionSettings, interval: Duration) -> Self {
        Self {
            transport,
            settings,
            interval,
        }
    }

    pub fn from_config(config: &PipelineConfig, transport: T) -> gantry_core::Result<Self> {
        Ok(Self::new(
            transport,
            ProvisionSettings::from_config(config)?,
            Duration::from_secs(config.deploy.poll_interval_secs),
        ))
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Diff the desired graph against live state without changing anything.
    pub async fn plan(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<Plan, DeployError> {
        let graph = ResourceGraph::desired(image, spec, &self.settings);
        let mut changes = Vec::with_capacity(graph.resources.len());

        for resource in graph.resources {
            let live = self.fetch_live(&resource).await?;
            let action = match (&live, resource.kind) {
                (None, _) => Action::Create,
                (Some(policy), ResourceKind::Invoker) => {
                    if grants(policy, INVOKER_ROLE, INVOKER_MEMBER) {
                        Action::Unchanged
                    } else {
                        Action::Create
                    }
                }
                // Only the route is managed, and it cannot change in place.
                (Some(live), ResourceKind::DomainMapping) => {
                    check_route(&resource, live)?;
                    Action::Unchanged
                }
                (Some(live), _) if is_subset(&resource.desired, Some(live)) => Action::Unchanged,
                (Some(_), _) => Action::Update,
            };
            tracing::debug!(kind = %resource.kind, name = %resource.name, ?action, "planned");
            changes.push(Change {
                kind: resource.kind,
                name: resource.name,
                url: resource.url,
                action,
                desired: resource.desired,
                live,
            });
        }

        Ok(Plan {
            project_id: graph.project_id,
            region: graph.region,
            changes,
        })
    }

    async fn fetch_live(&self, resource: &Resource) -> Result<Option<Value>, DeployError> {
        match self.transport.send(Method::GET, &resource.url, None).await {
            Ok(live) => Ok(Some(live)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(rejected(resource.kind, &resource.name, e)),
        }
    }

    pub async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        let plan = self.plan(image, spec).await?;
        let changed = plan
            .changes
            .iter()
            .filter(|c| c.action != Action::Unchanged)
            .count();
        tracing::info!(changed, total = plan.changes.len(), "provision plan");
        self.apply_plan(&plan).await
    }

    /// Create or update every changed resource, in graph order.
    ///
    /// Resources that later changes depend on are awaited inline; the rest
    /// are handed back as pending operations.
    pub async fn apply_plan(&self, plan: &Plan) -> Result<DeploymentOperation, DeployError> {
        let mut operations = Vec::new();
        let mut service_uri = plan.live_service_uri();
        let mut service_pending = false;

        let pending: Vec<&Change> = plan
            .changes
            .iter()
            .filter(|c| c.action != Action::Unchanged)
            .collect();

        for (i, change) in pending.iter().enumerate() {
            let depended_on = i + 1 < pending.len();
            tracing::info!(
                kind = %change.kind,
                name = %change.name,
                action = ?change.action,
                "applying"
            );

            match change.kind {
                ResourceKind::Database => {
                    let handle = self.apply_database(plan, change).await?;
                    if change.action == Action::Create && depended_on {
                        self.await_dependency(change, &handle).await?;
                    } else {
                        operations.push(handle);
                    }
                }
                ResourceKind::Service => {
                    let handle = self.apply_service(plan, change).await?;
                    if depended_on {
                        let done = self.await_dependency(change, &handle).await?;
                        service_uri = done
                            .pointer("/response/uri")
                            .and_then(Value::as_str)
                            .map(str::to_owned)
                            .or(service_uri);
                    } else {
                        operations.push(handle);
                        service_pending = true;
                    }
                }
                ResourceKind::Invoker => self.apply_invoker(change).await?,
                ResourceKind::DomainMapping => self.apply_domain_mapping(plan, change).await?,
                ResourceKind::SchedulerJob => self.apply_job(plan, change).await?,
            }
        }

        let endpoint = if service_pending {
            Endpoint::RunResponse
        } else {
            let url = service_uri.ok_or_else(|| DeployError::UnexpectedResponse {
                resource: plan
                    .change(ResourceKind::Service)
                    .map(|c| c.url.clone())
                    .unwrap_or_default(),
                detail: "service has no uri".to_owned(),
            })?;
            if operations.is_empty() {
                return Ok(DeploymentOperation::Resolved { url });
            }
            Endpoint::Known(url)
        };

        Ok(DeploymentOperation::Pending {
            operations,
            endpoint,
        })
    }

    async fn await_dependency(
        &self,
        change: &Change,
        handle: &OperationHandle,
    ) -> Result<Value, DeployError> {
        await_operation(&self.transport, handle, self.interval)
            .await
            .map_err(|e| DeployError::Dependency {
                resource: change.name.clone(),
                source: e,
            })
    }

    async fn send(
        &self,
        change: &Change,
        method: Method,
        url: &str,
        body: Value,
    ) -> Result<Value, DeployError> {
        self.transport
            .send(method, url, Some(body))
            .await
            .map_err(|e| rejected(change.kind, &change.name, e))
    }

    async fn apply_database(
        &self,
        plan: &Plan,
        change: &Change,
    ) -> Result<OperationHandle, DeployError> {
        // Cloud SQL PATCH is a partial update; the desired body alone is enough.
        let response = match change.action {
            Action::Create => {
                let url = format!("{SQL_API}/projects/{}/instances", plan.project_id);
                self.send(change, Method::POST, &url, change.desired.clone())
                    .await?
            }
            _ => {
                self.send(change, Method::PATCH, &change.url, change.desired.clone())
                    .await?
            }
        };
        OperationHandle::from_self_link(OperationKind::SqlAdmin, &response)
            .map_err(|body| DeployError::unexpected(&change.url, &body))
    }

    async fn apply_service(
        &self,
        plan: &Plan,
        change: &Change,
    ) -> Result<OperationHandle, DeployError> {
        let response = match (&change.action, &change.live) {
            (Action::Update, Some(live)) => {
                self.send(change, Method::PATCH, &change.url, overlay(live, &change.desired))
                    .await?
            }
            _ => {
                let url = format!(
                    "{RUN_API}/projects/{}/locations/{}/services?serviceId={}",
                    plan.project_id, plan.region, change.name
                );
                self.send(change, Method::POST, &url, change.desired.clone())
                    .await?
            }
        };
        OperationHandle::from_run_response(&response)
            .map_err(|body| DeployError::unexpected(&change.url, &body))
    }

    async fn apply_invoker(&self, change: &Change) -> Result<(), DeployError> {
        let mut policy = change.live.clone().unwrap_or_else(|| json!({}));
        let Some(object) = policy.as_object_mut() else {
            return Err(DeployError::unexpected(&change.url, &policy));
        };
        let bindings = object
            .entry("bindings")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(bindings) = bindings.as_array_mut() else {
            return Err(DeployError::unexpected(&change.url, &*bindings));
        };

        let existing = bindings
            .iter()
            .position(|b| b.get("role").and_then(Value::as_str) == Some(INVOKER_ROLE));
        match existing {
            Some(i) => {
                let members = match bindings[i]["members"].take() {
                    Value::Array(mut members) => {
                        members.push(json!(INVOKER_MEMBER));
                        members
                    }
                    _ => vec![json!(INVOKER_MEMBER)],
                };
                bindings[i]["members"] = Value::Array(members);
            }
            None => bindings.push(json!({ "role": INVOKER_ROLE, "members": [INVOKER_MEMBER] })),
        }

        let url = change.url.replace(":getIamPolicy", ":setIamPolicy");
        self.send(change, Method::POST, &url, json!({ "policy": policy }))
            .await?;
        Ok(())
    }

    async fn apply_domain_mapping(&self, plan: &Plan, change: &Change) -> Result<(), DeployError> {
        let url = format!(
            "{}/namespaces/{}/domainmappings",
            domain_mapping_api(&plan.region),
            plan.project_id
        );
        self.send(change, Method::POST, &url, change.desired.clone())
            .await?;
        Ok(())
    }

    async fn apply_job(&self, plan: &Plan, change: &Change) -> Result<(), DeployError> {
        match (&change.action, &change.live) {
            (Action::Update, Some(live)) => {
                self.send(change, Method::PATCH, &change.url, overlay(live, &change.desired))
                    .await?;
            }
            _ => {
                let url = format!(
                    "{SCHEDULER_API}/projects/{}/locations/{}/jobs",
                    plan.project_id, plan.region
                );
                self.send(change, Method::POST, &url, change.desired.clone())
                    .await?;
            }
        }
        Ok(())
    }
}

fn check_route(resource: &Resource, live: &Value) -> Result<(), DeployError> {
    let desired = resource.desired.pointer("/spec/routeName");
    let live_route = live.pointer("/spec/routeName");
    if desired == live_route {
        return Ok(());
    }
    Err(DeployError::Immutable {
        resource: resource.url.clone(),
        detail: format!(
            "mapped to service {}; delete the mapping to route it elsewhere",
            live_route.and_then(Value::as_str).unwrap_or("<none>")
        ),
    })
}

fn rejected(kind: ResourceKind, name: &str, source: ApiError) -> DeployError {
    DeployError::Rejected {
        target: kind.label(),
        resource: name.to_owned(),
        source,
    }
}

fn grants(policy: &Value, role: &str, member: &str) -> bool {
    policy
        .get("bindings")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|b| b.get("role").and_then(Value::as_str) == Some(role))
        .filter_map(|b| b.get("members").and_then(Value::as_array))
        .flatten()
        .any(|m| m.as_str() == Some(member))
}

/// How an array field is reconciled against its live counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayMerge {
    /// The desired list is authoritative (env, ports, networks, ...).
    Replace,
    /// Element `i` merges with live element `i`; extra live elements stay.
    ByIndex,
    /// Elements merge with the live element of the same `name`; live-only
    /// elements stay.
    ByName,
}

fn array_merge(key: &str) -> ArrayMerge {
    match key {
        "containers" => ArrayMerge::ByIndex,
        "volumes" | "volumeMounts" => ArrayMerge::ByName,
        _ => ArrayMerge::Replace,
    }
}

fn named<'a>(items: &'a [Value], item: &Value) -> Option<&'a Value> {
    let name = item.get("name")?;
    items.iter().find(|l| l.get("name") == Some(name))
}

/// Whether every field of `desired` holds the same value in `live`.
///
/// JSON APIs omit proto3 default values, so a missing live field matches a
/// desired `0`, `false`, `""` or empty list. Numbers also match their
/// decimal string form (int64 fields are sent as strings).
pub(crate) fn is_subset(desired: &Value, live: Option<&Value>) -> bool {
    value_subset(ArrayMerge::Replace, desired, live)
}

fn value_subset(merge: ArrayMerge, desired: &Value, live: Option<&Value>) -> bool {
    match desired {
        Value::Object(fields) => fields.iter().all(|(key, value)| {
            value_subset(array_merge(key), value, live.and_then(|l| l.get(key)))
        }),
        Value::Array(items) => {
            let live_items = live
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let pairwise = || {
                items
                    .iter()
                    .zip(live_items)
                    .all(|(d, l)| is_subset(d, Some(l)))
            };
            match merge {
                ArrayMerge::Replace => items.len() == live_items.len() && pairwise(),
                ArrayMerge::ByIndex => items.len() <= live_items.len() && pairwise(),
                ArrayMerge::ByName => items
                    .iter()
                    .all(|d| is_subset(d, named(live_items, d))),
            }
        }
        scalar => match live {
            None | Some(Value::Null) => is_default(scalar),
            Some(live) => scalar_eq(scalar, live),
        },
    }
}

fn is_default(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn scalar_eq(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => desired == live,
    }
}

/// `desired` laid over `live`.
///
/// Objects merge recursively. `containers` merge by position and
/// `volumes`/`volumeMounts` by name, keeping live-only elements; any other
/// array, and any scalar, in `desired` replaces the live value.
pub(crate) fn overlay(live: &Value, desired: &Value) -> Value {
    overlay_value(ArrayMerge::Replace, live, desired)
}

fn overlay_value(merge: ArrayMerge, live: &Value, desired: &Value) -> Value {
    match (live, desired) {
        (Value::Object(live_fields), Value::Object(desired_fields)) => {
            let mut merged: Map<String, Value> = live_fields.clone();
            for (key, value) in desired_fields {
                let next = match live_fields.get(key) {
                    Some(existing) => overlay_value(array_merge(key), existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (Value::Array(live_items), Value::Array(items)) => match merge {
            ArrayMerge::Replace => desired.clone(),
            ArrayMerge::ByIndex => {
                let mut merged: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .map(|(i, d)| match live_items.get(i) {
                        Some(l) => overlay(l, d),
                        None => d.clone(),
                    })
                    .collect();
                merged.extend(live_items.iter().skip(items.len()).cloned());
                Value::Array(merged)
            }
            ArrayMerge::ByName => {
                let mut merged: Vec<Value> = live_items
                    .iter()
                    .map(|l| match named(items, l) {
                        Some(d) => overlay(l, d),
                        None => l.clone(),
                    })
                    .collect();
                merged.extend(
                    items
                        .iter()
                        .filter(|d| named(live_items, d).is_none())
                        .cloned(),
                );
                Value::Array(merged)
            }
        },
        _ => desired.clone(),
    }
}
