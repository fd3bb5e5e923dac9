use std::path::Path;

use gantry::build::{BuildContext, BuildRecipe};
use gantry::cloud::api::{ApiError, ApiTransport, Method};
use gantry::cloud::{
    BuildError, CommandError, DeployError, DeploymentOperation, Endpoint, OperationHandle,
    PublishError, WaitError,
};
use gantry::{
    DeployMode, DeployTarget, ImageBuilder, ImageReference, LocalImage, OperationWaiter,
    Parameter, Pipeline, PipelineError, PipelineState, RawConfig, RegistryPublisher, ServiceSpec,
    Target,
};
use mockall::mock;
use serde_json::{Value, json};
use tempfile::TempDir;

mock! {
    Builder {}

    impl ImageBuilder for Builder {
        async fn build(
            &self,
            context: BuildContext,
            recipe: &BuildRecipe,
        ) -> Result<LocalImage, BuildError>;
    }
}

mock! {
    Publisher {}

    impl RegistryPublisher for Publisher {
        async fn publish(
            &self,
            image: &LocalImage,
            registry: &str,
        ) -> Result<ImageReference, PublishError>;
    }
}

mock! {
    Deployer {}

    impl DeployTarget for Deployer {
        async fn apply(
            &self,
            image: &ImageReference,
            spec: &ServiceSpec,
        ) -> Result<DeploymentOperation, DeployError>;
    }
}

mock! {
    Waiter {}

    impl OperationWaiter for Waiter {
        async fn wait(&self, operation: &DeploymentOperation) -> Result<String, WaitError>;
    }
}

/// Transport that must never be used.
struct Unreachable;

impl ApiTransport for Unreachable {
    async fn send(
        &self,
        method: Method,
        url: &str,
        _body: Option<Value>,
    ) -> Result<Value, ApiError> {
        panic!("unexpected request {method} {url}");
    }
}

const REGISTRY: &str = "us-central1-docker.pkg.dev/proj/demo/api";
const PUBLIC_URL: &str = "https://demo-uc.a.run.app";

fn reference() -> ImageReference {
    ImageReference::parse(&format!("{REGISTRY}@sha256:abc{}", "0".repeat(61))).unwrap()
}

fn local_image() -> LocalImage {
    LocalImage {
        id: "sha256:1111".to_owned(),
        tag: "demo:0123456789abcdef".to_owned(),
    }
}

fn write_project(dir: &Path) {
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(dir.join("Cargo.toml"), "[package]\nname = \"demo\"").unwrap();
    std::fs::write(dir.join("Cargo.lock"), "# lock").unwrap();
    std::fs::write(dir.join("src/main.rs"), "fn main() {}").unwrap();
}

fn raw_config() -> RawConfig {
    let mut raw = RawConfig::default();
    raw.parameters.set(Parameter::ProjectId, "proj");
    raw.parameters.set(Parameter::Region, "us-central1");
    raw.parameters.set(Parameter::AppName, "demo");
    raw.parameters.set(Parameter::DatabaseName, "demo-db");
    raw.parameters.set(Parameter::DatabaseUrl, "postgres://user:pw@10.0.0.3/demo");
    raw.parameters.set(Parameter::NtfyUnknownMedia, "https://ntfy.sh/media");
    raw.parameters.set(Parameter::NtfyUnknownError, "https://ntfy.sh/error");
    raw.parameters.set(Parameter::ApiDomain, "api.example.com");
    raw
}

fn pending() -> DeploymentOperation {
    DeploymentOperation::Pending {
        operations: vec![
            OperationHandle::from_run_response(&json!({
                "name": "projects/proj/locations/us-central1/operations/op-1"
            }))
            .unwrap(),
        ],
        endpoint: Endpoint::RunResponse,
    }
}

fn permission_denied() -> DeployError {
    DeployError::Rejected {
        target: "Cloud Run",
        resource: "projects/proj/locations/us-central1/services/demo".to_owned(),
        source: ApiError::Status {
            method: Method::PATCH,
            url: "https://run.googleapis.com/v2/projects/proj/locations/us-central1/services/demo"
                .to_owned(),
            status: 403,
            detail: r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#
                .to_owned(),
        },
    }
}

fn untouched() -> (MockBuilder, MockPublisher, MockDeployer, MockWaiter) {
    let mut builder = MockBuilder::new();
    builder.expect_build().never();
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().never();
    let mut deployer = MockDeployer::new();
    deployer.expect_apply().never();
    let mut waiter = MockWaiter::new();
    waiter.expect_wait().never();
    (builder, publisher, deployer, waiter)
}

// ── Validation ──

#[tokio::test]
async fn missing_parameter_aborts_before_any_stage() {
    for mode in [DeployMode::CloudRun, DeployMode::Provision, DeployMode::Instance] {
        for param in mode.required_parameters() {
            let tmp = TempDir::new().unwrap();
            write_project(tmp.path());

            let mut raw = raw_config();
            raw.deploy.mode = mode;
            raw.deploy.instance.zone = Some("us-central1-c".to_owned());
            raw.parameters.unset(*param);

            let (builder, publisher, deployer, waiter) = untouched();
            let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
            let err = pipeline.run(raw, |_| Ok(deployer)).await.unwrap_err();

            match err {
                PipelineError::Config(gantry::Error::MissingParameter { key, .. }) => {
                    assert_eq!(key, param.key(), "mode {mode}")
                }
                other => {
                    panic!("mode {mode}, {param:?}: expected missing parameter, got {other:?}")
                }
            }
            assert_eq!(pipeline.state(), PipelineState::Failed);
            assert_eq!(
                pipeline.history(),
                &[PipelineState::Validating, PipelineState::Failed]
            );
        }
    }
}

#[tokio::test]
async fn target_is_not_selected_for_invalid_config() {
    let tmp = TempDir::new().unwrap();
    let mut raw = raw_config();
    raw.service.min_instances = 5;
    raw.service.max_instances = 2;

    let (builder, publisher, _, waiter) = untouched();
    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    let err = pipeline
        .run(raw, |_| -> gantry::Result<MockDeployer> {
            panic!("target selected before validation passed")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn unreadable_project_fails_in_building() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("gone");

    let (builder, publisher, deployer, waiter) = untouched();
    let mut pipeline = Pipeline::new(&missing, builder, publisher, waiter);
    let err = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Context(_)));
    assert_eq!(
        pipeline.history(),
        &[
            PipelineState::Validating,
            PipelineState::Building,
            PipelineState::Failed
        ]
    );
}

// ── Stage failures ──

#[tokio::test]
async fn build_failure_skips_publish() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let (_, mut publisher, deployer, waiter) = untouched();
    publisher.expect_publish().never();
    let mut builder = MockBuilder::new();
    builder.expect_build().times(1).returning(|_, _| {
        Err(BuildError::Build {
            source: CommandError::CommandFailed {
                program: "docker",
                args: vec![],
                stderr: "error[E0432]: unresolved import".to_owned(),
            },
        })
    });

    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    let err = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Build(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn rejection_fails_without_waiting() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let mut builder = MockBuilder::new();
    builder
        .expect_build()
        .times(1)
        .returning(|_, _| Ok(local_image()));
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .returning(|_, _| Ok(reference()));
    let mut deployer = MockDeployer::new();
    deployer
        .expect_apply()
        .times(1)
        .returning(|_, _| Err(permission_denied()));
    let mut waiter = MockWaiter::new();
    waiter.expect_wait().never();

    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    let err = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap_err();

    let PipelineError::Deploy(DeployError::Rejected { source, .. }) = err else {
        panic!("expected deployment rejection");
    };
    assert_eq!(source.platform_message().as_deref(), Some("Permission denied"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(
        pipeline.history(),
        &[
            PipelineState::Validating,
            PipelineState::Building,
            PipelineState::Publishing,
            PipelineState::Deploying,
            PipelineState::Failed,
        ]
    );
}

#[tokio::test]
async fn operation_failure_is_terminal() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let mut builder = MockBuilder::new();
    builder.expect_build().returning(|_, _| Ok(local_image()));
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().returning(|_, _| Ok(reference()));
    let mut deployer = MockDeployer::new();
    deployer.expect_apply().returning(|_, _| Ok(pending()));
    let mut waiter = MockWaiter::new();
    waiter.expect_wait().times(1).returning(|_| {
        Err(WaitError::Failed {
            operation: "op-1".to_owned(),
            detail: "code 9: container failed to start".to_owned(),
        })
    });

    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    let err = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap_err();

    assert!(matches!(err, PipelineError::Operation(WaitError::Failed { .. })));
    assert_eq!(pipeline.history().last(), Some(&PipelineState::Failed));
    assert_eq!(pipeline.history()[pipeline.history().len() - 2], PipelineState::Waiting);
}

// ── Successful run ──

#[tokio::test]
async fn cloud_run_scenario_resolves_public_url() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());
    std::fs::create_dir_all(tmp.path().join("target/release")).unwrap();
    std::fs::write(tmp.path().join("target/release/demo"), "stale binary").unwrap();

    let mut builder = MockBuilder::new();
    builder
        .expect_build()
        .withf(|context, recipe| {
            context.contains(Path::new("src/main.rs"))
                && !context.contains(Path::new("target/release/demo"))
                && recipe.app_name == "demo"
                && recipe.platform == "linux/amd64"
        })
        .times(1)
        .returning(|_, _| Ok(local_image()));

    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .withf(|image, registry| *image == local_image() && registry == REGISTRY)
        .times(1)
        .returning(|_, _| Ok(reference()));

    let mut deployer = MockDeployer::new();
    deployer
        .expect_apply()
        .withf(|image, spec| {
            *image == reference()
                && spec.service_name == "demo"
                && spec.region == "us-central1"
                && spec.port == 8080
                && spec.cpu == "1"
                && spec.memory == "512Mi"
                && spec.min_instances == 0
                && spec.max_instances == 1
                && spec.env_value("DATABASE_URL") == Some("postgres://user:pw@10.0.0.3/demo")
        })
        .times(1)
        .returning(|_, _| Ok(pending()));

    let mut waiter = MockWaiter::new();
    waiter
        .expect_wait()
        .withf(|operation| *operation == pending())
        .times(1)
        .returning(|_| Ok(PUBLIC_URL.to_owned()));

    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    let outcome = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap();

    assert_eq!(outcome.url, PUBLIC_URL);
    assert_eq!(outcome.image, reference());
    assert_eq!(outcome.mode, DeployMode::CloudRun);
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(
        pipeline.history(),
        &[
            PipelineState::Validating,
            PipelineState::Building,
            PipelineState::Publishing,
            PipelineState::Deploying,
            PipelineState::Waiting,
            PipelineState::Done,
        ]
    );
}

#[tokio::test]
async fn explicit_service_settings_reach_the_target() {
    let tmp = TempDir::new().unwrap();
    write_project(tmp.path());

    let mut raw = raw_config();
    raw.service.port = 3000;
    raw.service.min_instances = 1;
    raw.service.max_instances = 8;
    raw.service.concurrency = 40;
    raw.service.memory = "1Gi".to_owned();
    raw.service.env.insert("RUST_LOG".to_owned(), "info".to_owned());
    raw.deploy.registry = Some("europe-docker.pkg.dev/proj/apps/demo".to_owned());

    let mut builder = MockBuilder::new();
    builder.expect_build().returning(|_, _| Ok(local_image()));
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .withf(|_, registry| registry == "europe-docker.pkg.dev/proj/apps/demo")
        .times(1)
        .returning(|_, _| Ok(reference()));
    let mut deployer = MockDeployer::new();
    deployer
        .expect_apply()
        .withf(|_, spec| {
            spec.port == 3000
                && spec.min_instances == 1
                && spec.max_instances == 8
                && spec.concurrency == 40
                && spec.memory == "1Gi"
                && spec.env_value("RUST_LOG") == Some("info")
        })
        .times(1)
        .returning(|_, _| {
            Ok(DeploymentOperation::Resolved {
                url: PUBLIC_URL.to_owned(),
            })
        });
    let mut waiter = MockWaiter::new();
    waiter
        .expect_wait()
        .times(1)
        .returning(|_| Ok(PUBLIC_URL.to_owned()));

    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    assert!(pipeline.run(raw, |_| Ok(deployer)).await.is_ok());
}

#[tokio::test]
async fn pipeline_runs_only_once() {
    let tmp = TempDir::new().unwrap();
    let mut raw = raw_config();
    raw.parameters.unset(Parameter::ProjectId);

    let (builder, publisher, deployer, waiter) = untouched();
    let mut pipeline = Pipeline::new(tmp.path(), builder, publisher, waiter);
    assert!(pipeline.run(raw, |_| Ok(deployer)).await.is_err());

    let (_, _, deployer, _) = untouched();
    let err = pipeline.run(raw_config(), |_| Ok(deployer)).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRan(PipelineState::Failed)));
}

// ── Target selection ──

#[test]
fn target_follows_deploy_mode() {
    for mode in [DeployMode::CloudRun, DeployMode::Provision, DeployMode::Instance] {
        let mut raw = raw_config();
        raw.deploy.mode = mode;
        raw.deploy.instance.zone = Some("us-central1-c".to_owned());
        let config = raw.validate().unwrap();

        let target = Target::select(&config, Unreachable).unwrap();
        assert_eq!(target.mode(), mode);
    }
}

#[tokio::test]
async fn provision_target_sees_deletion_protection_default() {
    let mut raw = raw_config();
    raw.deploy.mode = DeployMode::Provision;
    let config = raw.validate().unwrap();

    let Target::Provision(target) = Target::select(&config, Unreachable).unwrap() else {
        panic!("expected provision target");
    };
    assert!(target.settings().deletion_protection);
    assert_eq!(target.settings().database_name, "demo-db");
}

#[test]
fn instance_target_restarts_unless_disabled() {
    let mut raw = raw_config();
    raw.deploy.mode = DeployMode::Instance;
    raw.deploy.instance.zone = Some("us-central1-c".to_owned());

    let config = raw.clone().validate().unwrap();
    let Target::Instance(target) = Target::select(&config, Unreachable).unwrap() else {
        panic!("expected instance target");
    };
    assert!(target.restarts());

    raw.deploy.instance.restart = false;
    let config = raw.validate().unwrap();
    let Target::Instance(target) = Target::select(&config, Unreachable).unwrap() else {
        panic!("expected instance target");
    };
    assert!(!target.restarts());
}
