//! Given/when step definitions for batch behavioural scenarios.

use std::sync::{Arc, Mutex};

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ExecInspectResponse, ImageInspect,
};
use bollard::query_parameters::{
    BuildImageOptions, CreateContainerOptions, RemoveContainerOptions,
};
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use futures_util::stream;
use mockall::mock;
use rstest_bdd_macros::{given, when};
use tanglebox::batch::{BatchOrchestrator, BatchRequest, BatchSettings, Operation};
use tanglebox::config::AppConfig;
use tanglebox::engine::{
    BuildImageStream, ContainerExecClient, ContainerOpFuture, CreateContainerFuture,
    CreateExecFuture, ImageClient, InspectContainerFuture, InspectExecFuture, InspectImageFuture,
    SandboxClient, StartExecFuture,
};
use tanglebox::error::{ContainerError, TangleboxError};

use super::state::{BatchOutcome, BatchState, EngineCalls, StepResult};

mock! {
    #[derive(Debug)]
    Runtime {}

    impl ImageClient for Runtime {
        fn inspect_image(&self, tag: &str) -> InspectImageFuture<'_>;
        fn build_image(&self, options: BuildImageOptions, context: Vec<u8>) -> BuildImageStream<'_>;
    }

    impl SandboxClient for Runtime {
        fn create_container(
            &self,
            options: Option<CreateContainerOptions>,
            config: ContainerCreateBody,
        ) -> CreateContainerFuture<'_>;
        fn start_container(&self, name: &str) -> ContainerOpFuture<'_>;
        fn remove_container(
            &self,
            name: &str,
            options: Option<RemoveContainerOptions>,
        ) -> ContainerOpFuture<'_>;
        fn inspect_container(&self, name: &str) -> InspectContainerFuture<'_>;
    }

    impl ContainerExecClient for Runtime {
        fn create_exec(&self, container_id: &str, options: CreateExecOptions<String>) -> CreateExecFuture<'_>;
        fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;
        fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
    }
}

type SharedCalls = Arc<Mutex<EngineCalls>>;

const LISP_ERROR: &str = "Debugger entered--Lisp error: (void-function org-babel-tangle)\n";

fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn project_dir(batch_state: &BatchState) -> StepResult<Dir> {
    let root = batch_state
        .project_root
        .get()
        .ok_or_else(|| String::from("project should be created first"))?;
    Dir::open_ambient_dir(&root, ambient_authority())
        .map_err(|e| format!("should open project dir: {e}"))
}

#[given("a project containing {files}")]
fn project_containing(batch_state: &BatchState, files: String) -> StepResult<()> {
    let tmp = tempfile::tempdir().map_err(|e| format!("should create temp dir: {e}"))?;
    let root = Utf8Path::from_path(tmp.path())
        .ok_or_else(|| String::from("temp dir path should be UTF-8"))?
        .to_owned();
    batch_state.project.set(Arc::new(tmp));
    batch_state.project_root.set(root);

    let dir = project_dir(batch_state)?;
    for name in split_names(&files) {
        dir.write(&name, "")
            .map_err(|e| format!("should write {name}: {e}"))?;
    }
    Ok(())
}

#[given("a generated source {file} linked to {origin}")]
fn generated_source_linked(batch_state: &BatchState, file: String, origin: String) -> StepResult<()> {
    let dir = project_dir(batch_state)?;
    let contents = format!("# [[file:{origin}::*Generator][Generator:1]]\nprint('hi')\n# Generator:1 ends here\n");
    dir.write(&file, contents)
        .map_err(|e| format!("should write {file}: {e}"))
}

#[given("the engine reports a Lisp error for every file")]
fn engine_reports_lisp_error(batch_state: &BatchState) {
    batch_state.engine_fails.set(true);
}

#[given("the batch is restricted to {files}")]
fn batch_restricted_to(batch_state: &BatchState, files: String) {
    batch_state.allow_list.set(split_names(&files));
}

#[given("an instance with the sandbox name already exists")]
fn instance_already_exists(batch_state: &BatchState) {
    batch_state.instance_exists.set(true);
}

#[when("a tangle batch runs over the project")]
fn tangle_batch_runs(batch_state: &BatchState) -> StepResult<()> {
    run_batch(batch_state, Operation::Extract)
}

#[when("a detangle batch runs over the project")]
fn detangle_batch_runs(batch_state: &BatchState) -> StepResult<()> {
    run_batch(batch_state, Operation::SyncBack)
}

#[when("an evaluate batch runs over the project")]
fn evaluate_batch_runs(batch_state: &BatchState) -> StepResult<()> {
    run_batch(batch_state, Operation::Evaluate)
}

fn run_batch(batch_state: &BatchState, operation: Operation) -> StepResult<()> {
    let root = batch_state
        .project_root
        .get()
        .ok_or_else(|| String::from("project should be created first"))?;
    let calls: SharedCalls = Arc::new(Mutex::new(EngineCalls::default()));
    let client = setup_mock_runtime(
        &calls,
        batch_state.engine_fails.get().unwrap_or(false),
        batch_state.instance_exists.get().unwrap_or(false),
    );
    let request = BatchRequest::new(operation, root, ".")
        .with_allow_list(batch_state.allow_list.get().unwrap_or_default());

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|_| String::from("failed to create tokio runtime for scenario"))?;
    let orchestrator = BatchOrchestrator::new(&client, BatchSettings::from_config(&AppConfig::default()));
    let result = runtime.block_on(orchestrator.run(&request));

    let observed = calls
        .lock()
        .map_err(|_| String::from("engine calls mutex is poisoned"))?
        .clone();
    batch_state.calls.set(observed);
    batch_state.outcome.set(match result {
        Ok(report) => BatchOutcome::Report(report),
        Err(error) => BatchOutcome::Aborted {
            instance_exists: matches!(
                error,
                TangleboxError::Container(ContainerError::InstanceExists { .. })
            ),
            message: error.to_string(),
        },
    });
    Ok(())
}

fn setup_mock_runtime(calls: &SharedCalls, engine_fails: bool, instance_exists: bool) -> MockRuntime {
    let mut client = MockRuntime::new();
    client
        .expect_inspect_image()
        .returning(|_| Box::pin(async { Ok(ImageInspect::default()) }));
    client.expect_build_image().never();

    let creations = Arc::clone(calls);
    client.expect_create_container().returning(move |_, _| {
        if let Ok(mut locked) = creations.lock() {
            locked.creations += 1;
        }
        Box::pin(async move {
            if instance_exists {
                return Err(BollardError::DockerResponseServerError {
                    status_code: 409,
                    message: String::from("name already in use"),
                });
            }
            Ok(ContainerCreateResponse {
                id: String::from("bdd-sandbox-id"),
                warnings: vec![],
            })
        })
    });
    client
        .expect_start_container()
        .returning(|_| Box::pin(async { Ok(()) }));

    let removals = Arc::clone(calls);
    client.expect_remove_container().returning(move |_, _| {
        if let Ok(mut locked) = removals.lock() {
            locked.removals += 1;
        }
        Box::pin(async { Ok(()) })
    });

    let forms = Arc::clone(calls);
    client.expect_create_exec().returning(move |_, options| {
        let form = options
            .cmd
            .and_then(|cmd| cmd.last().cloned())
            .unwrap_or_default();
        if let Ok(mut locked) = forms.lock() {
            locked.forms.push(form);
        }
        Box::pin(async { Ok(CreateExecResults { id: String::from("bdd-exec-id") }) })
    });
    client.expect_start_exec().returning(move |_, _| {
        let text = if engine_fails { LISP_ERROR } else { "Tangled 1 code block\n" };
        Box::pin(async move {
            let chunks: Vec<Result<LogOutput, BollardError>> = vec![Ok(LogOutput::StdErr {
                message: Vec::from(text).into(),
            })];
            Ok(StartExecResults::Attached {
                output: Box::pin(stream::iter(chunks)),
                input: Box::pin(tokio::io::sink()),
            })
        })
    });
    client.expect_inspect_exec().returning(|_| {
        Box::pin(async {
            Ok(ExecInspectResponse {
                running: Some(false),
                exit_code: Some(0),
                ..ExecInspectResponse::default()
            })
        })
    });
    client
}
