//! The end-to-end walkthrough
//!
//! Create a container, wait for it, give it a public address and SSH
//! access, upload the model bundle, classify the sample image, and tear
//! everything down again. Once a container exists, a failure in any later
//! step still runs teardown before the error is returned.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::container::{ContainerSpec, ReservationId};
use crate::error::{EdgeError, Result};
use crate::inference::{self, InferenceJob, InferenceReport};
use crate::service::ContainerService;
use crate::session::ProvisioningSession;
use crate::wait::Backoff;

pub const DEFAULT_IMAGE: &str = "python:3.9-slim";
pub const SSH_PORT: u16 = 22;
/// Container platform revision the testbed expects for new containers
pub const PLATFORM_VERSION: u8 = 2;

/// Everything the walkthrough needs to know up front
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub name: String,
    pub image: String,
    pub reservation: ReservationId,
    pub exposed_ports: Vec<u16>,
    pub public_key: String,
    /// Local directory holding the script, model, labels and sample image
    pub bundle: PathBuf,
    pub job: InferenceJob,
    /// Leave the container and address in place after a run
    pub keep: bool,
    pub backoff: Backoff,
}

impl RunOptions {
    pub fn new(name: impl Into<String>, reservation: ReservationId, public_key: impl Into<String>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            image: DEFAULT_IMAGE.to_string(),
            reservation,
            exposed_ports: vec![SSH_PORT],
            public_key: public_key.into(),
            bundle: bundle.into(),
            job: InferenceJob::default(),
            keep: false,
            backoff: Backoff::default(),
        }
    }

    fn spec(&self) -> ContainerSpec {
        let spec = ContainerSpec::new(self.name.clone(), self.image.clone(), self.reservation.clone())
            .interactive(true)
            .platform_version(PLATFORM_VERSION);
        self.exposed_ports.iter().fold(spec, |spec, port| spec.expose(*port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateContainer,
    WaitUntilActive,
    AttachAddress,
    SetupSsh,
    UploadBundle,
    InstallDependencies,
    RunInference,
    Teardown,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::CreateContainer => "create container",
            Step::WaitUntilActive => "wait until active",
            Step::AttachAddress => "attach floating ip",
            Step::SetupSsh => "set up ssh",
            Step::UploadBundle => "upload model bundle",
            Step::InstallDependencies => "install dependencies",
            Step::RunInference => "run inference",
            Step::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Outcome of one completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// Outcome of a whole walkthrough
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub container_name: String,
    pub container_id: Option<String>,
    pub endpoint: Option<String>,
    pub steps: Vec<StepReport>,
    pub inference: Option<InferenceReport>,
    /// Resources were left running on request
    pub kept: bool,
}

type Observer = Box<dyn FnMut(&StepReport) + Send>;

pub struct Sequencer<S> {
    session: ProvisioningSession<S>,
    options: RunOptions,
    observer: Option<Observer>,
}

impl<S: ContainerService> Sequencer<S> {
    pub fn new(service: S, options: RunOptions) -> Self {
        Self {
            session: ProvisioningSession::new(service, options.backoff.clone()),
            options,
            observer: None,
        }
    }

    /// Called after every completed step, e.g. to print progress
    pub fn on_step(mut self, observer: impl FnMut(&StepReport) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn session(&self) -> &ProvisioningSession<S> {
        &self.session
    }

    fn record(&mut self, report: &mut RunReport, step: Step, started: Instant, detail: String) {
        let step_report = StepReport {
            step,
            detail,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(step = %step, "{}", step_report.detail);
        if let Some(observer) = self.observer.as_mut() {
            observer(&step_report);
        }
        report.steps.push(step_report);
    }

    /// Run the walkthrough
    pub async fn run(&mut self) -> Result<RunReport> {
        self.options.job.check_bundle(&self.options.bundle)?;

        let mut report = RunReport {
            container_name: self.options.name.clone(),
            container_id: None,
            endpoint: None,
            steps: Vec::new(),
            inference: None,
            kept: self.options.keep,
        };

        // nothing exists yet if creation fails, so there is nothing to tear down
        let started = Instant::now();
        let spec = self.options.spec();
        let id = self.session.create_container(&spec).await?.id.clone();
        report.container_id = Some(id.clone());
        self.record(&mut report, Step::CreateContainer, started, format!("{} ({})", spec.name, id));

        let outcome = self.provision(&mut report).await;

        if self.options.keep {
            let floating_ip = self.session.address().map(|a| a.id.clone()).unwrap_or_default();
            warn!(
                container = %id,
                floating_ip = %floating_ip,
                "Leaving resources in place; remove them with `edgeprov destroy` and `edgeprov release-ip`"
            );
            return outcome.map(|_| report);
        }

        let started = Instant::now();
        match (outcome, self.session.teardown().await) {
            (Ok(()), Ok(())) => {
                self.record(&mut report, Step::Teardown, started, "container destroyed, address released".to_string());
                Ok(report)
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                warn!("Teardown after failure also failed: {}", teardown);
                Err(e)
            }
        }
    }

    async fn provision(&mut self, report: &mut RunReport) -> Result<()> {
        let started = Instant::now();
        let state = self.session.wait_until_active().await?.state;
        self.record(report, Step::WaitUntilActive, started, format!("container is {}", state));

        let started = Instant::now();
        let address = self.session.attach_address().await?.address.clone();
        self.record(report, Step::AttachAddress, started, address);

        let started = Instant::now();
        let public_key = self.options.public_key.clone();
        self.session.setup_ssh(&public_key).await?;
        let endpoint = self.session.ssh_endpoint()?;
        report.endpoint = Some(endpoint.clone());
        self.record(report, Step::SetupSsh, started, endpoint);

        let started = Instant::now();
        let summary = self
            .session
            .upload_directory(&self.options.bundle, &self.options.job.remote_dir)
            .await?;
        let detail = format!(
            "{} files ({}) to {}",
            summary.files,
            bytesize::ByteSize(summary.bytes),
            self.options.job.remote_dir
        );
        self.record(report, Step::UploadBundle, started, detail);

        let started = Instant::now();
        self.session
            .run_command(inference::DEPENDENCY_COMMAND)
            .await?
            .require_success(inference::DEPENDENCY_COMMAND)?;
        self.record(report, Step::InstallDependencies, started, "tflite-runtime pillow numpy".to_string());

        let started = Instant::now();
        let command = self.options.job.command();
        let output = self.session.run_command(&command).await?.require_success(&command)?;
        let prediction = InferenceReport::parse(&output.output)?;
        let detail = format!(
            "{} ({:.6}) in {:.4}s",
            prediction.label,
            prediction.score,
            prediction.elapsed.as_secs_f64()
        );
        self.record(report, Step::RunInference, started, detail);
        report.inference = Some(prediction);

        Ok(())
    }
}

/// Deadline for the wait step, from a user-facing number of seconds
pub fn backoff_with_timeout(secs: u64) -> Result<Backoff> {
    if secs == 0 {
        return Err(EdgeError::Config("timeout must be at least one second".to_string()));
    }
    Ok(Backoff::default().with_deadline(Duration::from_secs(secs)))
}
