//! edgeprov CLI - provision an edge container, run inference, clean up

use clap::Parser;
use tracing_subscriber::EnvFilter;

use edgeprov::cli::{Args, SubCommand};
use edgeprov::output::human::format_step;
use edgeprov::sequencer::{self, RunOptions, Sequencer};
use edgeprov::service::{ContainerService, HttpContainerService, SimulatedTestbed};
use edgeprov::{
    format_output, inference, naming, ssh, Backoff, Config, ContainerSpec, EdgeError, InferenceJob,
    OutputFormat, ProvisioningSession, Report, ReservationId,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.remediation() {
                eprintln!("Hint: {}", hint);
            }
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "edgeprov=debug" } else { "edgeprov=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn http_service(args: &Args, config: &Config) -> edgeprov::Result<Box<dyn ContainerService>> {
    let url = args
        .api_url
        .clone()
        .unwrap_or_else(|| config.api_url().to_string());
    let mut builder = HttpContainerService::new(url);
    if let Some(token) = args.token.clone().or_else(|| config.token.clone()) {
        builder = builder.token(token);
    }
    Ok(Box::new(builder.build()?))
}

fn reservation(flag: Option<String>, config: &Config) -> edgeprov::Result<ReservationId> {
    let id = flag.or_else(|| config.reservation.clone()).ok_or_else(|| {
        EdgeError::Config("no reservation id; pass --reservation or set EDGEPROV_RESERVATION".to_string())
    })?;
    ReservationId::new(id)
}

fn container_name(name: Option<String>, experiment: &str) -> edgeprov::Result<String> {
    match name {
        Some(name) => Ok(naming::normalize(&name)),
        None => naming::default_resource_name(experiment),
    }
}

fn backoff(timeout_secs: Option<u64>, config: &Config) -> edgeprov::Result<Backoff> {
    match timeout_secs.or(config.wait_timeout_secs) {
        Some(secs) => sequencer::backoff_with_timeout(secs),
        None => Ok(Backoff::default()),
    }
}

async fn run(args: Args) -> edgeprov::Result<i32> {
    let config = Config::load(args.profile.as_deref())?;
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Human };
    let print = |report: Report| println!("{}", format_output(&report, &format));

    match args.command {
        SubCommand::Name { ref experiment } => {
            print(Report::Name {
                name: naming::default_resource_name(experiment)?,
            });
        }

        SubCommand::Run {
            reservation: ref reservation_flag,
            ref bundle,
            ref name,
            ref experiment,
            ref image,
            ref public_key,
            ref remote_dir,
            ref model,
            ref labels,
            ref sample,
            keep,
            timeout_secs,
            simulate,
        } => {
            let reservation = reservation(reservation_flag.clone(), &config)?;
            let name = container_name(name.clone(), experiment)?;
            let key_path = public_key
                .clone()
                .or_else(|| config.public_key.clone())
                .or_else(ssh::default_public_key_path)
                .ok_or_else(|| EdgeError::Config("no public key; pass --public-key".to_string()))?;
            let public_key = ssh::read_public_key(&key_path)?;

            let mut options = RunOptions::new(name, reservation, public_key, bundle.clone());
            if let Some(image) = image.clone().or_else(|| config.image.clone()) {
                options.image = image;
            }
            options.job = InferenceJob {
                remote_dir: remote_dir.clone(),
                script: inference::DEFAULT_SCRIPT.to_string(),
                model: model.clone(),
                labels: labels.clone(),
                image: sample.clone(),
            };
            options.keep = keep;
            options.backoff = backoff(timeout_secs, &config)?;

            let service: Box<dyn ContainerService> = if simulate {
                Box::new(SimulatedTestbed::new())
            } else {
                http_service(&args, &config)?
            };

            let mut sequencer = Sequencer::new(service, options);
            if format == OutputFormat::Human {
                sequencer = sequencer.on_step(|step| println!("{}", format_step(step)));
            }
            let report = sequencer.run().await?;
            print(Report::Run(report));
        }

        SubCommand::Create {
            reservation: ref reservation_flag,
            ref name,
            ref experiment,
            ref image,
            ref ports,
            timeout_secs,
        } => {
            let reservation = reservation(reservation_flag.clone(), &config)?;
            let name = container_name(name.clone(), experiment)?;
            let image = image
                .clone()
                .or_else(|| config.image.clone())
                .unwrap_or_else(|| sequencer::DEFAULT_IMAGE.to_string());
            let spec = ports.iter().fold(
                ContainerSpec::new(name, image, reservation)
                    .interactive(true)
                    .platform_version(sequencer::PLATFORM_VERSION),
                |spec, port| spec.expose(*port),
            );

            let mut session = ProvisioningSession::new(http_service(&args, &config)?, backoff(timeout_secs, &config)?);
            session.create_container(&spec).await?;
            let container = session.wait_until_active().await?.clone();
            print(Report::Container(container));
        }

        SubCommand::Exec {
            ref container_id,
            ref command,
        } => {
            let session =
                ProvisioningSession::resume(http_service(&args, &config)?, Backoff::default(), container_id).await?;
            let result = session.run_command(command).await?;
            let code = result.exit_status;
            print(Report::Command {
                command: command.clone(),
                result,
            });
            return Ok(code);
        }

        SubCommand::Upload {
            ref container_id,
            ref local,
            ref remote,
        } => {
            let session =
                ProvisioningSession::resume(http_service(&args, &config)?, Backoff::default(), container_id).await?;
            let summary = session.upload_directory(local, remote).await?;
            print(Report::Upload {
                remote: remote.clone(),
                summary,
            });
        }

        SubCommand::AttachIp { ref container_id } => {
            let mut session =
                ProvisioningSession::resume(http_service(&args, &config)?, Backoff::default(), container_id).await?;
            let address = session.attach_address().await?.clone();
            print(Report::Address(address));
        }

        SubCommand::ReleaseIp { ref address_id } => {
            http_service(&args, &config)?.release_floating_ip(address_id).await?;
            print(Report::Message {
                message: format!("Released floating IP {}", address_id),
            });
        }

        SubCommand::Destroy { ref container } => {
            let service = http_service(&args, &config)?;
            let id = match service.find_container(container).await? {
                Some(found) => found.id,
                None => container.clone(),
            };
            let mut session = ProvisioningSession::resume(service, Backoff::default(), &id).await?;
            session.destroy_container().await?;
            print(Report::Message {
                message: format!("Destroyed container {}", id),
            });
        }
    }

    Ok(0)
}
