//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edgeprov")]
#[command(author, version, about = "Provision an edge testbed container and run image classification on it", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Container Service endpoint
    #[arg(long, global = true, env = "EDGEPROV_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the Container Service
    #[arg(long, global = true, env = "EDGEPROV_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Profile name from the config file
    #[arg(long, short, global = true)]
    pub profile: Option<String>,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum SubCommand {
    /// Print the default resource name for the current user
    Name {
        /// Experiment name appended to the username
        #[arg(long, default_value = crate::naming::DEFAULT_EXPERIMENT)]
        experiment: String,
    },

    /// Run the full walkthrough: provision, classify, tear down
    Run {
        /// Lease reservation id
        #[arg(long, env = "EDGEPROV_RESERVATION")]
        reservation: Option<String>,

        /// Local directory with the inference script, model, labels and image
        #[arg(long)]
        bundle: PathBuf,

        /// Container name (default: <user>-<experiment>)
        #[arg(long)]
        name: Option<String>,

        /// Experiment name used to derive the container name
        #[arg(long, default_value = crate::naming::DEFAULT_EXPERIMENT)]
        experiment: String,

        /// Container image
        #[arg(long)]
        image: Option<String>,

        /// Public key to install for root (default: ~/.ssh/id_rsa.pub)
        #[arg(long)]
        public_key: Option<PathBuf>,

        /// Where the bundle goes inside the container
        #[arg(long, default_value = crate::inference::DEFAULT_REMOTE_DIR)]
        remote_dir: String,

        /// Model file name inside the bundle
        #[arg(long, default_value = crate::inference::DEFAULT_MODEL)]
        model: String,

        /// Labels file name inside the bundle
        #[arg(long, default_value = crate::inference::DEFAULT_LABELS)]
        labels: String,

        /// Image to classify, inside the bundle
        #[arg(long, default_value = crate::inference::DEFAULT_SAMPLE)]
        sample: String,

        /// Leave the container and floating IP running afterwards
        #[arg(long)]
        keep: bool,

        /// Give up waiting for the container after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Use an in-process simulated testbed instead of the Container Service
        #[arg(long)]
        simulate: bool,
    },

    /// Create a container and wait until it is active
    Create {
        /// Lease reservation id
        #[arg(long, env = "EDGEPROV_RESERVATION")]
        reservation: Option<String>,

        /// Container name (default: <user>-<experiment>)
        #[arg(long)]
        name: Option<String>,

        /// Experiment name used to derive the container name
        #[arg(long, default_value = crate::naming::DEFAULT_EXPERIMENT)]
        experiment: String,

        /// Container image
        #[arg(long)]
        image: Option<String>,

        /// Ports to expose
        #[arg(long = "port", default_value = "22")]
        ports: Vec<u16>,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Run a shell command in an active container
    Exec {
        container_id: String,
        command: String,
    },

    /// Copy a local directory into an active container
    Upload {
        container_id: String,
        local: PathBuf,
        remote: String,
    },

    /// Attach a floating IP to an active container
    AttachIp { container_id: String },

    /// Release a floating IP
    ReleaseIp { address_id: String },

    /// Destroy a container by name or id
    Destroy { container: String },
}
