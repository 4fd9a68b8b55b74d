//! In-process testbed.
//!
//! Behaves like the real Container Service closely enough to drive a whole
//! walkthrough: containers take a few polls to come up, `apt-get`/`service
//! ssh` manage an emulated sshd, and `python3 model.py ...` answers from the
//! uploaded labels file. Every call is recorded so tests can check ordering.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::ContainerService;
use crate::container::{
    CommandOutput, Container, ContainerRegistry, ContainerSpec, ContainerState, FloatingIp,
};
use crate::error::{EdgeError, Result};

/// One call received by the testbed, with enough of its outcome to audit a trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Create { name: String, id: Option<String> },
    Get { id: String, state: Option<ContainerState> },
    Find { name: String },
    Destroy { id: String, ok: bool },
    Execute { id: String, command: String },
    Upload { id: String, path: String },
    AttachIp { container_id: String, ip_id: Option<String> },
    ReleaseIp { id: String, ok: bool },
}

#[derive(Debug, Clone)]
struct Settings {
    /// Polls answered with `requested` before the container turns active;
    /// `None` keeps it requested forever
    activate_after: Option<u32>,
    start_error: Option<String>,
    sshd_preinstalled: bool,
    failing_commands: Vec<(String, i32)>,
    fail_uploads: bool,
    fail_destroy: bool,
    inference_seconds: f64,
    inference_score: f64,
}

/// Emulated state inside one container
#[derive(Debug, Default)]
struct Machine {
    polls: u32,
    ssh_installed: bool,
    ssh_running: bool,
    authorized_keys: Vec<String>,
    files: HashMap<String, Vec<u8>>,
}

#[derive(Debug)]
struct State {
    registry: ContainerRegistry,
    machines: HashMap<String, Machine>,
    trace: Vec<ServiceCall>,
}

/// Container Service that lives in memory.
#[derive(Debug)]
pub struct SimulatedTestbed {
    settings: Settings,
    state: Mutex<State>,
}

impl SimulatedTestbed {
    /// Testbed with default behaviour: active on the second poll, one address.
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> SimulatedTestbedBuilder {
        SimulatedTestbedBuilder::default()
    }

    /// Every call received so far, in order
    pub fn trace(&self) -> Vec<ServiceCall> {
        self.state.lock().trace.clone()
    }

    pub fn live_containers(&self) -> usize {
        self.state.lock().registry.count()
    }

    pub fn allocated_addresses(&self) -> usize {
        self.state.lock().registry.allocated_addresses()
    }

    /// Content of a file uploaded into a live container
    pub fn file(&self, container_id: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .machines
            .get(container_id)
            .and_then(|m| m.files.get(path).cloned())
    }

    /// Keys appended to `authorized_keys` in a live container
    pub fn authorized_keys(&self, container_id: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .machines
            .get(container_id)
            .map(|m| m.authorized_keys.clone())
            .unwrap_or_default()
    }

    fn require_active(state: &State, id: &str) -> Result<()> {
        let container = state.registry.get(id)?;
        if container.is_active() {
            Ok(())
        } else {
            Err(EdgeError::Api {
                status: 409,
                message: format!("container {} is {}", id, container.state),
            })
        }
    }

    fn run(&self, machine: &mut Machine, command: &str) -> CommandOutput {
        let command = command.trim();
        if let Some((_, code)) = self
            .settings
            .failing_commands
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return reply(format!("simulated failure: {}", command), *code);
        }

        if command.starts_with("apt-get") && command.contains("openssh-server") {
            machine.ssh_installed = true;
            return reply("Setting up openssh-server ...".to_string(), 0);
        }
        if command.starts_with("mkdir") || command == "true" {
            return reply(String::new(), 0);
        }
        if command.starts_with("echo ") && command.contains("authorized_keys") {
            // echo <key> >> /root/.ssh/authorized_keys && chmod ...
            return match shlex::split(command) {
                Some(words) if words.len() > 2 && words[2] == ">>" => {
                    machine.authorized_keys.push(words[1].clone());
                    reply(String::new(), 0)
                }
                _ => reply("sh: 1: Syntax error: Unterminated quoted string".to_string(), 2),
            };
        }
        match command {
            "service ssh start" if machine.ssh_installed => {
                machine.ssh_running = true;
                return reply(" * Starting OpenBSD Secure Shell server sshd   ...done.".to_string(), 0);
            }
            "service ssh status" if machine.ssh_running => {
                return reply(" * sshd is running".to_string(), 0);
            }
            "service ssh status" if machine.ssh_installed => {
                return reply(" * sshd is not running".to_string(), 3);
            }
            "service ssh start" | "service ssh status" => {
                return reply("ssh: unrecognized service".to_string(), 1);
            }
            _ => {}
        }
        if command.starts_with("pip install") {
            return reply("Successfully installed".to_string(), 0);
        }
        if command.contains("python3") {
            return self.run_inference(machine, command);
        }

        let program = command.split_whitespace().next().unwrap_or_default();
        reply(format!("sh: 1: {}: not found", program), 127)
    }

    /// `cd <dir> && python3 <script> <model> <labels> <image>`
    fn run_inference(&self, machine: &Machine, command: &str) -> CommandOutput {
        let words = match shlex::split(command) {
            Some(words) => words,
            None => return reply("sh: 1: Syntax error: Unterminated quoted string".to_string(), 2),
        };
        let (workdir, invocation) = match words.as_slice() {
            [cd, dir, and, rest @ ..] if cd == "cd" && and == "&&" => (dir.as_str(), rest),
            _ => ("/", words.as_slice()),
        };
        let args: Vec<String> = invocation
            .iter()
            .skip(1)
            .map(|arg| resolve(workdir, arg))
            .collect();
        if args.len() != 4 {
            return reply(
                "usage: model.py [-h] model_name labels_file_name image_name".to_string(),
                2,
            );
        }
        if let Some(missing) = args.iter().find(|path| !machine.files.contains_key(*path)) {
            return reply(
                format!("FileNotFoundError: [Errno 2] No such file or directory: '{}'", missing),
                1,
            );
        }

        let labels = String::from_utf8_lossy(&machine.files[&args[2]]).into_owned();
        let first = labels.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
        let label = first.split_once(':').map(|(_, l)| l).unwrap_or(first).trim();

        reply(
            format!(
                "time: {}s\n{:08.6}: {}\n",
                self.settings.inference_seconds, self.settings.inference_score, label
            ),
            0,
        )
    }
}

fn reply(output: String, exit_status: i32) -> CommandOutput {
    CommandOutput { output, exit_status }
}

fn resolve(workdir: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", workdir.trim_end_matches('/'), path)
    }
}

impl Default for SimulatedTestbed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerService for SimulatedTestbed {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<Container> {
        let mut state = self.state.lock();
        let result = state.registry.create(spec);
        state.trace.push(ServiceCall::Create {
            name: spec.name.clone(),
            id: result.as_ref().ok().map(|c| c.id.clone()),
        });
        let container = result?;

        let machine = Machine {
            ssh_installed: self.settings.sshd_preinstalled,
            ssh_running: self.settings.sshd_preinstalled,
            ..Machine::default()
        };
        state.machines.insert(container.id.clone(), machine);
        debug!(id = %container.id, "simulated container requested");
        Ok(container)
    }

    async fn get_container(&self, id: &str) -> Result<Container> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let result = match state.registry.get_mut(id) {
            Ok(container) => {
                if container.state == ContainerState::Requested {
                    let machine = state.machines.entry(id.to_string()).or_default();
                    machine.polls += 1;
                    if let Some(reason) = &self.settings.start_error {
                        container.state = ContainerState::Error;
                        container.status_reason = Some(reason.clone());
                    } else if matches!(self.settings.activate_after, Some(n) if machine.polls > n) {
                        container.state = ContainerState::Active;
                    }
                }
                Ok(container.clone())
            }
            Err(e) => Err(e),
        };

        state.trace.push(ServiceCall::Get {
            id: id.to_string(),
            state: result.as_ref().ok().map(|c| c.state),
        });
        result
    }

    async fn find_container(&self, name: &str) -> Result<Option<Container>> {
        let mut state = self.state.lock();
        state.trace.push(ServiceCall::Find {
            name: name.to_string(),
        });
        Ok(state.registry.find_by_name(name).cloned())
    }

    async fn destroy_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let result = if self.settings.fail_destroy {
            Err(EdgeError::Api {
                status: 500,
                message: "compute host unreachable".to_string(),
            })
        } else {
            state.registry.destroy(id)
        };
        state.trace.push(ServiceCall::Destroy {
            id: id.to_string(),
            ok: result.is_ok(),
        });
        result?;
        state.machines.remove(id);
        Ok(())
    }

    async fn execute(&self, id: &str, command: &str) -> Result<CommandOutput> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.trace.push(ServiceCall::Execute {
            id: id.to_string(),
            command: command.to_string(),
        });
        Self::require_active(state, id)?;

        let machine = state.machines.entry(id.to_string()).or_default();
        Ok(self.run(machine, command))
    }

    async fn upload_file(&self, id: &str, remote_path: &str, content: &[u8], _mode: u32) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.trace.push(ServiceCall::Upload {
            id: id.to_string(),
            path: remote_path.to_string(),
        });
        if self.settings.fail_uploads {
            return Err(EdgeError::Transfer(format!("{}: connection reset by peer", remote_path)));
        }
        Self::require_active(state, id)?;

        let machine = state.machines.entry(id.to_string()).or_default();
        machine.files.insert(remote_path.to_string(), content.to_vec());
        Ok(())
    }

    async fn associate_floating_ip(&self, container_id: &str) -> Result<FloatingIp> {
        let mut state = self.state.lock();
        let result = state.registry.allocate_address(container_id);
        state.trace.push(ServiceCall::AttachIp {
            container_id: container_id.to_string(),
            ip_id: result.as_ref().ok().map(|ip| ip.id.clone()),
        });
        result
    }

    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let result = state.registry.release_address(id);
        state.trace.push(ServiceCall::ReleaseIp {
            id: id.to_string(),
            ok: result.is_ok(),
        });
        result.map(|_| ())
    }
}

/// Builder for [`SimulatedTestbed`].
#[derive(Debug, Clone)]
pub struct SimulatedTestbedBuilder {
    settings: Settings,
    pool: Vec<String>,
}

impl Default for SimulatedTestbedBuilder {
    fn default() -> Self {
        Self {
            settings: Settings {
                activate_after: Some(1),
                start_error: None,
                sshd_preinstalled: false,
                failing_commands: Vec::new(),
                fail_uploads: false,
                fail_destroy: false,
                inference_seconds: 0.0421,
                inference_score: 0.878431,
            },
            pool: vec!["192.5.87.10".to_string()],
        }
    }
}

impl SimulatedTestbedBuilder {
    /// Answer `n` polls with `requested` before turning active.
    #[must_use]
    pub fn activate_after(mut self, n: u32) -> Self {
        self.settings.activate_after = Some(n);
        self
    }

    /// Containers never leave `requested`.
    #[must_use]
    pub fn never_activate(mut self) -> Self {
        self.settings.activate_after = None;
        self
    }

    /// Containers go to `error` on their first poll.
    #[must_use]
    pub fn fail_start(mut self, reason: impl Into<String>) -> Self {
        self.settings.start_error = Some(reason.into());
        self
    }

    /// Images come with sshd installed and running.
    #[must_use]
    pub fn sshd_preinstalled(mut self, yes: bool) -> Self {
        self.settings.sshd_preinstalled = yes;
        self
    }

    /// Commands containing `pattern` exit with `exit_status`.
    #[must_use]
    pub fn fail_command(mut self, pattern: impl Into<String>, exit_status: i32) -> Self {
        self.settings.failing_commands.push((pattern.into(), exit_status));
        self
    }

    /// Every upload fails with a transfer error.
    #[must_use]
    pub fn fail_uploads(mut self) -> Self {
        self.settings.fail_uploads = true;
        self
    }

    /// Every destroy fails with a server error.
    #[must_use]
    pub fn fail_destroy(mut self) -> Self {
        self.settings.fail_destroy = true;
        self
    }

    /// Floating IP pool, handed out in order.
    #[must_use]
    pub fn address_pool(mut self, addresses: Vec<String>) -> Self {
        self.pool = addresses;
        self
    }

    #[must_use]
    pub fn build(self) -> SimulatedTestbed {
        SimulatedTestbed {
            settings: self.settings,
            state: Mutex::new(State {
                registry: ContainerRegistry::new(self.pool),
                machines: HashMap::new(),
                trace: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ReservationId;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec::new(name, "python:3.9-slim", ReservationId::new("lease").unwrap()).expose(22)
    }

    #[tokio::test]
    async fn test_activates_after_polls() {
        let testbed = SimulatedTestbed::builder().activate_after(2).build();
        let c = testbed.create_container(&spec("a")).await.unwrap();

        assert_eq!(testbed.get_container(&c.id).await.unwrap().state, ContainerState::Requested);
        assert_eq!(testbed.get_container(&c.id).await.unwrap().state, ContainerState::Requested);
        assert_eq!(testbed.get_container(&c.id).await.unwrap().state, ContainerState::Active);
    }

    #[tokio::test]
    async fn test_execute_requires_active() {
        let testbed = SimulatedTestbed::new();
        let c = testbed.create_container(&spec("a")).await.unwrap();
        let err = testbed.execute(&c.id, "true").await.unwrap_err();
        assert!(matches!(err, EdgeError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_ssh_emulation() {
        let testbed = SimulatedTestbed::builder().activate_after(0).build();
        let c = testbed.create_container(&spec("a")).await.unwrap();
        testbed.get_container(&c.id).await.unwrap();

        let status = testbed.execute(&c.id, "service ssh status").await.unwrap();
        assert_eq!(status.exit_status, 1);

        testbed
            .execute(&c.id, "apt-get update && apt-get install -y openssh-server")
            .await
            .unwrap();
        let status = testbed.execute(&c.id, "service ssh status").await.unwrap();
        assert_eq!(status.exit_status, 3);

        assert!(testbed.execute(&c.id, "service ssh start").await.unwrap().success());
        let status = testbed.execute(&c.id, "service ssh status").await.unwrap();
        assert!(status.success());
        assert!(status.output.contains("is running"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let testbed = SimulatedTestbed::builder().activate_after(0).build();
        let c = testbed.create_container(&spec("a")).await.unwrap();
        testbed.get_container(&c.id).await.unwrap();

        let out = testbed.execute(&c.id, "nvidia-smi -L").await.unwrap();
        assert_eq!(out.exit_status, 127);
        assert!(out.output.contains("nvidia-smi"));
    }

    #[tokio::test]
    async fn test_inference_reads_labels() {
        let testbed = SimulatedTestbed::builder().activate_after(0).build();
        let c = testbed.create_container(&spec("a")).await.unwrap();
        testbed.get_container(&c.id).await.unwrap();

        for (path, content) in [
            ("/root/m/model.py", "print()".as_bytes()),
            ("/root/m/model.tflite", b"\x00\x01".as_slice()),
            ("/root/m/labels.txt", b"0:tabby cat\n1:tiger cat\n".as_slice()),
            ("/root/m/cat.jpg", b"\xff\xd8".as_slice()),
        ] {
            testbed.upload_file(&c.id, path, content, 0o644).await.unwrap();
        }

        let out = testbed
            .execute(&c.id, "cd /root/m && python3 model.py model.tflite labels.txt cat.jpg")
            .await
            .unwrap();
        assert!(out.success(), "{}", out.output);
        assert!(out.output.contains("time: 0.0421s"));
        assert!(out.output.contains("0.878431: tabby cat"));

        let missing = testbed
            .execute(&c.id, "cd /root/m && python3 model.py model.tflite labels.txt dog.jpg")
            .await
            .unwrap();
        assert_eq!(missing.exit_status, 1);
        assert!(missing.output.contains("/root/m/dog.jpg"));
    }
}
