#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use edgeprov::service::ServiceCall;
use edgeprov::{ContainerSpec, ContainerState, ReservationId};

pub const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB alice@laptop";

pub fn alice_spec() -> ContainerSpec {
    ContainerSpec::new(
        "alice-edge-cpu",
        "python:3.9-slim",
        ReservationId::new("8e2f1c34-lease").unwrap(),
    )
    .expose(22)
    .interactive(true)
}

/// A container as the Container Service reports it
pub fn container_json(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "name": "alice-edge-cpu",
        "image": "python:3.9-slim",
        "reservation_id": "8e2f1c34-lease",
        "exposed_ports": [22],
        "state": state,
        "created_at": "2026-10-19T08:30:00Z"
    })
}

/// A bundle laid out the way the inference script expects
pub fn write_bundle(dir: &Path) {
    fs::write(dir.join("model.py"), "import sys\nprint(sys.argv)\n").unwrap();
    fs::write(dir.join("model.tflite"), [0x54u8, 0x46, 0x4c, 0x33, 0x00, 0x01]).unwrap();
    fs::write(dir.join("labels.txt"), "0:tabby cat\n1:tiger cat\n2:macaw\n").unwrap();
    fs::write(dir.join("parrot.jpg"), [0xffu8, 0xd8, 0xff, 0xe0]).unwrap();
}

/// No command or upload reaches a container before a poll saw it active
pub fn assert_nothing_runs_before_active(trace: &[ServiceCall]) {
    let mut active: HashSet<&str> = HashSet::new();
    for call in trace {
        match call {
            ServiceCall::Get {
                id,
                state: Some(ContainerState::Active),
            } => {
                active.insert(id.as_str());
            }
            ServiceCall::Execute { id, command } => {
                assert!(active.contains(id.as_str()), "`{}` ran on {} before it was active", command, id);
            }
            ServiceCall::Upload { id, path } => {
                assert!(active.contains(id.as_str()), "{} uploaded to {} before it was active", path, id);
            }
            _ => {}
        }
    }
}

/// Every allocated address is released later in the trace, after its container is destroyed
pub fn assert_every_address_released(trace: &[ServiceCall]) {
    for (i, call) in trace.iter().enumerate() {
        if let ServiceCall::AttachIp {
            container_id,
            ip_id: Some(ip_id),
        } = call
        {
            let released = trace[i..].iter().position(|c| {
                matches!(c, ServiceCall::ReleaseIp { id, ok: true } if id == ip_id)
            });
            let released = released.unwrap_or_else(|| panic!("{} was never released", ip_id));

            let destroyed = trace[i..].iter().position(|c| {
                matches!(c, ServiceCall::Destroy { id, .. } if id == container_id)
            });
            if let Some(destroyed) = destroyed {
                assert!(destroyed < released, "{} released before {} was destroyed", ip_id, container_id);
            }
        }
    }
}
