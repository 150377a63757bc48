//! Test double backend shared by the integration tests
//!
//! [`MockBackend`] records every acquire and release in a [`Ledger`] so tests
//! can check counts and ordering. Records are fed through a channel.

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bpfrun::package::{MapSpec, ProgramPackage, ProgramSpec, RunOptions};
use bpfrun::runtime::{Backend, KernelObject, Polled, RecordSource};

/// Ordered log of kernel-side acquisitions and releases
#[derive(Default)]
pub struct Ledger {
    events: Mutex<Vec<String>>,
}

impl Ledger {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events of one kind (`open`, `load`, `detach`, ...)
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.split(':').next() == Some(kind))
            .count()
    }

    /// Every acquisition has exactly one matching release
    pub fn assert_balanced(&self) {
        for (acquire, release) in
            [("open", "close"), ("load", "unload"), ("attach", "detach"), ("subscribe", "unsubscribe")]
        {
            assert_eq!(
                self.count(acquire),
                self.count(release),
                "{acquire}/{release} unbalanced: {:?}",
                self.events()
            );
        }
    }
}

/// What the next poll returns
pub enum Feed {
    Record(Vec<u8>),
    Lost(u64),
    Fail(&'static str),
}

pub struct MockBackend {
    ledger: Arc<Ledger>,
    sender: Sender<Feed>,
    receiver: Mutex<Option<Receiver<Feed>>>,
    fail_open: bool,
    fail_load: Option<String>,
    fail_attach: Option<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            ledger: Arc::new(Ledger::default()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            fail_open: false,
            fail_load: None,
            fail_attach: None,
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_load(mut self, program: &str) -> Self {
        self.fail_load = Some(program.to_string());
        self
    }

    pub fn failing_attach(mut self, program: &str) -> Self {
        self.fail_attach = Some(program.to_string());
        self
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    pub fn feed(&self) -> Sender<Feed> {
        self.sender.clone()
    }
}

impl Backend for MockBackend {
    type Object = MockObject;

    fn open(&self, package: &ProgramPackage) -> Result<MockObject> {
        if self.fail_open {
            bail!("object rejected");
        }
        self.ledger.record(format!("open:{}", package.name()));
        Ok(MockObject {
            ledger: Arc::clone(&self.ledger),
            receiver: self.receiver.lock().unwrap().take(),
            fail_load: self.fail_load.clone(),
            fail_attach: self.fail_attach.clone(),
        })
    }
}

pub struct MockObject {
    ledger: Arc<Ledger>,
    receiver: Option<Receiver<Feed>>,
    fail_load: Option<String>,
    fail_attach: Option<String>,
}

pub struct MockLink(String);

impl KernelObject for MockObject {
    type Link = MockLink;

    fn load_program(&mut self, program: &ProgramSpec) -> Result<()> {
        if self.fail_load.as_deref() == Some(program.name.as_str()) {
            bail!("verifier rejected {}", program.name);
        }
        self.ledger.record(format!("load:{}", program.name));
        Ok(())
    }

    fn attach_program(&mut self, program: &ProgramSpec) -> Result<MockLink> {
        if self.fail_attach.as_deref() == Some(program.name.as_str()) {
            bail!("no such hook for {}", program.name);
        }
        self.ledger.record(format!("attach:{}", program.name));
        Ok(MockLink(program.name.clone()))
    }

    fn detach(&mut self, link: MockLink) {
        self.ledger.record(format!("detach:{}", link.0));
    }

    fn unload_program(&mut self, program: &ProgramSpec) {
        self.ledger.record(format!("unload:{}", program.name));
    }

    fn subscribe(&mut self, map: &MapSpec, _options: &RunOptions) -> Result<Box<dyn RecordSource>> {
        let receiver = self.receiver.take().ok_or_else(|| anyhow!("{} already subscribed", map.name))?;
        self.ledger.record(format!("subscribe:{}", map.name));
        Ok(Box::new(MockSource {
            ledger: Arc::clone(&self.ledger),
            map: map.name.clone(),
            receiver,
            current: Vec::new(),
        }))
    }
}

impl Drop for MockObject {
    fn drop(&mut self) {
        self.ledger.record("close");
    }
}

pub struct MockSource {
    ledger: Arc<Ledger>,
    map: String,
    receiver: Receiver<Feed>,
    current: Vec<u8>,
}

impl RecordSource for MockSource {
    fn poll(&mut self, timeout: Duration) -> Result<Polled<'_>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Feed::Record(bytes)) => {
                self.current = bytes;
                Ok(Polled::Record(&self.current))
            }
            Ok(Feed::Lost(count)) => Ok(Polled::Lost(count)),
            Ok(Feed::Fail(message)) => Err(anyhow!(message)),
            Err(RecvTimeoutError::Timeout) => Ok(Polled::Empty),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(Polled::Empty)
            }
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.ledger.record(format!("unsubscribe:{}", self.map));
    }
}

/// Minimal 64-bit little-endian ELF header for the BPF machine, base64-encoded
pub fn bpf_object_base64() -> String {
    let mut header = vec![0u8; 64];
    header[..4].copy_from_slice(b"\x7fELF");
    header[4] = 2;
    header[5] = 1;
    header[6] = 1;
    header[16..18].copy_from_slice(&1u16.to_le_bytes());
    header[18..20].copy_from_slice(&247u16.to_le_bytes()); // EM_BPF
    header[20..24].copy_from_slice(&1u32.to_le_bytes());
    header[52..54].copy_from_slice(&64u16.to_le_bytes());
    header[58..60].copy_from_slice(&64u16.to_le_bytes());
    STANDARD.encode(header)
}

/// Package with one tracepoint program per name plus the given `maps` and
/// `export` JSON arrays
pub fn package_json(programs: &[&str], maps: &str, export: &str) -> String {
    let programs = programs
        .iter()
        .map(|name| {
            format!(
                r#"{{"name": "{name}", "attach": {{"kind": "tracepoint", "category": "syscalls", "name": "{name}"}}}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"name": "testpkg", "data": "{}", "programs": [{programs}], "maps": {maps}, "export": {export}, "options": {{"poll_timeout_ms": 10}}}}"#,
        bpf_object_base64()
    )
}

/// Scenario package: ring buffer `EVENTS` with a single `pid: u32` field
pub fn pid_package() -> String {
    package_json(
        &["sys_enter_openat"],
        r#"[{"name": "EVENTS", "kind": "ring_buffer", "value_size": 4}]"#,
        r#"[{"name": "pid", "type": "u32", "width": 4}]"#,
    )
}

/// Package with no export map
pub fn silent_package() -> String {
    package_json(&["sys_enter_openat"], "[]", "[]")
}
