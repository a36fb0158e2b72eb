//! Scripted [`SystemRunner`] for unit tests.
//!
//! Commands are matched on their display form (`"systemctl restart xray"`).
//! Anything not scripted succeeds with empty stdout.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::system::{CommandOutcome, CommandSpec, SystemRunner};

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<CommandOutcome>>,
    stdout: HashMap<String, String>,
    timeouts: HashSet<String>,
    unavailable: HashSet<String>,
    log: Vec<CommandSpec>,
}

#[derive(Default)]
pub struct FakeRunner {
    script: Mutex<Script>,
}

impl FakeRunner {
    /// The next `n` runs of `command` exit with `status`.
    pub fn fail_times(&self, command: &str, status: i32, n: usize) {
        let mut script = self.script.lock().unwrap();
        let queue = script.queued.entry(command.to_string()).or_default();
        for _ in 0..n {
            queue.push_back(CommandOutcome::Failed {
                status: Some(status),
                stderr: String::new(),
            });
        }
    }

    /// Every run of `command` times out.
    pub fn time_out(&self, command: &str) {
        self.script.lock().unwrap().timeouts.insert(command.to_string());
    }

    /// Every command running `program` is reported as not installed.
    pub fn unavailable(&self, program: &str) {
        self.script.lock().unwrap().unavailable.insert(program.to_string());
    }

    /// Successful runs of `command` print `stdout`.
    pub fn respond(&self, command: &str, stdout: &str) {
        self.script
            .lock()
            .unwrap()
            .stdout
            .insert(command.to_string(), stdout.to_string());
    }

    /// Drops every script for `command`.
    pub fn heal(&self, command: &str) {
        let mut script = self.script.lock().unwrap();
        script.queued.remove(command);
        script.timeouts.remove(command);
    }

    pub fn count(&self, command: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|spec| spec.to_string() == command)
            .count()
    }

    /// Stdin of the most recent run of `command`.
    pub fn stdin_of(&self, command: &str) -> Option<String> {
        self.script
            .lock()
            .unwrap()
            .log
            .iter()
            .rev()
            .find(|spec| spec.to_string() == command)
            .and_then(|spec| spec.stdin.clone())
    }

    pub fn commands(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .log
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl SystemRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> CommandOutcome {
        let key = spec.to_string();
        let mut script = self.script.lock().unwrap();
        script.log.push(spec.clone());

        if script.unavailable.contains(&spec.program) {
            return CommandOutcome::Unavailable {
                reason: format!("{} not found", spec.program),
            };
        }
        if script.timeouts.contains(&key) {
            return CommandOutcome::TimedOut;
        }
        if let Some(outcome) = script.queued.get_mut(&key).and_then(VecDeque::pop_front) {
            return outcome;
        }
        CommandOutcome::Success {
            stdout: script.stdout.get(&key).cloned().unwrap_or_default(),
        }
    }
}
