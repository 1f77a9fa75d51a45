//! Behavioural tests for layering constants from flags and the environment.

use std::cell::RefCell;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use provision_config::{Constants, ENV_PREFIX};

const MANAGED: &[&str] = &["LOG_FILTER", "LOG_FORMAT", "RSYNC", "RSYNC_PORT", "SSH_PORT"];

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    cli_args: RefCell<Vec<OsString>>,
    overrides: RefCell<Vec<(String, Option<OsString>)>>,
    resolved: RefCell<Option<Result<Constants, String>>>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            cli_args: RefCell::new(vec![OsString::from("provision")]),
            overrides: RefCell::new(Vec::new()),
            resolved: RefCell::new(None),
            guard: Some(guard),
        }
    }

    fn set_env(&self, key: &str, value: Option<&str>) {
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe on edition 2024; `Drop` restores the
        // previous values and the mutex serialises every harness.
        match value {
            Some(value) => unsafe { std::env::set_var(key, value) },
            None => unsafe { std::env::remove_var(key) },
        }
        self.overrides
            .borrow_mut()
            .push((key.to_string(), previous));
    }

    fn push_cli_arg(&self, arg: &str) {
        self.cli_args.borrow_mut().push(OsString::from(arg));
    }

    fn resolve(&self) {
        let args = self.cli_args.borrow().clone();
        let result = Constants::from_args(args).map_err(|error| error.to_string());
        *self.resolved.borrow_mut() = Some(result);
    }

    fn constants(&self) -> Constants {
        match self.resolved.borrow().as_ref() {
            Some(Ok(constants)) => constants.clone(),
            Some(Err(error)) => panic!("constants failed to resolve: {error}"),
            None => panic!("constants were not resolved"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
        drop(overrides);
        drop(self.guard.take());
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a clean provisioning environment")]
fn given_clean_environment(harness: &Harness) {
    for name in MANAGED {
        harness.set_env(&format!("{ENV_PREFIX}{name}"), None);
    }
}

#[given("the environment sets \"{key}\" to \"{value}\"")]
fn given_environment_override(harness: &Harness, key: String, value: String) {
    harness.set_env(&key, Some(&value));
}

#[given("the environment sets \"{key}\" to an empty value")]
fn given_empty_override(harness: &Harness, key: String) {
    harness.set_env(&key, Some(""));
}

#[given("the command line passes \"{flag}\" \"{value}\"")]
fn given_cli_flag(harness: &Harness, flag: String, value: String) {
    harness.push_cli_arg(&flag);
    harness.push_cli_arg(&value);
}

#[when("the constants are resolved")]
fn when_resolved(harness: &Harness) {
    harness.resolve();
}

#[then("the rsync port is {port}")]
fn then_rsync_port(harness: &Harness, port: u16) {
    assert_eq!(harness.constants().rsync_port(), port);
}

#[then("the rsync binary is \"{binary}\"")]
fn then_rsync_binary(harness: &Harness, binary: String) {
    assert_eq!(harness.constants().rsync_binary(), binary);
}

#[then("the ssh port is {port}")]
fn then_ssh_port(harness: &Harness, port: u16) {
    assert_eq!(harness.constants().ssh_port(), port);
}

#[then("resolution fails naming \"{variable}\"")]
fn then_resolution_fails(harness: &Harness, variable: String) {
    let resolved = harness.resolved.borrow();
    match resolved.as_ref() {
        Some(Err(message)) => assert!(
            message.contains(&variable),
            "expected error naming {variable}, got {message:?}"
        ),
        Some(Ok(constants)) => panic!("expected failure, resolved {constants:?}"),
        None => panic!("constants were not resolved"),
    }
}

#[scenario(
    path = "tests/features/constants_overrides.feature",
    name = "Defaults apply when nothing is overridden"
)]
fn defaults_apply(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/constants_overrides.feature",
    name = "Environment overrides replace defaults"
)]
fn environment_overrides(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/constants_overrides.feature",
    name = "Flags take precedence over the environment"
)]
fn flags_over_environment(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/constants_overrides.feature",
    name = "Empty overrides leave the default in place"
)]
fn empty_overrides_ignored(harness: Harness) {
    drop(harness);
}

#[scenario(
    path = "tests/features/constants_overrides.feature",
    name = "Malformed overrides are rejected"
)]
fn malformed_overrides_rejected(harness: Harness) {
    drop(harness);
}
