//! Process executor tests with scripted stand-ins for ansible-playbook
#![cfg(target_os = "linux")]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use secrecy::SecretString;
use tempfile::TempDir;

use vm_deployer::deploy::executor::{Invocation, ProcessExecutor, RAW_TAIL_CHARS};
use vm_deployer::models::extra_vars::{ExtraVar, ExtraVariables};
use vm_deployer::storage::settings::AnsibleSettings;

fn tool(dir: &Path, body: &str) -> ProcessExecutor {
    let path = dir.join("ansible-playbook");
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    ProcessExecutor::new(&AnsibleSettings {
        binary: path.display().to_string(),
        ..Default::default()
    })
}

struct Fixture {
    tmp: TempDir,
    automation_dir: PathBuf,
    inventory: PathBuf,
    vars: ExtraVariables,
}

impl Fixture {
    fn invocation(&self) -> Invocation<'_> {
        Invocation {
            automation_dir: &self.automation_dir,
            inventory: &self.inventory,
            private_key: None,
            extra_vars: &self.vars,
            env: vec![("DEPLOY_MARKER".to_string(), "on".to_string())],
        }
    }
}

fn setup() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let automation_dir = tmp.path().join("ansible");
    std::fs::create_dir_all(&automation_dir).unwrap();
    let inventory = automation_dir.join("hosts");
    std::fs::write(&inventory, "[vm]\n").unwrap();

    let mut vars = ExtraVariables::new();
    vars.set(ExtraVar::ServiceName, Some("svc1"));
    vars.set_secret(ExtraVar::DbPassword, Some(&SecretString::from("hunter2")));
    Fixture {
        tmp,
        automation_dir,
        inventory,
        vars,
    }
}

/// A zombie counts as gone
fn is_running(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .map(|state| state != "Z" && state != "X")
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[tokio::test]
async fn test_success_captures_stdout() {
    let fixture = setup();
    let executor = tool(
        fixture.tmp.path(),
        "echo \"cwd=$(pwd)\"\necho \"marker=$DEPLOY_MARKER nocolor=$ANSIBLE_NOCOLOR\"\nexit 0\n",
    );

    let result = executor.run(&fixture.invocation()).await;

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert!(!result.timed_out);
    assert!(result.stdout_tail.contains(&format!("cwd={}", fixture.automation_dir.display())));
    assert!(result.stdout_tail.contains("marker=on nocolor=1"));
}

#[tokio::test]
async fn test_nonzero_exit_keeps_both_streams() {
    let fixture = setup();
    let executor = tool(fixture.tmp.path(), "echo out\necho 'role failed' >&2\nexit 4\n");

    let result = executor.run(&fixture.invocation()).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 4);
    assert_eq!(result.stdout_tail.trim(), "out");
    assert_eq!(result.stderr_tail.trim(), "role failed");
}

#[tokio::test]
async fn test_argument_vector() {
    let fixture = setup();
    let executor = tool(fixture.tmp.path(), "printf '%s\\n' \"$@\"\n");

    let result = executor.run(&fixture.invocation()).await;

    let args: Vec<&str> = result.stdout_tail.lines().collect();
    assert_eq!(args[0], "-i");
    assert!(args[1].ends_with("/ansible/hosts"));
    assert_eq!(args[2], "main.yml");
    assert_eq!(args[3], "--ssh-common-args");
    assert_eq!(args[5], "-vv");
    assert_eq!(&args[6..], &["-e", r#"{"service_name":"svc1"}"#, "-e", r#"{"db_password":"hunter2"}"#]);
}

#[tokio::test]
async fn test_large_output_is_truncated_to_tail() {
    let fixture = setup();
    let executor = tool(
        fixture.tmp.path(),
        "i=0\nwhile [ $i -lt 3000 ]; do echo \"line $i xxxxxxxxxxxxxxxxxxxx\"; i=$((i+1)); done\necho LAST\n",
    );

    let result = executor.run(&fixture.invocation()).await;

    assert!(result.success);
    assert_eq!(result.stdout_tail.chars().count(), RAW_TAIL_CHARS);
    assert!(result.stdout_tail.ends_with("LAST\n"));
}

#[tokio::test]
async fn test_timeout_kills_process_group() {
    let fixture = setup();
    let pid_file = fixture.tmp.path().join("pids.txt");
    let executor = tool(
        fixture.tmp.path(),
        &format!(
            "sleep 60 &\necho \"$$ $!\" > {}\necho started\nwait\n",
            pid_file.display()
        ),
    )
    .with_timeout(Duration::from_secs(1));

    let started = Instant::now();
    let result = executor.run(&fixture.invocation()).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!result.success);
    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert!(result.stderr_tail.contains("timed out after 1 seconds"));
    assert_eq!(result.limit, Duration::from_secs(1));
    assert!(result.stdout_tail.contains("started"));

    let pids = std::fs::read_to_string(&pid_file).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    for pid in pids.split_whitespace() {
        assert!(!is_running(pid), "process {} survived the timeout", pid);
    }
}

#[tokio::test]
async fn test_background_job_does_not_swallow_output() {
    let fixture = setup();
    let pid_file = fixture.tmp.path().join("bg_pid.txt");
    let executor = tool(
        fixture.tmp.path(),
        &format!(
            "sleep 20 &\necho $! > {}\necho 'PLAY RECAP ok=3 failed=0'\necho warn >&2\nexit 0\n",
            pid_file.display()
        ),
    );

    let started = Instant::now();
    let result = executor.run(&fixture.invocation()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.success);
    assert!(!result.timed_out);
    assert!(result.stdout_tail.contains("PLAY RECAP ok=3 failed=0"));
    assert_eq!(result.stderr_tail.trim(), "warn");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let pid = std::fs::read_to_string(&pid_file).unwrap();
    assert!(!is_running(pid.trim()), "background job {} survived", pid.trim());
}

#[tokio::test]
async fn test_missing_binary_is_a_result() {
    let fixture = setup();
    let executor = ProcessExecutor::new(&AnsibleSettings {
        binary: "/nonexistent/ansible-playbook".to_string(),
        ..Default::default()
    });

    let result = executor.run(&fixture.invocation()).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(!result.timed_out);
    assert!(result.stderr_tail.contains("Failed to launch"));
}
