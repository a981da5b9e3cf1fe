//! Dependency-resolution oracle backed by `knife`.
//!
//! The knife command is user-configurable (parsed with shell-words) so it can
//! be wrapped, e.g. `bundle exec knife`. It runs from the chef repo directory
//! so relative cookbook paths in `knife.rb` resolve.
use crate::error::{Collaborator, LockError};
use crate::model::Environment;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Resolves run-lists to cookbook listings and fetches environments.
pub trait Resolver {
    /// Raw `knife solve` listing for `run_list`, optionally under `environment`.
    fn solve(&self, run_list: &str, environment: Option<&str>) -> Result<String, LockError>;

    /// Full document of an existing environment.
    fn environment(&self, name: &str) -> Result<Environment, LockError>;
}

#[derive(Debug, Clone)]
pub struct KnifeResolver {
    argv: Vec<String>,
    config: Option<PathBuf>,
    repo_dir: Option<PathBuf>,
}

impl KnifeResolver {
    /// Build a resolver from a shell-style command string.
    ///
    /// The program is looked up on `PATH` up front so a missing knife fails
    /// before any appliance is touched.
    pub fn new(
        command: &str,
        config: Option<PathBuf>,
        repo_dir: Option<PathBuf>,
    ) -> Result<Self, LockError> {
        let mut argv = shell_words::split(command).map_err(|err| {
            LockError::contract("knife command", err.to_string(), command)
        })?;
        if argv.is_empty() {
            return Err(LockError::contract("knife command", "command is empty", command));
        }
        let program = which::which(&argv[0]).map_err(|err| {
            LockError::unreachable(Collaborator::Resolver, format!("locate {}", argv[0]), err)
        })?;
        argv[0] = program.to_string_lossy().into_owned();
        Ok(Self {
            argv,
            config,
            repo_dir,
        })
    }

    fn solve_args(&self, run_list: &str, environment: Option<&str>) -> Vec<String> {
        let mut args = vec!["solve".to_string(), run_list.to_string()];
        if let Some(environment) = environment {
            args.push("-E".to_string());
            args.push(environment.to_string());
        }
        self.push_config(&mut args);
        args
    }

    fn environment_args(&self, name: &str) -> Vec<String> {
        let mut args = vec![
            "environment".to_string(),
            "show".to_string(),
            name.to_string(),
            "-F".to_string(),
            "json".to_string(),
        ];
        self.push_config(&mut args);
        args
    }

    fn push_config(&self, args: &mut Vec<String>) {
        if let Some(config) = &self.config {
            args.push("-c".to_string());
            args.push(config.to_string_lossy().into_owned());
        }
    }

    fn run(&self, args: &[String]) -> Result<String, LockError> {
        let call = format!("knife {}", args.join(" "));
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.repo_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let output = command
            .output()
            .map_err(|err| LockError::unreachable(Collaborator::Resolver, call.as_str(), err))?;
        tracing::debug!(
            call = %call,
            elapsed_ms = start.elapsed().as_millis(),
            stdout_bytes = output.stdout.len(),
            "knife complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LockError::unreachable(
                Collaborator::Resolver,
                call,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| LockError::contract("knife output", err.to_string(), &call))
    }
}

impl Resolver for KnifeResolver {
    fn solve(&self, run_list: &str, environment: Option<&str>) -> Result<String, LockError> {
        self.run(&self.solve_args(run_list, environment))
    }

    fn environment(&self, name: &str) -> Result<Environment, LockError> {
        let text = self.run(&self.environment_args(name))?;
        serde_json::from_str(&text)
            .map_err(|err| LockError::contract("environment document", err.to_string(), &text))
    }
}
