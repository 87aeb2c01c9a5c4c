use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use botvisor_utils::{
    BOTVISOR_CONFIG_FILENAME, DEFAULT_CREDENTIAL_KEY, DEFAULT_ENTRY_FILENAME,
    DEFAULT_MANIFEST_FILENAME, DEFAULT_SCAFFOLD_SUBDIR, DEFAULT_UNIT_CONFIG_FILENAME,
    REGISTRY_FILENAME, TEMPLATE_SUBDIR, UNITS_SUBDIR,
};
use getset::Getters;
use serde::Deserialize;
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::{BotvisorError, BotvisorResult};

use super::{
    DEFAULT_INSTALL_ARGS, DEFAULT_INSTALL_PROFILE, DEFAULT_INSTALL_PROGRAM,
    DEFAULT_INSTALL_TIMEOUT, DEFAULT_PROFILE_ENV_VAR, DEFAULT_RUNTIME_PROCESS_NAME,
    DEFAULT_RUN_PROFILE, DEFAULT_RUN_PROGRAM, DEFAULT_STARTUP_GRACE, DEFAULT_STOP_TIMEOUT,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Settings of the supervisor.
///
/// Every path that is not absolute is interpreted relative to `home_dir`.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub with_prefix")]
pub struct SupervisorConfig {
    /// The directory holding the registry, the template and the units.
    #[builder(setter(into))]
    home_dir: PathBuf,

    /// Overrides the directory that holds one directory per unit.
    #[getset(skip)]
    #[builder(default, setter(strip_option, into))]
    units_dir: Option<PathBuf>,

    /// Overrides the template directory.
    #[getset(skip)]
    #[builder(default, setter(strip_option, into))]
    template_dir: Option<PathBuf>,

    /// The registry document name.
    #[builder(default = REGISTRY_FILENAME.to_string(), setter(into))]
    registry_file: String,

    /// The entry point file of every unit.
    #[builder(default = DEFAULT_ENTRY_FILENAME.to_string(), setter(into))]
    entry_file: String,

    /// The dependency manifest required before launch.
    #[builder(default = DEFAULT_MANIFEST_FILENAME.to_string(), setter(into))]
    manifest_file: String,

    /// The unit configuration document that receives the credential.
    #[builder(default = DEFAULT_UNIT_CONFIG_FILENAME.to_string(), setter(into))]
    unit_config_file: String,

    /// The scaffold subdirectory seeded in every new unit.
    #[builder(default = DEFAULT_SCAFFOLD_SUBDIR.to_string(), setter(into))]
    scaffold_subdir: String,

    /// The key of the credential in the unit configuration document.
    #[builder(default = DEFAULT_CREDENTIAL_KEY.to_string(), setter(into))]
    credential_key: String,

    /// The dependency installer.
    #[builder(default = DEFAULT_INSTALL_PROGRAM.to_string(), setter(into))]
    install_program: String,

    /// Arguments of the dependency installer.
    #[builder(default = DEFAULT_INSTALL_ARGS.iter().map(|arg| arg.to_string()).collect())]
    install_args: Vec<String>,

    /// The runtime that executes the entry point.
    #[builder(default = DEFAULT_RUN_PROGRAM.to_string(), setter(into))]
    run_program: String,

    /// The process name targeted by the fallback termination.
    #[builder(default = DEFAULT_RUNTIME_PROCESS_NAME.to_string(), setter(into))]
    runtime_process_name: String,

    /// The environment variable selecting the profile.
    #[builder(default = DEFAULT_PROFILE_ENV_VAR.to_string(), setter(into))]
    profile_env_var: String,

    /// The profile for dependency installation.
    #[builder(default = DEFAULT_INSTALL_PROFILE.to_string(), setter(into))]
    install_profile: String,

    /// The profile for running units.
    #[builder(default = DEFAULT_RUN_PROFILE.to_string(), setter(into))]
    run_profile: String,

    /// Upper bound on a dependency installation.
    #[builder(default = DEFAULT_INSTALL_TIMEOUT)]
    install_timeout: Duration,

    /// How long a new process must survive before the start commits.
    #[builder(default = DEFAULT_STARTUP_GRACE)]
    startup_grace: Duration,

    /// How long a stop waits before escalating to a hard kill.
    #[builder(default = DEFAULT_STOP_TIMEOUT)]
    stop_timeout: Duration,
}

/// The optional `botvisor.yaml` document. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    units_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    registry_file: Option<String>,
    entry_file: Option<String>,
    manifest_file: Option<String>,
    unit_config_file: Option<String>,
    scaffold_subdir: Option<String>,
    credential_key: Option<String>,
    install_program: Option<String>,
    install_args: Option<Vec<String>>,
    run_program: Option<String>,
    runtime_process_name: Option<String>,
    profile_env_var: Option<String>,
    install_profile: Option<String>,
    run_profile: Option<String>,
    install_timeout_secs: Option<u64>,
    startup_grace_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SupervisorConfig {
    /// Loads the configuration for the given home directory.
    ///
    /// Starts from the built-in defaults and applies `<home>/botvisor.yaml` if it exists.
    pub async fn load(home_dir: impl Into<PathBuf>) -> BotvisorResult<Self> {
        let home_dir = home_dir.into();
        let mut config = SupervisorConfig::builder().home_dir(home_dir.clone()).build();

        let config_path = home_dir.join(BOTVISOR_CONFIG_FILENAME);
        let exists = fs::try_exists(&config_path).await.map_err(|e| {
            BotvisorError::Config(format!("failed to access {}: {}", config_path.display(), e))
        })?;
        if !exists {
            tracing::debug!("no config file at {}, using defaults", config_path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path).await.map_err(|e| {
            BotvisorError::Config(format!("failed to read {}: {}", config_path.display(), e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|e| {
            BotvisorError::Config(format!("failed to parse {}: {}", config_path.display(), e))
        })?;

        config.apply(file);
        tracing::info!("loaded supervisor config from {}", config_path.display());

        Ok(config)
    }

    /// The directory holding one directory per unit.
    pub fn get_units_dir(&self) -> PathBuf {
        self.resolve(self.units_dir.as_deref(), UNITS_SUBDIR)
    }

    /// The template directory copied for every new unit.
    pub fn get_template_dir(&self) -> PathBuf {
        self.resolve(self.template_dir.as_deref(), TEMPLATE_SUBDIR)
    }

    /// The path of the registry document.
    pub fn get_registry_path(&self) -> PathBuf {
        self.home_dir.join(&self.registry_file)
    }

    fn resolve(&self, path: Option<&Path>, default_subdir: &str) -> PathBuf {
        match path {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.home_dir.join(path),
            None => self.home_dir.join(default_subdir),
        }
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(units_dir) = file.units_dir {
            self.units_dir = Some(units_dir);
        }

        if let Some(template_dir) = file.template_dir {
            self.template_dir = Some(template_dir);
        }

        let strings = [
            (file.registry_file, &mut self.registry_file),
            (file.entry_file, &mut self.entry_file),
            (file.manifest_file, &mut self.manifest_file),
            (file.unit_config_file, &mut self.unit_config_file),
            (file.scaffold_subdir, &mut self.scaffold_subdir),
            (file.credential_key, &mut self.credential_key),
            (file.install_program, &mut self.install_program),
            (file.run_program, &mut self.run_program),
            (file.runtime_process_name, &mut self.runtime_process_name),
            (file.profile_env_var, &mut self.profile_env_var),
            (file.install_profile, &mut self.install_profile),
            (file.run_profile, &mut self.run_profile),
        ];

        for (value, field) in strings {
            if let Some(value) = value {
                *field = value;
            }
        }

        if let Some(install_args) = file.install_args {
            self.install_args = install_args;
        }

        if let Some(secs) = file.install_timeout_secs {
            self.install_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = file.startup_grace_ms {
            self.startup_grace = Duration::from_millis(ms);
        }

        if let Some(ms) = file.stop_timeout_ms {
            self.stop_timeout = Duration::from_millis(ms);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test_log::test(tokio::test)]
    async fn test_load_without_file_uses_defaults() -> BotvisorResult<()> {
        let home = TempDir::new()?;
        let config = SupervisorConfig::load(home.path()).await?;

        assert_eq!(config.get_units_dir(), home.path().join("bots"));
        assert_eq!(config.get_template_dir(), home.path().join("template"));
        assert_eq!(
            config.get_registry_path(),
            home.path().join("managed_bots.json")
        );
        assert_eq!(config.get_run_program(), "node");
        assert_eq!(
            config.get_install_args(),
            &vec!["install", "--legacy-peer-deps", "--force"]
        );
        assert_eq!(*config.get_install_timeout(), DEFAULT_INSTALL_TIMEOUT);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_load_applies_yaml_overrides() -> BotvisorResult<()> {
        let home = TempDir::new()?;
        fs::write(
            home.path().join(BOTVISOR_CONFIG_FILENAME),
            "units_dir: fleet\n\
             template_dir: /opt/template\n\
             run_program: deno\n\
             install_args: [ci]\n\
             install_timeout_secs: 30\n\
             stop_timeout_ms: 250\n",
        )
        .await?;

        let config = SupervisorConfig::load(home.path()).await?;

        assert_eq!(config.get_units_dir(), home.path().join("fleet"));
        assert_eq!(config.get_template_dir(), PathBuf::from("/opt/template"));
        assert_eq!(config.get_run_program(), "deno");
        assert_eq!(config.get_install_args(), &vec!["ci".to_string()]);
        assert_eq!(*config.get_install_timeout(), Duration::from_secs(30));
        assert_eq!(*config.get_stop_timeout(), Duration::from_millis(250));
        assert_eq!(config.get_entry_file(), "index.js");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_load_rejects_unknown_keys() -> BotvisorResult<()> {
        let home = TempDir::new()?;
        fs::write(home.path().join(BOTVISOR_CONFIG_FILENAME), "restart: always\n").await?;

        let result = SupervisorConfig::load(home.path()).await;
        assert!(matches!(result, Err(BotvisorError::Config(_))));

        Ok(())
    }
}
