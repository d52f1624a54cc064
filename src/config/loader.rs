use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

use super::model::{GroupsFile, MonitorSettings, ServersFile, WebsitesFile};
use super::{ConfigError, ConfigSource, Reload};
use crate::model::{Group, SeverityPolicy, normalize_name};
use crate::server::state::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConfigFile {
    Global,
    Severity,
    Servers,
    Groups,
    Websites,
}

impl ConfigFile {
    const ALL: [ConfigFile; 5] = [
        ConfigFile::Global,
        ConfigFile::Severity,
        ConfigFile::Servers,
        ConfigFile::Groups,
        ConfigFile::Websites,
    ];

    fn file_name(self) -> &'static str {
        match self {
            ConfigFile::Global => "monitor.toml",
            ConfigFile::Severity => "severity.toml",
            ConfigFile::Servers => "servers.toml",
            ConfigFile::Groups => "groups.toml",
            ConfigFile::Websites => "websites.toml",
        }
    }

    fn rebuilds_sessions(self) -> bool {
        matches!(
            self,
            ConfigFile::Servers | ConfigFile::Groups | ConfigFile::Websites
        )
    }
}

/// Loads the five TOML files from a directory, falling back to
/// `<dir>/default/` for any file the directory does not override.
///
/// Changes are detected by comparing each file's modification time against
/// the one recorded at the last successful load.
pub struct FileConfigSource {
    dir: PathBuf,
    loaded: HashMap<ConfigFile, (PathBuf, Option<SystemTime>)>,
    apply_env: bool,
}

impl FileConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: HashMap::new(),
            apply_env: true,
        }
    }

    /// Skips the `DATABASE_URL`/`WARDEN_LOG_DIR` overrides.
    pub fn without_env(mut self) -> Self {
        self.apply_env = false;
        self
    }

    /// Reads only `monitor.toml`, for bootstrapping logging and storage before
    /// the first full load.
    pub fn settings(&self) -> Result<MonitorSettings, ConfigError> {
        let mut settings: MonitorSettings = parse_file(&self.require(ConfigFile::Global)?)?;
        if self.apply_env {
            settings.apply_env();
        }
        Ok(settings)
    }

    fn resolve(&self, file: ConfigFile) -> Option<PathBuf> {
        [
            self.dir.join(file.file_name()),
            self.dir.join("default").join(file.file_name()),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }

    fn require(&self, file: ConfigFile) -> Result<PathBuf, ConfigError> {
        self.resolve(file).ok_or_else(|| ConfigError::Missing {
            file: file.file_name(),
            dir: self.dir.clone(),
        })
    }

    fn changed(&self, file: ConfigFile) -> bool {
        let current = self.resolve(file);
        match (self.loaded.get(&file), current) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some((loaded_path, loaded_mtime)), Some(path)) => {
                *loaded_path != path || *loaded_mtime != modified_time(&path)
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Rejects names that collide once normalized, since they would share a TestId.
fn ensure_unique<'a>(
    kind: &'static str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(normalize_name(name)) {
            return Err(ConfigError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn warn_on_severity(
    severities: &HashMap<String, Arc<SeverityPolicy>>,
    kind: &str,
    name: &str,
    severity: Option<&str>,
) {
    match severity {
        None => warn!(target_kind = kind, target_name = name, "Severity not specified."),
        Some(s) if !severities.contains_key(s) => warn!(
            target_kind = kind,
            target_name = name,
            severity = s,
            "Severity does not exist."
        ),
        Some(_) => {}
    }
}

fn build_snapshot(
    settings: MonitorSettings,
    raw_severities: HashMap<String, SeverityPolicy>,
    groups_file: GroupsFile,
    servers_file: ServersFile,
    websites_file: WebsitesFile,
) -> Result<Snapshot, ConfigError> {
    let severities: HashMap<String, Arc<SeverityPolicy>> = raw_severities
        .into_iter()
        .map(|(name, mut policy)| {
            policy.name = name.clone();
            (name, Arc::new(policy))
        })
        .collect();

    ensure_unique("group", groups_file.groups.iter().map(|g| g.name.as_str()))?;
    ensure_unique("server", servers_file.servers.iter().map(|s| s.name.as_str()))?;
    ensure_unique("website", websites_file.websites.iter().map(|w| w.name.as_str()))?;

    let groups: HashMap<String, Group> = groups_file
        .groups
        .into_iter()
        .map(|raw| raw.into_group().map(|g| (g.name.clone(), g)))
        .collect::<Result<_, _>>()?;

    let mut servers = Vec::with_capacity(servers_file.servers.len());
    for raw in servers_file.servers {
        let server = raw.into_target()?;
        warn_on_severity(
            &severities,
            "server",
            &server.common.name,
            server.common.severity.as_deref(),
        );
        for group_name in &server.groups {
            if !groups.contains_key(group_name) {
                warn!(server = %server.common.name, group = %group_name, "Group does not exist.");
            }
        }
        let checks = server.effective_checks(&groups);
        let mut check_ids = HashSet::new();
        for check in &checks {
            if !check_ids.insert(normalize_name(&check.name)) {
                return Err(ConfigError::DuplicateCheck {
                    server: server.common.name.clone(),
                    check: check.name.clone(),
                });
            }
        }
        for check in checks {
            if let Some(s) = check.severity.as_deref() {
                if !severities.contains_key(s) {
                    warn!(
                        server = %server.common.name,
                        check = %check.name,
                        severity = s,
                        "Check severity does not exist."
                    );
                }
            }
        }
        servers.push(Arc::new(server));
    }

    let mut websites = Vec::with_capacity(websites_file.websites.len());
    for raw in websites_file.websites {
        let website = raw.into_target()?;
        warn_on_severity(
            &severities,
            "website",
            &website.common.name,
            website.common.severity.as_deref(),
        );
        websites.push(Arc::new(website));
    }

    Ok(Snapshot {
        settings,
        severities,
        groups,
        servers,
        websites,
    })
}

impl ConfigSource for FileConfigSource {
    fn has_changes(&self) -> bool {
        ConfigFile::ALL.iter().any(|file| self.changed(*file))
    }

    fn load(&mut self) -> Result<Reload, ConfigError> {
        let mut paths = HashMap::new();
        for file in ConfigFile::ALL {
            paths.insert(file, self.require(file)?);
        }
        let rebuild_sessions = ConfigFile::ALL
            .iter()
            .any(|file| file.rebuilds_sessions() && self.changed(*file));

        let settings = self.settings()?;
        let snapshot = build_snapshot(
            settings,
            parse_file(&paths[&ConfigFile::Severity])?,
            parse_file(&paths[&ConfigFile::Groups])?,
            parse_file(&paths[&ConfigFile::Servers])?,
            parse_file(&paths[&ConfigFile::Websites])?,
        )?;

        for (file, path) in paths {
            let mtime = modified_time(&path);
            self.loaded.insert(file, (path, mtime));
        }
        info!(
            dir = %self.dir.display(),
            servers = snapshot.servers.len(),
            websites = snapshot.websites.len(),
            severities = snapshot.severities.len(),
            rebuild_sessions,
            "Configuration loaded."
        );

        Ok(Reload {
            snapshot,
            rebuild_sessions,
        })
    }
}
