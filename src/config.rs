//! The declarative configuration that parameterizes a mount.
//!
//! Reads `<client>/config.toml` into a [`CheckoutConfig`]
//! and `<eden-dir>/config.json` into a name-to-client-directory map,
//! the latter tolerant of `//`/`/* */` comments and
//! trailing commas the way the original's `folly::json::stripComments` +
//! `allow_trailing_comma` loader is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const CLIENT_DIRECTORY_MAP_FILE_NAME: &str = "config.json";
const SNAPSHOT_FILE_NAME: &str = "SNAPSHOT";
const OVERLAY_DIR_NAME: &str = "local";

/// The protocol the kernel bridge uses to deliver requests to the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountProtocol {
    KernelFuse,
    KernelNfs,
    UserspaceProjected,
}

impl MountProtocol {
    fn default_for_platform() -> Self {
        if cfg!(windows) {
            MountProtocol::UserspaceProjected
        } else {
            MountProtocol::KernelFuse
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "fuse" => Ok(MountProtocol::KernelFuse),
            "nfs" => Ok(MountProtocol::KernelNfs),
            "prjfs" => Ok(MountProtocol::UserspaceProjected),
            other => Err(Error::BadConfig(format!(
                "unrecognized repository.protocol {other:?}, expected one of \"fuse\", \"nfs\", \"prjfs\""
            ))),
        }
    }
}

/// Whether path lookups in the mount are case sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    fn default_for_platform() -> Self {
        if cfg!(windows) || cfg!(target_os = "macos") {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }
}

/// Immutable configuration for a single mount, built from `config.toml`.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Absolute path the mount is presented at.
    pub mount_path: PathBuf,
    /// Absolute path of the client's state directory.
    pub client_directory: PathBuf,
    /// The backing store's own identifier for the repository (e.g. a URL
    /// or local path, meaning is backend-specific).
    pub repository_source: String,
    /// The backing store type name (e.g. `"git"`, `"hg"`).
    pub repository_type: String,
    pub mount_protocol: MountProtocol,
    pub case_sensitivity: CaseSensitivity,
    pub require_utf8_path: bool,
    pub enable_tree_overlay: bool,
    /// Present only on Windows, where ProjFS mounts are identified by a
    /// GUID distinct from the mount path.
    #[cfg(windows)]
    pub guid: String,
}

impl CheckoutConfig {
    /// Path of the `SNAPSHOT` file inside the client directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.client_directory.join(SNAPSHOT_FILE_NAME)
    }

    /// Path of the overlay directory inside the client directory. The
    /// overlay itself is an excluded collaborator; this is
    /// only the anchor path the core hands off to it.
    pub fn overlay_path(&self) -> PathBuf {
        self.client_directory.join(OVERLAY_DIR_NAME)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    protocol: Option<String>,
    #[serde(rename = "case-sensitive")]
    case_sensitive: Option<bool>,
    #[serde(rename = "require-utf8-path")]
    require_utf8_path: Option<bool>,
    #[serde(rename = "enable-tree-overlay")]
    enable_tree_overlay: Option<bool>,
    #[cfg(windows)]
    guid: Option<String>,
}

/// Parses `<client_directory>/config.toml` into a [`CheckoutConfig`] for
/// a mount at `mount_path`.
///
/// Fails with [`Error::BadConfig`] if the file is missing, is not valid
/// TOML, is missing `repository.path`/`repository.type`, or names an
/// unrecognized `protocol`.
pub fn load_checkout_config(mount_path: &Path, client_directory: &Path) -> Result<CheckoutConfig> {
    let config_path = client_directory.join(CONFIG_FILE_NAME);
    let contents = std::fs::read_to_string(&config_path).map_err(|e| {
        let err = Error::BadConfig(format!("cannot read {}: {e}", config_path.display()));
        tracing::warn!(path = %config_path.display(), %err, "failed to read checkout config");
        err
    })?;
    let raw: RawConfigFile = toml::from_str(&contents).map_err(|e| {
        let err = Error::from(e);
        tracing::warn!(path = %config_path.display(), %err, "failed to parse checkout config");
        err
    })?;

    let mount_protocol = match raw.repository.protocol {
        Some(value) => MountProtocol::parse(&value)?,
        None => MountProtocol::default_for_platform(),
    };

    tracing::debug!(
        mount = %mount_path.display(),
        client = %client_directory.display(),
        protocol = ?mount_protocol,
        "loaded checkout config"
    );

    #[cfg(windows)]
    let guid = raw
        .repository
        .guid
        .unwrap_or_else(generate_guid);

    Ok(CheckoutConfig {
        mount_path: mount_path.to_path_buf(),
        client_directory: client_directory.to_path_buf(),
        repository_source: raw.repository.path,
        repository_type: raw.repository.kind,
        mount_protocol,
        case_sensitivity: raw
            .repository
            .case_sensitive
            .map(|sensitive| {
                if sensitive {
                    CaseSensitivity::Sensitive
                } else {
                    CaseSensitivity::Insensitive
                }
            })
            .unwrap_or_else(CaseSensitivity::default_for_platform),
        require_utf8_path: raw.repository.require_utf8_path.unwrap_or(true),
        enable_tree_overlay: raw.repository.enable_tree_overlay.unwrap_or(false),
        #[cfg(windows)]
        guid,
    })
}

#[cfg(windows)]
fn generate_guid() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::hash::Hash;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let seed = format!("{}-{}", now.as_nanos(), std::process::id());
    let digest = Hash::sha1(seed.as_bytes());
    let bytes = digest.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Parses `<eden_dir>/config.json` into a mount-name-to-client-directory
/// map, stripping `//` and `/* */` comments and tolerating a trailing
/// comma before the closing `}`/`]`. An empty file
/// yields an empty map.
pub fn load_client_directory_map(eden_dir: &Path) -> Result<HashMap<String, PathBuf>> {
    let map_path = eden_dir.join(CLIENT_DIRECTORY_MAP_FILE_NAME);
    let contents = std::fs::read_to_string(&map_path)
        .map_err(|e| Error::BadConfig(format!("cannot read {}: {e}", map_path.display())))?;

    let stripped = strip_json_comments(&contents);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Ok(HashMap::new());
    }

    let without_trailing_commas = strip_trailing_commas(trimmed);
    let raw: HashMap<String, String> = serde_json::from_str(&without_trailing_commas)?;
    Ok(raw.into_iter().map(|(name, path)| (name, PathBuf::from(path))).collect())
}

/// Strips `//` line comments and `/* ... */` block comments, leaving
/// characters inside JSON string literals untouched.
fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Removes a trailing comma that immediately precedes a closing `}` or
/// `]`, outside of string literals.
fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }

        if c == ',' {
            // Look ahead past whitespace for a closing bracket.
            let mut lookahead = chars.clone();
            let mut only_whitespace = true;
            let mut next_significant = None;
            for next in lookahead.by_ref() {
                if next.is_whitespace() {
                    continue;
                }
                only_whitespace = false;
                next_significant = Some(next);
                break;
            }
            if only_whitespace {
                out.push(c);
                continue;
            }
            if matches!(next_significant, Some('}') | Some(']')) {
                continue;
            }
        }

        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_minimal_config() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CONFIG_FILE_NAME,
            r#"
            [repository]
            path = "/srv/repo"
            type = "git"
            "#,
        );

        let config = load_checkout_config(Path::new("/mnt/x"), dir.path()).unwrap();
        assert_eq!(config.repository_source, "/srv/repo");
        assert_eq!(config.repository_type, "git");
        assert!(!config.enable_tree_overlay);
        assert!(config.require_utf8_path);
        assert_eq!(config.mount_protocol, MountProtocol::default_for_platform());
    }

    #[test]
    fn parses_nfs_protocol_override() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CONFIG_FILE_NAME,
            r#"
            [repository]
            path = "/srv/repo"
            type = "hg"
            protocol = "nfs"
            "#,
        );

        let config = load_checkout_config(Path::new("/mnt/x"), dir.path()).unwrap();
        assert_eq!(config.mount_protocol, MountProtocol::KernelNfs);
    }

    #[test]
    fn rejects_unrecognized_protocol() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CONFIG_FILE_NAME,
            r#"
            [repository]
            path = "/srv/repo"
            type = "hg"
            protocol = "smb"
            "#,
        );

        assert!(matches!(
            load_checkout_config(Path::new("/mnt/x"), dir.path()),
            Err(Error::BadConfig(_))
        ));
    }

    #[test]
    fn missing_required_key_fails() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CONFIG_FILE_NAME,
            r#"
            [repository]
            path = "/srv/repo"
            "#,
        );

        assert!(matches!(
            load_checkout_config(Path::new("/mnt/x"), dir.path()),
            Err(Error::BadConfig(_))
        ));
    }

    #[test]
    fn client_directory_map_empty_file_is_empty_map() {
        let dir = TempDir::new().unwrap();
        write(&dir, CLIENT_DIRECTORY_MAP_FILE_NAME, "");
        let map = load_client_directory_map(dir.path()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn client_directory_map_tolerates_comments_and_trailing_commas() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            CLIENT_DIRECTORY_MAP_FILE_NAME,
            r#"
            {
                // a line comment
                "repo1": "/home/user/.eden/clients/repo1",
                /* a block
                   comment */
                "repo2": "/home/user/.eden/clients/repo2",
            }
            "#,
        );

        let map = load_client_directory_map(dir.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("repo1").unwrap(),
            &PathBuf::from("/home/user/.eden/clients/repo1")
        );
    }
}
