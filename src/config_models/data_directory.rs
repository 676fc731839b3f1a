use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use directories::ProjectDirs;

use crate::config_models::network::Network;

pub const TEMP_DIRECTORY_NAME: &str = "temp";
pub const KEY_FILE_NAME: &str = "keys.hex";

#[derive(Debug, Clone)]
pub struct DataDirectory {
    data_dir: PathBuf,
}

impl DataDirectory {
    ///////////////////////////////////////////////////////////////////////////
    ///
    /// The repository directory holding keys and scratch space.
    ///
    /// The default varies by operating system, and includes the network, e.g.
    ///
    /// - Linux:   /home/alice/.local/share/pledge/mainnet
    /// - Windows: C:\Users\Alice\AppData\Roaming\pledge\data\mainnet
    /// - macOS:   /Users/Alice/Library/Application Support/org.pledge.pledge/mainnet
    pub fn get(root_dir: Option<PathBuf>, network: Network) -> Result<Self> {
        let project_dirs = root_dir
            .map(ProjectDirs::from_path)
            .unwrap_or_else(|| ProjectDirs::from("org", "pledge", "pledge"))
            .context("Could not determine data directory")?;

        let network_dir = network.to_string();
        let network_path = Path::new(&network_dir);
        let data_dir = project_dirs.data_dir().to_path_buf().join(network_path);

        Ok(DataDirectory { data_dir })
    }

    /// Create directory if it does not exist
    pub fn create_dir_if_not_exists(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.to_string_lossy()))
    }

    ///////////////////////////////////////////////////////////////////////////
    ///
    /// The root data directory path
    pub fn root_dir_path(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Scratch space for source files and archives of in-flight pledges.
    pub fn temp_dir_path(&self) -> PathBuf {
        self.data_dir.join(Path::new(TEMP_DIRECTORY_NAME))
    }

    /// The default key file path
    pub fn key_file_path(&self) -> PathBuf {
        self.data_dir.join(Path::new(KEY_FILE_NAME))
    }
}

impl std::fmt::Display for DataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data_dir.display())
    }
}
