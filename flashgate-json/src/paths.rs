use directories::ProjectDirs;
use std::path::PathBuf;

pub fn data_root() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("com", "flashgate", "Flashgate") {
        pd.data_dir().to_path_buf()
    } else {
        // Fallback: current dir
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// `(store file, backups dir)` under the data root.
pub fn default_store_file() -> (PathBuf, PathBuf) {
    let root = data_root();
    let file = root.join("flashgate.json");
    let backups = root.join("backups");
    (file, backups)
}

pub fn default_sqlite_file() -> PathBuf {
    data_root().join("flashgate.sqlite3")
}
