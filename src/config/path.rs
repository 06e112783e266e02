//! Module for searching for imu-sampler config files

use std::path::PathBuf;

/// Name of the configuration file in every search directory
const CONFIG_FILE_NAME: &str = "config.yaml";

/// System-wide configuration path used if no user configuration exists
const SYSTEM_CONFIG_PATH: &str = "/etc/imu-sampler/config.yaml";

/// Calibration file used when the configuration does not name one
pub const DEFAULT_CALIBRATION_PATH: &str = "/etc/icm20948cal.json";

/// Returns the user configuration path (e.g. "~/.config/imu-sampler/config.yaml")
/// if one exists
pub fn get_user_config_path() -> Option<PathBuf> {
    let Ok(base_dirs) = xdg::BaseDirectories::with_prefix("imu-sampler") else {
        log::warn!("Unable to determine user config directory");
        return None;
    };
    base_dirs.find_config_file(CONFIG_FILE_NAME)
}

/// Returns a list of configuration files in load order.
/// E.g. ["~/.config/imu-sampler/config.yaml", "/etc/imu-sampler/config.yaml"]
pub fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = get_user_config_path() {
        paths.push(path);
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    paths.push(PathBuf::from("./rootfs/etc/imu-sampler").join(CONFIG_FILE_NAME));

    paths
}

/// Returns the first configuration file that exists, if any
pub fn find_config_path() -> Option<PathBuf> {
    get_config_paths().into_iter().find(|path| path.is_file())
}
