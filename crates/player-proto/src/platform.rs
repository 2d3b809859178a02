use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "musicplayer";

/// Home directory used when neither the CLI nor the environment names one.
pub fn default_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn data_dir(home: &Path) -> PathBuf {
    // ~/.local/share/musicplayer (XDG layout on every unix, macOS included)
    home.join(".local").join("share").join(APP_NAME)
}

pub fn config_dir(home: &Path) -> PathBuf {
    home.join(".config").join(APP_NAME)
}

pub fn session_file(home: &Path) -> PathBuf {
    data_dir(home).join("session")
}

pub fn log_file(home: &Path) -> PathBuf {
    data_dir(home).join(format!("{}.log", APP_NAME))
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

pub fn mpv_socket_path() -> PathBuf {
    temp_dir().join(format!("{}-mpv.sock", APP_NAME))
}

pub fn mpv_socket_arg(socket_path: &Path) -> String {
    format!("--input-ipc-server={}", socket_path.display())
}

pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_hang_off_home() {
        let home = PathBuf::from("/home/someone");
        assert_eq!(
            data_dir(&home),
            PathBuf::from("/home/someone/.local/share/musicplayer")
        );
        assert_eq!(
            session_file(&home),
            PathBuf::from("/home/someone/.local/share/musicplayer/session")
        );
        assert_eq!(
            config_dir(&home),
            PathBuf::from("/home/someone/.config/musicplayer")
        );
    }

    #[test]
    fn test_socket_arg() {
        let arg = mpv_socket_arg(Path::new("/tmp/x.sock"));
        assert_eq!(arg, "--input-ipc-server=/tmp/x.sock");
    }
}
