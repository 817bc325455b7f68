use std::path::PathBuf;

pub const ENGINE_TCP_PORT: u16 = 9712;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/guide/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("guide")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("guide")
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/guide/
    // (avoid macOS Application Support folder for consistency)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("guide")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("guide")
    }
}
