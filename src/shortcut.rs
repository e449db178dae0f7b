//! Desktop launchers for layout files.
//!
//! `deskplan create-shortcut work.deskr.yaml` writes a freedesktop
//! `work.desktop` entry that applies the layout when clicked.

use log::info;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Theme icon used when none is given.
pub const DEFAULT_ICON: &str = "preferences-desktop";

#[derive(Debug, thiserror::Error)]
#[error("shortcut error: {0}")]
pub struct ShortcutError(String);

/// A `.desktop` entry that runs one layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub name: String,
    /// Program and arguments, unquoted.
    pub exec: Vec<String>,
    /// Theme icon name or absolute path.
    pub icon: String,
}

/// Launcher name for a layout file: its file name without `.deskr.yaml`
/// (or a plain `.yaml` / `.yml`).
pub fn shortcut_name(config: &Path) -> String {
    let file_name = config
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    [".deskr.yaml", ".yaml", ".yml"]
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .unwrap_or(file_name.as_str())
        .to_string()
}

/// `$XDG_DATA_HOME/applications`, defaulting to `~/.local/share/applications`.
pub fn applications_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.local/share", home)
    });
    PathBuf::from(base).join("applications")
}

/// Quote one `Exec` argument per the Desktop Entry Specification.
fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    if !arg.is_empty() && !arg.contains(RESERVED) {
        return arg.replace('%', "%%");
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '"' | '`' | '$' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '%' => quoted.push_str("%%"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Shortcut {
    /// Launcher that runs `program layout <config>`, with `config` made
    /// absolute.
    pub fn for_layout(program: &str, config: &Path, icon: Option<&str>) -> Result<Self, ShortcutError> {
        let config = fs::canonicalize(config)
            .map_err(|e| ShortcutError(format!("{}: {}", config.display(), e)))?;
        Ok(Self {
            name: shortcut_name(&config),
            exec: vec![
                program.to_string(),
                "layout".to_string(),
                config.to_string_lossy().into_owned(),
            ],
            icon: icon.unwrap_or(DEFAULT_ICON).to_string(),
        })
    }

    pub fn render(&self) -> String {
        let exec = self
            .exec
            .iter()
            .map(|arg| quote_exec_arg(arg))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "#!/usr/bin/env xdg-open\n\
             [Desktop Entry]\n\
             Version=1.0\n\
             Terminal=false\n\
             Type=Application\n\
             Name={}\n\
             Exec={}\n\
             Icon={}\n",
            self.name, exec, self.icon
        )
    }

    /// Write `<name>.desktop` into `dir` and mark it executable.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ShortcutError> {
        fs::create_dir_all(dir).map_err(|e| ShortcutError(format!("{}: {}", dir.display(), e)))?;
        let path = dir.join(format!("{}.desktop", self.name));
        let io_error = |e: std::io::Error| ShortcutError(format!("{}: {}", path.display(), e));

        fs::write(&path, self.render()).map_err(io_error)?;
        let mut permissions = fs::metadata(&path).map_err(io_error)?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(&path, permissions).map_err(io_error)?;

        info!("wrote {}", path.display());
        Ok(path)
    }
}
