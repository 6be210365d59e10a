use std::path::{Path, PathBuf};

use pedimentos_core::config::CONFIG_FILE;

/// Resolve the working root.
///
/// Priority:
/// 1. `--root` flag / `PEDIMENTOS_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` holding `pedimentos.yaml`
/// 3. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
        .unwrap_or(cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins() {
        let p = Path::new("/tmp/somewhere");
        assert_eq!(resolve_root(Some(p)), PathBuf::from("/tmp/somewhere"));
    }
}
