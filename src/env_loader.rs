use std::env;
use std::path::PathBuf;

/// Candidate `.env` files after the working directory: the archive root
/// named by `IMGSYNC_HOME`, then the per-user config directory.
fn fallback_dotenv_paths(
    imgsync_home: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(home) = imgsync_home {
        out.push(home.join(".env"));
    }
    if let Some(config) = config_dir {
        out.push(config.join("imgsync").join(".env"));
    }
    out
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let candidates = fallback_dotenv_paths(
        env::var_os("IMGSYNC_HOME").map(PathBuf::from),
        dirs::config_dir(),
    );
    if let Some(path) = candidates.into_iter().find(|path| path.is_file()) {
        let _ = dotenvy::from_path(&path);
    }
}
