//! Version identifier reported to the runtime.

/// Package version, including any pre-release suffix
const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Pre-release part of the package version, empty for a final release
const VERSION_PRERELEASE: &str = env!("CARGO_PKG_VERSION_PRE");

/// The plugin version with a `v` prefix, matching other CNI plugins
pub fn get() -> String {
    format!("v{VERSION}")
}

/// Whether this build is a pre-release
pub fn is_prerelease() -> bool {
    !VERSION_PRERELEASE.is_empty()
}

/// Source commit, set through `SMUGGLE_BUILD_COMMIT` at build time
pub fn build_commit() -> Option<&'static str> {
    option_env!("SMUGGLE_BUILD_COMMIT").filter(|v| !v.is_empty())
}

/// Build timestamp, set through `SMUGGLE_BUILD_TIME` at build time
pub fn build_time() -> Option<&'static str> {
    option_env!("SMUGGLE_BUILD_TIME").filter(|v| !v.is_empty())
}

/// One-line description printed when the plugin runs without a command
pub fn about() -> String {
    describe(build_commit(), build_time())
}

fn describe(commit: Option<&str>, built: Option<&str>) -> String {
    let mut line = format!("{} {}", env!("CARGO_PKG_NAME"), get());
    match (commit, built) {
        (Some(commit), Some(built)) => line.push_str(&format!(" (commit {commit}, built {built})")),
        (Some(commit), None) => line.push_str(&format!(" (commit {commit})")),
        (None, Some(built)) => line.push_str(&format!(" (built {built})")),
        (None, None) => {}
    }
    line
}
