use std::process::Command;

fn main() {
    let version = env!("CARGO_PKG_VERSION");

    // Release builds report the plain package version
    let profile = std::env::var("PROFILE").unwrap_or_default();
    if profile == "release" {
        println!("cargo:rustc-env=VERSION_STRING={}", version);
        return;
    }

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let is_dirty = Command::new("git")
        .args(["diff-index", "--quiet", "HEAD"])
        .output()
        .map(|output| !output.status.success())
        .unwrap_or(false);

    let suffix = if is_dirty { "-dirty" } else { "" };
    println!(
        "cargo:rustc-env=VERSION_STRING={}+{}{}",
        version, git_hash, suffix
    );
}
