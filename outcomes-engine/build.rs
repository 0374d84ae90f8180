//! Build script for outcomes-engine
//!
//! Embeds GIT_HASH, BUILD_TIMESTAMP and BUILD_PROFILE for the startup
//! banner and `/health`. Builds from a source archive have no `.git`;
//! they can pass the hash through `OUTCOMES_GIT_HASH` instead.

use std::process::Command;

const HASH_OVERRIDE_ENV: &str = "OUTCOMES_GIT_HASH";

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

fn main() {
    let git_hash = std::env::var(HASH_OVERRIDE_ENV)
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);

    // Rerun on commits and on override changes rather than on every build
    println!("cargo:rerun-if-env-changed={}", HASH_OVERRIDE_ENV);
    if std::path::Path::new("../.git/HEAD").exists() {
        println!("cargo:rerun-if-changed=../.git/HEAD");
        println!("cargo:rerun-if-changed=../.git/refs/heads");
    }
}
