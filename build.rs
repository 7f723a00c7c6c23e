use std::env;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

// Exposes MPCHAT_GIT_SHA and MPCHAT_BUILD_TS to `mpchat --version`.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    println!("cargo:rustc-env=MPCHAT_GIT_SHA={}", short_commit());
    println!("cargo:rustc-env=MPCHAT_BUILD_TS={}", build_epoch());
}

fn short_commit() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn build_epoch() -> String {
    match env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) if !epoch.trim().is_empty() => epoch.trim().to_string(),
        _ => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
            .to_string(),
    }
}
