use std::process::Command;

// Stamps the build with a short commit id for the banner and /health.
// Container builds have no .git, so RELAY_BUILD_SHA can supply it instead.
fn main() {
    let sha = std::env::var("RELAY_BUILD_SHA")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            let out = Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()?;
            out.status
                .success()
                .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
        })
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=RELAY_BUILD_SHA={sha}");
    println!("cargo:rerun-if-env-changed=RELAY_BUILD_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
