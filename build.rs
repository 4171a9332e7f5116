use std::process::Command;

fn git_short_sha() -> Option<String> {
    let from_git = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|s| !s.is_empty());

    // CI builds from tarballs have no .git; allow GIT_SHA instead
    from_git.or_else(|| std::env::var("GIT_SHA").ok().filter(|s| !s.is_empty()))
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");

    let is_nightly = std::env::var("MQTT_PVINVERTER_NIGHTLY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // /Mgmt/ProcessVersion on the bus shows this string
    let version = match (is_nightly, git_short_sha()) {
        (true, Some(sha)) => format!("{}-nightly+{}", base, sha),
        (true, None) => format!("{}-nightly", base),
        (false, _) => base.to_string(),
    };

    println!("cargo:rustc-env=APP_VERSION={}", version);

    println!("cargo:rerun-if-env-changed=MQTT_PVINVERTER_NIGHTLY");
    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
