fn main() {
    // Short commit hash for the version banner; BOTDASH_GIT_HASH overrides it
    // for builds from a source tarball
    let git_hash = std::env::var("BOTDASH_GIT_HASH")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::process::Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .and_then(|o| String::from_utf8(o.stdout).ok())
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "dev".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-env-changed=BOTDASH_GIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
