use std::env;

pub fn main() {
    generate_version_info();

    println!("cargo:rerun-if-changed=proto");
    prost_build::compile_protos(&["proto/snapshot.proto"], &["proto"])
        .expect("Failed to compile proto/snapshot.proto");
}

/// Generate version information from git tags using vergen.
///
/// - For tagged commits: the tag name (e.g., "v0.1.4")
/// - For commits after a tag: tag + commits + hash (e.g., "v0.1.4-2-ge930185")
/// - For dirty working trees: appends "-dirty"
/// - For non-git environments: falls back to "0.0.0-dev"
///
/// Accessible via `env!("VERGEN_GIT_DESCRIBE")` / `env!("VERGEN_GIT_SHA")`.
fn generate_version_info() {
    use vergen_git2::{BuildBuilder, CargoBuilder, Emitter, Git2Builder};

    let build = BuildBuilder::default()
        .build_timestamp(true)
        .build()
        .expect("Failed to configure build info");

    let cargo = CargoBuilder::default()
        .target_triple(true)
        .build()
        .expect("Failed to configure cargo info");

    let git2 = Git2Builder::default()
        .describe(true, true, None)
        .sha(true)
        .build()
        .expect("Failed to configure git info");

    let emitter_result = Emitter::default()
        .add_instructions(&build)
        .and_then(|e| e.add_instructions(&cargo))
        .and_then(|e| e.add_instructions(&git2))
        .map(|e| e.emit());

    if emitter_result.is_err() {
        // No .git directory (e.g. packaged tarball) - fall back to env defaults
        // so the build doesn't hard-fail outside a git checkout.
        println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=0.0.0-dev");
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
        println!("cargo:rustc-env=VERGEN_BUILD_TIMESTAMP=unknown");
        println!("cargo:rustc-env=VERGEN_CARGO_TARGET_TRIPLE={}", env::var("TARGET").unwrap_or_default());
    }
}
