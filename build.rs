use std::path::PathBuf;

fn main() {
    // Only the `native` feature links the bridge library.
    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }

    println!("cargo:rerun-if-env-changed=GUB_LIB_DIR");

    match std::env::var_os("GUB_LIB_DIR").map(PathBuf::from) {
        Some(lib_dir) if lib_dir.exists() => {
            // Tell rustc where to find GstUnityBridge for linking
            println!("cargo:rustc-link-search=native={}", lib_dir.display());
        }
        Some(lib_dir) => {
            println!(
                "cargo:warning=GstUnityBridge library dir not found at {}",
                lib_dir.display()
            );
        }
        None => {
            println!("cargo:warning=GUB_LIB_DIR not set, relying on the system linker path");
        }
    }
}
