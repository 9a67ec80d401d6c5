fn main() {
    println!("cargo:rerun-if-env-changed=NEUTRINO_TAU_NATIVE_DIR");

    if std::env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return;
    }
    if let Some(dir) = std::env::var_os("NEUTRINO_TAU_NATIVE_DIR") {
        println!(
            "cargo:rustc-link-search=native={}",
            std::path::PathBuf::from(dir).display()
        );
    }
}
