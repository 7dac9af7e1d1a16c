use std::env;

fn main() {
    // Handle OpenBLAS linking when cpu_openblas feature is enabled
    if env::var("CARGO_FEATURE_CPU_OPENBLAS").is_ok() {
        println!("cargo:warning=CPU OpenBLAS feature enabled, configuring linking...");

        if let Ok(dir) = env::var("OPENBLAS_PATH") {
            println!("cargo:rustc-link-search=native={}", dir);
        }
        println!("cargo:rustc-link-lib=openblas");

        // Ensure rebuild if relevant env vars change
        println!("cargo:rerun-if-env-changed=OPENBLAS_PATH");
    }

    println!("cargo:rerun-if-changed=build.rs");
}
