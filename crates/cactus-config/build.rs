fn main() {
    // option_env!() values are cached by cargo unless the build script
    // declares them.
    println!("cargo:rerun-if-env-changed=CACTUS_APP_ID");
    println!("cargo:rerun-if-env-changed=CACTUS_BASE_URL");
}
