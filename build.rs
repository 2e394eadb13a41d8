fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let gstreamer = std::env::var_os("CARGO_FEATURE_GSTREAMER").is_some();
    if gstreamer && cfg!(target_os = "macos") {
        // GStreamer.framework from the official macOS installer
        println!("cargo:rustc-link-search=framework=/Library/Frameworks");
        println!(
            "cargo:rustc-link-arg=-Wl,-rpath,/Library/Frameworks/GStreamer.framework/Versions/1.0/lib"
        );
    }
}
