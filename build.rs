use std::env;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_else(|_| String::from("unknown"));
    if target_os == "windows" {
        println!("cargo:rerun-if-changed=assets/app/icon.ico");
        let mut res = winres::WindowsResource::new();

        if Path::new("assets/app/icon.ico").exists() {
            res.set_icon("assets/app/icon.ico");
        }

        let product = env::var("SPEEDTUNE_PRODUCT").unwrap_or_else(|_| "Speedtune".into());
        let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into());
        res.set("FileDescription", "Speed-aware preview player node");
        res.set("ProductName", &product);
        res.set("ProductVersion", &version);
        res.set("FileVersion", &version);
        res.set("OriginalFilename", "speedtune.exe");
        res.set("InternalName", "speedtune");

        if let Err(e) = res.compile() {
            eprintln!("Failed to embed Windows resources: {e}");
        }
    }
}
