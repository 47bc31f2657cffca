//! Build script for the storefront crate.
//!
//! Hashes `static/css/main.css` so templates can reference a cache-busting
//! stylesheet URL.

use std::env;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

fn main() {
    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:rustc-env=CSS_HASH=");
        return;
    };
    let css_path = Path::new(&manifest_dir).join("static/css/main.css");
    println!("cargo:rerun-if-changed={}", css_path.display());

    let hash = match fs::read(&css_path) {
        Ok(content) => {
            let digest = format!("{:x}", Sha256::digest(&content));
            digest[..8].to_owned()
        }
        Err(e) => {
            println!("cargo:warning=Could not read main.css: {e}");
            String::new()
        }
    };

    println!("cargo:rustc-env=CSS_HASH={hash}");
}
