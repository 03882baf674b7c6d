//! Build script for detecting system dependencies and providing installation guidance.
//!
//! Checks for the OpenCV development package and pkg-config, and reminds
//! about the face models the binary loads at runtime.

use std::path::Path;
use std::process::Command;

/// Model paths used by the default configuration, with their CLI flags
const DEFAULT_MODELS: [(&str, &str, &str); 2] = [
    ("Face detector", "assets/face_detector.onnx", "--face-model"),
    ("Face mesh", "assets/face_mesh.onnx", "--model"),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    if check_pkg_config() {
        check_opencv();
    }
    check_onnx_runtime();
    check_models();
}

fn pkg_config(args: &[&str]) -> Option<String> {
    let output = Command::new("pkg-config").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_pkg_config() -> bool {
    if let Some(version) = pkg_config(&["--version"]) {
        println!("cargo:warning=Found pkg-config version: {version}");
        true
    } else {
        println!("cargo:warning=pkg-config not found. This is required to find system libraries.");
        println!("cargo:warning=On Ubuntu: sudo apt-get install pkg-config");
        println!("cargo:warning=On macOS: brew install pkg-config");
        false
    }
}

fn check_opencv() {
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rerun-if-env-changed=OPENCV_LINK_PATHS");
    println!("cargo:rerun-if-env-changed=OPENCV_INCLUDE_PATHS");

    match ["opencv4", "opencv"]
        .iter()
        .find_map(|module| pkg_config(&["--modversion", module]))
    {
        Some(version) => println!("cargo:warning=Found OpenCV version: {version}"),
        None => {
            println!("cargo:warning=OpenCV not found via pkg-config. Capture and display need libopencv with highgui and videoio.");
            println!("cargo:warning=On Ubuntu: sudo apt-get install libopencv-dev clang libclang-dev");
            println!("cargo:warning=On macOS: brew install opencv");
        }
    }
}

fn check_onnx_runtime() {
    println!("cargo:rerun-if-env-changed=ORT_STRATEGY");
    println!("cargo:rerun-if-env-changed=ORT_LIB_LOCATION");

    if let Ok(location) = std::env::var("ORT_LIB_LOCATION") {
        if !Path::new(&location).exists() {
            println!("cargo:warning=ORT_LIB_LOCATION points to a missing directory: {location}");
        }
    }
}

fn check_models() {
    for (name, path, flag) in DEFAULT_MODELS {
        println!("cargo:rerun-if-changed={path}");
        if !Path::new(path).exists() {
            println!("cargo:warning={name} model not found at {path}.");
            println!("cargo:warning=Place the ONNX export there, or pass {flag} at runtime.");
        }
    }
}
