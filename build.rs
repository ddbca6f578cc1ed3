fn main() {
    // ── macOS: embed Info.plist so CoreBluetooth grants Bluetooth access ──────
    //
    // A CLI binary without NSBluetoothAlwaysUsageDescription in an embedded
    // Info.plist never leaves the "unauthorised" state and scans find nothing.
    // The plist goes into the __TEXT,__info_plist section of the Mach-O image
    // via `-sectcreate`, which macOS reads like a bundle's Info.plist.
    //
    // CARGO_CFG_TARGET_OS is the target OS, so cross builds work too.
    println!("cargo:rerun-if-changed=Info.plist");
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }
    let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR unset, Info.plist not embedded");
        return;
    };
    let plist = format!("{dir}/Info.plist");
    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg-bins={arg}");
    }
}
