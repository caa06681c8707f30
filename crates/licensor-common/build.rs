//! ---
//! lic_section: "05-runtime-common"
//! lic_subsection: "build"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Emits build metadata consumed by the version module."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    EmitBuilder::builder()
        .build_timestamp()
        .cargo_target_triple()
        .cargo_debug()
        .emit()?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
