use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let proto_path = manifest_dir.join("proto/csi.proto");
    let proto_dir = manifest_dir.join("proto");
    let descriptor_path = out_dir.join("csi_descriptor.bin");

    // Fall back to the bundled protoc when the host has none configured.
    if std::env::var_os("PROTOC").is_none() {
        // SAFETY: build scripts are single-threaded.
        unsafe { std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?) };
    }
    let well_known_dir = protoc_bin_vendored::include_path()?;

    println!("cargo:rerun-if-changed={}", proto_path.display());

    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&[proto_path], &[proto_dir, well_known_dir])?;
    Ok(())
}
