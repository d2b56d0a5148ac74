fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/subscription_service.proto");

    // Vendored protoc keeps builds reproducible on hosts without a system install.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);
    let well_known_types = protoc_bin_vendored::include_path()
        .map_err(|e| format!("failed to locate vendored protobuf includes: {e}"))?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[std::path::PathBuf::from("proto/subscription_service.proto")],
            &[std::path::PathBuf::from("proto"), well_known_types],
        )
        .unwrap_or_else(|e| panic!("protobuf compile error: {}", e));

    Ok(())
}
