//! Build script for swift-signals.
//!
//! Compiles the service protobuf contracts into Rust code using
//! tonic-prost-build. Both services and the gateway clients share the
//! generated types, so everything is compiled into the one library.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = [
        "proto/swiftsignals/user/v1/user.proto",
        "proto/swiftsignals/intersection/v1/intersection.proto",
    ];

    for proto in &protos {
        println!("cargo::rerun-if-changed={proto}");
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &["proto"])?;

    Ok(())
}
