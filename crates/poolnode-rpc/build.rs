use std::{env, error::Error};

use protoc_bin_vendored::protoc_bin_path;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=proto/pool/v1/pool.proto");

    let protoc = protoc_bin_path()?;
    unsafe {
        env::set_var("PROTOC", &protoc);
    }

    // The node only ever calls the coordinator.
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/pool/v1/pool.proto"], &["proto"])?;
    Ok(())
}
