// SPDX-License-Identifier: MIT OR Apache-2.0

fn main() {
    // Vendor protoc rather than requiring it on the build host's PATH, matching
    // the teacher's own build.rs.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }

    tonic_build::configure()
        .compile_protos(&["proto/vault/v1/vault.proto"], &["proto"])
        .unwrap();
}
