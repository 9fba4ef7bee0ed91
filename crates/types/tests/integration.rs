//! Integration tests for bndl-types

use bndl_types::{
    Bundle, FileVersion, Package, PackageOperation, Payload, PayloadSource, RollbackBoundary,
};

#[test]
fn bundle_manifest_serialization_is_stable() {
    let bundle = Bundle::new("com.example.app", "Example App", FileVersion::new(2, 4, 0, 11))
        .with_boundary(RollbackBoundary::new("core").transactional(true))
        .with_boundary(RollbackBoundary::new("optional").vital(false))
        .with_package(
            Package::new("vcredist", FileVersion::new(14, 0, 30704, 0), "core").with_payload(
                Payload::new("vcredist.exe")
                    .with_digest("aa".repeat(32))
                    .with_size(14_338_056)
                    .with_source(PayloadSource::Url {
                        url: "https://example.invalid/vcredist.exe".into(),
                    }),
            ),
        )
        .with_package(
            Package::new("app", FileVersion::new(2, 4, 0, 11), "core")
                .with_dependency("vcredist"),
        )
        .with_package(
            Package::new("docs", FileVersion::new(2, 4, 0, 11), "optional").vital(false),
        );

    let first = serde_json::to_string(&bundle).unwrap();
    let second = serde_json::to_string(&serde_json::from_str::<Bundle>(&first).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn versions_in_manifests_compare_numerically() {
    let old: FileVersion = "1.9.0.0".parse().unwrap();
    let new: FileVersion = "1.10.0.0".parse().unwrap();
    assert!(old < new, "1.10 is newer than 1.9, not a string compare");
}

#[test]
fn uninstall_of_installed_group_restores_by_inverse() {
    // The inverse chain used by transaction rollback must terminate.
    let op = PackageOperation::Install;
    assert_eq!(op.inverse().inverse(), op);
}
